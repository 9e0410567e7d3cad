//! Streaming endpoint resolution
//!
//! An explicit base URL wins over the backend origin. Either one is upgraded
//! to its streaming scheme (`https` → `wss`, `http` → `ws`); any other
//! scheme is rejected.

use crate::core::EndpointError;

/// Resolved streaming endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEndpoint {
    url: String,
}

impl FeedEndpoint {
    /// Resolve `base` or `origin` joined with `path`
    ///
    /// ```
    /// use biogas_core::config::FeedEndpoint;
    ///
    /// let endpoint = FeedEndpoint::resolve(None, Some("https://plant.example"), "/ws/dataSensor/").unwrap();
    /// assert_eq!(endpoint.as_str(), "wss://plant.example/ws/dataSensor/");
    /// ```
    pub fn resolve(
        base: Option<&str>,
        origin: Option<&str>,
        path: &str,
    ) -> Result<Self, EndpointError> {
        let host = match (non_empty(base), non_empty(origin)) {
            (Some(base), _) => upgrade_scheme(base)?,
            (None, Some(origin)) => upgrade_scheme(origin)?,
            (None, None) => return Err(EndpointError::Missing),
        };

        let path = path.trim();
        let url = if path.is_empty() {
            host
        } else {
            format!(
                "{}/{}",
                host.trim_end_matches('/'),
                path.trim_start_matches('/')
            )
        };
        Ok(Self { url })
    }

    pub fn as_str(&self) -> &str {
        &self.url
    }

    pub fn into_string(self) -> String {
        self.url
    }

    pub fn is_secure(&self) -> bool {
        self.url.starts_with("wss://")
    }
}

impl std::fmt::Display for FeedEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.url)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn upgrade_scheme(url: &str) -> Result<String, EndpointError> {
    let (scheme, rest) = url
        .split_once("://")
        .ok_or_else(|| EndpointError::UnsupportedScheme(url.to_string()))?;

    let upgraded = match scheme.to_ascii_lowercase().as_str() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        _ => return Err(EndpointError::UnsupportedScheme(url.to_string())),
    };
    Ok(format!("{}://{}", upgraded, rest))
}
