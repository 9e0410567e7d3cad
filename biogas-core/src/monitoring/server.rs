//! HTTP server for metrics export and the sensor read API
//!
//! Endpoints:
//! - `GET /metrics`: Prometheus text format
//! - `GET /health`: liveness
//! - `GET /api/status`: connection status and retry counter
//! - `GET /api/sensors[?range=5min|15min|1hr]`: current snapshot as JSON
//! - `POST /api/reconnect`, `POST /api/disconnect`: manual connection control

use super::MetricsRegistry;
use crate::data::{SensorFeedHandle, TimeRange};
use anyhow::{Context, Result};
use chrono::Utc;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Configuration for the monitoring HTTP server
#[derive(Debug, Clone)]
pub struct MonitoringServerConfig {
    /// Address to bind to (e.g., "0.0.0.0:9090")
    pub listen_addr: SocketAddr,
}

impl Default for MonitoringServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 9090)),
        }
    }
}

/// State shared by every connection
struct ApiState {
    registry: Arc<MetricsRegistry>,
    feed: SensorFeedHandle,
}

#[derive(Serialize)]
struct StatusBody {
    status: crate::core::ConnectionStatus,
    connected: bool,
    retry_count: u32,
    sensors: usize,
}

/// HTTP server for metrics and the read API
pub struct MonitoringServer {
    config: MonitoringServerConfig,
    state: Arc<ApiState>,
}

impl MonitoringServer {
    /// Create a new monitoring server
    pub fn new(
        config: MonitoringServerConfig,
        registry: Arc<MetricsRegistry>,
        feed: SensorFeedHandle,
    ) -> Self {
        Self {
            config,
            state: Arc::new(ApiState { registry, feed }),
        }
    }

    /// Bind the configured address and serve forever
    ///
    /// It should be spawned in a separate tokio task.
    pub async fn serve(self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.listen_addr)
            .await
            .context("Failed to bind monitoring server")?;
        self.serve_on(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve_on(self, listener: TcpListener) -> Result<()> {
        let local_addr = listener.local_addr().context("Listener has no local address")?;
        info!("Monitoring server listening on http://{}", local_addr);

        loop {
            let (stream, remote_addr) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    continue;
                }
            };

            let state = Arc::clone(&self.state);

            // Spawn a new task for each connection
            tokio::spawn(async move {
                let io = TokioIo::new(stream);

                let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                    let state = Arc::clone(&state);
                    async move { handle_request(req, state).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    debug!("Connection error from {}: {}", remote_addr, err);
                }
            });
        }
    }
}

/// Handle HTTP request
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<ApiState>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    debug!("Monitoring request: {} {}", req.method(), req.uri());
    Ok(route(req.method(), req.uri().path(), req.uri().query(), &state))
}

fn route(method: &Method, path: &str, query: Option<&str>, state: &ApiState) -> Response<Full<Bytes>> {
    match (method, path) {
        (&Method::GET, "/health") | (&Method::GET, "/healthz") => text(StatusCode::OK, "OK"),

        (&Method::GET, "/metrics") => match encode_metrics(&state.registry) {
            Ok(metrics_text) => {
                let mut response = text(StatusCode::OK, metrics_text);
                response.headers_mut().insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static("text/plain; version=0.0.4"),
                );
                response
            }
            Err(e) => {
                error!("Failed to encode metrics: {}", e);
                text(StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", e))
            }
        },

        (&Method::GET, "/api/status") => {
            let feed_state = state.feed.state();
            json(
                StatusCode::OK,
                &StatusBody {
                    status: feed_state.status,
                    connected: feed_state.status.is_connected(),
                    retry_count: feed_state.retry_count,
                    sensors: state.feed.snapshot().len(),
                },
            )
        }

        (&Method::GET, "/api/sensors") => match query_param(query, "range") {
            None => json(StatusCode::OK, state.feed.snapshot().as_ref()),
            Some(raw) => match raw.parse::<TimeRange>() {
                Ok(range) => json(StatusCode::OK, &state.feed.snapshot().windowed(range, Utc::now())),
                Err(e) => text(StatusCode::BAD_REQUEST, e.to_string()),
            },
        },

        (&Method::POST, "/api/reconnect") => {
            info!("Manual reconnect requested over HTTP");
            state.feed.reconnect();
            json(StatusCode::ACCEPTED, &serde_json::json!({"requested": "reconnect"}))
        }

        (&Method::POST, "/api/disconnect") => {
            info!("Disconnect requested over HTTP");
            state.feed.disconnect();
            json(StatusCode::ACCEPTED, &serde_json::json!({"requested": "disconnect"}))
        }

        // Root endpoint - simple help page
        (&Method::GET, "/") => text(
            StatusCode::OK,
            "Biogas Sensor Monitor\n\nEndpoints:\n  GET  /metrics - Prometheus metrics\n  GET  /health - Health check\n  GET  /api/status - Connection status\n  GET  /api/sensors[?range=5min|15min|1hr] - Sensor readings\n  POST /api/reconnect - Reconnect now\n  POST /api/disconnect - Disconnect\n",
        ),

        (_, "/health" | "/healthz" | "/metrics" | "/api/status" | "/api/sensors" | "/api/reconnect" | "/api/disconnect") => {
            text(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
        }

        _ => {
            warn!("Unknown monitoring endpoint requested: {}", path);
            text(StatusCode::NOT_FOUND, "Not Found")
        }
    }
}

fn query_param<'a>(query: Option<&'a str>, name: &str) -> Option<&'a str> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

fn text(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}

fn json<T: Serialize + ?Sized>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(body) {
        Ok(bytes) => {
            let mut response = text(status, bytes);
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(e) => {
            error!("Failed to serialize response: {}", e);
            text(StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", e))
        }
    }
}

/// Encode metrics to Prometheus text format
pub fn encode_metrics(registry: &MetricsRegistry) -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = registry.registry().gather();

    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .context("Failed to encode metrics")?;

    String::from_utf8(buffer).context("Invalid UTF-8 in metrics")
}
