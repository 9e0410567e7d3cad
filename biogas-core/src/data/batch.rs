//! Demultiplexing of inbound batches
//!
//! A batch is a JSON object keyed by sensor topic:
//!
//! ```json
//! {"Biogestor/temperatura": ["35.1", "35.2"], "Biogestor/ph": ["7.0"]}
//! ```
//!
//! Values are the samples accumulated since the previous batch, oldest first.

use serde_json::{Map, Value};

/// Topic → value list, in wire order
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorBatch<'a> {
    object: &'a Map<String, Value>,
}

impl<'a> SensorBatch<'a> {
    /// View a JSON object as a batch; anything else is not a batch
    pub fn from_value(value: &'a Value) -> Option<Self> {
        value.as_object().map(|object| Self { object })
    }

    pub fn entries(&self) -> impl Iterator<Item = (&'a str, &'a Value)> + 'a {
        self.object.iter().map(|(topic, values)| (topic.as_str(), values))
    }

    pub fn len(&self) -> usize {
        self.object.len()
    }

    pub fn is_empty(&self) -> bool {
        self.object.is_empty()
    }
}

/// Sensor code for a topic: the first matching prefix is removed
pub fn strip_namespace<'a, S: AsRef<str>>(topic: &'a str, prefixes: &[S]) -> &'a str {
    prefixes
        .iter()
        .find_map(|prefix| topic.strip_prefix(prefix.as_ref()))
        .unwrap_or(topic)
}

/// Parse one sample; numbers are taken as-is, strings by their leading
/// decimal literal (`"12.5abc"` → 12.5)
///
/// NaN and infinities are rejected along with anything unparsable.
pub fn parse_sample(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::String(text) => numeric_prefix(text)?.parse::<f64>().ok()?,
        Value::Number(number) => number.as_f64()?,
        _ => return None,
    };
    parsed.is_finite().then_some(parsed)
}

/// Longest `[+-]digits[.digits][e[+-]digits]` prefix after leading whitespace
fn numeric_prefix(text: &str) -> Option<&str> {
    let text = text.trim_start();
    let bytes = text.as_bytes();
    let digits_from = |mut i: usize| {
        while bytes.get(i).map_or(false, u8::is_ascii_digit) {
            i += 1;
        }
        i
    };

    let mut end = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    let int_end = digits_from(end);
    let mut mantissa_digits = int_end - end;
    end = int_end;

    if bytes.get(end) == Some(&b'.') {
        let frac_end = digits_from(end + 1);
        mantissa_digits += frac_end - (end + 1);
        end = frac_end;
    }
    if mantissa_digits == 0 {
        return None;
    }

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let sign = usize::from(matches!(bytes.get(end + 1), Some(b'+' | b'-')));
        let exp_end = digits_from(end + 1 + sign);
        if exp_end > end + 1 + sign {
            end = exp_end;
        }
    }
    Some(&text[..end])
}

/// Parsed samples of one entry and how many were rejected
///
/// `None` when the entry's value is not an array.
pub fn parse_samples(values: &Value) -> Option<(Vec<f64>, usize)> {
    let items = values.as_array()?;
    let parsed: Vec<f64> = items.iter().filter_map(parse_sample).collect();
    let rejected = items.len() - parsed.len();
    Some((parsed, rejected))
}
