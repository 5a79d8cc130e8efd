//! Normalization of demodulator samples.
//!
//! Depending on the server version a sample comes back as a structured
//! object with one array per field, as a flat mapping, as a mapping nested
//! under `"value"`, or as a bare number. [`normalize`] turns any of these
//! into a [`DemodSample`], always keeping only the most recent value.

use serde_json::{Map, Value};

const FIELDS: [&str; 4] = ["x", "y", "r", "phi"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Sample contains no data")]
    Empty,

    #[error("Unrecognized sample shape: {0}")]
    UnrecognizedShape(String),

    #[error("Field '{field}' is not numeric: {value}")]
    InvalidField { field: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DemodSample {
    pub x: f64,
    pub y: f64,
    pub r: f64,
    pub phi: f64,
    pub timestamp: Option<u64>,
}

impl DemodSample {
    /// Build a sample, deriving `r` and `phi` from `x` and `y` when `r` is
    /// zero but the rectangular components are not.
    pub fn new(x: f64, y: f64, r: f64, phi: f64) -> Self {
        let mut sample = Self {
            x,
            y,
            r,
            phi,
            timestamp: None,
        };
        sample.fill_polar();
        sample
    }

    fn fill_polar(&mut self) {
        if self.r == 0.0 && (self.x != 0.0 || self.y != 0.0) {
            self.r = self.x.hypot(self.y);
            self.phi = self.y.atan2(self.x);
        }
    }
}

/// Normalize a raw sample of any supported shape.
pub fn normalize(raw: &Value) -> Result<DemodSample, ParseError> {
    let mut sample = match raw {
        Value::Array(items) => {
            let last = items.last().ok_or(ParseError::Empty)?;
            return normalize(last);
        }
        Value::Object(map) if has_fields(map) => from_fields(map)?,
        Value::Object(map) => match map.get("value") {
            Some(inner) => {
                let mut sample = normalize(inner)?;
                sample.timestamp = sample.timestamp.or_else(|| timestamp_of(map));
                return Ok(sample);
            }
            None => return Err(ParseError::UnrecognizedShape(describe(raw))),
        },
        Value::Number(_) | Value::String(_) => {
            let x = scalar("x", raw)?.ok_or_else(|| ParseError::UnrecognizedShape(describe(raw)))?;
            DemodSample {
                x,
                y: 0.0,
                r: 0.0,
                phi: 0.0,
                timestamp: None,
            }
        }
        Value::Null | Value::Bool(_) => return Err(ParseError::UnrecognizedShape(describe(raw))),
    };

    sample.fill_polar();
    Ok(sample)
}

fn has_fields(map: &Map<String, Value>) -> bool {
    FIELDS.iter().any(|f| map.contains_key(*f))
}

fn from_fields(map: &Map<String, Value>) -> Result<DemodSample, ParseError> {
    let field = |name: &'static str| -> Result<f64, ParseError> {
        match map.get(name) {
            Some(value) => Ok(latest(name, value)?.unwrap_or(0.0)),
            None => Ok(0.0),
        }
    };

    Ok(DemodSample {
        x: field("x")?,
        y: field("y")?,
        r: field("r")?,
        phi: field("phi")?,
        timestamp: timestamp_of(map),
    })
}

fn timestamp_of(map: &Map<String, Value>) -> Option<u64> {
    map.get("timestamp").and_then(|v| match v {
        Value::Array(items) => items.last().and_then(Value::as_u64),
        other => other.as_u64(),
    })
}

/// The most recent value of a field. Arrays yield their last element and an
/// empty array yields `None`.
fn latest(field: &'static str, value: &Value) -> Result<Option<f64>, ParseError> {
    match value {
        Value::Array(items) => match items.last() {
            Some(last) => scalar(field, last),
            None => Ok(None),
        },
        other => scalar(field, other),
    }
}

fn scalar(field: &'static str, value: &Value) -> Result<Option<f64>, ParseError> {
    match value {
        Value::Number(n) => Ok(n.as_f64()),
        Value::String(s) => s.trim().parse::<f64>().map(Some).map_err(|_| ParseError::InvalidField {
            field,
            value: describe(value),
        }),
        Value::Null => Ok(None),
        _ => Err(ParseError::InvalidField {
            field,
            value: describe(value),
        }),
    }
}

fn describe(value: &Value) -> String {
    let mut text = value.to_string();
    if text.len() > 60 {
        let cut = (0..=60).rev().find(|i| text.is_char_boundary(*i)).unwrap_or(0);
        text.truncate(cut);
        text.push_str("...");
    }
    text
}
