//! Pulling the latest price out of exchange responses

use crate::error::{ReporterError, Result};
use crate::types::Quote;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

/// Timestamps above this are taken to be milliseconds
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Response shapes the reporter understands
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PriceExtractor {
    /// Gate-style candlesticks: `{"result": "true", "data": [[ts, volume, close, high, low, open], ...]}`.
    /// The last row is the most recent candle.
    Candlestick {
        #[serde(default = "default_close_index")]
        close_index: usize,
    },
    /// A direct last-price field, addressed by JSON pointer
    Field {
        pointer: String,
        #[serde(default)]
        timestamp_pointer: Option<String>,
    },
}

fn default_close_index() -> usize {
    2
}

impl Default for PriceExtractor {
    fn default() -> Self {
        PriceExtractor::Candlestick {
            close_index: default_close_index(),
        }
    }
}

impl PriceExtractor {
    pub fn extract(&self, body: &Value) -> Result<Quote> {
        match self {
            PriceExtractor::Candlestick { close_index } => extract_candlestick(body, *close_index),
            PriceExtractor::Field {
                pointer,
                timestamp_pointer,
            } => {
                let price = body
                    .pointer(pointer)
                    .and_then(scalar_text)
                    .ok_or_else(|| ReporterError::Quote(format!("no price at {}", pointer)))?;
                let observed_at = timestamp_pointer
                    .as_deref()
                    .and_then(|p| body.pointer(p))
                    .and_then(parse_timestamp)
                    .unwrap_or_else(Utc::now);
                Ok(Quote::new(price, observed_at))
            }
        }
    }
}

fn extract_candlestick(body: &Value, close_index: usize) -> Result<Quote> {
    if let Some(result) = body.get("result").and_then(scalar_text) {
        if result != "true" {
            return Err(ReporterError::Quote(format!(
                "source reported result={}",
                result
            )));
        }
    }

    let rows = body
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| ReporterError::Quote("missing candlestick data".to_string()))?;
    let last = rows
        .last()
        .and_then(Value::as_array)
        .ok_or_else(|| ReporterError::Quote("empty candlestick data".to_string()))?;

    let price = last
        .get(close_index)
        .and_then(scalar_text)
        .ok_or_else(|| {
            ReporterError::Quote(format!("candle has no column {}", close_index))
        })?;
    let observed_at = last
        .first()
        .and_then(parse_timestamp)
        .unwrap_or_else(Utc::now);

    Ok(Quote::new(price, observed_at))
}

/// Strings pass through untouched; numbers keep their JSON text
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let raw: i64 = match value {
        Value::Number(n) => n.as_i64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    if raw > MILLIS_THRESHOLD {
        DateTime::from_timestamp_millis(raw)
    } else {
        DateTime::from_timestamp(raw, 0)
    }
}
