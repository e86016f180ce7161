//! 🎯 `--where field=value` parsing.
//!
//! The value's spelling picks the `FilterValue` shape:
//! `a,b` is an array, `lo..hi` a range (either end may be blank), `null` is null,
//! and anything else is a JSON scalar if it parses as one, a plain string if not.

use anyhow::{Context, Result, bail};
use krx::FilterValue;
use serde_json::Value;

/// 🔪 Split `field=value` at the first `=`.
pub(crate) fn parse_pair(raw: &str) -> Result<(String, FilterValue)> {
    let (field, value) = raw
        .split_once('=')
        .with_context(|| format!("💀 --where expects field=value, got '{}'", raw))?;
    let field = field.trim();
    if field.is_empty() {
        bail!("💀 --where '{}' has no field name before the '='", raw);
    }
    Ok((field.to_string(), parse_value(value.trim())))
}

pub(crate) fn parse_value(raw: &str) -> FilterValue {
    if raw == "null" {
        return FilterValue::Null;
    }
    if let Some((min, max)) = raw.split_once("..") {
        return FilterValue::Range {
            min: bound(min),
            max: bound(max),
        };
    }
    if raw.contains(',') {
        return FilterValue::Array(raw.split(',').map(|item| scalar(item.trim())).collect());
    }
    FilterValue::Scalar(scalar(raw))
}

fn bound(raw: &str) -> Option<Value> {
    let raw = raw.trim();
    (!raw.is_empty()).then(|| scalar(raw))
}

/// -- numbers and booleans come through typed; everything else stays a string
fn scalar(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) if !value.is_object() && !value.is_array() && !value.is_null() => value,
        _ => Value::from(raw),
    }
}
