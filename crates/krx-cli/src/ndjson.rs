//! 📜 NDJSON input for `krx import`: one document per line, optionally gzipped.
//!
//! The whole file is read up front (and inflated if it ends in `.gz`), then cut into
//! lines with `memchr`. Blank lines are skipped. Each document's id comes from one
//! of its own fields.

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde_json::Value;

/// 📦 One parsed line.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Line {
    pub id: String,
    pub document: Value,
    /// raw bytes this line took up, newline included, for the progress bar
    pub bytes: u64,
}

/// 📂 Read `path`, inflating it first when the name ends in `.gz`.
pub(crate) fn read_file(path: &Path) -> Result<Vec<u8>> {
    let raw = std::fs::read(path)
        .with_context(|| format!("💀 couldn't read import file '{}'", path.display()))?;
    let gzipped = path
        .extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("gz"));
    if !gzipped {
        return Ok(raw);
    }
    let mut inflated = Vec::new();
    flate2::read::GzDecoder::new(raw.as_slice())
        .read_to_end(&mut inflated)
        .with_context(|| format!("💀 '{}' ends in .gz but didn't inflate", path.display()))?;
    Ok(inflated)
}

/// 🔪 Byte ranges of every line, newline included. A last line without one still counts.
pub(crate) fn line_spans(bytes: &[u8]) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = 0;
    for end in memchr::memchr_iter(b'\n', bytes) {
        spans.push((start, end + 1));
        start = end + 1;
    }
    if start < bytes.len() {
        spans.push((start, bytes.len()));
    }
    spans
}

/// 🧾 Parse one line. `Ok(None)` for blank ones.
pub(crate) fn parse_line(raw: &[u8], number: usize, id_field: &str) -> Result<Option<Line>> {
    let text = std::str::from_utf8(raw)
        .with_context(|| format!("💀 line {} is not UTF-8", number))?
        .trim();
    if text.is_empty() {
        return Ok(None);
    }
    let document: Value = serde_json::from_str(text)
        .with_context(|| format!("💀 line {} is not valid JSON", number))?;
    let id = match document.get(id_field) {
        Some(Value::String(id)) => id.clone(),
        Some(Value::Number(id)) => id.to_string(),
        Some(_) => bail!("💀 line {}: '{}' must be a string or a number", number, id_field),
        None => bail!("💀 line {} has no '{}' field to use as the id", number, id_field),
    };
    Ok(Some(Line {
        id,
        document,
        bytes: raw.len() as u64,
    }))
}
