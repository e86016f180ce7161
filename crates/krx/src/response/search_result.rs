//! 📦 SearchResult: one hit, with the document and the engine's notes kept apart.
//!
//! The document's own fields live in `source`. Score, highlight, explanation and
//! friends live in `meta`, so a document with a field called `score` doesn't get
//! clobbered by the engine's opinion of it.

use serde_json::Value;

/// 🏷️ What the engine says about a hit, as opposed to what the hit says about itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HitMeta {
    pub score: Option<f64>,
    pub highlight: Option<Value>,
    pub explanation: Option<Value>,
    pub sort: Option<Vec<Value>>,
    pub routing: Option<String>,
}

/// 📦 One hit.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub id: String,
    pub index: Option<String>,
    pub source: Value,
    pub meta: HitMeta,
}

impl SearchResult {
    /// 🔧 Build from one raw `hits.hits[]` entry. Missing pieces stay empty.
    pub fn from_hit(hit: &Value) -> Self {
        let text = |key: &str| hit.get(key).and_then(Value::as_str).map(str::to_string);
        Self {
            id: text("_id").unwrap_or_default(),
            index: text("_index"),
            source: hit.get("_source").cloned().unwrap_or(Value::Null),
            meta: HitMeta {
                score: hit.get("_score").and_then(Value::as_f64),
                highlight: hit.get("highlight").cloned(),
                explanation: hit.get("_explanation").cloned(),
                sort: hit.get("sort").and_then(Value::as_array).cloned(),
                routing: text("_routing"),
            },
        }
    }

    /// 🔍 One field of the document.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.source.get(field)
    }
}
