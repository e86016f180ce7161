//! 📭 Response: one decoded search result, plus everything derived from it.
//!
//! 🎬 COLD OPEN - INT. JSON BLOB - IMMEDIATELY AFTER THE ENGINE REPLIES
//!
//! `hits.total` is a number. Or an object with a `value` in it, depending on which
//! major version you woke up next to. Buckets are an array. Or a map, if somebody
//! asked for `keyed: true`. This module reads all of it once and hands back the
//! same answer every time you ask.
//!
//! 🧠 Knowledge graph:
//! - Holds the raw JSON plus a (cache-free) copy of the criteria that produced it,
//!   which is where offset and limit for the page math come from.
//! - `ids`, `results`, `records` and each normalized aggregation are computed once.
//! - `records` go through the index's `RecordFetcher` when one is registered and are
//!   re-sorted into hit order. Without a fetcher they are built from `_source`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use serde_json::{Map, Value, json};
use tokio::sync::OnceCell;
use tracing::trace;

use crate::criteria::Criteria;
use crate::error::Result;
use crate::index::Record;

pub mod search_result;

pub use search_result::{HitMeta, SearchResult};

/// 📭 A decoded search response.
#[derive(Debug)]
pub struct Response {
    raw: Value,
    criteria: Criteria,
    ids: OnceLock<Vec<String>>,
    results: OnceLock<Vec<SearchResult>>,
    records: OnceCell<Vec<Record>>,
    aggregations: Mutex<HashMap<String, Arc<Value>>>,
}

impl Response {
    pub fn new(raw: Value, criteria: Criteria) -> Self {
        Self {
            raw,
            criteria,
            ids: OnceLock::new(),
            results: OnceLock::new(),
            records: OnceCell::new(),
            aggregations: Mutex::new(HashMap::new()),
        }
    }

    /// 🛟 Zero hits, zero total. What a failsafe criteria returns when the engine doesn't.
    pub fn empty(criteria: Criteria) -> Self {
        Self::new(
            json!({
                "took": 0,
                "timed_out": false,
                "hits": {"total": {"value": 0, "relation": "eq"}, "hits": []}
            }),
            criteria,
        )
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn criteria(&self) -> &Criteria {
        &self.criteria
    }

    pub fn took(&self) -> Option<u64> {
        self.raw.get("took").and_then(Value::as_u64)
    }

    pub fn timed_out(&self) -> bool {
        self.raw
            .get("timed_out")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn scroll_id(&self) -> Option<&str> {
        self.raw.get("_scroll_id").and_then(Value::as_str)
    }

    /// 📦 The raw `hits.hits` array.
    pub fn hits(&self) -> &[Value] {
        self.raw
            .pointer("/hits/hits")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// 🔢 `hits.total`, whether it came as `42` or `{"value": 42}`.
    pub fn total_count(&self) -> u64 {
        match self.raw.pointer("/hits/total") {
            Some(Value::Object(total)) => total.get("value").and_then(Value::as_u64).unwrap_or(0),
            Some(total) => total.as_u64().unwrap_or(0),
            None => 0,
        }
    }

    pub fn total_entries(&self) -> u64 {
        self.total_count()
    }

    // ===== Page math =====

    fn offset(&self) -> i64 {
        i64::try_from(self.criteria.offset_value()).unwrap_or(i64::MAX)
    }

    fn limit(&self) -> i64 {
        i64::try_from(self.criteria.limit_value()).unwrap_or(i64::MAX)
    }

    /// 📄 `1 + offset / limit`. An aggregation-only query (limit 0) sits on page 1.
    pub fn current_page(&self) -> i64 {
        let limit = self.limit();
        if limit == 0 {
            return 1;
        }
        (self.offset() / limit).saturating_add(1)
    }

    /// 📄 `max(1, ceil(total / limit))`.
    pub fn total_pages(&self) -> i64 {
        let limit = self.limit();
        if limit == 0 {
            return 1;
        }
        let pages = self.total_count().div_ceil(limit.unsigned_abs());
        i64::try_from(pages).unwrap_or(i64::MAX).max(1)
    }

    pub fn previous_page(&self) -> Option<i64> {
        let current = self.current_page();
        if current <= 1 {
            return None;
        }
        let total_pages = self.total_pages();
        if current > total_pages {
            Some((current - 1).min(total_pages))
        } else {
            Some(current - 1)
        }
    }

    pub fn next_page(&self) -> Option<i64> {
        let current = self.current_page();
        if current >= self.total_pages() {
            return None;
        }
        if current < 1 {
            return Some(1);
        }
        Some(current + 1)
    }

    pub fn first_page(&self) -> bool {
        self.current_page() == 1
    }

    pub fn last_page(&self) -> bool {
        self.current_page() == self.total_pages()
    }

    pub fn out_of_range(&self) -> bool {
        self.current_page() > self.total_pages()
    }

    // ===== Hits =====

    /// 🆔 Hit ids in hit order.
    pub fn ids(&self) -> &[String] {
        self.ids.get_or_init(|| {
            self.hits()
                .iter()
                .filter_map(|hit| hit.get("_id").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
    }

    /// 📦 One `SearchResult` per hit, in hit order.
    pub fn results(&self) -> &[SearchResult] {
        self.results
            .get_or_init(|| self.hits().iter().map(SearchResult::from_hit).collect())
    }

    /// 🗄️ Records for this page, in hit order no matter what order the fetcher used.
    pub async fn records(&self) -> Result<&[Record]> {
        let records = self
            .records
            .get_or_try_init(|| self.load_records())
            .await?;
        Ok(records.as_slice())
    }

    async fn load_records(&self) -> Result<Vec<Record>> {
        let ids = self.ids();
        let Some(fetcher) = self.criteria.target.record_fetcher() else {
            return Ok(self
                .results()
                .iter()
                .map(|result| Record {
                    id: result.id.clone(),
                    data: result.source.clone(),
                })
                .collect());
        };

        let fetched = fetcher
            .fetch_records(ids, self.criteria.includes_list())
            .await?;
        trace!("🗄️ fetched {} records for {} ids", fetched.len(), ids.len());

        let mut by_id: HashMap<String, Record> = fetched
            .into_iter()
            .map(|record| (record.id.clone(), record))
            .collect();
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    // ===== Aggregations and suggestions =====

    /// 📊 The raw `aggregations` section, untouched.
    pub fn aggregations(&self) -> Option<&Value> {
        self.raw.get("aggregations")
    }

    /// 📊 One aggregation, normalized: bucket arrays become a map keyed by bucket key,
    /// keyed buckets come back as-is, metrics come back as-is.
    pub fn aggregation(&self, name: &str) -> Option<Arc<Value>> {
        let mut memo = self
            .aggregations
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(hit) = memo.get(name) {
            return Some(Arc::clone(hit));
        }
        let raw = self.aggregations()?.get(name)?;
        let normalized = Arc::new(normalize(raw));
        memo.insert(name.to_string(), Arc::clone(&normalized));
        Some(normalized)
    }

    /// 💡 Suggestions for one named suggester.
    pub fn suggestions(&self, name: &str) -> Option<&Value> {
        self.raw.get("suggest").and_then(|suggest| suggest.get(name))
    }
}

/// 🌳 Flatten one aggregation's buckets, and every bucketed sub-aggregation inside them.
pub(crate) fn normalize(aggregation: &Value) -> Value {
    match aggregation.get("buckets") {
        Some(Value::Array(buckets)) => {
            let mut by_key = Map::new();
            for bucket in buckets {
                by_key.insert(bucket_key(bucket), normalize_bucket(bucket));
            }
            Value::Object(by_key)
        }
        Some(Value::Object(buckets)) => Value::Object(
            buckets
                .iter()
                .map(|(key, bucket)| (key.clone(), normalize_bucket(bucket)))
                .collect(),
        ),
        _ => aggregation.clone(),
    }
}

fn normalize_bucket(bucket: &Value) -> Value {
    match bucket {
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(name, value)| {
                    let value = if value.get("buckets").is_some() {
                        normalize(value)
                    } else {
                        value.clone()
                    };
                    (name.clone(), value)
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

/// 🔑 The bucket's raw `key`. A `key_as_string` stays inside the bucket.
fn bucket_key(bucket: &Value) -> String {
    match bucket.get("key") {
        Some(Value::String(key)) => key.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}
