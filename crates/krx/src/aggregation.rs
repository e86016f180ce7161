//! 📊 AggregationNode: the builder you get handed inside `aggregate_with`.
//!
//! Same vocabulary as a criteria (filters, sort, source, highlight, custom, pagination,
//! sub-aggregations) but nothing that only makes sense for a top-level search.
//! A node's filter changes what lands in the buckets, so scroll cursors, routing,
//! profiling and friends have no business sneaking in through `merge`. They get a
//! `NotSupported` at the door instead of being quietly dropped.
//!
//! 🧠 Knowledge graph:
//! - Compiles to the *body* of an aggregation entry: `aggregations`, plus a `filter`
//!   wrapper when it has constraints, plus `from`/`size` only when explicitly set.
//! - `aggregate_with` merges that body into the named entry.
//! - `scope` evaluates a named scope against a fresh criteria and merges the result in.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::criteria::Criteria;
use crate::error::{Error, Result};
use crate::index::Index;
use crate::query_builder::{QueryBuilder, Shape};

/// 📊 A nested, restricted builder for one aggregation entry.
#[derive(Debug, Clone)]
pub struct AggregationNode {
    target: Arc<Index>,
    shape: Shape,
}

impl QueryBuilder for AggregationNode {
    fn shape(&self) -> &Shape {
        &self.shape
    }

    fn derive_shape(&self, f: impl FnOnce(&mut Shape)) -> Self {
        let mut next = self.clone();
        f(&mut next.shape);
        next
    }

    fn target(&self) -> &Arc<Index> {
        &self.target
    }
}

impl AggregationNode {
    pub fn new(target: Arc<Index>) -> Self {
        Self {
            target,
            shape: Shape::default(),
        }
    }

    /// 🔗 Fold a criteria's filter state into this node.
    ///
    /// Fails with `NotSupported` if the criteria carries anything a node cannot hold:
    /// the top-level-only settings, and also `explain` and `track_total_hits`, which a
    /// node has no slot for and would otherwise drop without a word.
    pub fn merge(&self, criteria: &Criteria) -> Result<Self> {
        let forbidden = forbidden_fields(criteria);
        if !forbidden.is_empty() {
            return Err(Error::NotSupported(format!(
                "aggregation nodes cannot take {}",
                forbidden.join(", ")
            )));
        }
        Ok(Self {
            target: Arc::clone(&self.target),
            shape: self.shape.merged(&criteria.shape),
        })
    }

    /// 🔍 Evaluate a named scope and merge what it builds.
    pub fn scope(&self, name: &str, args: &[Value]) -> Result<Self> {
        let scope = self
            .target
            .resolve_scope(name)
            .ok_or_else(|| Error::UndefinedScope(name.to_string()))?;
        let built = scope(&self.target.criteria(), args)?;
        self.merge(&built)
    }

    /// 🏗️ The compiled entry body.
    pub fn to_value(&self) -> Value {
        let mut body = Map::new();
        if let Some(filter) = self.shape.query.to_bool() {
            body.insert("filter".to_string(), filter);
        }
        if let Some(offset) = self.shape.offset {
            body.insert("from".to_string(), Value::from(offset));
        }
        if let Some(limit) = self.shape.limit {
            body.insert("size".to_string(), Value::from(limit));
        }
        self.shape.write_sections(&mut body);
        self.shape.write_custom(&mut body);
        Value::Object(body)
    }
}

fn forbidden_fields(criteria: &Criteria) -> Vec<&'static str> {
    let checks = [
        ("profile", criteria.profile.is_some()),
        ("explain", criteria.explain.is_some()),
        ("failsafe", criteria.failsafe.is_some()),
        ("terminate_after", criteria.terminate_after.is_some()),
        ("timeout", criteria.timeout.is_some()),
        ("track_total_hits", criteria.track_total_hits.is_some()),
        ("scroll", criteria.scroll.is_some()),
        ("suggest", criteria.suggest.is_some()),
        ("includes", criteria.includes.is_some()),
        ("post filters", !criteria.post.is_empty()),
        ("preference", criteria.preference.is_some()),
        ("search_type", criteria.search_type.is_some()),
        ("routing", criteria.routing.is_some()),
        ("http_timeout", criteria.http_timeout.is_some()),
    ];
    checks
        .into_iter()
        .filter_map(|(name, set)| set.then_some(name))
        .collect()
}
