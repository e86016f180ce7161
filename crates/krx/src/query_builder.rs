//! 🧱 QueryBuilder: the vocabulary a `Criteria` and an `AggregationNode` share.
//!
//! Filtering, sorting, source selection, highlighting, custom sections, pagination and
//! aggregation attachment all work the same way in both places. The state for all of it
//! lives in one `Shape`, and every provided method here is "copy the shape, change one
//! thing, hand back a new builder". Implementors only say how to copy themselves.
//!
//! 🧠 Knowledge graph:
//! - `Criteria::derive_shape` also drops the memoized response, so a derived criteria
//!   never inherits its parent's cached result.
//! - `AggregationNode` has no cache and no top-level-only fields, just the shape.
//! - Compilation of the shared sections lives on `Shape` so both compile the same way.

use std::sync::Arc;

use serde_json::{Map, Value, json};

use crate::aggregation::AggregationNode;
use crate::criteria::constraints::{Constraints, exists_clause};
use crate::criteria::filter_value::FilterValue;
use crate::error::Result;
use crate::index::Index;

/// 📦 The shared state. Options are "unset"; unset and empty compile differently.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Shape {
    pub(crate) query: Constraints,
    pub(crate) sort: Option<Vec<Value>>,
    pub(crate) source: Option<Value>,
    pub(crate) offset: Option<u64>,
    pub(crate) limit: Option<u64>,
    pub(crate) aggregations: Option<Map<String, Value>>,
    pub(crate) highlight: Option<Map<String, Value>>,
    pub(crate) custom: Option<Map<String, Value>>,
}

impl Shape {
    /// 🔗 Merge rules: sequences concatenate (self first), scalars are right-biased,
    /// mappings merge key-wise with the right side winning collisions.
    pub(crate) fn merged(&self, other: &Shape) -> Shape {
        Shape {
            query: self.query.merged(&other.query),
            sort: merge_seq(&self.sort, &other.sort),
            source: other.source.clone().or_else(|| self.source.clone()),
            offset: other.offset.or(self.offset),
            limit: other.limit.or(self.limit),
            aggregations: merge_map(&self.aggregations, &other.aggregations),
            highlight: merge_map(&self.highlight, &other.highlight),
            custom: merge_map(&self.custom, &other.custom),
        }
    }

    /// 🏗️ Write the optional shared sections into a request body.
    /// Pagination is not written here; the two callers disagree about defaults.
    pub(crate) fn write_sections(&self, body: &mut Map<String, Value>) {
        if let Some(ref sort) = self.sort {
            body.insert("sort".to_string(), Value::Array(sort.clone()));
        }
        if let Some(ref aggregations) = self.aggregations {
            body.insert(
                "aggregations".to_string(),
                Value::Object(aggregations.clone()),
            );
        }
        if let Some(ref highlight) = self.highlight {
            body.insert("highlight".to_string(), Value::Object(highlight.clone()));
        }
        if let Some(ref source) = self.source {
            body.insert("_source".to_string(), source.clone());
        }
    }

    /// 🎨 Custom keys go last and win every collision.
    pub(crate) fn write_custom(&self, body: &mut Map<String, Value>) {
        if let Some(ref custom) = self.custom {
            for (key, value) in custom {
                body.insert(key.clone(), value.clone());
            }
        }
    }
}

pub(crate) fn merge_seq<T: Clone>(a: &Option<Vec<T>>, b: &Option<Vec<T>>) -> Option<Vec<T>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.iter().chain(b).cloned().collect()),
        (Some(a), None) => Some(a.clone()),
        (None, b) => b.clone(),
    }
}

pub(crate) fn merge_map(
    a: &Option<Map<String, Value>>,
    b: &Option<Map<String, Value>>,
) -> Option<Map<String, Value>> {
    match (a, b) {
        (Some(a), Some(b)) => {
            let mut merged = a.clone();
            for (key, value) in b {
                merged.insert(key.clone(), value.clone());
            }
            Some(merged)
        }
        (Some(a), None) => Some(a.clone()),
        (None, b) => b.clone(),
    }
}

/// 🔧 Shallow-merge the keys of `extra` (if it is an object) into `map`.
pub(crate) fn extend_object(map: &mut Map<String, Value>, extra: Value) {
    if let Value::Object(extra) = extra {
        for (key, value) in extra {
            map.insert(key, value);
        }
    }
}

/// 📊 The default aggregation entry for a field: a terms aggregation on that field,
/// with `options` (size, order, ...) merged into the terms body.
pub(crate) fn terms_entry(field: &str, options: Value) -> Value {
    let mut terms = Map::new();
    terms.insert("field".to_string(), Value::from(field));
    extend_object(&mut terms, options);
    json!({ "terms": terms })
}

/// 🧱 The shared chaining vocabulary. Every method returns a new builder.
pub trait QueryBuilder: Sized {
    /// The current shape. Mostly for inspection and tests.
    fn shape(&self) -> &Shape;

    /// Copy self, apply `f` to the copy's shape, return the copy.
    fn derive_shape(&self, f: impl FnOnce(&mut Shape)) -> Self;

    /// The index this builder queries.
    fn target(&self) -> &Arc<Index>;

    // ===== Filtering =====

    /// 🎯 Add one filter per field/value pair. The value's shape picks the clause.
    fn where_<I, K, V>(&self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<FilterValue>,
    {
        self.derive_shape(move |shape| {
            for (field, value) in pairs {
                shape.query.add_where(field.as_ref(), value.into());
            }
        })
    }

    /// 🙅 The negated mirror of `where_`.
    fn where_not<I, K, V>(&self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<FilterValue>,
    {
        self.derive_shape(move |shape| {
            for (field, value) in pairs {
                shape.query.add_where_not(field.as_ref(), value.into());
            }
        })
    }

    /// Append a raw clause to `filter`.
    fn filter(&self, clause: Value) -> Self {
        self.derive_shape(move |shape| shape.query.filter.push(clause))
    }

    /// Append a raw clause to `must`.
    fn must(&self, clause: Value) -> Self {
        self.derive_shape(move |shape| shape.query.must.push(clause))
    }

    /// Append a raw clause to `must_not`.
    fn must_not(&self, clause: Value) -> Self {
        self.derive_shape(move |shape| shape.query.must_not.push(clause))
    }

    /// 🔀 `{"bool": {"should": clauses, ..options}}`, appended to `must`.
    fn should(&self, clauses: Vec<Value>, options: Value) -> Self {
        self.derive_shape(move |shape| shape.query.add_should(clauses, options))
    }

    /// `filter` with `{"range": {field: options}}`.
    fn range(&self, field: &str, options: Value) -> Self {
        self.filter(json!({ "range": { field: options } }))
    }

    fn match_all(&self, options: Value) -> Self {
        self.filter(json!({ "match_all": options }))
    }

    fn match_none(&self) -> Self {
        self.filter(json!({ "match_none": {} }))
    }

    fn exists(&self, field: &str) -> Self {
        self.filter(exists_clause(field))
    }

    fn exists_not(&self, field: &str) -> Self {
        self.must_not(exists_clause(field))
    }

    /// 🔎 Full-text search. Blank text is a no-op, not an error.
    /// Defaults to `default_operator: AND`; `options` can override it.
    fn search(&self, text: &str, options: Value) -> Self {
        let text = text.trim();
        if text.is_empty() {
            return self.derive_shape(|_| {});
        }
        let mut query_string = Map::new();
        query_string.insert("query".to_string(), Value::from(text));
        query_string.insert("default_operator".to_string(), Value::from("AND"));
        extend_object(&mut query_string, options);
        self.must(json!({ "query_string": query_string }))
    }

    // ===== Sorting, source, highlight, custom =====

    /// 🔄 Append sort directives (`"price"`, `{"price": "desc"}`, ...).
    fn sort<I, S>(&self, directives: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Value>,
    {
        let directives: Vec<Value> = directives.into_iter().map(Into::into).collect();
        self.derive_shape(move |shape| {
            shape.sort.get_or_insert_with(Vec::new).extend(directives)
        })
    }

    /// 🔄 Replace the sort directives wholesale.
    fn resort<I, S>(&self, directives: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Value>,
    {
        let directives: Vec<Value> = directives.into_iter().map(Into::into).collect();
        self.derive_shape(move |shape| shape.sort = Some(directives))
    }

    /// 📦 `_source` selection: `false`, a field list, or an includes/excludes object.
    fn source(&self, source: impl Into<Value>) -> Self {
        let source = source.into();
        self.derive_shape(move |shape| shape.source = Some(source))
    }

    /// 🖍️ Highlight `fields` with top-level highlight `options`.
    fn highlight<I, F>(&self, fields: I, options: Value) -> Self
    where
        I: IntoIterator<Item = F>,
        F: AsRef<str>,
    {
        let fields: Vec<String> = fields.into_iter().map(|f| f.as_ref().to_string()).collect();
        self.derive_shape(move |shape| {
            let highlight = shape.highlight.get_or_insert_with(Map::new);
            extend_object(highlight, options);
            let field_map = highlight
                .entry("fields")
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(field_map) = field_map {
                for field in fields {
                    field_map.insert(field, json!({}));
                }
            }
        })
    }

    /// 🎨 Raw request keys merged in last. They override anything compiled before them.
    fn custom(&self, sections: Value) -> Self {
        self.derive_shape(move |shape| {
            extend_object(shape.custom.get_or_insert_with(Map::new), sections)
        })
    }

    // ===== Pagination =====

    fn offset(&self, offset: u64) -> Self {
        self.derive_shape(move |shape| shape.offset = Some(offset))
    }

    fn limit(&self, limit: u64) -> Self {
        self.derive_shape(move |shape| shape.limit = Some(limit))
    }

    /// 📄 Page numbers start at 1; anything lower is treated as 1.
    fn paginate(&self, page: u64, per_page: u64) -> Self {
        let page = page.max(1);
        self.derive_shape(move |shape| {
            shape.offset = Some((page - 1).saturating_mul(per_page));
            shape.limit = Some(per_page);
        })
    }

    // ===== Aggregations =====

    /// 📊 A terms aggregation on `field`, named after the field.
    fn aggregate(&self, field: &str, options: Value) -> Self {
        self.aggregate_raw(field, terms_entry(field, options))
    }

    /// 📊 Add (or overwrite) one aggregation entry verbatim.
    fn aggregate_raw(&self, name: &str, spec: Value) -> Self {
        let name = name.to_string();
        self.derive_shape(move |shape| {
            shape
                .aggregations
                .get_or_insert_with(Map::new)
                .insert(name, spec);
        })
    }

    /// 📊 A terms aggregation on `field` whose body is extended by whatever the block
    /// builds on a fresh `AggregationNode` (sub-aggregations, a filter wrapper, ...).
    fn aggregate_with<F>(&self, field: &str, options: Value, block: F) -> Result<Self>
    where
        F: FnOnce(AggregationNode) -> Result<AggregationNode>,
    {
        self.aggregate_raw_with(field, terms_entry(field, options), block)
    }

    /// 📊 Like `aggregate_with`, but starting from a raw entry instead of a terms one.
    fn aggregate_raw_with<F>(&self, name: &str, spec: Value, block: F) -> Result<Self>
    where
        F: FnOnce(AggregationNode) -> Result<AggregationNode>,
    {
        let node = block(AggregationNode::new(self.target().clone()))?;
        let mut entry = match spec {
            Value::Object(entry) => entry,
            _ => Map::new(),
        };
        extend_object(&mut entry, node.to_value());
        Ok(self.aggregate_raw(name, Value::Object(entry)))
    }
}
