//! # krx
//!
//! 🎬 A client-side query builder, response decoder, bulk batcher and scroll iterator
//! for a search engine that speaks HTTP and JSON.
//!
//! ```text
//!   Index ──criteria()──▶ Criteria ──where_/sort/aggregate/...──▶ Criteria
//!                                                                    │
//!                                                      execute()     ▼
//!   Transport ◀──────────────── Request ◀──────────────── request()
//!       │
//!       └──▶ raw JSON ──▶ Response (pages, ids, results, records, aggregations)
//!
//!   Index ──bulk()──▶ Bulk ──index/create/update/delete──▶ _bulk (flushed by count/bytes)
//!   Criteria ──scroll_batches()──▶ ScrollBatches ──▶ page, page, page, done
//! ```
//!
//! 🧠 Knowledge graph:
//! - `Criteria` is immutable; every chained call returns a new one.
//! - `QueryBuilder` is the vocabulary `Criteria` and `AggregationNode` share.
//!   `use krx::prelude::*` brings it into scope.
//! - The library logs with `tracing` and never installs a subscriber.
//! - Errors are `krx::Error`; only transport-shaped ones are ever swallowed, and only
//!   by a failsafe criteria.

pub mod aggregation;
pub mod app_config;
pub mod bulk;
pub mod criteria;
pub mod error;
pub mod index;
pub mod query_builder;
pub mod response;
pub mod scroll;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use aggregation::AggregationNode;
pub use app_config::{Settings, load_config};
pub use bulk::{Bulk, BulkAction, BulkOptions};
pub use criteria::filter_value::FilterValue;
pub use criteria::{Criteria, ScrollState, Unscope};
pub use error::{Error, Result};
pub use index::{Index, Record, RecordFetcher, Scope};
pub use query_builder::QueryBuilder;
pub use response::{HitMeta, Response, SearchResult};
pub use scroll::{ScrollBatches, ScrollOptions};
pub use transport::{HttpTransport, Transport};

/// 🎒 Everything a caller usually needs, including the `QueryBuilder` trait.
pub mod prelude {
    pub use crate::aggregation::AggregationNode;
    pub use crate::bulk::BulkOptions;
    pub use crate::criteria::filter_value::FilterValue;
    pub use crate::criteria::{Criteria, Unscope};
    pub use crate::index::Index;
    pub use crate::query_builder::QueryBuilder;
    pub use crate::scroll::ScrollOptions;
}
