//! 🔄 ScrollBatches: walking a result set too big for one page.
//!
//! Open a cursor, take a page, follow the cursor id to the next page, stop at the
//! first empty one. Pull-based: stop asking and it stops. Nothing is cleaned up on
//! the engine side; the cursor just times out there.
//!
//! 🧠 Knowledge graph:
//! - Every page is a derived criteria (`base.limit(batch).scroll(id, timeout)`), so each
//!   page has its own memoized response and the base criteria is never touched.
//! - Batch size and cursor timeout default to `Settings.scroll`.
//! - `into_stream()` turns the iterator into a `futures::Stream` of result batches.

use std::sync::Arc;

use futures::Stream;
use futures::stream;
use tracing::debug;

use crate::criteria::Criteria;
use crate::error::Result;
use crate::index::Record;
use crate::query_builder::QueryBuilder;
use crate::response::{Response, SearchResult};

/// 🔧 Scroll knobs. Unset ones come from `Settings.scroll`.
#[derive(Debug, Clone, Default)]
pub struct ScrollOptions {
    pub batch_size: Option<u64>,
    pub timeout: Option<String>,
}

/// 🔄 A pull-based walk over every hit of a criteria.
#[derive(Debug)]
pub struct ScrollBatches {
    base: Criteria,
    batch_size: u64,
    timeout: String,
    next: Option<Criteria>,
    pages: usize,
}

impl Criteria {
    /// 🔄 Iterate every hit in pages of `batch_size`.
    pub fn scroll_batches(&self, options: ScrollOptions) -> ScrollBatches {
        let defaults = &self.target.settings().scroll;
        let batch_size = options.batch_size.unwrap_or(defaults.batch_size);
        let timeout = options.timeout.unwrap_or_else(|| defaults.timeout.clone());
        let first = self.limit(batch_size).scroll(None, &timeout);
        ScrollBatches {
            base: self.clone(),
            batch_size,
            timeout,
            next: Some(first),
            pages: 0,
        }
    }
}

impl ScrollBatches {
    /// 📭 The next non-empty page, or `None` once the cursor runs dry.
    pub async fn next_response(&mut self) -> Result<Option<Arc<Response>>> {
        let Some(current) = self.next.take() else {
            return Ok(None);
        };
        let response = current.execute().await?;
        if response.hits().is_empty() {
            debug!("🔄 scroll finished after {} pages", self.pages);
            return Ok(None);
        }

        self.pages += 1;
        // -- no cursor id means the engine will not continue; this page is the last one
        self.next = response.scroll_id().map(|id| {
            self.base
                .limit(self.batch_size)
                .scroll(Some(id), &self.timeout)
        });
        Ok(Some(response))
    }

    /// 📦 The next page's results. Empty once iteration is done.
    pub async fn next_results(&mut self) -> Result<Vec<SearchResult>> {
        Ok(self
            .next_response()
            .await?
            .map(|response| response.results().to_vec())
            .unwrap_or_default())
    }

    /// 🗄️ The next page's records. Empty once iteration is done.
    pub async fn next_records(&mut self) -> Result<Vec<Record>> {
        match self.next_response().await? {
            Some(response) => Ok(response.records().await?.to_vec()),
            None => Ok(Vec::new()),
        }
    }

    /// 🔢 Non-empty pages handed out so far.
    pub fn pages(&self) -> usize {
        self.pages
    }

    /// 🌊 Result batches as a stream. Ends at the first empty page or the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<Vec<SearchResult>>> {
        stream::try_unfold(self, next_batch)
    }
}

async fn next_batch(
    mut batches: ScrollBatches,
) -> Result<Option<(Vec<SearchResult>, ScrollBatches)>> {
    let batch = batches.next_results().await?;
    if batch.is_empty() {
        Ok(None)
    } else {
        Ok(Some((batch, batches)))
    }
}
