pub mod enrich;
pub mod index_search;
pub mod wiki;

use async_trait::async_trait;

use crate::models::{SearchResult, SourceType};

pub use enrich::Enricher;
pub use index_search::IndexSearchAdapter;
pub use wiki::WikiAdapter;

/// One searchable content source. Adapters swallow their own transport
/// failures: a failed keyword search logs a warning and contributes nothing,
/// so one source being down never fails the whole retrieval.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source_type(&self) -> SourceType;

    /// Search one keyword, returning at most `cap` results with 1-based
    /// `original_rank` in the source's native order.
    async fn search(&self, keyword: &str, auth_token: &str, cap: usize) -> Vec<SearchResult>;

    /// Replace summaries with full content where the source supports it.
    /// Default is a no-op for sources that already return full content.
    async fn enrich(&self, _results: &mut [SearchResult]) {}
}
