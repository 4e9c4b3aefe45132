pub mod cache;
pub mod index;

pub use cache::{content_hash, EmbeddingCache};
pub use index::{IndexStats, VectorHit, VectorIndex};
