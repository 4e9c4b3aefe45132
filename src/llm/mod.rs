pub mod embeddings;
pub mod keywords;

pub use embeddings::{Embedder, HttpEmbedder, MockEmbedder};
