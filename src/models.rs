use serde::{Deserialize, Serialize};

/// Which content source a result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    KeywordIndex,
    WikiConnector,
}

impl SourceType {
    /// Short tag used in passage headers and logs.
    pub fn tag(&self) -> &'static str {
        match self {
            SourceType::KeywordIndex => "index",
            SourceType::WikiConnector => "wiki",
        }
    }
}

/// One candidate passage from one source.
///
/// Created by a source adapter, enriched in place, scored in place by the
/// ranker, and read-only once it reaches the combiner. Not persisted across
/// requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// Stable identifier for the underlying document (hit id, or URL when the
    /// source has no separate id). Used for dedup and cache keys.
    pub id: String,
    pub title: String,
    pub url: String,
    /// Extracted text body. May be a summary until enrichment replaces it.
    pub content: String,
    /// Short excerpt returned by the source alongside the hit.
    pub summary: String,
    pub source_type: SourceType,
    /// 1-based position in the source's native ranking.
    pub original_rank: usize,
    /// `1 / (original_rank + 1)` unless the source supplies a raw score.
    pub lexical_score: f32,
    /// Cosine similarity to the query embedding. 0.0 until scored.
    pub vector_score: f32,
    /// Raw relevance score from the source, when it exposes one.
    pub search_score: Option<f32>,
    /// Semantic reranker score from the source, when it exposes one.
    pub reranker_score: Option<f32>,
    /// Weighted lexical/vector combination. 0.0 until ranked.
    pub combined_score: f32,
    /// 1-based rank after single-source ranking. 0 until ranked.
    pub final_rank: usize,
    /// True once full content has replaced the summary.
    pub content_enhanced: bool,
    pub author: String,
    pub space: String,
    pub last_modified: Option<String>,
}

impl SearchResult {
    /// Lexical score derived from a 1-based native rank.
    pub fn lexical_score_for_rank(rank: usize) -> f32 {
        1.0 / (rank as f32 + 1.0)
    }
}

/// A result augmented with cross-source combination metadata. Produced by the
/// dual-source combiner; immutable after creation. Position in the output
/// list equals `final_rank`.
#[derive(Debug, Clone, Serialize)]
pub struct RankedResult {
    pub result: SearchResult,
    pub combined_score: f32,
    pub final_rank: usize,
    pub normalized_vector_score: f32,
    pub normalized_lexical_score: f32,
    pub source_boost: f32,
    /// True when the equal-representation fallback produced this ranking.
    pub fallback_mode: bool,
}

/// Relative weighting of the lexical and vector signals.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RankingWeights {
    pub lexical: f32,
    pub vector: f32,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            lexical: 0.3,
            vector: 0.7,
        }
    }
}

/// A single chat turn, passed through for keyword generation context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Which sources to consult for a request.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_true")]
    pub use_keyword_index: bool,
    #[serde(default)]
    pub use_wiki_connector: bool,
    #[serde(default)]
    pub use_dual: bool,
    /// Per-request weight override; falls back to the configured defaults.
    pub weights: Option<RankingWeights>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            use_keyword_index: true,
            use_wiki_connector: false,
            use_dual: false,
            weights: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_top() -> usize {
    10
}

/// One retrieval request from the chat layer.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalRequest {
    pub query: String,
    #[serde(default)]
    pub past_messages: Vec<ChatMessage>,
    #[serde(default)]
    pub source_config: SourceConfig,
    #[serde(default = "default_top")]
    pub top_n: usize,
    /// Bearer token for the source search APIs, supplied by the caller's
    /// auth layer.
    #[serde(default)]
    pub auth_token: String,
    /// Named retrieval profile; unknown or absent ids resolve to the default.
    #[serde(default)]
    pub profile_id: Option<String>,
    #[serde(default)]
    pub use_agentic_retrieval: bool,
}

/// Ordered passages plus a structured trace, handed to the prompt layer.
#[derive(Debug, Serialize)]
pub struct RetrievalResponse {
    pub passages: Vec<String>,
    pub trace: Vec<TraceStep>,
}

/// One step of the retrieval trace: what ran, with what parameters, and how
/// many results it produced.
#[derive(Debug, Clone, Serialize)]
pub struct TraceStep {
    pub title: String,
    pub description: serde_json::Value,
    pub props: serde_json::Value,
}

impl TraceStep {
    pub fn new(
        title: impl Into<String>,
        description: serde_json::Value,
        props: serde_json::Value,
    ) -> Self {
        Self {
            title: title.into(),
            description,
            props,
        }
    }
}
