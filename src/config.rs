use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::models::RankingWeights;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where the vector index and its metadata are stored
    pub data_dir: PathBuf,
    /// LLM provider configuration (keywords + embeddings)
    pub llm: LlmConfig,
    /// Wiki connector and content API configuration
    pub wiki: WikiConfig,
    /// Keyword-search index configuration
    pub index_search: IndexSearchConfig,
    /// Retrieval pipeline tuning
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL for the OpenAI-compatible API
    pub base_url: String,
    /// Model name for keyword generation
    pub chat_model: String,
    /// Model name for embeddings
    pub embedding_model: String,
    /// API key (only needed for cloud providers)
    pub api_key: Option<String>,
    /// Embedding vector dimension
    pub embedding_dim: usize,
}

/// Configuration for the wiki page-search connector and its content API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikiConfig {
    /// Graph-style search endpoint the connector is queried through.
    pub search_url: String,
    /// Connector id under `/external/connections/`.
    pub connector_id: String,
    /// REST base URL for fetching full page bodies.
    pub api_base_url: String,
    /// Basic-auth credentials for the content API.
    pub api_email: String,
    pub api_token: String,
    /// When false, enrichment synthesizes content from hit metadata instead
    /// of calling the content API.
    pub use_content_api: bool,
    /// Per-page fetch timeout in seconds.
    pub content_fetch_timeout_secs: u64,
    /// Maximum concurrent content fetches.
    pub max_concurrent_fetches: usize,
}

/// Configuration for the enterprise keyword-search index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSearchConfig {
    /// Service endpoint, e.g. "https://example.search.windows.net".
    pub endpoint: String,
    pub index_name: String,
    /// Service api-key header value.
    pub api_key: String,
}

/// Tuning knobs for the retrieval pipeline. The weighting constants are
/// deliberately configuration, not constants: the defaults are starting
/// points, not tuned values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Default lexical/vector weighting for combined scores.
    pub weights: RankingWeights,
    /// Score multiplier applied to wiki results in dual mode.
    pub wiki_boost: f32,
    /// Score multiplier applied to keyword-index results in dual mode.
    pub index_boost: f32,
    /// Maximum LLM-generated keyword variants per query.
    pub max_keywords: usize,
    /// Keyword cap when agentic retrieval is requested.
    pub agentic_max_keywords: usize,
    /// Skip keyword generation and search the literal query.
    pub use_exact_query_search: bool,
    /// Result cap per keyword search.
    pub results_per_keyword: usize,
    /// Maximum concurrent keyword searches per source.
    pub max_concurrent_searches: usize,
    /// Maximum concurrent embedding calls.
    pub max_concurrent_embeddings: usize,
    /// Return early once enough ranked results are gathered, cancelling
    /// remaining keyword searches.
    pub progressive_ranking: bool,
    pub embedding_retry_attempts: usize,
    pub embedding_retry_delay_ms: u64,
    pub cache_ttl_hours: u64,
    pub cache_max_entries: usize,
    /// Character budget per formatted passage.
    pub passage_content_budget: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            llm: LlmConfig::default(),
            wiki: WikiConfig::default(),
            index_search: IndexSearchConfig::default(),
            retrieval: RetrievalConfig::default(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            chat_model: "gpt-4o".to_string(),
            embedding_model: "text-embedding-3-large".to_string(),
            api_key: None,
            embedding_dim: 1536,
        }
    }
}

impl Default for WikiConfig {
    fn default() -> Self {
        Self {
            search_url: "https://graph.microsoft.com/v1.0/search/query".to_string(),
            connector_id: "WikiCloud".to_string(),
            api_base_url: "https://example.atlassian.net/wiki/rest/api".to_string(),
            api_email: String::new(),
            api_token: String::new(),
            use_content_api: true,
            content_fetch_timeout_secs: 8,
            max_concurrent_fetches: 15,
        }
    }
}

impl Default for IndexSearchConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            index_name: "documents".to_string(),
            api_key: String::new(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            weights: RankingWeights::default(),
            wiki_boost: 1.1,
            index_boost: 1.0,
            max_keywords: 2,
            agentic_max_keywords: 4,
            use_exact_query_search: false,
            results_per_keyword: 3,
            max_concurrent_searches: 5,
            max_concurrent_embeddings: 8,
            progressive_ranking: true,
            embedding_retry_attempts: 2,
            embedding_retry_delay_ms: 500,
            cache_ttl_hours: 24,
            cache_max_entries: 10_000,
            passage_content_budget: 2_400,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("KB_SEARCH_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(url) = std::env::var("LLM_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Ok(model) = std::env::var("LLM_CHAT_MODEL") {
            config.llm.chat_model = model;
        }
        if let Ok(model) = std::env::var("LLM_EMBEDDING_MODEL") {
            config.llm.embedding_model = model;
        }
        if let Ok(key) = std::env::var("LLM_API_KEY") {
            config.llm.api_key = Some(key);
        }
        if let Ok(dim) = std::env::var("LLM_EMBEDDING_DIM") {
            if let Ok(d) = dim.parse() {
                config.llm.embedding_dim = d;
            }
        }

        if let Ok(url) = std::env::var("WIKI_SEARCH_URL") {
            config.wiki.search_url = url;
        }
        if let Ok(id) = std::env::var("WIKI_CONNECTOR_ID") {
            config.wiki.connector_id = id;
        }
        if let Ok(url) = std::env::var("WIKI_API_BASE_URL") {
            config.wiki.api_base_url = url;
        }
        if let Ok(email) = std::env::var("WIKI_API_EMAIL") {
            config.wiki.api_email = email;
        }
        if let Ok(token) = std::env::var("WIKI_API_TOKEN") {
            config.wiki.api_token = token;
        }
        if let Ok(val) = std::env::var("WIKI_USE_CONTENT_API") {
            config.wiki.use_content_api = val != "false" && val != "0";
        }
        if let Ok(val) = std::env::var("WIKI_CONTENT_FETCH_TIMEOUT_SECS") {
            if let Ok(v) = val.parse() {
                config.wiki.content_fetch_timeout_secs = v;
            }
        }
        if let Ok(val) = std::env::var("WIKI_MAX_CONCURRENT_FETCHES") {
            if let Ok(v) = val.parse() {
                config.wiki.max_concurrent_fetches = v;
            }
        }

        if let Ok(endpoint) = std::env::var("INDEX_SEARCH_ENDPOINT") {
            config.index_search.endpoint = endpoint;
        }
        if let Ok(name) = std::env::var("INDEX_SEARCH_INDEX_NAME") {
            config.index_search.index_name = name;
        }
        if let Ok(key) = std::env::var("INDEX_SEARCH_API_KEY") {
            config.index_search.api_key = key;
        }

        if let Ok(val) = std::env::var("KB_SEARCH_LEXICAL_WEIGHT") {
            if let Ok(v) = val.parse() {
                config.retrieval.weights.lexical = v;
            }
        }
        if let Ok(val) = std::env::var("KB_SEARCH_VECTOR_WEIGHT") {
            if let Ok(v) = val.parse() {
                config.retrieval.weights.vector = v;
            }
        }
        if let Ok(val) = std::env::var("KB_SEARCH_WIKI_BOOST") {
            if let Ok(v) = val.parse() {
                config.retrieval.wiki_boost = v;
            }
        }
        if let Ok(val) = std::env::var("KB_SEARCH_MAX_KEYWORDS") {
            if let Ok(v) = val.parse() {
                config.retrieval.max_keywords = v;
            }
        }
        if let Ok(val) = std::env::var("KB_SEARCH_USE_EXACT_QUERY") {
            config.retrieval.use_exact_query_search = val == "true" || val == "1";
        }
        if let Ok(val) = std::env::var("KB_SEARCH_RESULTS_PER_KEYWORD") {
            if let Ok(v) = val.parse() {
                config.retrieval.results_per_keyword = v;
            }
        }
        if let Ok(val) = std::env::var("KB_SEARCH_PROGRESSIVE_RANKING") {
            config.retrieval.progressive_ranking = val != "false" && val != "0";
        }
        if let Ok(val) = std::env::var("KB_SEARCH_CACHE_TTL_HOURS") {
            if let Ok(v) = val.parse() {
                config.retrieval.cache_ttl_hours = v;
            }
        }
        if let Ok(val) = std::env::var("KB_SEARCH_CACHE_MAX_ENTRIES") {
            if let Ok(v) = val.parse() {
                config.retrieval.cache_max_entries = v;
            }
        }
        if let Ok(val) = std::env::var("KB_SEARCH_PASSAGE_BUDGET") {
            if let Ok(v) = val.parse() {
                config.retrieval.passage_content_budget = v;
            }
        }

        config
    }

    /// Index artifact: the full entry list with embeddings.
    pub fn index_path(&self) -> PathBuf {
        self.data_dir.join("index.json")
    }

    /// Structured metadata artifact: tracked documents, hash aliases, cache.
    pub fn metadata_path(&self) -> PathBuf {
        self.data_dir.join("meta.json")
    }
}
