//! Integration tests for the retrieval pipeline and orchestrator.
//!
//! These exercise the full flow (keyword fan-out, dedup, vector scoring,
//! ranking, combination, passage formatting) without a running LLM: the
//! exact-query toggle keeps keyword generation local and a deterministic
//! mock embedder stands in for the embedding API.

use async_trait::async_trait;
use std::sync::Arc;

use kb_search::config::{Config, LlmConfig, RetrievalConfig};
use kb_search::llm::MockEmbedder;
use kb_search::models::{
    RetrievalRequest, SearchResult, SourceConfig, SourceType,
};
use kb_search::orchestrator::{default_profiles, Orchestrator};
use kb_search::pipeline::{PipelineRequest, SourcePipeline};
use kb_search::sources::SourceAdapter;
use kb_search::vector::VectorIndex;

/// Canned adapter returning the same fixed hits for every keyword.
struct StubAdapter {
    source: SourceType,
    hits: Vec<SearchResult>,
}

#[async_trait]
impl SourceAdapter for StubAdapter {
    fn source_type(&self) -> SourceType {
        self.source
    }

    async fn search(&self, _keyword: &str, _token: &str, cap: usize) -> Vec<SearchResult> {
        self.hits.iter().take(cap).cloned().collect()
    }
}

fn hit(source: SourceType, id: &str, rank: usize, content: &str) -> SearchResult {
    SearchResult {
        id: id.to_string(),
        title: format!("Title {id}"),
        url: format!("https://example.com/{id}"),
        content: content.to_string(),
        summary: content.chars().take(40).collect(),
        source_type: source,
        original_rank: rank,
        lexical_score: SearchResult::lexical_score_for_rank(rank),
        vector_score: 0.0,
        search_score: None,
        reranker_score: None,
        combined_score: 0.0,
        final_rank: 0,
        content_enhanced: true,
        author: String::new(),
        space: String::new(),
        last_modified: None,
    }
}

fn retrieval_config() -> RetrievalConfig {
    RetrievalConfig {
        // Keeps keyword generation off the network
        use_exact_query_search: true,
        // Let the 5-hit degraded-ordering fixture flow through uncapped
        results_per_keyword: 5,
        ..RetrievalConfig::default()
    }
}

fn pipeline(
    source: SourceType,
    hits: Vec<SearchResult>,
    index: Option<Arc<VectorIndex>>,
) -> SourcePipeline {
    SourcePipeline::new(
        Arc::new(StubAdapter { source, hits }),
        index,
        reqwest::Client::new(),
        LlmConfig::default(),
        retrieval_config(),
    )
}

fn orchestrator(
    index_hits: Vec<SearchResult>,
    wiki_hits: Vec<SearchResult>,
    index: Option<Arc<VectorIndex>>,
) -> Orchestrator {
    Orchestrator::from_pipelines(
        pipeline(SourceType::KeywordIndex, index_hits, index.clone()),
        pipeline(SourceType::WikiConnector, wiki_hits, index),
        retrieval_config(),
        default_profiles(),
    )
}

fn request(query: &str, source_config: SourceConfig) -> RetrievalRequest {
    RetrievalRequest {
        query: query.to_string(),
        past_messages: Vec::new(),
        source_config,
        top_n: 10,
        auth_token: String::new(),
        profile_id: None,
        use_agentic_retrieval: false,
    }
}

fn open_index(dir: &std::path::Path) -> Arc<VectorIndex> {
    let config = Config {
        data_dir: dir.to_path_buf(),
        ..Config::default()
    };
    let embedder = Arc::new(MockEmbedder::new(8));
    Arc::new(VectorIndex::open(&config, embedder).unwrap())
}

#[tokio::test]
async fn test_keyword_index_retrieval_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let hits = vec![
        hit(SourceType::KeywordIndex, "k1", 1, "expense reports are due monthly and require receipts"),
        hit(SourceType::KeywordIndex, "k2", 2, "travel booking is handled through the internal portal"),
    ];
    let orch = orchestrator(hits, Vec::new(), Some(open_index(dir.path())));

    let response = orch.retrieve(&request("expense policy", SourceConfig::default())).await;

    assert_eq!(response.passages.len(), 2);
    assert!(response.passages[0].starts_with("[index] **"));
    assert!(response.passages.iter().any(|p| p.contains("expense reports")));
    // Strategy step plus one search step
    assert!(response.trace.len() >= 2);
    assert_eq!(response.trace[0].title, "Retrieval strategy");
}

#[tokio::test]
async fn test_dual_retrieval_combines_both_sources() {
    let dir = tempfile::tempdir().unwrap();
    let index_hits = vec![
        hit(SourceType::KeywordIndex, "k1", 1, "expense reimbursement rules for employees on travel"),
        hit(SourceType::KeywordIndex, "k2", 2, "corporate card usage guidelines and monthly limits"),
        hit(SourceType::KeywordIndex, "k3", 3, "quarterly budget review process for team leads"),
    ];
    let wiki_hits = vec![
        hit(SourceType::WikiConnector, "w1", 1, "how to submit an expense claim in the finance tool"),
        hit(SourceType::WikiConnector, "w2", 2, "office supply ordering and reimbursement workflow"),
    ];
    let orch = orchestrator(index_hits, wiki_hits, Some(open_index(dir.path())));

    let source_config = SourceConfig {
        use_dual: true,
        ..SourceConfig::default()
    };
    let response = orch.retrieve(&request("expense policy", source_config)).await;

    assert_eq!(response.passages.len(), 5);
    let wiki_passages = response.passages.iter().filter(|p| p.starts_with("[wiki]")).count();
    let index_passages = response.passages.iter().filter(|p| p.starts_with("[index]")).count();
    assert_eq!(wiki_passages, 2);
    assert_eq!(index_passages, 3);

    let combination = response
        .trace
        .iter()
        .find(|s| s.title == "Dual-source combination")
        .expect("combination trace step");
    assert_eq!(combination.props["results"], 5);
    // Both sides were vector-scored by the shared index, no fallback
    assert_eq!(combination.props["fallback_mode"], false);
}

#[tokio::test]
async fn test_degraded_lexical_only_ordering() {
    // No vector index at all: ranking must follow native rank exactly
    let hits = vec![
        hit(SourceType::KeywordIndex, "k3", 3, "third ranked document content for the query"),
        hit(SourceType::KeywordIndex, "k1", 1, "first ranked document content for the query"),
        hit(SourceType::KeywordIndex, "k5", 5, "fifth ranked document content for the query"),
        hit(SourceType::KeywordIndex, "k2", 2, "second ranked document content for the query"),
        hit(SourceType::KeywordIndex, "k4", 4, "fourth ranked document content for the query"),
    ];
    let orch = orchestrator(hits, Vec::new(), None);

    let response = orch.retrieve(&request("anything", SourceConfig::default())).await;

    assert_eq!(response.passages.len(), 5);
    for (i, passage) in response.passages.iter().enumerate() {
        assert!(
            passage.contains(&format!("**Title k{}**", i + 1)),
            "passage {i} out of order: {passage}"
        );
    }
}

#[tokio::test]
async fn test_wiki_only_profile_routes_to_wiki() {
    let dir = tempfile::tempdir().unwrap();
    let index_hits = vec![hit(SourceType::KeywordIndex, "k1", 1, "index content that must not appear")];
    let wiki_hits = vec![hit(SourceType::WikiConnector, "w1", 1, "wiki page content for the helpdesk query")];
    let orch = orchestrator(index_hits, wiki_hits, Some(open_index(dir.path())));

    let mut req = request("reset my password", SourceConfig::default());
    req.profile_id = Some("helpdesk".to_string());
    let response = orch.retrieve(&req).await;

    assert_eq!(response.passages.len(), 1);
    assert!(response.passages[0].starts_with("[wiki]"));
}

#[tokio::test]
async fn test_unknown_profile_falls_back_to_default() {
    let index_hits = vec![hit(SourceType::KeywordIndex, "k1", 1, "default profile index content here")];
    let orch = orchestrator(index_hits, Vec::new(), None);

    let mut req = request("anything", SourceConfig::default());
    req.profile_id = Some("no-such-profile".to_string());
    let response = orch.retrieve(&req).await;

    assert_eq!(response.passages.len(), 1);
    assert!(response.passages[0].starts_with("[index]"));
}

#[tokio::test]
async fn test_disabled_keyword_index_is_not_searched() {
    let index_hits = vec![hit(SourceType::KeywordIndex, "k1", 1, "index content that must not appear")];
    let orch = orchestrator(index_hits, Vec::new(), None);

    let source_config = SourceConfig {
        use_keyword_index: false,
        ..SourceConfig::default()
    };
    let response = orch.retrieve(&request("anything", source_config)).await;

    // Every source switched off: no passages, but the trace says why
    assert!(response.passages.is_empty());
    assert!(response.trace.iter().any(|s| s.title == "No sources enabled"));
}

#[tokio::test]
async fn test_dual_without_keyword_index_collapses_to_wiki() {
    let index_hits = vec![hit(SourceType::KeywordIndex, "k1", 1, "index content that must not appear")];
    let wiki_hits = vec![hit(SourceType::WikiConnector, "w1", 1, "wiki content that must survive")];
    let orch = orchestrator(index_hits, wiki_hits, None);

    let source_config = SourceConfig {
        use_keyword_index: false,
        use_dual: true,
        ..SourceConfig::default()
    };
    let response = orch.retrieve(&request("anything", source_config)).await;

    assert_eq!(response.passages.len(), 1);
    assert!(response.passages[0].starts_with("[wiki]"));
}

#[tokio::test]
async fn test_empty_profile_list_falls_back_to_defaults() {
    let index_hits = vec![hit(SourceType::KeywordIndex, "k1", 1, "default profile index content here")];
    let orch = Orchestrator::from_pipelines(
        pipeline(SourceType::KeywordIndex, index_hits, None),
        pipeline(SourceType::WikiConnector, Vec::new(), None),
        retrieval_config(),
        Vec::new(),
    );

    let mut req = request("anything", SourceConfig::default());
    req.profile_id = Some("helpdesk".to_string());
    let response = orch.retrieve(&req).await;

    // Built-in profiles back the empty list, so resolution still works
    assert!(!response.passages.is_empty() || !response.trace.is_empty());
    let unknown = request("anything", SourceConfig::default());
    let response = orch.retrieve(&unknown).await;
    assert_eq!(response.passages.len(), 1);
    assert!(response.passages[0].starts_with("[index]"));
}

#[tokio::test]
async fn test_empty_sources_yield_empty_passages() {
    let orch = orchestrator(Vec::new(), Vec::new(), None);
    let source_config = SourceConfig {
        use_dual: true,
        ..SourceConfig::default()
    };
    let response = orch.retrieve(&request("nothing matches", source_config)).await;
    assert!(response.passages.is_empty());
    assert!(!response.trace.is_empty());
}

#[tokio::test]
async fn test_agentic_retrieval_uses_keyword_index() {
    let dir = tempfile::tempdir().unwrap();
    let index_hits = vec![hit(SourceType::KeywordIndex, "k1", 1, "agentic retrieval target document content")];
    let orch = orchestrator(index_hits, Vec::new(), Some(open_index(dir.path())));

    let mut req = request("complex multi-part question", SourceConfig::default());
    req.use_agentic_retrieval = true;
    let response = orch.retrieve(&req).await;

    // Forced expansion would call the LLM; with no server it degrades to the
    // raw query and still retrieves
    assert_eq!(response.passages.len(), 1);
    assert!(response
        .trace
        .iter()
        .any(|s| s.title == "Agentic keyword search"));
}

#[tokio::test]
async fn test_shared_index_dedups_content_across_sources() {
    let dir = tempfile::tempdir().unwrap();
    let index = open_index(dir.path());
    let same = "identical content surfaced by both sources for this query";
    let mut index_hit = hit(SourceType::KeywordIndex, "k1", 1, same);
    let mut wiki_hit = hit(SourceType::WikiConnector, "w1", 1, same);
    // Dedup hashes title + content, so the shared page needs one title too
    index_hit.title = "Shared Page".to_string();
    wiki_hit.title = "Shared Page".to_string();
    let index_hits = vec![index_hit];
    let wiki_hits = vec![wiki_hit];
    let orch = orchestrator(index_hits, wiki_hits, Some(index.clone()));

    let source_config = SourceConfig {
        use_dual: true,
        ..SourceConfig::default()
    };
    orch.retrieve(&request("query", source_config)).await;

    // Two tracked ids, one embedded entry
    let stats = index.stats();
    assert_eq!(stats.tracked, 2);
    assert_eq!(stats.indexed, 1);
}

#[tokio::test]
async fn test_pipeline_request_weights_flow_through() {
    let dir = tempfile::tempdir().unwrap();
    let hits = vec![
        hit(SourceType::KeywordIndex, "k1", 1, "some searchable document content number one"),
        hit(SourceType::KeywordIndex, "k2", 2, "some searchable document content number two"),
    ];
    let p = pipeline(SourceType::KeywordIndex, hits, Some(open_index(dir.path())));

    let req = PipelineRequest {
        query: "document".to_string(),
        past_messages: Vec::new(),
        auth_token: String::new(),
        top: 1,
        weights: kb_search::models::RankingWeights {
            lexical: 1.0,
            vector: 0.0,
        },
        max_keywords: 2,
        force_expansion: false,
    };
    let outcome = p.run(&req).await;

    // Pure-lexical weights: the rank-1 hit must win regardless of vectors
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].id, "k1");
}

#[test]
fn test_stub_adapter_caps_results() {
    // Guards the test harness itself: cap must be honored like real adapters
    let adapter = StubAdapter {
        source: SourceType::KeywordIndex,
        hits: (1..=5)
            .map(|i| hit(SourceType::KeywordIndex, &format!("k{i}"), i, "body content of the hit"))
            .collect(),
    };
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let results = runtime.block_on(adapter.search("q", "", 3));
    assert_eq!(results.len(), 3);
}
