use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;

use crate::config::{LlmConfig, RetrievalConfig};
use crate::llm::keywords::generate_keywords;
use crate::models::{ChatMessage, RankingWeights, SearchResult};
use crate::ranking::single::{
    apply_lexical_ranking, apply_vector_scores, combine_scores, dedup_results, rank_and_limit,
};
use crate::sources::SourceAdapter;
use crate::vector::VectorIndex;

/// One pipeline run's parameters. Fields mirror the request, resolved against
/// config defaults by the orchestrator.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub query: String,
    pub past_messages: Vec<ChatMessage>,
    pub auth_token: String,
    pub top: usize,
    pub weights: RankingWeights,
    pub max_keywords: usize,
    /// Run keyword generation even when exact-query search is configured.
    pub force_expansion: bool,
}

#[derive(Debug)]
pub struct PipelineOutcome {
    pub results: Vec<SearchResult>,
    pub keywords: Vec<String>,
    /// True when remaining keyword searches were cancelled early.
    pub short_circuited: bool,
}

/// Retrieval pipeline for one source: keyword expansion, concurrent fan-out
/// search, dedup, content enrichment, vector scoring, ranking.
///
/// The pipeline degrades rather than fails: keyword generation falls back to
/// the literal query, a dead source contributes nothing, and without a usable
/// vector index ranking is purely lexical.
pub struct SourcePipeline {
    adapter: Arc<dyn SourceAdapter>,
    index: Option<Arc<VectorIndex>>,
    client: reqwest::Client,
    llm: LlmConfig,
    config: RetrievalConfig,
    search_semaphore: Arc<tokio::sync::Semaphore>,
}

impl SourcePipeline {
    pub fn new(
        adapter: Arc<dyn SourceAdapter>,
        index: Option<Arc<VectorIndex>>,
        client: reqwest::Client,
        llm: LlmConfig,
        config: RetrievalConfig,
    ) -> Self {
        let search_semaphore = Arc::new(tokio::sync::Semaphore::new(
            config.max_concurrent_searches.max(1),
        ));
        Self {
            adapter,
            index,
            client,
            llm,
            config,
            search_semaphore,
        }
    }

    pub async fn run(&self, req: &PipelineRequest) -> PipelineOutcome {
        let source = self.adapter.source_type().tag();

        // ── Step 1: keyword variants ──
        let keywords = self.keywords(req).await;
        tracing::debug!("[{source}] searching {} keyword(s): {keywords:?}", keywords.len());

        // ── Step 2: concurrent fan-out, one task per keyword ──
        let mut tasks = JoinSet::new();
        for keyword in &keywords {
            let adapter = self.adapter.clone();
            let semaphore = self.search_semaphore.clone();
            let keyword = keyword.clone();
            let token = req.auth_token.clone();
            let cap = self.config.results_per_keyword;
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                adapter.search(&keyword, &token, cap).await
            });
        }

        // ── Step 3: gather, with progressive short-circuit ──
        let mut gathered: Vec<SearchResult> = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(batch) => gathered.extend(batch),
                Err(e) => tracing::warn!("[{source}] keyword search task failed: {e}"),
            }

            if self.config.progressive_ranking && gathered.len() >= req.top * 2 {
                let ranked = self.rank_and_finalize(req, gathered.clone()).await;
                if ranked.len() >= req.top {
                    tracing::debug!(
                        "[{source}] progressive ranking satisfied with {} results, \
                         cancelling remaining searches",
                        ranked.len()
                    );
                    tasks.abort_all();
                    return PipelineOutcome {
                        results: ranked,
                        keywords,
                        short_circuited: true,
                    };
                }
            }
        }

        // ── Step 4: full ranking pass ──
        let results = self.rank_and_finalize(req, gathered).await;
        PipelineOutcome {
            results,
            keywords,
            short_circuited: false,
        }
    }

    async fn keywords(&self, req: &PipelineRequest) -> Vec<String> {
        if self.config.use_exact_query_search && !req.force_expansion {
            return vec![req.query.clone()];
        }
        match generate_keywords(
            &self.client,
            &self.llm,
            &req.query,
            &req.past_messages,
            req.max_keywords,
        )
        .await
        {
            Ok(keywords) if !keywords.is_empty() => keywords,
            Ok(_) => vec![req.query.clone()],
            Err(e) => {
                tracing::warn!("Keyword generation failed, using raw query: {e:#}");
                vec![req.query.clone()]
            }
        }
    }

    /// Dedup, enrich, vector-score, and rank a gathered candidate set.
    async fn rank_and_finalize(
        &self,
        req: &PipelineRequest,
        results: Vec<SearchResult>,
    ) -> Vec<SearchResult> {
        let mut results = dedup_results(results);
        if results.is_empty() {
            return results;
        }

        self.adapter.enrich(&mut results).await;

        match &self.index {
            Some(index) => self.apply_hybrid_scores(index, req, &mut results).await,
            None => apply_lexical_ranking(&mut results),
        }

        rank_and_limit(&mut results, req.top);
        self.log_content_analysis(&results);

        if let Some(index) = &self.index {
            if let Err(e) = index.save() {
                tracing::warn!("Failed to persist vector index: {e:#}");
            }
        }

        results
    }

    async fn apply_hybrid_scores(
        &self,
        index: &Arc<VectorIndex>,
        req: &PipelineRequest,
        results: &mut Vec<SearchResult>,
    ) {
        if let Err(e) = index.add_documents(results).await {
            tracing::warn!("Vector insertion failed: {e:#}");
        }

        let stats = index.stats();
        let pool = stats.indexed + stats.pending;
        match index.search(&req.query, pool.max(req.top)).await {
            Ok(hits) => {
                let by_hash: HashMap<String, f32> =
                    hits.into_iter().map(|h| (h.hash, h.score)).collect();
                let by_id: HashMap<String, f32> = results
                    .iter()
                    .filter_map(|r| {
                        let hash = index.hash_for(&r.id)?;
                        Some((r.id.clone(), *by_hash.get(&hash)?))
                    })
                    .collect();
                apply_vector_scores(results, &by_id);
                combine_scores(results, req.weights);
            }
            Err(e) => {
                tracing::warn!("Vector search failed, ranking lexically: {e:#}");
                apply_lexical_ranking(results);
            }
        }
    }

    fn log_content_analysis(&self, results: &[SearchResult]) {
        let substantial = results.iter().filter(|r| r.content.len() >= 100).count();
        let enhanced = results.iter().filter(|r| r.content_enhanced).count();
        let embedded = results.iter().filter(|r| r.vector_score != 0.0).count();
        tracing::debug!(
            "[{}] ranked {} results: {substantial} substantial, {enhanced} enhanced, \
             {embedded} with vector scores",
            self.adapter.source_type().tag(),
            results.len()
        );
    }
}
