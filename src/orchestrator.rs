use anyhow::Result;
use serde_json::json;
use std::sync::Arc;

use crate::config::{Config, RetrievalConfig};
use crate::llm::Embedder;
use crate::models::{
    RankedResult, RankingWeights, RetrievalRequest, RetrievalResponse, SearchResult, SourceType,
    TraceStep,
};
use crate::pipeline::{PipelineOutcome, PipelineRequest, SourcePipeline};
use crate::ranking::combine::{combine, CombineOptions};
use crate::sources::{IndexSearchAdapter, WikiAdapter};
use crate::vector::VectorIndex;

/// Named retrieval profile selecting sources and default weights.
#[derive(Debug, Clone)]
pub struct RetrievalProfile {
    pub id: String,
    pub name: String,
    pub use_wiki_search: bool,
    pub use_dual: bool,
    pub weights: Option<RankingWeights>,
}

pub fn default_profiles() -> Vec<RetrievalProfile> {
    vec![
        RetrievalProfile {
            id: "default".to_string(),
            name: "General assistant".to_string(),
            use_wiki_search: false,
            use_dual: false,
            weights: None,
        },
        RetrievalProfile {
            id: "helpdesk".to_string(),
            name: "IT helpdesk".to_string(),
            use_wiki_search: true,
            use_dual: false,
            weights: None,
        },
        RetrievalProfile {
            id: "research".to_string(),
            name: "Deep research".to_string(),
            use_wiki_search: true,
            use_dual: true,
            weights: None,
        },
    ]
}

/// Entry point for retrieval requests: resolves the profile, picks a search
/// strategy, runs the pipelines, and formats the ranked results into passages
/// plus a structured trace.
pub struct Orchestrator {
    index_pipeline: SourcePipeline,
    wiki_pipeline: SourcePipeline,
    config: RetrievalConfig,
    profiles: Vec<RetrievalProfile>,
}

impl Orchestrator {
    pub fn new(config: &Config, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(60))
            .build()?;

        // Index startup failure degrades the whole process to lexical-only
        // ranking; logged once here, never per request.
        let index = match VectorIndex::open(config, embedder) {
            Ok(index) => Some(Arc::new(index)),
            Err(e) => {
                tracing::error!("Vector index unavailable, ranking will be lexical-only: {e:#}");
                None
            }
        };

        let index_adapter = Arc::new(IndexSearchAdapter::new(
            client.clone(),
            config.index_search.clone(),
        ));
        let wiki_adapter = Arc::new(WikiAdapter::new(client.clone(), config.wiki.clone()));

        let index_pipeline = SourcePipeline::new(
            index_adapter,
            index.clone(),
            client.clone(),
            config.llm.clone(),
            config.retrieval.clone(),
        );
        let wiki_pipeline = SourcePipeline::new(
            wiki_adapter,
            index,
            client,
            config.llm.clone(),
            config.retrieval.clone(),
        );

        Ok(Self::from_pipelines(
            index_pipeline,
            wiki_pipeline,
            config.retrieval.clone(),
            default_profiles(),
        ))
    }

    /// Assemble from prebuilt pipelines. Tests inject stub adapters this way.
    /// An empty profile list falls back to [`default_profiles`] so profile
    /// resolution always has a default to land on.
    pub fn from_pipelines(
        index_pipeline: SourcePipeline,
        wiki_pipeline: SourcePipeline,
        config: RetrievalConfig,
        profiles: Vec<RetrievalProfile>,
    ) -> Self {
        let profiles = if profiles.is_empty() {
            default_profiles()
        } else {
            profiles
        };
        Self {
            index_pipeline,
            wiki_pipeline,
            config,
            profiles,
        }
    }

    fn profile_for(&self, id: Option<&str>) -> &RetrievalProfile {
        // `profiles` is never empty, the constructor guarantees a default
        id.and_then(|id| self.profiles.iter().find(|p| p.id == id))
            .unwrap_or(&self.profiles[0])
    }

    pub async fn retrieve(&self, req: &RetrievalRequest) -> RetrievalResponse {
        let profile = self.profile_for(req.profile_id.as_deref());
        let weights = req
            .source_config
            .weights
            .or(profile.weights)
            .unwrap_or(self.config.weights);
        let top = req.top_n.max(1);

        let use_index = req.source_config.use_keyword_index;
        let dual_requested = req.source_config.use_dual || profile.use_dual;
        // Dual needs both sources; with the keyword index switched off it
        // collapses to wiki-only.
        let use_dual = dual_requested && use_index;
        let use_wiki = req.source_config.use_wiki_connector
            || profile.use_wiki_search
            || (dual_requested && !use_index);

        let mut trace = vec![TraceStep::new(
            "Retrieval strategy",
            json!(req.query),
            json!({
                "profile": profile.id,
                "agentic": req.use_agentic_retrieval,
                "dual": use_dual,
                "wiki": use_wiki,
                "keyword_index": use_index,
                "top": top,
            }),
        )];

        let mut pipeline_req = PipelineRequest {
            query: req.query.clone(),
            past_messages: req.past_messages.clone(),
            auth_token: req.auth_token.clone(),
            top,
            weights,
            max_keywords: self.config.max_keywords,
            force_expansion: false,
        };

        let passages = if req.use_agentic_retrieval {
            // Agentic mode: wider keyword expansion against the curated index
            pipeline_req.max_keywords = self.config.agentic_max_keywords;
            pipeline_req.force_expansion = true;
            let outcome = self.index_pipeline.run(&pipeline_req).await;
            trace.push(trace_pipeline("Agentic keyword search", &outcome));
            self.format_all(&outcome.results)
        } else if use_dual {
            self.retrieve_dual(&pipeline_req, &mut trace).await
        } else if use_wiki {
            let outcome = self.wiki_pipeline.run(&pipeline_req).await;
            trace.push(trace_pipeline("Wiki search", &outcome));
            self.format_all(&outcome.results)
        } else if use_index {
            let outcome = self.index_pipeline.run(&pipeline_req).await;
            trace.push(trace_pipeline("Keyword index search", &outcome));
            self.format_all(&outcome.results)
        } else {
            tracing::warn!("Request disabled every source, returning no passages");
            trace.push(TraceStep::new(
                "No sources enabled",
                json!(req.query),
                json!({"results": 0}),
            ));
            Vec::new()
        };

        if passages.is_empty() {
            tracing::info!("Retrieval produced no usable passages for query");
        }

        RetrievalResponse { passages, trace }
    }

    async fn retrieve_dual(
        &self,
        pipeline_req: &PipelineRequest,
        trace: &mut Vec<TraceStep>,
    ) -> Vec<String> {
        let (index_outcome, wiki_outcome) = tokio::join!(
            self.index_pipeline.run(pipeline_req),
            self.wiki_pipeline.run(pipeline_req)
        );
        trace.push(trace_pipeline("Keyword index search", &index_outcome));
        trace.push(trace_pipeline("Wiki search", &wiki_outcome));

        let opts = CombineOptions {
            top: pipeline_req.top,
            weights: pipeline_req.weights,
            wiki_boost: self.config.wiki_boost,
            index_boost: self.config.index_boost,
        };
        let ranked = combine(index_outcome.results, wiki_outcome.results, &opts);

        let wiki_count = ranked
            .iter()
            .filter(|r| r.result.source_type == SourceType::WikiConnector)
            .count();
        let fallback = ranked.first().is_some_and(|r| r.fallback_mode);
        tracing::debug!(
            "Dual combination: {} results ({wiki_count} wiki, {} index), fallback={fallback}",
            ranked.len(),
            ranked.len() - wiki_count
        );
        trace.push(TraceStep::new(
            "Dual-source combination",
            json!({"weights": {"lexical": opts.weights.lexical, "vector": opts.weights.vector}}),
            json!({
                "results": ranked.len(),
                "wiki": wiki_count,
                "index": ranked.len() - wiki_count,
                "fallback_mode": fallback,
                "top_score": ranked.first().map(|r| r.combined_score),
            }),
        ));

        self.format_ranked(&ranked)
    }

    fn format_all(&self, results: &[SearchResult]) -> Vec<String> {
        results
            .iter()
            .map(|r| format_passage(r, self.config.passage_content_budget))
            .collect()
    }

    fn format_ranked(&self, ranked: &[RankedResult]) -> Vec<String> {
        ranked
            .iter()
            .map(|r| format_passage(&r.result, self.config.passage_content_budget))
            .collect()
    }
}

fn trace_pipeline(title: &str, outcome: &PipelineOutcome) -> TraceStep {
    TraceStep::new(
        title,
        json!({"keywords": outcome.keywords}),
        json!({
            "results": outcome.results.len(),
            "short_circuited": outcome.short_circuited,
        }),
    )
}

/// One passage block for the prompt layer: tagged header, source line,
/// metadata, budgeted body.
pub fn format_passage(result: &SearchResult, budget: usize) -> String {
    let mut passage = format!("[{}] **{}**\n", result.source_type.tag(), result.title);
    if !result.url.is_empty() {
        passage.push_str(&format!("Source: {}\n", result.url));
    }
    if !result.space.is_empty() {
        passage.push_str(&format!("Space: {}\n", result.space));
    }
    if !result.author.is_empty() {
        passage.push_str(&format!("Author: {}\n", result.author));
    }
    if let Some(modified) = &result.last_modified {
        passage.push_str(&format!("Last modified: {modified}\n"));
    }
    passage.push('\n');

    let body = result.content.trim();
    if body.len() > budget {
        let mut end = budget;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        passage.push_str(&body[..end]);
        passage.push_str("... [truncated]");
    } else {
        passage.push_str(body);
    }
    passage
}
