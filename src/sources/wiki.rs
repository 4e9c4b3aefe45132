use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashSet;

use crate::config::WikiConfig;
use crate::models::{SearchResult, SourceType};
use crate::sources::{Enricher, SourceAdapter};

/// Resource property names checked for body text, in priority order. The
/// connector schema varies by deployment, so several candidate fields are
/// merged instead of trusting any single one.
const CONTENT_FIELDS: &[&str] = &[
    "content",
    "body",
    "fullContent",
    "indexedContent",
    "searchableText",
    "excerpt",
    "description",
    "snippet",
];

/// Content parts shorter than this are noise (empty strings, bare labels).
const MIN_PART_CHARS: usize = 10;

/// Cap on assembled content per hit before enrichment.
const MAX_CONTENT_CHARS: usize = 10_000;

/// Hits with no real title and under this much content carry nothing worth
/// ranking and are dropped.
const MIN_USEFUL_CONTENT: usize = 50;

/// Wiki pages surfaced through a graph-style search connector.
pub struct WikiAdapter {
    client: reqwest::Client,
    config: WikiConfig,
    enricher: Enricher,
}

impl WikiAdapter {
    pub fn new(client: reqwest::Client, config: WikiConfig) -> Self {
        let enricher = Enricher::new(client.clone(), config.clone());
        Self {
            client,
            config,
            enricher,
        }
    }

    async fn try_search(
        &self,
        keyword: &str,
        auth_token: &str,
        cap: usize,
    ) -> Result<Vec<SearchResult>> {
        let request = json!({
            "requests": [{
                "entityTypes": ["externalItem"],
                "contentSources": [format!("/external/connections/{}", self.config.connector_id)],
                "query": { "queryString": keyword },
                "from": 0,
                "size": cap,
                "fields": ["title", "url", "content", "author", "spaceName", "lastModifiedDateTime"],
            }]
        });

        let resp = self
            .client
            .post(&self.config.search_url)
            .header("Authorization", format!("Bearer {auth_token}"))
            .json(&request)
            .send()
            .await
            .context("Failed to call wiki search endpoint")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Wiki search returned {status}: {body}");
        }

        let body: Value = resp
            .json()
            .await
            .context("Failed to parse wiki search response")?;
        Ok(parse_search_response(&body, cap))
    }
}

#[async_trait]
impl SourceAdapter for WikiAdapter {
    fn source_type(&self) -> SourceType {
        SourceType::WikiConnector
    }

    async fn search(&self, keyword: &str, auth_token: &str, cap: usize) -> Vec<SearchResult> {
        match self.try_search(keyword, auth_token, cap).await {
            Ok(results) => {
                tracing::debug!("Wiki search '{keyword}' returned {} hits", results.len());
                results
            }
            Err(e) => {
                tracing::warn!("Wiki search '{keyword}' failed: {e:#}");
                Vec::new()
            }
        }
    }

    async fn enrich(&self, results: &mut [SearchResult]) {
        self.enricher.enrich(results).await;
    }
}

/// Parse a graph search response: `value[].hitsContainers[].hits[]`.
pub fn parse_search_response(body: &Value, cap: usize) -> Vec<SearchResult> {
    let mut results = Vec::new();

    let containers = body
        .get("value")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|v| v.get("hitsContainers").and_then(Value::as_array))
        .flatten();

    for container in containers {
        let hits = container
            .get("hits")
            .and_then(Value::as_array)
            .into_iter()
            .flatten();

        for (position, hit) in hits.enumerate() {
            if results.len() >= cap {
                return results;
            }
            if let Some(result) = parse_hit(hit, position) {
                results.push(result);
            }
        }
    }

    results
}

fn parse_hit(hit: &Value, position: usize) -> Option<SearchResult> {
    let summary = str_field(hit, "summary").unwrap_or_default();
    let rank = hit
        .get("rank")
        .and_then(Value::as_u64)
        .map(|r| r as usize)
        .unwrap_or(position + 1)
        .max(1);

    let props = hit
        .pointer("/resource/properties")
        .cloned()
        .unwrap_or(Value::Null);

    let title = str_field(&props, "title")
        .or_else(|| str_field(&props, "name"))
        .unwrap_or_else(|| "Untitled".to_string());
    let url = str_field(&props, "url")
        .or_else(|| str_field(&props, "webUrl"))
        .unwrap_or_default();

    let content = assemble_content(&props, &summary);

    // A hit with no title and next to no content grounds nothing
    if title == "Untitled" && content.len() <= MIN_USEFUL_CONTENT {
        return None;
    }

    let id = str_field(hit, "hitId").unwrap_or_else(|| url.clone());
    if id.is_empty() {
        return None;
    }

    Some(SearchResult {
        id,
        title,
        url,
        content,
        summary,
        source_type: SourceType::WikiConnector,
        original_rank: rank,
        lexical_score: SearchResult::lexical_score_for_rank(rank),
        vector_score: 0.0,
        search_score: None,
        reranker_score: None,
        combined_score: 0.0,
        final_rank: 0,
        content_enhanced: false,
        author: str_field(&props, "author").unwrap_or_default(),
        space: str_field(&props, "spaceName")
            .or_else(|| str_field(&props, "space"))
            .unwrap_or_default(),
        last_modified: str_field(&props, "lastModifiedDateTime"),
    })
}

/// Merge candidate body fields and the hit summary into one content block:
/// priority order, case-insensitive dedup, short fragments dropped, hard cap
/// with a truncation marker.
pub fn assemble_content(props: &Value, summary: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    let candidates = CONTENT_FIELDS
        .iter()
        .filter_map(|f| props.get(f).and_then(Value::as_str))
        .chain(std::iter::once(summary));

    for candidate in candidates {
        let trimmed = candidate.trim();
        if trimmed.len() < MIN_PART_CHARS {
            continue;
        }
        if seen.insert(trimmed.to_lowercase()) {
            parts.push(trimmed);
        }
    }

    let mut content = parts.join("\n\n");
    if content.len() > MAX_CONTENT_CHARS {
        let mut end = MAX_CONTENT_CHARS;
        while !content.is_char_boundary(end) {
            end -= 1;
        }
        content.truncate(end);
        content.push_str("... [content truncated]");
    }
    content
}

fn str_field(value: &Value, field: &str) -> Option<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(|s| s.to_string())
        .filter(|s| !s.is_empty())
}
