use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::config::IndexSearchConfig;
use crate::models::{SearchResult, SourceType};
use crate::sources::SourceAdapter;

const SUMMARY_CHARS: usize = 200;

/// Enterprise keyword-search index over curated documents. Unlike the wiki
/// connector it returns full content and native relevance scores directly.
pub struct IndexSearchAdapter {
    client: reqwest::Client,
    config: IndexSearchConfig,
}

#[derive(Deserialize)]
struct IndexResponse {
    #[serde(default)]
    value: Vec<IndexDocument>,
}

#[derive(Deserialize)]
struct IndexDocument {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    sourcepage: String,
    #[serde(default)]
    content: String,
    #[serde(rename = "@search.score")]
    search_score: Option<f32>,
    #[serde(rename = "@search.rerankerScore")]
    reranker_score: Option<f32>,
}

impl IndexSearchAdapter {
    pub fn new(client: reqwest::Client, config: IndexSearchConfig) -> Self {
        Self { client, config }
    }

    async fn try_search(&self, keyword: &str, cap: usize) -> Result<Vec<SearchResult>> {
        let url = format!(
            "{}/indexes/{}/docs/search",
            self.config.endpoint, self.config.index_name
        );

        let resp = self
            .client
            .post(&url)
            .header("api-key", &self.config.api_key)
            .json(&json!({ "query": keyword, "top": cap }))
            .send()
            .await
            .context("Failed to call keyword-search index")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Keyword-search index returned {status}: {body}");
        }

        let body: IndexResponse = resp
            .json()
            .await
            .context("Failed to parse keyword-search response")?;

        Ok(body
            .value
            .into_iter()
            .take(cap)
            .enumerate()
            .map(|(position, doc)| to_result(doc, position + 1))
            .collect())
    }
}

fn to_result(doc: IndexDocument, rank: usize) -> SearchResult {
    let summary = summarize(&doc.content);
    SearchResult {
        id: doc.id,
        title: doc.title,
        url: doc.sourcepage,
        content: doc.content,
        summary,
        source_type: SourceType::KeywordIndex,
        original_rank: rank,
        lexical_score: SearchResult::lexical_score_for_rank(rank),
        vector_score: 0.0,
        search_score: doc.search_score,
        reranker_score: doc.reranker_score,
        combined_score: 0.0,
        final_rank: 0,
        // The index stores extracted document text, nothing left to fetch
        content_enhanced: true,
        author: String::new(),
        space: String::new(),
        last_modified: None,
    }
}

fn summarize(content: &str) -> String {
    let mut end = content.len().min(SUMMARY_CHARS);
    while !content.is_char_boundary(end) {
        end -= 1;
    }
    content[..end].to_string()
}

#[async_trait]
impl SourceAdapter for IndexSearchAdapter {
    fn source_type(&self) -> SourceType {
        SourceType::KeywordIndex
    }

    async fn search(&self, keyword: &str, _auth_token: &str, cap: usize) -> Vec<SearchResult> {
        match self.try_search(keyword, cap).await {
            Ok(results) => {
                tracing::debug!("Index search '{keyword}' returned {} documents", results.len());
                results
            }
            Err(e) => {
                tracing::warn!("Index search '{keyword}' failed: {e:#}");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_mapping_preserves_native_scores() {
        let doc: IndexDocument = serde_json::from_value(serde_json::json!({
            "id": "doc-1",
            "title": "Travel Policy",
            "sourcepage": "travel-policy.pdf#page=2",
            "content": "Employees may book economy class for flights under six hours.",
            "@search.score": 7.25,
            "@search.rerankerScore": 2.9
        }))
        .unwrap();

        let r = to_result(doc, 1);
        assert_eq!(r.id, "doc-1");
        assert_eq!(r.source_type, SourceType::KeywordIndex);
        assert_eq!(r.search_score, Some(7.25));
        assert_eq!(r.reranker_score, Some(2.9));
        assert_eq!(r.original_rank, 1);
        assert_eq!(r.lexical_score, 0.5);
        assert!(r.content_enhanced);
    }

    #[test]
    fn test_missing_optional_fields_default() {
        let doc: IndexDocument =
            serde_json::from_value(serde_json::json!({ "id": "doc-2" })).unwrap();
        let r = to_result(doc, 3);
        assert!(r.title.is_empty());
        assert!(r.search_score.is_none());
        assert!((r.lexical_score - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_summary_truncates_on_char_boundary() {
        let content = "é".repeat(300);
        let summary = summarize(&content);
        assert!(summary.len() <= SUMMARY_CHARS);
        assert!(summary.chars().all(|c| c == 'é'));
    }
}
