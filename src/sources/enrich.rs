use anyhow::{Context, Result};
use futures_util::future::join_all;
use regex::Regex;
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use crate::config::WikiConfig;
use crate::models::SearchResult;

/// Results already carrying at least this much content are left alone when
/// synthesizing pseudo-content.
const SUBSTANTIAL_CONTENT_CHARS: usize = 100;

fn page_id_patterns() -> &'static [Regex; 2] {
    static PATTERNS: OnceLock<[Regex; 2]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            Regex::new(r"[?&]pageId=(\d+)").unwrap(),
            Regex::new(r"/pages/(\d+)").unwrap(),
        ]
    })
}

/// Extract the numeric page id from a wiki hit URL.
pub fn extract_page_id(url: &str) -> Option<String> {
    page_id_patterns()
        .iter()
        .find_map(|re| re.captures(url))
        .map(|caps| caps[1].to_string())
}

/// Fetches full page bodies for wiki hits, bounded by a semaphore and a
/// per-page timeout. Every failure mode leaves the hit's summary-based
/// content untouched.
pub struct Enricher {
    client: reqwest::Client,
    config: WikiConfig,
    semaphore: Arc<tokio::sync::Semaphore>,
}

impl Enricher {
    pub fn new(client: reqwest::Client, config: WikiConfig) -> Self {
        let semaphore = Arc::new(tokio::sync::Semaphore::new(
            config.max_concurrent_fetches.max(1),
        ));
        Self {
            client,
            config,
            semaphore,
        }
    }

    pub async fn enrich(&self, results: &mut [SearchResult]) {
        if !self.config.use_content_api {
            synthesize_content(results);
            return;
        }

        let jobs: Vec<(usize, String)> = results
            .iter()
            .enumerate()
            .filter(|(_, r)| !r.content_enhanced)
            .filter_map(|(i, r)| extract_page_id(&r.url).map(|id| (i, id)))
            .collect();
        if jobs.is_empty() {
            return;
        }

        let timeout = Duration::from_secs(self.config.content_fetch_timeout_secs);
        let fetched = join_all(jobs.iter().map(|(i, page_id)| async move {
            let _permit = self.semaphore.acquire().await.ok()?;
            match tokio::time::timeout(timeout, self.fetch_page(page_id)).await {
                Ok(Ok(body)) if !body.trim().is_empty() => Some((*i, body)),
                Ok(Ok(_)) => None,
                Ok(Err(e)) => {
                    tracing::warn!("Content fetch for page {page_id} failed: {e:#}");
                    None
                }
                Err(_) => {
                    tracing::warn!("Content fetch for page {page_id} timed out");
                    None
                }
            }
        }))
        .await;

        let mut enhanced = 0;
        for (i, body) in fetched.into_iter().flatten() {
            results[i].content = body;
            results[i].content_enhanced = true;
            enhanced += 1;
        }
        tracing::debug!("Enhanced {enhanced}/{} wiki results", jobs.len());
    }

    async fn fetch_page(&self, page_id: &str) -> Result<String> {
        let url = format!(
            "{}/content/{}?expand=body.storage",
            self.config.api_base_url, page_id
        );

        let resp = self
            .client
            .get(&url)
            .basic_auth(&self.config.api_email, Some(&self.config.api_token))
            .send()
            .await
            .context("Failed to call content API")?;

        if !resp.status().is_success() {
            anyhow::bail!("Content API returned {}", resp.status());
        }

        let body: Value = resp.json().await.context("Failed to parse content API response")?;
        let html = body
            .pointer("/body/storage/value")
            .and_then(Value::as_str)
            .context("Content API response missing body")?;
        Ok(strip_html(html))
    }
}

/// Build a metadata-and-summary block for results that could not be (or were
/// configured not to be) fetched, so ranking has more than a one-line summary
/// to work with.
pub fn synthesize_content(results: &mut [SearchResult]) {
    for r in results.iter_mut() {
        if r.content_enhanced || r.content.len() >= SUBSTANTIAL_CONTENT_CHARS {
            continue;
        }
        let mut lines = vec![format!("Document: {}", r.title)];
        if !r.url.is_empty() {
            lines.push(format!("URL: {}", r.url));
        }
        if !r.author.is_empty() {
            lines.push(format!("Author: {}", r.author));
        }
        if !r.space.is_empty() {
            lines.push(format!("Space: {}", r.space));
        }
        if let Some(modified) = &r.last_modified {
            lines.push(format!("Last modified: {modified}"));
        }
        if !r.summary.is_empty() {
            lines.push(String::new());
            lines.push(r.summary.clone());
        }
        lines.push(String::new());
        lines.push("Full page content unavailable; metadata and summary only.".to_string());

        r.content = lines.join("\n");
        r.content_enhanced = true;
    }
}

/// Strip HTML tags and decode the handful of entities wiki storage format
/// actually emits, collapsing runs of whitespace.
pub fn strip_html(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                text.push(' ');
            }
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }

    let decoded = text
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");

    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceType;

    fn wiki_result(url: &str, content: &str) -> SearchResult {
        SearchResult {
            id: url.to_string(),
            title: "Page".to_string(),
            url: url.to_string(),
            content: content.to_string(),
            summary: "a short summary of the page".to_string(),
            source_type: SourceType::WikiConnector,
            original_rank: 1,
            lexical_score: 0.5,
            vector_score: 0.0,
            search_score: None,
            reranker_score: None,
            combined_score: 0.0,
            final_rank: 0,
            content_enhanced: false,
            author: "Alex".to_string(),
            space: "ENG".to_string(),
            last_modified: Some("2026-02-01".to_string()),
        }
    }

    #[test]
    fn test_extract_page_id_query_param() {
        assert_eq!(
            extract_page_id("https://wiki.example.com/view?pageId=12345"),
            Some("12345".to_string())
        );
        assert_eq!(
            extract_page_id("https://wiki.example.com/view?space=X&pageId=9"),
            Some("9".to_string())
        );
    }

    #[test]
    fn test_extract_page_id_path_form() {
        assert_eq!(
            extract_page_id("https://wiki.example.com/spaces/ENG/pages/777/VPN+Setup"),
            Some("777".to_string())
        );
    }

    #[test]
    fn test_extract_page_id_absent() {
        assert_eq!(extract_page_id("https://wiki.example.com/home"), None);
        assert_eq!(extract_page_id(""), None);
    }

    #[test]
    fn test_strip_html() {
        let html = "<h1>Title</h1><p>First &amp; second&nbsp;line</p>";
        assert_eq!(strip_html(html), "Title First & second line");
    }

    #[test]
    fn test_strip_html_plain_text_unchanged() {
        assert_eq!(strip_html("no markup at all"), "no markup at all");
    }

    #[test]
    fn test_synthesize_fills_thin_results() {
        let mut results = vec![wiki_result("https://wiki.example.com/pages/1", "thin")];
        synthesize_content(&mut results);
        let r = &results[0];
        assert!(r.content_enhanced);
        assert!(r.content.contains("Document: Page"));
        assert!(r.content.contains("Author: Alex"));
        assert!(r.content.contains("a short summary of the page"));
        assert!(r.content.contains("unavailable"));
    }

    #[test]
    fn test_synthesize_leaves_substantial_content() {
        let long = "x".repeat(200);
        let mut results = vec![wiki_result("https://wiki.example.com/pages/1", &long)];
        synthesize_content(&mut results);
        assert!(!results[0].content_enhanced);
        assert_eq!(results[0].content, long);
    }

    #[tokio::test]
    async fn test_unreachable_content_api_leaves_results_untouched() {
        let config = WikiConfig {
            // Non-routable test address, connection attempts hang or fail fast
            api_base_url: "http://203.0.113.1:9".to_string(),
            content_fetch_timeout_secs: 1,
            ..WikiConfig::default()
        };
        let enricher = Enricher::new(reqwest::Client::new(), config);
        let mut results = vec![wiki_result("https://wiki.example.com/pages/42", "original")];
        enricher.enrich(&mut results).await;
        assert_eq!(results[0].content, "original");
        assert!(!results[0].content_enhanced);
    }

    #[tokio::test]
    async fn test_disabled_content_api_synthesizes() {
        let config = WikiConfig {
            use_content_api: false,
            ..WikiConfig::default()
        };
        let enricher = Enricher::new(reqwest::Client::new(), config);
        let mut results = vec![wiki_result("https://wiki.example.com/pages/42", "thin")];
        enricher.enrich(&mut results).await;
        assert!(results[0].content_enhanced);
        assert!(results[0].content.contains("Document:"));
    }
}
