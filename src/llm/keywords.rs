use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::models::ChatMessage;

/// How many prior turns to include in the keyword prompt. Older turns rarely
/// change the search intent and just burn tokens.
const CONTEXT_TURNS: usize = 4;

/// Generate up to `max_keywords` search keyword variants for a query using
/// the LLM, with recent conversation turns as disambiguation context.
///
/// Parse failures degrade to the literal query so retrieval never stalls on a
/// malformed completion.
pub async fn generate_keywords(
    client: &reqwest::Client,
    config: &LlmConfig,
    query: &str,
    past_messages: &[ChatMessage],
    max_keywords: usize,
) -> Result<Vec<String>> {
    let context = format_context(past_messages);
    let prompt = format!(
        "You are a search keyword generator for an internal knowledge base. \
         Given a user question, produce at most {max_keywords} short search phrases \
         that together cover the question's intent. Prefer concrete nouns and \
         domain terms over full sentences.\n\n\
         {context}Question: \"{query}\"\n\n\
         Respond with ONLY a JSON array of strings. No explanation.\n\
         Example: [\"expense reimbursement policy\", \"travel expense limits\"]"
    );

    let response = call_chat(client, config, &prompt).await?;
    let keywords = parse_keywords(&response, max_keywords);
    if keywords.is_empty() {
        tracing::warn!("Keyword generation produced nothing usable, falling back to raw query");
        return Ok(vec![query.to_string()]);
    }
    Ok(keywords)
}

fn format_context(past_messages: &[ChatMessage]) -> String {
    if past_messages.is_empty() {
        return String::new();
    }
    let recent = past_messages
        .iter()
        .rev()
        .take(CONTEXT_TURNS)
        .rev()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n");
    format!("Recent conversation:\n{recent}\n\n")
}

fn parse_keywords(content: &str, max_keywords: usize) -> Vec<String> {
    // Extract the JSON array from the response, tolerating surrounding prose
    // and markdown fences
    let json_str = if let Some(start) = content.find('[') {
        if let Some(end) = content.rfind(']') {
            &content[start..=end]
        } else {
            content
        }
    } else {
        content
    };

    match serde_json::from_str::<Vec<String>>(json_str) {
        Ok(keywords) => keywords
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .take(max_keywords)
            .collect(),
        Err(e) => {
            tracing::warn!("Failed to parse keywords: {e}. Raw: {content}");
            Vec::new()
        }
    }
}

// ─── OpenAI-compatible chat call ─────────────────────────

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<PromptMessage>,
    temperature: f32,
}

#[derive(Serialize)]
struct PromptMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

async fn call_chat(client: &reqwest::Client, config: &LlmConfig, prompt: &str) -> Result<String> {
    let url = format!("{}/v1/chat/completions", config.base_url);

    let req = ChatRequest {
        model: config.chat_model.clone(),
        messages: vec![PromptMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
        }],
        temperature: 0.3,
    };

    let mut request = client.post(&url).json(&req);
    if let Some(key) = config.api_key.as_deref() {
        request = request.header("Authorization", format!("Bearer {key}"));
    }

    let resp = request
        .send()
        .await
        .context("Failed to call chat API for keyword generation")?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("Chat API returned {status}: {body}");
    }

    let body: ChatResponse = resp.json().await?;
    Ok(body
        .choices
        .first()
        .map(|c| c.message.content.clone())
        .unwrap_or_default())
}
