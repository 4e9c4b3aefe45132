use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use kb_search::config::Config;
use kb_search::llm::HttpEmbedder;
use kb_search::models::RetrievalRequest;
use kb_search::orchestrator::Orchestrator;

/// Minimal driver: one retrieval for a query given on the command line,
/// passages to stdout, trace as JSON behind --trace.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let show_trace = args.iter().any(|a| a == "--trace");
    args.retain(|a| a != "--trace");
    let query = args.join(" ");
    if query.is_empty() {
        eprintln!("Usage: kb-search [--trace] <query>");
        std::process::exit(2);
    }

    let config = Config::from_env();
    tracing::info!("Data directory: {}", config.data_dir.display());
    tracing::info!(
        "LLM: {} (chat {}, embeddings {})",
        config.llm.base_url,
        config.llm.chat_model,
        config.llm.embedding_model
    );

    let embed_client = reqwest::Client::builder()
        .connect_timeout(std::time::Duration::from_secs(10))
        .timeout(std::time::Duration::from_secs(60))
        .build()?;
    let embedder = Arc::new(HttpEmbedder::new(embed_client, config.llm.clone()));

    let orchestrator = Orchestrator::new(&config, embedder)?;

    let request = RetrievalRequest {
        query,
        past_messages: Vec::new(),
        source_config: Default::default(),
        top_n: 10,
        auth_token: std::env::var("KB_SEARCH_AUTH_TOKEN").unwrap_or_default(),
        profile_id: std::env::var("KB_SEARCH_PROFILE").ok(),
        use_agentic_retrieval: false,
    };

    let response = orchestrator.retrieve(&request).await;

    if response.passages.is_empty() {
        println!("No passages found.");
    }
    for (i, passage) in response.passages.iter().enumerate() {
        println!("--- passage {} ---", i + 1);
        println!("{passage}\n");
    }

    if show_trace {
        println!("{}", serde_json::to_string_pretty(&response.trace)?);
    }

    Ok(())
}
