use std::sync::Arc;

use clap::Parser;

use conductor::cache::AgentCache;
use conductor::cli::Cli;
use conductor::config;
use conductor::models::ModelRegistry;
use conductor::server::{self, AppState};
use conductor::toolserver::ToolServerManager;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    tracing::info!("Conductor starting");

    let config = Arc::new(config::load_config(&cli)?);
    tracing::info!(
        bind = %config.bind_addr,
        ollama = %config.ollama_base_url,
        cloud = config.zai_api_key.is_some(),
        "Config loaded"
    );

    // Probe the model infrastructure once, up front, so the log shows what
    // each category resolved to before the first request arrives.
    let registry = Arc::new(ModelRegistry::new(&config));
    let default_category = registry.default_category().await;
    if registry.any_resolvable().await {
        tracing::info!(default = %default_category, "model registry ready");
    } else {
        tracing::error!(
            "no models resolvable -- requests will be rejected until Ollama has models \
             or a cloud credential is configured (restart required)"
        );
    }

    // Bring up the external tool servers. A degraded server is logged and
    // tolerated; the dependent helper agents are simply omitted.
    let toolservers = Arc::new(ToolServerManager::start(ToolServerManager::default_specs(&config)).await);

    let state = AppState {
        config: config.clone(),
        registry,
        toolservers: toolservers.clone(),
        cache: Arc::new(AgentCache::new()),
    };

    // Serve until ctrl-c; tool-server shutdown runs on every exit path,
    // including a failed bind.
    let serve_result = serve(&config.bind_addr, state).await;
    toolservers.shutdown();
    serve_result
}

async fn serve(bind_addr: &str, state: AppState) -> anyhow::Result<()> {
    let app = server::router(state);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;
    Ok(())
}
