use std::sync::Arc;

use rmcp::{ServiceExt, transport::stdio};

use sdlc_relay::config::Config;
use sdlc_relay::providers::ProcessEnv;
use sdlc_relay::providers::registry::ProviderRegistry;
use sdlc_relay::server::RelayServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    // .env next to the binary first (MCP clients start servers from any CWD), then CWD.
    let beside_binary = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(".env")))
        .filter(|path| path.exists());
    match beside_binary {
        Some(path) => {
            dotenvy::from_path(&path).ok();
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }

    tracing::info!("sdlc-relay starting");

    let config = Config::load();
    let registry = Arc::new(ProviderRegistry::detect_new(config.clone(), Arc::new(ProcessEnv)).await);
    let server = RelayServer::new(&config, registry);

    let service = server
        .serve(stdio())
        .await
        .inspect_err(|e| tracing::error!("serving error: {e:?}"))?;

    service.waiting().await?;

    tracing::info!("sdlc-relay shutting down");
    Ok(())
}
