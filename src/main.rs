use anyhow::Result;
use clap::Parser;
use image_shrinker::app::AppState;
use image_shrinker::config::{Config, StoreBackend};
use image_shrinker::routes;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "image-shrinker")]
#[command(about = "Serve uploads compressed to a size budget")]
struct CliArgs {
    /// Address to listen on; overrides BIND_ADDRESS.
    #[arg(long, value_name = "ADDR")]
    bind: Option<SocketAddr>,

    /// Keep images in memory instead of the configured blob store.
    #[arg(long)]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "image_shrinker=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = CliArgs::parse();

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    if args.in_memory {
        config.store_backend = StoreBackend::Memory;
    }

    info!(
        backend = %config.store_backend,
        container = %config.container,
        max_size_kb = config.compression.max_size_kb,
        "Starting image-shrinker"
    );

    let state = match AppState::new(&config).await {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            std::process::exit(1);
        }
    };

    let listener = TcpListener::bind(config.bind_address).await?;
    info!(bind_address = %config.bind_address, "Server listening on socket");

    axum::serve(listener, routes::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::CliArgs;
    use clap::Parser;

    #[test]
    fn test_cli_args_default() {
        let args = CliArgs::try_parse_from(["image-shrinker"]).unwrap();
        assert!(args.bind.is_none());
        assert!(!args.in_memory);
    }

    #[test]
    fn test_cli_args_overrides() {
        let args =
            CliArgs::try_parse_from(["image-shrinker", "--bind", "127.0.0.1:3000", "--in-memory"])
                .unwrap();
        assert_eq!(args.bind.unwrap().port(), 3000);
        assert!(args.in_memory);
    }

    #[test]
    fn test_cli_args_invalid_bind() {
        let err = CliArgs::try_parse_from(["image-shrinker", "--bind", "nowhere"]).unwrap_err();
        assert!(err.to_string().contains("nowhere"));
    }
}
