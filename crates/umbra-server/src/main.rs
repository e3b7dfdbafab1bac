use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;

use umbra_server::captcha::DigitGridRenderer;
use umbra_server::config::{Cli, Commands, ServerConfig};
use umbra_server::handshake::AppState;
use umbra_server::http::routes::build_router;
use umbra_server::rate_limiter::RateLimiter;
use umbra_server::store::InMemorySessionStore;
use umbra_server::{janitor, logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Version => {
            println!("umbra-server {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Config(args) => {
            let cfg = args.apply(ServerConfig::load(args.config.as_ref())?);
            println!("{}", toml::to_string_pretty(&cfg)?);
            Ok(())
        }
        Commands::Run(args) => run(cli.verbosity, args).await,
    }
}

async fn run(verbosity: u8, args: umbra_server::config::RunArgs) -> anyhow::Result<()> {
    let cfg = args.apply(ServerConfig::load(args.config.as_ref())?);
    let _log_guard = logging::init(verbosity, &cfg.log_dir)?;

    tracing::info!(bind_addr = %cfg.bind_addr, "starting umbra-server");

    let store = Arc::new(InMemorySessionStore::new());
    let rate_limiter = Arc::new(RateLimiter::new(cfg.rate_limiter.clone()));
    let captcha = Arc::new(DigitGridRenderer);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let janitor_handle = janitor::spawn(
        store.clone(),
        rate_limiter.clone(),
        cfg.janitor_interval_secs,
        shutdown_rx,
    );

    let state = Arc::new(AppState {
        config: cfg.clone(),
        store,
        rate_limiter,
        captcha,
    });
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown_tx.send(true).ok();
    janitor_handle.await.ok();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received");
}
