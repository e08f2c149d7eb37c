use anyhow::Result;
use clap::Parser;
use sotto::cli::{Cli, Commands, ServeArgs};
use sotto::config::Config;
use sotto::engine::whisper::WhisperEngine;
use sotto::engine::{EnginePool, SpeechEngine};
use sotto::server::Server;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose);

    match cli.command {
        None => run_serve(cli.config.as_deref(), &ServeArgs::default()).await,
        Some(Commands::Serve(args)) => run_serve(cli.config.as_deref(), &args).await,
        Some(Commands::Transcribe { wav, uri, language }) => {
            let config = load_config(cli.config.as_deref())?;
            let uri = uri.unwrap_or(config.server.uri);
            sotto::client::run_transcribe(&uri, &wav, language, cli.quiet).await?;
            Ok(())
        }
        Some(Commands::Probe { uri, timeout }) => {
            let config = load_config(cli.config.as_deref())?;
            let uri = uri.unwrap_or(config.server.uri);
            sotto::client::run_probe(&uri, timeout).await?;
            Ok(())
        }
    }
}

async fn run_serve(config_path: Option<&std::path::Path>, args: &ServeArgs) -> Result<()> {
    let mut config = load_config(config_path)?;
    args.apply(&mut config);
    config.validate()?;

    info!(
        version = %sotto::version_string(),
        model = %config.engine.model,
        device = %config.engine.device,
        backend = sotto::defaults::gpu_backend(),
        "starting sotto"
    );

    // Load the model once; startup fails before the socket opens if the
    // engine cannot serve.
    let engine: Arc<dyn SpeechEngine> = Arc::new(WhisperEngine::new(config.engine_config()?)?);
    info!(model = engine.model_name(), "model loaded");

    let pool = EnginePool::new(engine, config.pool_config());
    let server = Server::new(pool, config.server_config())?;
    server.run(shutdown_signal()).await?;

    info!("server stopped");
    Ok(())
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config)
/// 2. Default config path (~/.config/sotto/config.toml)
/// 3. Built-in defaults
/// Environment variables override the file in all cases.
fn load_config(custom_path: Option<&std::path::Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path)?
    } else {
        Config::load_or_default(&Config::default_path())?
    };
    Ok(config.with_env_overrides())
}

/// Resolve when the process should stop accepting connections.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT"),
        _ = terminate => info!("received SIGTERM"),
    }
}

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise verbosity flags choose the level.
fn init_tracing(quiet: bool, verbosity: u8) {
    let default_filter = match (quiet, verbosity) {
        (true, _) => "sotto=warn",
        (_, 0) => "sotto=info",
        (_, 1) => "sotto=debug",
        (_, _) => "sotto=trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
