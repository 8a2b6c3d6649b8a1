// src/main.rs

use anyhow::Context;
use axum::serve;
use clap::Parser;
use key_broker::{
    cli::{Cli, Commands},
    bind_listener, run, setup_configuration,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!(signal = "Ctrl+C", "Received signal. Initiating graceful shutdown...") },
        () = terminate => { info!(signal = "Terminate", "Received signal. Initiating graceful shutdown...") },
    }

    // Abandon in-flight broker calls so connections can drain.
    token.cancel();
}

fn init_tracing(cli: &Cli) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let registry = tracing_subscriber::registry().with(env_filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_current_span(true).with_span_list(true))
            .init();
    } else {
        registry.with(fmt::layer().with_target(false)).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    match cli.command() {
        Commands::CheckConfig => {
            let config = setup_configuration(cli.config.clone())
                .context("configuration check failed")?;
            info!(keys = config.keys.len(), "Configuration is valid");
            println!("Configuration OK: {} key(s) configured", config.keys.len());
            Ok(())
        }
        Commands::Serve => serve_http(cli).await,
    }
}

async fn serve_http(cli: Cli) -> anyhow::Result<()> {
    let (app, state) = run(cli.config.clone())
        .await
        .context("application setup failed")?;

    let host = cli.host.unwrap_or_else(|| state.config.server.host.clone());
    let port = cli.port.unwrap_or(state.config.server.port);
    let listener = bind_listener(&host, port)
        .await
        .with_context(|| format!("failed to bind {host}:{port}"))?;
    match listener.local_addr() {
        Ok(addr) => info!(server.address = %addr, "Server listening"),
        Err(_) => info!(server.host = %host, server.port = port, "Server listening"),
    }

    serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal(state.shutdown.clone()))
        .await
        .map_err(|e| {
            warn!(error = ?e, "Server run loop encountered an error. Exiting.");
            e
        })?;

    info!("Server shut down gracefully.");
    Ok(())
}
