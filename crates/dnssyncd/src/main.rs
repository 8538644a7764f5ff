// # dnssyncd - ExternalDNS webhook for NextDNS
//
// This is a THIN integration layer:
// - Reconciliation logic lives in dnssync-core
// - NextDNS HTTP details live in dnssync-provider-nextdns
//
// The daemon is responsible for:
// 1. Reading configuration from flags / environment variables
// 2. Initializing logging and the runtime
// 3. Wiring the NextDNS client into the Reconciler
// 4. Serving the webhook until SIGTERM/SIGINT
//
// ## Example
//
// ```bash
// export NEXTDNS_WEBHOOK_API_KEY=...
// export NEXTDNS_WEBHOOK_PROFILE_ID=abc123
// export NEXTDNS_WEBHOOK_DOMAIN_FILTER=home.example.com
//
// dnssyncd --log-format json
// ```

mod config;
mod webhook;

use anyhow::{Context, Result};
use clap::Parser;
use config::{Config, LogFormat};
use dnssync_core::Reconciler;
use dnssync_provider_nextdns::NextDnsClient;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum WebhookExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<WebhookExitCode> for ExitCode {
    fn from(code: WebhookExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

fn main() -> ExitCode {
    // Load configuration from flags and environment
    let config = match Config::try_parse() {
        Ok(cfg) => cfg,
        Err(e) if !e.use_stderr() => {
            // --help / --version
            let _ = e.print();
            return WebhookExitCode::CleanShutdown.into();
        }
        Err(e) => {
            let _ = e.print();
            return WebhookExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return WebhookExitCode::ConfigError.into();
    }

    if let Err(e) = init_tracing(&config) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return WebhookExitCode::ConfigError.into();
    }

    info!("Starting dnssyncd {}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {:?}", config);

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return WebhookExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config).await {
            error!("Daemon error: {:#}", e);
            WebhookExitCode::RuntimeError
        } else {
            WebhookExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Install the global tracing subscriber
fn init_tracing(config: &Config) -> Result<()> {
    let builder = FmtSubscriber::builder().with_max_level(tracing::Level::from(config.log_level));

    match config.log_format {
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish())?,
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
    }

    Ok(())
}

/// Run the daemon
async fn run_daemon(config: Config) -> Result<()> {
    let client = NextDnsClient::with_base_url(&config.api_key, &config.api_url, config.request_timeout)
        .context("Failed to create NextDNS client")?;
    let reconciler = Reconciler::new(Arc::new(client), config.provider_config())
        .context("Failed to create reconciler")?;

    if reconciler.is_dry_run() {
        warn!("Running in dry-run mode. No changes to DNS records will be made.");
    }

    let filter = reconciler.domain_filter();
    if filter.is_configured() {
        info!(
            "Domain filter: include {:?}, exclude {:?}",
            filter.include(),
            filter.exclude()
        );
    } else {
        warn!("No domain filter configured; every rewrite of profile {} is managed", config.profile_id);
    }

    let app = webhook::router(
        Arc::new(reconciler),
        webhook::Timeouts {
            read: config.read_timeout,
            write: config.write_timeout,
        },
    );

    let listener = tokio::net::TcpListener::bind(config.listen_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_address))?;
    info!("Webhook listening on {}", config.listen_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            match wait_for_shutdown().await {
                Ok(signal) => info!("Received shutdown signal: {}", signal),
                Err(e) => error!("Shutdown error: {:#}", e),
            }
            info!("Shutting down webhook");
        })
        .await
        .context("Webhook server failed")?;

    Ok(())
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let signal = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };

    Ok(signal)
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
