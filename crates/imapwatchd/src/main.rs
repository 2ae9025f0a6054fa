use anyhow::Context;
use clap::Parser;
use imapwatch_config::ConfigManager;
use imapwatch_email::{ImapConnector, SmtpNotifier};
use imapwatch_watch::WatchSupervisor;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Watch IMAP mailboxes and forward matching messages by email.
#[derive(Debug, Parser)]
#[command(name = "imapwatchd", version, about)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Raise log verbosity (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let manager = match cli.config {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new().context("failed to resolve config directory")?,
    };
    let config = manager.load().with_context(|| {
        format!(
            "failed to load config from {}",
            manager.config_path().display()
        )
    })?;
    tracing::info!(
        path = %manager.config_path().display(),
        accounts = config.accounts.len(),
        "config loaded"
    );

    let supervisor = Arc::new(
        WatchSupervisor::new(
            &config,
            Arc::new(ImapConnector),
            Arc::new(SmtpNotifier::new(config.smtp.clone())),
        )
        .context("failed to build watch set")?,
    );

    let runner = tokio::spawn({
        let supervisor = supervisor.clone();
        async move { supervisor.start().await }
    });

    shutdown_signal().await?;
    tracing::info!("shutdown requested");
    supervisor.stop().await;

    runner
        .await
        .context("watch supervisor task panicked")?
        .context("watch supervisor failed")?;
    tracing::info!("imapwatchd stopped");
    Ok(())
}

async fn shutdown_signal() -> anyhow::Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .context("failed to register SIGTERM handler")?;
        tokio::select! {
            result = ctrl_c => result.context("failed to listen for ctrl-c")?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.context("failed to listen for ctrl-c")?;
    }
    Ok(())
}
