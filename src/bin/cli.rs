use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use now_playing_proxy as lib;
use lib::config::Config;
use lib::models::NowPlayingState;
use lib::poller::{CycleOutcome, PollOptions, PollResult, PollingClient};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::subscriber as tracing_subscriber_global;
use tracing::{info, warn};
use tracing_appender::rolling::RollingFileAppender;
use tracing_log::LogTracer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "now-playing", version)]
struct Cli {
    /// Path to config TOML
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the now-playing endpoint (long-running)
    Serve,
    /// Poll a now-playing endpoint and log every state change
    Watch {
        /// Endpoint URL, e.g. http://127.0.0.1:3000/api/now-playing
        #[arg(long)]
        url: String,
        /// Polling interval in milliseconds (floor 3000)
        #[arg(long)]
        interval_ms: Option<u64>,
        /// Retries per poll cycle
        #[arg(long)]
        retries: Option<u32>,
        /// Run a single poll cycle and exit
        #[arg(long)]
        once: bool,
    },
    /// Authorize Spotify and print a refresh token (interactive)
    Auth,
    /// Validate config file and exit
    ConfigValidate,
}

/// Resolve config path: explicit --config overrides; otherwise prefer the
/// system-wide file, then the per-user config dir.
fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = explicit {
        return Some(p.to_path_buf());
    }
    let etc_path = Path::new("/etc/now-playing/config.toml");
    if etc_path.exists() {
        return Some(etc_path.to_path_buf());
    }
    dirs::config_dir()
        .map(|d| d.join("now-playing").join("config.toml"))
        .filter(|p| p.exists())
}

fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let cfg = match resolve_config_path(explicit) {
        Some(path) => Config::from_path(&path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };
    Ok(cfg.apply_env())
}

fn describe(result: &PollResult) -> String {
    if result.is_loading {
        return "loading".into();
    }
    let data = match &result.data {
        Some(NowPlayingState::Playing(t)) if t.is_playing => {
            format!("{} - {} ({})", t.artist, t.title, t.album)
        }
        Some(NowPlayingState::Playing(t)) => format!("paused: {} - {}", t.artist, t.title),
        Some(NowPlayingState::NotPlaying) | None => "nothing playing".into(),
    };
    if result.is_error {
        format!("{} [error]", data)
    } else {
        data
    }
}

async fn run_watch(url: String, options: PollOptions, once: bool) -> Result<()> {
    let http = reqwest::Client::builder()
        .timeout(options.request_timeout)
        .build()
        .context("building HTTP client")?;
    let client = PollingClient::with_client(http, url, options);

    if once {
        let report = client.run_cycle(&CancellationToken::new()).await;
        match report.outcome {
            CycleOutcome::Success(state) => {
                println!("{:?}", state);
                return Ok(());
            }
            CycleOutcome::Failure(e) => anyhow::bail!(
                "poll failed after {} retries and {} deferrals: {}",
                report.retry.attempt,
                report.retry.deferrals,
                e
            ),
            CycleOutcome::Cancelled => return Ok(()),
        }
    }

    let mut sub = client.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, stopping");
                break;
            }
            next = sub.changed() => match next {
                Some(result) if !result.is_fetching => info!("{}", describe(&result)),
                Some(_) => {}
                None => break,
            }
        }
    }
    sub.unsubscribe().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = match load_config(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) if matches!(cli.command, Commands::ConfigValidate) => {
            eprintln!("Config validation failed: {:#}", e);
            std::process::exit(2);
        }
        Err(e) => return Err(e),
    };

    // Initialize log->tracing bridge and structured logging.
    // Logs go to both stdout and a daily-rotated file in cfg.log_dir.
    let _ = LogTracer::init();
    let file_appender: RollingFileAppender =
        tracing_appender::rolling::daily(&cfg.log_dir, "now-playing.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    // Honor RUST_LOG if set, otherwise default to info.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = fmt::layer().with_writer(non_blocking);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer);

    tracing_subscriber_global::set_global_default(subscriber)
        .expect("failed to set global tracing subscriber");

    match cli.command {
        Commands::Serve => {
            lib::proxy::serve(&cfg)
                .await
                .with_context(|| "running server".to_string())?;
        }
        Commands::Watch { url, interval_ms, retries, once } => {
            let mut options = PollOptions::new(
                interval_ms.unwrap_or(cfg.poll_interval_ms),
                retries.unwrap_or(cfg.retry_count),
            );
            options.request_timeout = Duration::from_secs(cfg.request_timeout_secs);
            run_watch(url, options, once).await?;
        }
        Commands::Auth => {
            lib::api::spotify_auth::run_spotify_auth(&cfg).await?;
        }
        Commands::ConfigValidate => {
            if cfg.credentials().is_some() {
                println!("OK");
            } else {
                warn!("Spotify credentials are incomplete; the endpoint will answer 500");
                println!("OK (credentials missing)");
            }
        }
    }

    Ok(())
}
