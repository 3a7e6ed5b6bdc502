//! Command-line uploader: upload a video, wait for processing, print the read URL.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vdo_uploader::{parse_duration_secs, UploadFile, Uploader, UploaderConfig};

#[derive(Debug, Parser)]
#[command(name = "vdo-upload", version, about = "Upload a video and wait for its processed result")]
struct Cli {
    /// Backend base URL
    #[arg(long, env = "VDO_BACKEND_URL", global = true)]
    backend_url: Option<String>,

    /// Give up waiting after this many seconds (waits forever by default)
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Upload a file and wait until it is processed
    Upload {
        path: PathBuf,

        /// Video duration in seconds, checked against the upload limit
        #[arg(long, value_parser = duration_arg)]
        duration_secs: Option<Duration>,

        #[arg(long, default_value = "video/mp4")]
        content_type: String,
    },
    /// Wait for an upload started by an earlier run
    Resume,
    /// Forget the persisted session
    Reset,
}

fn duration_arg(value: &str) -> Result<Duration, String> {
    parse_duration_secs(value).ok_or_else(|| format!("invalid duration in seconds: {value}"))
}

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    let _ = rustls::crypto::ring::default_provider().install_default();

    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = UploaderConfig::from_env();
    if let Some(url) = cli.backend_url {
        config.backend_url = url;
    }
    let mut uploader = Uploader::new(config).context("failed to create uploader")?;

    match cli.command {
        Command::Upload {
            path,
            duration_secs,
            content_type,
        } => {
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload".to_string());
            let mut file = UploadFile::new(name, content_type, bytes);
            if let Some(duration) = duration_secs {
                file = file.with_duration(duration);
            }

            let key = uploader.begin_upload(file).await?;
            info!(video_key = %key, "Upload stored, waiting for processing");
        }
        Command::Resume => match uploader.resume_if_pending().await? {
            Some(key) => info!(video_key = %key, "Resumed pending upload"),
            None => {
                info!("Nothing to resume");
                return Ok(());
            }
        },
        Command::Reset => {
            uploader.reset()?;
            info!("Session cleared");
            return Ok(());
        }
    }

    let ready = match cli.timeout_secs {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), uploader.wait_until_ready())
            .await
            .context("timed out waiting for processing")??,
        None => uploader.wait_until_ready().await?,
    };

    info!(video_key = %ready.key, "Processed result ready");
    println!("{}", ready.url);
    Ok(())
}

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vdo_uploader=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(false).with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    }
}
