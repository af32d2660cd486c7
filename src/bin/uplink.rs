use anyhow::{Context, Result};
use chunkstream_uplink::config::{RetryPolicy, UplinkConfig};
use chunkstream_uplink::coordinator::UploadCoordinator;
use chunkstream_uplink::device::TASK_STATUS_PATH;
use chunkstream_uplink::metrics::init_metrics;
use chunkstream_uplink::poll::{HttpStatusSource, StatusPoller};
use chunkstream_uplink::progress::{NotificationCenter, ProgressReporter};
use chunkstream_uplink::remote::{HttpRemote, MemoryRemote, UploadRemote};
use chunkstream_uplink::session::{UploadPhase, UploadTarget};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "uplink", about = "Chunked, MD5-verified uploads to the camera")]
struct Cli {
    /// JSON config file; flags override its values
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Device API root
    #[arg(long, global = true, env = "UPLINK_BASE_URL")]
    base_url: Option<String>,

    /// -v info, -vv debug, -vvv trace (RUST_LOG wins when set)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload a file and wait for the device to verify it
    Upload {
        file: PathBuf,

        /// model, firmware or config
        #[arg(short, long, default_value = "firmware")]
        target: UploadTarget,

        #[arg(long)]
        chunk_size: Option<usize>,

        #[arg(long)]
        hash_window: Option<usize>,

        /// Extra attempts per chunk
        #[arg(long)]
        retries: Option<u32>,

        /// Abort the whole upload after this many seconds
        #[arg(long)]
        session_timeout_secs: Option<u64>,

        /// Run against an in-memory device instead of the network
        #[arg(long)]
        dry_run: bool,
    },

    /// Follow a device task (e.g. model conversion) until it finishes
    Poll {
        /// Status URL; relative paths are joined to the base URL
        #[arg(long, default_value = TASK_STATUS_PATH)]
        url: String,

        #[arg(long)]
        interval_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("uplink={log_level},chunkstream_uplink={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
    init_metrics();

    let mut config = match &cli.config {
        Some(path) => UplinkConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => UplinkConfig::default(),
    };
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            on_ctrl_c.cancel();
        }
    });

    match cli.command {
        Command::Upload {
            file,
            target,
            chunk_size,
            hash_window,
            retries,
            session_timeout_secs,
            dry_run,
        } => {
            apply_upload_flags(&mut config, chunk_size, hash_window, retries, session_timeout_secs);
            config.validate().context("invalid configuration")?;
            upload(&config, file, target, dry_run, cancel).await
        }
        Command::Poll { url, interval_ms } => {
            if let Some(ms) = interval_ms {
                config.poll_interval_ms = ms;
            }
            config.validate().context("invalid configuration")?;
            poll(&config, &url, cancel).await
        }
    }
}

fn apply_upload_flags(
    config: &mut UplinkConfig,
    chunk_size: Option<usize>,
    hash_window: Option<usize>,
    retries: Option<u32>,
    session_timeout_secs: Option<u64>,
) {
    if let Some(size) = chunk_size {
        config.chunk_size = size;
    }
    if let Some(window) = hash_window {
        config.hash_window = window;
    }
    if let Some(retries) = retries {
        config.retry = RetryPolicy {
            max_retries: retries,
            ..config.retry.clone()
        };
    }
    if let Some(secs) = session_timeout_secs {
        config.session_timeout_ms = Some(secs.saturating_mul(1000));
    }
}

async fn upload(
    config: &UplinkConfig,
    file: PathBuf,
    target: UploadTarget,
    dry_run: bool,
    cancel: CancellationToken,
) -> Result<()> {
    let remote: Arc<dyn UploadRemote> = if dry_run {
        Arc::new(MemoryRemote::new(target))
    } else {
        Arc::new(HttpRemote::new(&config.base_url, target, config.request_timeout())?)
    };

    let notifications = NotificationCenter::init();
    let mut inbox = notifications
        .subscribe()
        .context("notification center already disposed")?;

    let reporter = ProgressReporter::new();
    let progress = reporter.subscribe(|event| {
        if matches!(event.phase, UploadPhase::Hashing | UploadPhase::Transferring) {
            eprint!("\r{:<12} {:>3}%", event.phase.label(), event.percent);
            let _ = std::io::stderr().flush();
            if event.percent == 100 {
                eprintln!();
            }
        }
    });

    let coordinator = UploadCoordinator::from_config(remote, config)?
        .with_reporter(reporter)
        .with_notifications(notifications.clone());

    let result = coordinator.upload_with_cancel(&file, cancel).await;
    progress.unsubscribe();

    if let Ok(note) = inbox.try_recv() {
        println!("{}", note.message);
    }
    notifications.dispose();

    let outcome = result?;
    println!(
        "session {}  md5 {}  {} bytes in {} chunks ({:.1?})",
        outcome.session_id, outcome.digest, outcome.total_bytes, outcome.total_chunks, outcome.elapsed
    );
    Ok(())
}

async fn poll(config: &UplinkConfig, url: &str, cancel: CancellationToken) -> Result<()> {
    let url = if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("{}{}", config.base_url.trim_end_matches('/'), url)
    };
    let source = HttpStatusSource::new(&url, config.request_timeout())?;

    let reporter = ProgressReporter::new();
    let _progress = reporter.subscribe(|event| {
        eprintln!("{:>3}%  {}", event.percent, event.message);
    });

    StatusPoller::from_config(config)
        .with_reporter(reporter)
        .run(&source, &cancel)
        .await?;
    println!("device task finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_flags_override_config() {
        let mut config = UplinkConfig::default();
        apply_upload_flags(&mut config, Some(65_536), None, Some(3), Some(90));

        assert_eq!(config.chunk_size, 65_536);
        assert_eq!(config.hash_window, UplinkConfig::default().hash_window);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.session_timeout_ms, Some(90_000));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_huge_session_timeout_saturates() {
        let cli = Cli::try_parse_from([
            "uplink",
            "upload",
            "fw.img",
            "--session-timeout-secs",
            "18446744073709551615",
        ])
        .unwrap();
        let Command::Upload {
            session_timeout_secs,
            ..
        } = cli.command
        else {
            panic!("expected the upload subcommand");
        };

        let mut config = UplinkConfig::default();
        apply_upload_flags(&mut config, None, None, None, session_timeout_secs);
        assert_eq!(config.session_timeout_ms, Some(u64::MAX));
    }
}
