use anyhow::{Context, Result};
use chunkstream_uplink::device::{DeviceSimulator, FaultPlan};
use chunkstream_uplink::session::UploadTarget;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "uplink-device-sim",
    about = "Local stand-in for the camera upload API"
)]
struct Args {
    #[arg(long, default_value = "127.0.0.1:8000")]
    bind: SocketAddr,

    /// Path the upload endpoints are mounted under
    #[arg(long, default_value = "/cgi-bin/entry.cgi")]
    prefix: String,

    /// Write verified files here
    #[arg(long, value_name = "DIR")]
    save_dir: Option<PathBuf>,

    /// Answer HTTP 500 for this chunk index
    #[arg(long)]
    fail_chunk: Option<u32>,

    /// Report an md5 mismatch on every finalize
    #[arg(long)]
    force_mismatch: bool,

    /// Leave the file-id out of begin replies
    #[arg(long)]
    omit_session_id: bool,

    /// End the conversion task with this error
    #[arg(long)]
    fail_task: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .init();

    let simulator = match &args.save_dir {
        Some(dir) => {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("creating {}", dir.display()))?;
            DeviceSimulator::with_save_dir(dir)
        }
        None => DeviceSimulator::new(),
    };
    simulator.set_faults(FaultPlan {
        fail_chunk: args.fail_chunk,
        force_mismatch: args.force_mismatch,
        omit_session_id: args.omit_session_id,
        fail_task: args.fail_task.clone(),
    });

    let prefix = args.prefix.trim_end_matches('/');
    let app = simulator.router_at(prefix);

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("binding {}", args.bind))?;
    let local = listener.local_addr()?;

    tracing::info!("Device simulator listening on http://{local}{prefix}");
    for target in UploadTarget::ALL {
        tracing::info!("  POST {prefix}{}  ({target})", target.endpoint());
    }
    if let Some(dir) = &args.save_dir {
        tracing::info!("Saving verified files to {}", dir.display());
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;
    Ok(())
}
