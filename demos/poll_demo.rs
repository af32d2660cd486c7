use chunkstream_uplink::device::{DeviceSimulator, TASK_STATUS_PATH};
use chunkstream_uplink::poll::{HttpStatusSource, StatusPoller};
use chunkstream_uplink::progress::ProgressReporter;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("═══════════════════════════════════════════════════════════");
    println!("  Uplink Demo: following a device-side conversion task");
    println!("═══════════════════════════════════════════════════════════\n");

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let url = format!("http://{}{}", listener.local_addr()?, TASK_STATUS_PATH);
    tokio::spawn(DeviceSimulator::new().serve(listener));
    println!("📡 Polling {url}\n");

    let reporter = ProgressReporter::new();
    let _progress = reporter.subscribe(|event| {
        println!("   {:>3}%  {}", event.percent, event.message);
    });

    let source = HttpStatusSource::new(&url, Duration::from_secs(5))?;
    StatusPoller::new(Duration::from_millis(500))
        .with_reporter(reporter)
        .run(&source, &CancellationToken::new())
        .await?;

    println!("\n✅ Task finished");
    Ok(())
}
