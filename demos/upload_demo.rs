use chunkstream_uplink::chunk::ChunkUploader;
use chunkstream_uplink::coordinator::UploadCoordinator;
use chunkstream_uplink::device::{DeviceSimulator, FaultPlan};
use chunkstream_uplink::integrity::HashAccumulator;
use chunkstream_uplink::remote::HttpRemote;
use chunkstream_uplink::session::{UploadPhase, UploadTarget};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("═══════════════════════════════════════════════════════════");
    println!("  Uplink Demo: chunked upload with MD5 verification");
    println!("═══════════════════════════════════════════════════════════\n");

    // Local device on an ephemeral port
    let simulator = DeviceSimulator::new();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let base_url = format!("http://{}", listener.local_addr()?);
    tokio::spawn(simulator.clone().serve(listener));
    println!("📡 Device simulator at {base_url}\n");

    let dir = TempDir::new()?;
    let path = dir.path().join("firmware.img");
    let data: Vec<u8> = (0..1_500_000u32).map(|i| (i % 253) as u8).collect();
    tokio::fs::write(&path, &data).await?;
    println!("📄 Test file: {} ({} bytes)\n", path.display(), data.len());

    let coordinator = || -> Result<UploadCoordinator, Box<dyn std::error::Error>> {
        let remote = HttpRemote::new(&base_url, UploadTarget::Firmware, Duration::from_secs(10))?;
        Ok(UploadCoordinator::new(
            Arc::new(remote),
            HashAccumulator::new(2 * 1024 * 1024)?,
            ChunkUploader::new(512 * 1024)?,
        ))
    };

    // Demo 1: clean upload
    println!("📤 Demo 1: Upload");
    println!("----------------------------------");
    let uploader = coordinator()?;
    let progress = uploader.reporter().subscribe(|event| {
        if matches!(event.phase, UploadPhase::Hashing | UploadPhase::Transferring) {
            println!("   {:<12} {:>3}%", event.phase.label(), event.percent);
        }
    });
    let outcome = uploader.upload(&path).await?;
    progress.unsubscribe();
    println!("   ✓ Session:  {}", outcome.session_id);
    println!("   ✓ MD5:      {}", outcome.digest);
    println!("   ✓ Chunks:   {}", outcome.total_chunks);
    println!("   ✓ Device has {} verified file(s)\n", simulator.received().len());

    // Demo 2: device reports a digest mismatch
    println!("🔒 Demo 2: Verification failure");
    println!("----------------------------------");
    simulator.set_faults(FaultPlan {
        force_mismatch: true,
        ..Default::default()
    });
    match coordinator()?.upload(&path).await {
        Ok(_) => println!("   ✗ Unexpected success"),
        Err(e) => println!("   ✓ {e}"),
    }

    // Demo 3: a chunk fails mid-transfer
    println!("\n🌐 Demo 3: Transfer failure on chunk 2");
    println!("----------------------------------");
    simulator.set_faults(FaultPlan {
        fail_chunk: Some(1),
        ..Default::default()
    });
    match coordinator()?.upload(&path).await {
        Ok(_) => println!("   ✗ Unexpected success"),
        Err(e) => println!("   ✓ {e}"),
    }

    println!("\n✅ Demo complete");
    Ok(())
}
