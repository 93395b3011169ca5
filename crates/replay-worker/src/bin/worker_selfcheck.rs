use std::path::Path;
use std::process::Command;

use anyhow::Context;

use replay_media::{
    check_ffmpeg, remove_if_exists, temp_sibling, write_thumbnail, ArtifactFormat,
    EncoderCapabilities, ExportRoot, Rasterizer,
};
use replay_models::Snapshot;
use replay_queue::JobQueue;
use replay_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();

    println!(
        "worker-selfcheck: starting with export_root={}",
        config.export_root.display()
    );
    let root = ensure_export_root(&config.export_root).await?;
    ensure_ffmpeg(&config.ffmpeg_bin)?;
    report_capabilities(&config).await;
    ensure_render(&root).await?;
    ensure_redis().await?;

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_export_root(path: &Path) -> anyhow::Result<ExportRoot> {
    let root = ExportRoot::new(path)
        .await
        .with_context(|| format!("export root {} unusable", path.display()))?;
    let probe = temp_sibling(&root.path().join("selfcheck"), "write");
    tokio::fs::write(&probe, b"ok")
        .await
        .with_context(|| format!("export root {} not writable", root.path().display()))?;
    remove_if_exists(&probe).await?;
    Ok(root)
}

fn ensure_ffmpeg(program: &str) -> anyhow::Result<()> {
    let path = check_ffmpeg(program)?;
    let output = Command::new(&path)
        .arg("-version")
        .output()
        .map_err(|e| anyhow::anyhow!("ffmpeg not available: {}", e))?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("ffmpeg -version failed: {:?}", output.status));
    }
    let version = String::from_utf8_lossy(&output.stdout);
    println!(
        "worker-selfcheck: {}",
        version.lines().next().unwrap_or("ffmpeg (unknown version)")
    );
    Ok(())
}

async fn report_capabilities(config: &WorkerConfig) {
    let caps = EncoderCapabilities::probe(&config.ffmpeg_bin).await;
    println!("worker-selfcheck: hardware encoders [{}]", caps.encoders.join(", "));
    println!("worker-selfcheck: hwaccels [{}]", caps.hwaccels.join(", "));
    match (config.hw_accel_enabled, caps.selected_hw_encoder()) {
        (true, Some(profile)) => println!("worker-selfcheck: will try {} first", profile.codec),
        (true, None) => println!("worker-selfcheck: hardware enabled but none usable, libx264 only"),
        (false, _) => println!("worker-selfcheck: hardware disabled, libx264 only"),
    }
}

/// Render one frame to a PNG inside the export root and remove it again.
async fn ensure_render(root: &ExportRoot) -> anyhow::Result<()> {
    let target = temp_sibling(&root.path().join("selfcheck.png"), "render");
    write_thumbnail(&Rasterizer::new(), &Snapshot::default(), &target).await?;
    let valid = ArtifactFormat::Png.is_valid(&target).await;
    remove_if_exists(&target).await?;
    if !valid {
        return Err(anyhow::anyhow!("rendered thumbnail is not a PNG"));
    }
    println!("worker-selfcheck: render ok");
    Ok(())
}

async fn ensure_redis() -> anyhow::Result<()> {
    let queue = JobQueue::from_env()?;
    queue
        .ping()
        .await
        .context("redis unreachable")?;
    println!("worker-selfcheck: redis ok");
    Ok(())
}
