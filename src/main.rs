use std::sync::Arc;

use tracing::info;

use hostelres::config::Config;
use hostelres::directory::StaticRoomDirectory;
use hostelres::hostel::HostelManager;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    hostelres::observability::init(config.metrics_port)?;

    std::fs::create_dir_all(&config.data_dir)?;

    let directory = match &config.rooms_file {
        Some(path) => StaticRoomDirectory::load(path)?,
        None => StaticRoomDirectory::default(),
    };
    info!("room catalog: {} rooms", directory.len());

    let manager = HostelManager::new(
        config.data_dir.clone(),
        config.compact_threshold,
        config.report_interval,
        Arc::new(directory),
    );

    let mut hostels = manager.discover()?;
    hostels.extend(config.hostels.iter().cloned());
    for hostel in &hostels {
        manager.get_or_create(hostel)?;
    }

    info!("hostelres running");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  hostels: {}", manager.hostels().join(", "));
    info!("  compact_threshold: {}", config.compact_threshold);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await?;
    }

    info!("shutdown signal received");
    for hostel in manager.hostels() {
        let engine = manager.get_or_create(&hostel)?;
        if let Err(e) = engine.compact_wal().await {
            tracing::warn!("final compaction failed for hostel {hostel}: {e}");
        }
    }
    info!("hostelres stopped");
    Ok(())
}
