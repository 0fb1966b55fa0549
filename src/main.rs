use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use home_energy_monitor::bridge::{DeviceWriter, HomeIoClient, StateBridge};
use home_energy_monitor::config::Config;
use home_energy_monitor::jobs::JobScheduler;
use home_energy_monitor::repo::{MemoryStore, TelemetryStore};
use home_energy_monitor::{layout, telemetry};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let cfg = Config::load()?;
    let _log_guard = telemetry::init_tracing(&cfg.log);

    if cfg.sampling.interval_seconds == 0 {
        anyhow::bail!("CONFIG ERROR: sampling.interval_seconds must be at least 1");
    }
    if cfg.sampling.idle_draw_min_w > cfg.sampling.idle_draw_max_w {
        anyhow::bail!(
            "CONFIG ERROR: sampling.idle_draw_min_w ({}) exceeds idle_draw_max_w ({})",
            cfg.sampling.idle_draw_min_w,
            cfg.sampling.idle_draw_max_w
        );
    }

    let store: Arc<dyn TelemetryStore> = Arc::new(MemoryStore::new());

    let client = Arc::new(HomeIoClient::new(
        cfg.simulator.base_url.clone(),
        Duration::from_secs(cfg.simulator.http_timeout_seconds),
    )?);
    let writer =
        DeviceWriter::new(store.clone()).with_hook(Arc::new(StateBridge::new(client)));

    if store.homes().await?.is_empty() {
        let template = layout::load(Path::new(&cfg.layout.path))?;
        for i in 1..=cfg.layout.homes {
            layout::provision_home(
                store.as_ref(),
                &writer,
                &template,
                &format!("Home {i}"),
                cfg.layout.start_unlocked,
            )
            .await?;
        }
    }

    info!(
        homes = cfg.layout.homes,
        simulator = %cfg.simulator.base_url,
        "starting Home Energy Monitor"
    );

    let scheduler = Arc::new(JobScheduler::new(store, &cfg));
    let tracker = TaskTracker::new();
    let shutdown = CancellationToken::new();
    scheduler.spawn(&tracker, shutdown.clone());
    tracker.close();

    telemetry::shutdown_signal().await;
    shutdown.cancel();
    tracker.wait().await;

    warn!("shutdown complete");
    Ok(())
}
