use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use strum_macros::Display;
use tokio::sync::RwLock;
use tokio::time::{interval_at, sleep, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::domain::minute_floor;
use crate::pipeline::{DeviceRollup, GenerationRollup, RoomRollup, Sampler};
use crate::repo::TelemetryStore;

/// Every recurring job the daemon runs, by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum JobKind {
    Sample,
    DeviceRollup,
    RoomRollup,
    GenerationRollup,
}

/// Job status tracking.
#[derive(Debug, Clone, Default)]
pub struct JobStatus {
    pub last_run: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub run_count: u64,
    pub success_count: u64,
    pub error_count: u64,
}

/// Keeps one invocation per (job, period) in flight at a time. Dropping
/// the guard releases the slot.
#[derive(Default)]
pub struct SingleFlight {
    inflight: Mutex<HashSet<(JobKind, String)>>,
}

pub struct FlightGuard<'a> {
    flights: &'a SingleFlight,
    key: (JobKind, String),
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the (job, period) slot, or `None` when an invocation for
    /// it is already running.
    pub fn begin(&self, kind: JobKind, period: &str) -> Option<FlightGuard<'_>> {
        let mut inflight = self.inflight.lock();
        if !inflight.insert((kind, period.to_string())) {
            return None;
        }
        Some(FlightGuard { flights: self, key: (kind, period.to_string()) })
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.flights.inflight.lock().remove(&self.key);
    }
}

/// Owns the recurring jobs: the per-minute sampling pass and the nightly
/// rollup pass over all three tiers.
pub struct JobScheduler {
    store: Arc<dyn TelemetryStore>,
    sampler: Sampler,
    device_rollup: DeviceRollup,
    room_rollup: RoomRollup,
    generation_rollup: GenerationRollup,
    sample_interval_secs: u64,
    rollup_delay_secs: u64,
    flights: SingleFlight,
    sample_status: Arc<RwLock<JobStatus>>,
    device_status: Arc<RwLock<JobStatus>>,
    room_status: Arc<RwLock<JobStatus>>,
    generation_status: Arc<RwLock<JobStatus>>,
}

impl JobScheduler {
    pub fn new(store: Arc<dyn TelemetryStore>, config: &Config) -> Self {
        let sampler =
            Sampler::new(store.clone(), config.sampling.clone(), config.generation.clone());
        Self {
            sampler,
            device_rollup: DeviceRollup::new(config.sampling.interval_seconds as i64),
            room_rollup: RoomRollup,
            generation_rollup: GenerationRollup,
            store,
            sample_interval_secs: config.sampling.interval_seconds,
            rollup_delay_secs: config.rollup.delay_seconds,
            flights: SingleFlight::new(),
            sample_status: Arc::new(RwLock::new(JobStatus::default())),
            device_status: Arc::new(RwLock::new(JobStatus::default())),
            room_status: Arc::new(RwLock::new(JobStatus::default())),
            generation_status: Arc::new(RwLock::new(JobStatus::default())),
        }
    }

    /// Starts both job loops on the tracker. They run until the token is
    /// cancelled.
    pub fn spawn(self: Arc<Self>, tracker: &TaskTracker, shutdown: CancellationToken) {
        let scheduler = self.clone();
        let token = shutdown.clone();
        tracker.spawn(async move {
            scheduler.run_sample_loop(token).await;
        });

        let scheduler = self;
        tracker.spawn(async move {
            scheduler.run_rollup_loop(shutdown).await;
        });

        info!("telemetry jobs started");
    }

    /// Fires a sampling pass on every minute boundary.
    async fn run_sample_loop(&self, shutdown: CancellationToken) {
        let now = Utc::now();
        let next_minute = minute_floor(now) + chrono::Duration::minutes(1);
        let until_boundary = (next_minute - now).to_std().unwrap_or(Duration::from_secs(1));
        let mut ticker = interval_at(
            Instant::now() + until_boundary,
            Duration::from_secs(self.sample_interval_secs),
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("sampling loop stopped");
                    break;
                }
                _ = ticker.tick() => self.sample_once(Utc::now()).await,
            }
        }
    }

    async fn sample_once(&self, now: DateTime<Utc>) {
        let at = minute_floor(now);
        let period = at.format("%Y-%m-%dT%H:%M").to_string();
        let Some(_flight) = self.flights.begin(JobKind::Sample, &period) else {
            warn!(%period, "sample pass already in flight, skipping");
            return;
        };

        let mut status = self.sample_status.write().await;
        status.last_run = Some(now);
        status.run_count += 1;
        drop(status);

        match self.sampler.run(at).await {
            Ok(pass) => {
                let mut status = self.sample_status.write().await;
                status.last_success = Some(now);
                status.success_count += 1;
                status.last_error = None;
                info!(
                    timestamp = %pass.timestamp,
                    devices = pass.device_readings,
                    homes = pass.generation_readings,
                    rooms = pass.fan_in.rooms_written,
                    skipped = pass.skipped,
                    "sampling pass complete"
                );
            }
            Err(e) => {
                let mut status = self.sample_status.write().await;
                status.error_count += 1;
                status.last_error = Some(e.to_string());
                error!(error = %e, "sampling pass failed");
            }
        }
    }

    /// Sleeps until shortly after each midnight, then rolls up the day
    /// that just ended.
    async fn run_rollup_loop(&self, shutdown: CancellationToken) {
        loop {
            let now = Utc::now();
            let next = next_rollup_time(now, self.rollup_delay_secs);
            let wait = (next - now).to_std().unwrap_or(Duration::from_secs(1));
            info!(next = %next.format("%Y-%m-%d %H:%M:%S"), "next rollup pass scheduled");

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("rollup loop stopped");
                    break;
                }
                _ = sleep(wait) => self.rollup_once(Utc::now().date_naive()).await,
            }
        }
    }

    /// Runs the three rollup tiers for `today`. Each tier is its own
    /// job: one tier failing is logged and does not stop the others.
    async fn rollup_once(&self, today: NaiveDate) {
        let period = today.to_string();
        let now = Utc::now();

        if let Some(_flight) = self.flights.begin(JobKind::DeviceRollup, &period) {
            let mut status = self.device_status.write().await;
            status.last_run = Some(now);
            status.run_count += 1;
            drop(status);

            match self.device_rollup.run(self.store.as_ref(), today).await {
                Ok(report) => {
                    let mut status = self.device_status.write().await;
                    status.last_success = Some(now);
                    status.success_count += 1;
                    status.last_error = None;
                    info!(
                        date = %report.date,
                        daily = report.daily_written,
                        monthly = report.monthly_written,
                        skipped = report.entities_skipped,
                        "device rollup complete"
                    );
                }
                Err(e) => {
                    let mut status = self.device_status.write().await;
                    status.error_count += 1;
                    status.last_error = Some(e.to_string());
                    error!(error = %e, "device rollup failed");
                }
            }
        } else {
            warn!(%period, job = %JobKind::DeviceRollup, "rollup already in flight, skipping");
        }

        if let Some(_flight) = self.flights.begin(JobKind::RoomRollup, &period) {
            let mut status = self.room_status.write().await;
            status.last_run = Some(now);
            status.run_count += 1;
            drop(status);

            match self.room_rollup.run(self.store.as_ref(), today).await {
                Ok(report) => {
                    let mut status = self.room_status.write().await;
                    status.last_success = Some(now);
                    status.success_count += 1;
                    status.last_error = None;
                    info!(
                        date = %report.date,
                        daily = report.daily_written,
                        monthly = report.monthly_written,
                        "room rollup complete"
                    );
                }
                Err(e) => {
                    let mut status = self.room_status.write().await;
                    status.error_count += 1;
                    status.last_error = Some(e.to_string());
                    error!(error = %e, "room rollup failed");
                }
            }
        } else {
            warn!(%period, job = %JobKind::RoomRollup, "rollup already in flight, skipping");
        }

        if let Some(_flight) = self.flights.begin(JobKind::GenerationRollup, &period) {
            let mut status = self.generation_status.write().await;
            status.last_run = Some(now);
            status.run_count += 1;
            drop(status);

            match self.generation_rollup.run(self.store.as_ref(), today).await {
                Ok(report) => {
                    let mut status = self.generation_status.write().await;
                    status.last_success = Some(now);
                    status.success_count += 1;
                    status.last_error = None;
                    info!(
                        date = %report.date,
                        daily = report.daily_written,
                        monthly = report.monthly_written,
                        "generation rollup complete"
                    );
                }
                Err(e) => {
                    let mut status = self.generation_status.write().await;
                    status.error_count += 1;
                    status.last_error = Some(e.to_string());
                    error!(error = %e, "generation rollup failed");
                }
            }
        } else {
            warn!(%period, job = %JobKind::GenerationRollup, "rollup already in flight, skipping");
        }
    }

    pub async fn get_sample_status(&self) -> JobStatus {
        self.sample_status.read().await.clone()
    }

    pub async fn get_device_rollup_status(&self) -> JobStatus {
        self.device_status.read().await.clone()
    }

    pub async fn get_room_rollup_status(&self) -> JobStatus {
        self.room_status.read().await.clone()
    }

    pub async fn get_generation_rollup_status(&self) -> JobStatus {
        self.generation_status.read().await.clone()
    }
}

/// The next instant the rollup pass should fire: today's midnight plus
/// the settle delay if that is still ahead, otherwise tomorrow's.
fn next_rollup_time(now: DateTime<Utc>, delay_secs: u64) -> DateTime<Utc> {
    let midnight = now.date_naive().and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
    let today_run = midnight + chrono::Duration::seconds(delay_secs as i64);
    if today_run > now {
        today_run
    } else {
        today_run + chrono::Duration::days(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        GenerationConfig, LayoutConfig, LogConfig, RollupConfig, SamplingConfig, SimulatorConfig,
    };
    use crate::domain::{Device, DeviceCategory, DeviceReading, Home, Room};
    use crate::repo::MemoryStore;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn test_config() -> Config {
        Config {
            sampling: SamplingConfig {
                interval_seconds: 60,
                idle_draw_min_w: 1.0,
                idle_draw_max_w: 2.0,
            },
            generation: GenerationConfig {
                peak_kw: 4.0,
                noise_kw: 0.0,
                sunrise_hour: 6,
                sunset_hour: 20,
            },
            rollup: RollupConfig { delay_seconds: 45 },
            simulator: SimulatorConfig {
                base_url: "http://localhost:9797".into(),
                http_timeout_seconds: 2,
            },
            layout: LayoutConfig { path: "config/layout.json".into(), homes: 1, start_unlocked: true },
            log: LogConfig::default(),
        }
    }

    #[test]
    fn single_flight_admits_one_invocation_per_period() {
        let flights = SingleFlight::new();
        let first = flights.begin(JobKind::Sample, "2026-05-10T09:00");
        assert!(first.is_some());
        assert!(flights.begin(JobKind::Sample, "2026-05-10T09:00").is_none());
        // A different period or job is its own slot.
        assert!(flights.begin(JobKind::Sample, "2026-05-10T09:01").is_some());
        assert!(flights.begin(JobKind::DeviceRollup, "2026-05-10T09:00").is_some());

        drop(first);
        assert!(flights.begin(JobKind::Sample, "2026-05-10T09:00").is_some());
    }

    #[test]
    fn next_rollup_time_respects_the_delay() {
        let delay = 45u64;
        let early = Utc.with_ymd_and_hms(2026, 5, 10, 0, 0, 10).unwrap();
        assert_eq!(
            next_rollup_time(early, delay),
            Utc.with_ymd_and_hms(2026, 5, 10, 0, 0, 45).unwrap()
        );

        let late = Utc.with_ymd_and_hms(2026, 5, 10, 13, 0, 0).unwrap();
        assert_eq!(
            next_rollup_time(late, delay),
            Utc.with_ymd_and_hms(2026, 5, 11, 0, 0, 45).unwrap()
        );
    }

    #[tokio::test]
    async fn rollup_once_runs_all_three_tiers() {
        let store = Arc::new(MemoryStore::new());
        let home = Home { id: Uuid::new_v4(), name: "Home 1".into() };
        store.insert_home(home.clone()).await.unwrap();
        let room = Room {
            id: Uuid::new_v4(),
            home_id: home.id,
            name: "Living Room".into(),
            zone: "A".into(),
            is_unlocked: true,
        };
        store.insert_room(room.clone()).await.unwrap();
        let device = Device {
            id: Uuid::new_v4(),
            room_id: Some(room.id),
            name: "Lamp".into(),
            category: DeviceCategory::Lighting,
            number: Some(1),
            zone: "A".into(),
            is_unlocked: true,
            is_on: true,
            analogue_value: None,
            consumption_rate_w: Some(60.0),
        };
        store.insert_device(device.clone()).await.unwrap();

        let yesterday_noon = Utc.with_ymd_and_hms(2026, 5, 9, 12, 0, 0).unwrap();
        store
            .insert_device_reading(DeviceReading {
                device_id: device.id,
                timestamp: yesterday_noon,
                energy_kwh: 0.001,
                is_on: true,
            })
            .await
            .unwrap();
        crate::pipeline::fan_in(store.as_ref(), Some(yesterday_noon)).await.unwrap();

        let scheduler = JobScheduler::new(store.clone(), &test_config());
        let today = NaiveDate::from_ymd_opt(2026, 5, 10).unwrap();
        scheduler.rollup_once(today).await;

        let yesterday = NaiveDate::from_ymd_opt(2026, 5, 9).unwrap();
        assert!(store.device_daily(device.id, yesterday).await.unwrap().is_some());
        assert!(store.room_daily(room.id, yesterday).await.unwrap().is_some());
        // No generation readings were seeded, so that tier skipped the
        // home but still ran.
        assert!(store.generation_daily(home.id, yesterday).await.unwrap().is_none());

        assert_eq!(scheduler.get_device_rollup_status().await.success_count, 1);
        assert_eq!(scheduler.get_room_rollup_status().await.success_count, 1);
        assert_eq!(scheduler.get_generation_rollup_status().await.success_count, 1);
    }

    #[tokio::test]
    async fn sample_once_records_status() {
        let store = Arc::new(MemoryStore::new());
        let home = Home { id: Uuid::new_v4(), name: "Home 1".into() };
        store.insert_home(home).await.unwrap();

        let scheduler = JobScheduler::new(store.clone(), &test_config());
        let now = Utc.with_ymd_and_hms(2026, 5, 10, 9, 0, 30).unwrap();
        scheduler.sample_once(now).await;

        let status = scheduler.get_sample_status().await;
        assert_eq!(status.run_count, 1);
        assert_eq!(status.success_count, 1);
        assert!(status.last_error.is_none());
    }
}
