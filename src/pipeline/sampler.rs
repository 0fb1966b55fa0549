use std::sync::Arc;

use chrono::{DateTime, Timelike, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use tracing::{debug, warn};

use super::fanin::{fan_in, FanInReport};
use crate::config::{GenerationConfig, SamplingConfig};
use crate::domain::{energy_kwh, minute_floor, DeviceReading, GenerationReading};
use crate::repo::{StoreError, TelemetryStore};

/// Counters for one sampling pass.
#[derive(Debug, Clone)]
pub struct SamplePass {
    pub timestamp: DateTime<Utc>,
    pub device_readings: usize,
    pub generation_readings: usize,
    pub skipped: usize,
    pub already_sampled: usize,
    pub fan_in: FanInReport,
}

/// Emits one consumption reading per unlocked device and one generation
/// reading per home for each minute boundary, then fans the device
/// readings in to room level.
pub struct Sampler {
    store: Arc<dyn TelemetryStore>,
    sampling: SamplingConfig,
    generation: GenerationConfig,
    rng: Mutex<StdRng>,
}

impl Sampler {
    pub fn new(
        store: Arc<dyn TelemetryStore>,
        sampling: SamplingConfig,
        generation: GenerationConfig,
    ) -> Self {
        Self { store, sampling, generation, rng: Mutex::new(StdRng::from_entropy()) }
    }

    /// Deterministic variant for tests.
    pub fn seeded(
        store: Arc<dyn TelemetryStore>,
        sampling: SamplingConfig,
        generation: GenerationConfig,
        seed: u64,
    ) -> Self {
        Self { store, sampling, generation, rng: Mutex::new(StdRng::seed_from_u64(seed)) }
    }

    /// Samples every home and device for the minute containing `at`.
    ///
    /// A device that was already sampled for this minute is counted and
    /// left alone, so replaying a minute never duplicates rows. Devices
    /// without a consumption rate are skipped with a warning and do not
    /// fail the pass.
    pub async fn run(&self, at: DateTime<Utc>) -> Result<SamplePass, StoreError> {
        let at = minute_floor(at);
        let interval_secs = self.sampling.interval_seconds as i64;

        let mut device_readings = 0usize;
        let mut generation_readings = 0usize;
        let mut skipped = 0usize;
        let mut already_sampled = 0usize;

        for device in self.store.devices().await? {
            if !device.is_unlocked {
                continue;
            }
            let Some(rate_w) = device.consumption_rate_w else {
                warn!(device = %device.name, "device has no consumption rate, skipping sample");
                skipped += 1;
                continue;
            };
            let draw_w = if device.is_on { rate_w } else { self.idle_draw_w() };
            let reading = DeviceReading {
                device_id: device.id,
                timestamp: at,
                energy_kwh: energy_kwh(draw_w, interval_secs),
                is_on: device.is_on,
            };
            match self.store.insert_device_reading(reading).await {
                Ok(()) => device_readings += 1,
                Err(StoreError::Duplicate(_)) => {
                    debug!(device = %device.name, timestamp = %at, "minute already sampled");
                    already_sampled += 1;
                }
                Err(e) => return Err(e),
            }
        }

        for home in self.store.homes().await? {
            let reading = GenerationReading {
                home_id: home.id,
                timestamp: at,
                energy_kwh: self.generation_kwh(at),
            };
            match self.store.insert_generation_reading(reading).await {
                Ok(()) => generation_readings += 1,
                Err(StoreError::Duplicate(_)) => {
                    debug!(home = %home.name, timestamp = %at, "minute already sampled");
                    already_sampled += 1;
                }
                Err(e) => return Err(e),
            }
        }

        let fan_in = fan_in(self.store.as_ref(), Some(at)).await?;
        Ok(SamplePass {
            timestamp: at,
            device_readings,
            generation_readings,
            skipped,
            already_sampled,
            fan_in,
        })
    }

    /// Residual draw for a device that is switched off.
    fn idle_draw_w(&self) -> f64 {
        self.rng
            .lock()
            .gen_range(self.sampling.idle_draw_min_w..=self.sampling.idle_draw_max_w)
    }

    /// Momentary renewable output as kWh for one interval. A sine
    /// envelope between sunrise and sunset plus gaussian noise, clamped
    /// to [0, peak].
    fn generation_kwh(&self, at: DateTime<Utc>) -> f64 {
        let g = &self.generation;
        let hour = at.hour() as f64 + at.minute() as f64 / 60.0;
        let sunrise = g.sunrise_hour as f64;
        let sunset = g.sunset_hour as f64;
        if sunset <= sunrise || hour < sunrise || hour >= sunset {
            return 0.0;
        }
        let day_fraction = (hour - sunrise) / (sunset - sunrise);
        let envelope = (std::f64::consts::PI * day_fraction).sin();
        let noise = match Normal::new(0.0, g.noise_kw) {
            Ok(dist) => dist.sample(&mut *self.rng.lock()),
            Err(_) => 0.0,
        };
        let kw = (g.peak_kw * envelope + noise).clamp(0.0, g.peak_kw);
        energy_kwh(kw * 1_000.0, self.sampling.interval_seconds as i64)
    }
}
