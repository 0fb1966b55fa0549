use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::entities::{DeviceId, HomeId, RoomId};

/// Seconds in a civil day, used for whole-day averages.
pub const DAY_SECS: i64 = 86_400;

/// Converts a power draw in watts over an interval to energy in kWh.
pub fn energy_kwh(rate_w: f64, interval_secs: i64) -> f64 {
    rate_w * interval_secs as f64 / 3_600.0 / 1_000.0
}

/// One per-minute consumption sample for a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceReading {
    pub device_id: DeviceId,
    pub timestamp: DateTime<Utc>,
    pub energy_kwh: f64,
    pub is_on: bool,
}

/// One per-minute consumption sample for a room, fanned in from the
/// device readings that share its timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomReading {
    pub room_id: RoomId,
    pub timestamp: DateTime<Utc>,
    pub energy_kwh: f64,
}

/// One per-minute renewable generation sample for a home.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationReading {
    pub home_id: HomeId,
    pub timestamp: DateTime<Utc>,
    pub energy_kwh: f64,
}

/// Energy attributed to one power status (on or off) across a day.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StatusSlice {
    pub duration_secs: i64,
    pub energy_kwh: f64,
    pub avg_kwh_per_sec: f64,
}

impl StatusSlice {
    /// Builds a slice from a sample count and its summed energy. A slice
    /// with no samples has zero duration and must not divide by it.
    pub fn from_samples(count: usize, energy_kwh: f64, interval_secs: i64) -> Self {
        let duration_secs = count as i64 * interval_secs;
        let avg_kwh_per_sec = if duration_secs > 0 {
            energy_kwh / duration_secs as f64
        } else {
            0.0
        };
        Self { duration_secs, energy_kwh, avg_kwh_per_sec }
    }
}

/// Per-status breakdown attached to a device's daily summary.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StatusBreakdown {
    pub avg_kwh_per_sec: f64,
    pub uptime: StatusSlice,
    pub downtime: StatusSlice,
}

/// Daily consumption summary for a device, recomputed wholesale on
/// every rollup pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDaily {
    pub device_id: DeviceId,
    pub date: NaiveDate,
    pub total_kwh: f64,
    pub breakdown: StatusBreakdown,
}

/// Daily consumption summary for a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomDaily {
    pub room_id: RoomId,
    pub date: NaiveDate,
    pub total_kwh: f64,
}

/// Daily generation summary for a home.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationDaily {
    pub home_id: HomeId,
    pub date: NaiveDate,
    pub total_kwh: f64,
}

/// One day's contribution inside a device's monthly breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DayEntry {
    pub total_kwh: f64,
    pub uptime_kwh: f64,
    pub downtime_kwh: f64,
}

/// Per-day map plus month totals and per-day averages for a device.
/// Averages divide by the number of days that actually contributed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MonthlyBreakdown {
    pub days: BTreeMap<NaiveDate, DayEntry>,
    pub uptime_kwh: f64,
    pub downtime_kwh: f64,
    pub avg_daily_kwh: f64,
    pub avg_daily_uptime_kwh: f64,
    pub avg_daily_downtime_kwh: f64,
}

/// Monthly consumption summary for a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceMonthly {
    pub device_id: DeviceId,
    pub year: i32,
    pub month: u32,
    pub total_kwh: f64,
    pub breakdown: MonthlyBreakdown,
}

/// Monthly consumption summary for a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomMonthly {
    pub room_id: RoomId,
    pub year: i32,
    pub month: u32,
    pub total_kwh: f64,
    pub daily_totals: BTreeMap<NaiveDate, f64>,
}

/// Monthly generation summary for a home.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationMonthly {
    pub home_id: HomeId,
    pub year: i32,
    pub month: u32,
    pub total_kwh: f64,
    pub daily_totals: BTreeMap<NaiveDate, f64>,
}
