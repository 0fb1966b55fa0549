use std::collections::HashMap;

use chrono::{DateTime, Utc};
use itertools::Itertools;
use tracing::debug;

use crate::domain::{last_completed_minute, minute_floor, DeviceId, RoomId, RoomReading};
use crate::repo::{StoreError, SummaryBatch, TelemetryStore};

/// Counters for one fan-in invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanInReport {
    pub readings_seen: usize,
    pub readings_orphaned: usize,
    pub rooms_written: usize,
    pub rooms_already_present: usize,
}

/// Folds the device readings stamped at one minute into one reading per
/// room, summing their energy. Rooms that already have a reading for the
/// minute are left untouched, so replays are no-ops. Readings from
/// devices without a room are excluded from every room total.
///
/// Passing `None` targets the most recently completed minute.
pub async fn fan_in(
    store: &dyn TelemetryStore,
    at: Option<DateTime<Utc>>,
) -> Result<FanInReport, StoreError> {
    let at = match at {
        Some(ts) => minute_floor(ts),
        None => last_completed_minute(Utc::now()),
    };

    let readings = store.device_readings_at(at).await?;
    let mut report = FanInReport { readings_seen: readings.len(), ..Default::default() };
    if readings.is_empty() {
        debug!(timestamp = %at, "no device readings to fan in");
        return Ok(report);
    }

    let room_of: HashMap<DeviceId, RoomId> = store
        .devices()
        .await?
        .into_iter()
        .filter_map(|d| d.room_id.map(|room| (d.id, room)))
        .collect();

    let mut orphaned = 0usize;
    let grouped: HashMap<RoomId, Vec<f64>> = readings
        .into_iter()
        .filter_map(|r| match room_of.get(&r.device_id) {
            Some(room) => Some((*room, r.energy_kwh)),
            None => {
                orphaned += 1;
                None
            }
        })
        .into_group_map();
    report.readings_orphaned = orphaned;

    let mut batch = SummaryBatch::default();
    for (room_id, energies) in grouped {
        if store.room_reading_exists(room_id, at).await? {
            report.rooms_already_present += 1;
            continue;
        }
        batch.room_readings.push(RoomReading {
            room_id,
            timestamp: at,
            energy_kwh: energies.iter().sum(),
        });
    }

    report.rooms_written = batch.room_readings.len();
    if !batch.is_empty() {
        store.apply(batch).await?;
    }
    Ok(report)
}
