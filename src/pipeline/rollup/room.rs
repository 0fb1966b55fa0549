use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use tracing::debug;

use super::{RollupError, RollupReport};
use crate::domain::{previous_month, RoomDaily, RoomId, RoomMonthly};
use crate::repo::{SummaryBatch, TelemetryStore};

/// Daily and monthly consumption rollups per room, fed by the fanned-in
/// room readings.
#[derive(Default)]
pub struct RoomRollup;

impl RoomRollup {
    pub async fn run(
        &self,
        store: &dyn TelemetryStore,
        today: NaiveDate,
    ) -> Result<RollupReport, RollupError> {
        let yesterday = today.pred_opt().ok_or(RollupError::InvalidWindow(today))?;
        let rooms = store.rooms().await?;
        let mut report = RollupReport::for_date(yesterday);
        let mut batch = SummaryBatch::default();

        for room in &rooms {
            match store.sum_room_energy_on(room.id, yesterday).await? {
                Some(total_kwh) => {
                    batch.room_dailies.push(RoomDaily { room_id: room.id, date: yesterday, total_kwh })
                }
                None => {
                    debug!(room = %room.name, date = %yesterday, "no readings, skipping daily");
                    report.entities_skipped += 1;
                }
            }
        }
        report.daily_written = batch.room_dailies.len();

        if let Some(span) = previous_month(today) {
            // Yesterday's total is staged, not stored; overlay it so the
            // month sees its own final day.
            let staged: HashMap<RoomId, f64> =
                batch.room_dailies.iter().map(|d| (d.room_id, d.total_kwh)).collect();
            for room in &rooms {
                let mut dailies =
                    store.room_dailies_between(room.id, span.first, span.last).await?;
                if let Some(&fresh) = staged.get(&room.id) {
                    match dailies.iter_mut().find(|d| d.date == span.last) {
                        Some(slot) => slot.total_kwh = fresh,
                        None => dailies.push(RoomDaily {
                            room_id: room.id,
                            date: span.last,
                            total_kwh: fresh,
                        }),
                    }
                }
                if dailies.is_empty() {
                    continue;
                }
                let daily_totals: BTreeMap<NaiveDate, f64> =
                    dailies.iter().map(|d| (d.date, d.total_kwh)).collect();
                batch.room_monthlies.push(RoomMonthly {
                    room_id: room.id,
                    year: span.year,
                    month: span.month,
                    total_kwh: daily_totals.values().sum(),
                    daily_totals,
                });
            }
            report.monthly_written = batch.room_monthlies.len();
        }

        if !batch.is_empty() {
            store.apply(batch).await?;
        }
        Ok(report)
    }
}
