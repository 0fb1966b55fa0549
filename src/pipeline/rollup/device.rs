use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use tracing::debug;

use super::{RollupError, RollupReport};
use crate::domain::{
    previous_month, DayEntry, DeviceDaily, DeviceId, DeviceMonthly, DeviceReading,
    MonthSpan, MonthlyBreakdown, StatusBreakdown, StatusSlice, DAY_SECS,
};
use crate::repo::{SummaryBatch, TelemetryStore};

/// Daily and monthly consumption rollups per device.
pub struct DeviceRollup {
    interval_secs: i64,
}

impl DeviceRollup {
    pub fn new(interval_secs: i64) -> Self {
        Self { interval_secs }
    }

    /// Recomputes yesterday's summary for every device, plus last month's
    /// summaries when `today` is the first of a month. Everything this
    /// pass produces is applied as one batch, so a failure anywhere
    /// leaves the store untouched.
    pub async fn run(
        &self,
        store: &dyn TelemetryStore,
        today: NaiveDate,
    ) -> Result<RollupReport, RollupError> {
        let yesterday = today.pred_opt().ok_or(RollupError::InvalidWindow(today))?;
        let devices = store.devices().await?;
        let mut report = RollupReport::for_date(yesterday);
        let mut batch = SummaryBatch::default();

        for device in &devices {
            let readings = store.device_readings_on(device.id, yesterday).await?;
            if readings.is_empty() {
                debug!(device = %device.name, date = %yesterday, "no readings, skipping daily");
                report.entities_skipped += 1;
                continue;
            }
            batch.device_dailies.push(summarize_day(
                device.id,
                yesterday,
                &readings,
                self.interval_secs,
            ));
        }
        report.daily_written = batch.device_dailies.len();

        if let Some(span) = previous_month(today) {
            // The month always closes on yesterday, whose fresh summary is
            // still staged in the batch rather than stored. Overlay it on
            // what the store returns so the aggregate sees the final day.
            let staged: HashMap<DeviceId, DeviceDaily> = batch
                .device_dailies
                .iter()
                .map(|d| (d.device_id, d.clone()))
                .collect();
            for device in &devices {
                let mut dailies =
                    store.device_dailies_between(device.id, span.first, span.last).await?;
                if let Some(fresh) = staged.get(&device.id) {
                    match dailies.iter_mut().find(|d| d.date == fresh.date) {
                        Some(slot) => *slot = fresh.clone(),
                        None => dailies.push(fresh.clone()),
                    }
                }
                if dailies.is_empty() {
                    continue;
                }
                batch.device_monthlies.push(summarize_month(device.id, &span, &dailies));
            }
            report.monthly_written = batch.device_monthlies.len();
        }

        if !batch.is_empty() {
            store.apply(batch).await?;
        }
        Ok(report)
    }
}

fn summarize_day(
    device_id: DeviceId,
    date: NaiveDate,
    readings: &[DeviceReading],
    interval_secs: i64,
) -> DeviceDaily {
    let total_kwh: f64 = readings.iter().map(|r| r.energy_kwh).sum();
    let (on, off): (Vec<&DeviceReading>, Vec<&DeviceReading>) =
        readings.iter().partition(|r| r.is_on);
    let uptime =
        StatusSlice::from_samples(on.len(), on.iter().map(|r| r.energy_kwh).sum(), interval_secs);
    let downtime =
        StatusSlice::from_samples(off.len(), off.iter().map(|r| r.energy_kwh).sum(), interval_secs);
    DeviceDaily {
        device_id,
        date,
        total_kwh,
        breakdown: StatusBreakdown {
            avg_kwh_per_sec: total_kwh / DAY_SECS as f64,
            uptime,
            downtime,
        },
    }
}

fn summarize_month(device_id: DeviceId, span: &MonthSpan, dailies: &[DeviceDaily]) -> DeviceMonthly {
    let mut days = BTreeMap::new();
    let mut total_kwh = 0.0;
    let mut uptime_kwh = 0.0;
    let mut downtime_kwh = 0.0;
    for d in dailies {
        days.insert(
            d.date,
            DayEntry {
                total_kwh: d.total_kwh,
                uptime_kwh: d.breakdown.uptime.energy_kwh,
                downtime_kwh: d.breakdown.downtime.energy_kwh,
            },
        );
        total_kwh += d.total_kwh;
        uptime_kwh += d.breakdown.uptime.energy_kwh;
        downtime_kwh += d.breakdown.downtime.energy_kwh;
    }
    // Averages are over days that contributed, not the calendar length.
    let contributing = days.len() as f64;
    DeviceMonthly {
        device_id,
        year: span.year,
        month: span.month,
        total_kwh,
        breakdown: MonthlyBreakdown {
            days,
            uptime_kwh,
            downtime_kwh,
            avg_daily_kwh: total_kwh / contributing,
            avg_daily_uptime_kwh: uptime_kwh / contributing,
            avg_daily_downtime_kwh: downtime_kwh / contributing,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Device, DeviceCategory};
    use crate::repo::MemoryStore;
    use chrono::{DateTime, TimeZone, Utc};
    use uuid::Uuid;

    async fn seed_device(store: &MemoryStore) -> DeviceId {
        let device = Device {
            id: Uuid::new_v4(),
            room_id: None,
            name: "Heater".into(),
            category: DeviceCategory::Heating,
            number: Some(3),
            zone: "B".into(),
            is_unlocked: true,
            is_on: false,
            analogue_value: None,
            consumption_rate_w: Some(1_200.0),
        };
        store.insert_device(device.clone()).await.unwrap();
        device.id
    }

    fn at(y: i32, m: u32, d: u32, hh: u32, mm: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, hh, mm, 0).unwrap()
    }

    async fn seed_reading(
        store: &MemoryStore,
        device_id: DeviceId,
        ts: DateTime<Utc>,
        kwh: f64,
        on: bool,
    ) {
        store
            .insert_device_reading(DeviceReading {
                device_id,
                timestamp: ts,
                energy_kwh: kwh,
                is_on: on,
            })
            .await
            .unwrap();
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn daily_partitions_by_power_status() {
        let store = MemoryStore::new();
        let id = seed_device(&store).await;
        // Three on-minutes and two off-minutes yesterday.
        seed_reading(&store, id, at(2026, 5, 9, 10, 0), 0.02, true).await;
        seed_reading(&store, id, at(2026, 5, 9, 10, 1), 0.02, true).await;
        seed_reading(&store, id, at(2026, 5, 9, 10, 2), 0.02, true).await;
        seed_reading(&store, id, at(2026, 5, 9, 10, 3), 0.00005, false).await;
        seed_reading(&store, id, at(2026, 5, 9, 10, 4), 0.00005, false).await;

        let report = DeviceRollup::new(60).run(&store, date(2026, 5, 10)).await.unwrap();
        assert_eq!(report.date, date(2026, 5, 9));
        assert_eq!(report.daily_written, 1);
        assert_eq!(report.monthly_written, 0);

        let daily = store.device_daily(id, date(2026, 5, 9)).await.unwrap().unwrap();
        assert!((daily.total_kwh - 0.0601).abs() < 1e-12);
        assert_eq!(daily.breakdown.uptime.duration_secs, 180);
        assert_eq!(daily.breakdown.downtime.duration_secs, 120);
        assert!((daily.breakdown.uptime.energy_kwh - 0.06).abs() < 1e-12);
        assert!((daily.breakdown.uptime.avg_kwh_per_sec - 0.06 / 180.0).abs() < 1e-15);
        assert!((daily.breakdown.avg_kwh_per_sec - 0.0601 / 86_400.0).abs() < 1e-15);
    }

    #[tokio::test]
    async fn one_sided_day_keeps_zeroed_partition() {
        let store = MemoryStore::new();
        let id = seed_device(&store).await;
        seed_reading(&store, id, at(2026, 5, 9, 10, 0), 0.02, true).await;

        DeviceRollup::new(60).run(&store, date(2026, 5, 10)).await.unwrap();
        let daily = store.device_daily(id, date(2026, 5, 9)).await.unwrap().unwrap();
        assert_eq!(daily.breakdown.downtime.duration_secs, 0);
        assert_eq!(daily.breakdown.downtime.avg_kwh_per_sec, 0.0);
    }

    #[tokio::test]
    async fn rerun_recomputes_wholesale() {
        let store = MemoryStore::new();
        let id = seed_device(&store).await;
        seed_reading(&store, id, at(2026, 5, 9, 10, 0), 0.02, true).await;

        let rollup = DeviceRollup::new(60);
        rollup.run(&store, date(2026, 5, 10)).await.unwrap();

        // Late-arriving reading for the same day, then a replay.
        seed_reading(&store, id, at(2026, 5, 9, 11, 0), 0.03, true).await;
        rollup.run(&store, date(2026, 5, 10)).await.unwrap();

        let dailies = store
            .device_dailies_between(id, date(2026, 5, 9), date(2026, 5, 9))
            .await
            .unwrap();
        assert_eq!(dailies.len(), 1);
        assert!((dailies[0].total_kwh - 0.05).abs() < 1e-12);
    }

    #[tokio::test]
    async fn devices_without_readings_are_skipped() {
        let store = MemoryStore::new();
        let idle = seed_device(&store).await;
        let active = seed_device(&store).await;
        seed_reading(&store, active, at(2026, 5, 9, 10, 0), 0.02, true).await;

        let report = DeviceRollup::new(60).run(&store, date(2026, 5, 10)).await.unwrap();
        assert_eq!(report.daily_written, 1);
        assert_eq!(report.entities_skipped, 1);
        assert!(store.device_daily(idle, date(2026, 5, 9)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn monthly_runs_only_on_the_first() {
        let store = MemoryStore::new();
        let id = seed_device(&store).await;
        seed_reading(&store, id, at(2026, 5, 9, 10, 0), 0.02, true).await;

        DeviceRollup::new(60).run(&store, date(2026, 5, 10)).await.unwrap();
        assert!(store.device_monthly(id, 2026, 5).await.unwrap().is_none());
        assert!(store.device_monthly(id, 2026, 4).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn monthly_includes_the_freshly_staged_last_day() {
        let store = MemoryStore::new();
        let id = seed_device(&store).await;

        // Two stored dailies mid-April, raw readings for April 30 only.
        let stored = |date: NaiveDate, kwh: f64| DeviceDaily {
            device_id: id,
            date,
            total_kwh: kwh,
            breakdown: StatusBreakdown {
                avg_kwh_per_sec: kwh / DAY_SECS as f64,
                uptime: StatusSlice::from_samples(10, kwh, 60),
                downtime: StatusSlice::from_samples(0, 0.0, 60),
            },
        };
        let mut seedbatch = SummaryBatch::default();
        seedbatch.device_dailies.push(stored(date(2026, 4, 10), 1.0));
        seedbatch.device_dailies.push(stored(date(2026, 4, 20), 2.0));
        store.apply(seedbatch).await.unwrap();

        seed_reading(&store, id, at(2026, 4, 30, 8, 0), 0.25, true).await;
        seed_reading(&store, id, at(2026, 4, 30, 8, 1), 0.25, false).await;

        let report = DeviceRollup::new(60).run(&store, date(2026, 5, 1)).await.unwrap();
        assert_eq!(report.daily_written, 1);
        assert_eq!(report.monthly_written, 1);

        let monthly = store.device_monthly(id, 2026, 4).await.unwrap().unwrap();
        assert!((monthly.total_kwh - 3.5).abs() < 1e-12);
        assert_eq!(monthly.breakdown.days.len(), 3);
        let last_day = monthly.breakdown.days.get(&date(2026, 4, 30)).unwrap();
        assert!((last_day.total_kwh - 0.5).abs() < 1e-12);
        assert!((last_day.uptime_kwh - 0.25).abs() < 1e-12);
        // Averages divide by three contributing days, not thirty.
        assert!((monthly.breakdown.avg_daily_kwh - 3.5 / 3.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn stale_last_day_summary_is_replaced_in_the_aggregate() {
        let store = MemoryStore::new();
        let id = seed_device(&store).await;

        // A stale April 30 summary from an earlier run sits in the store.
        let mut seedbatch = SummaryBatch::default();
        seedbatch.device_dailies.push(DeviceDaily {
            device_id: id,
            date: date(2026, 4, 30),
            total_kwh: 99.0,
            breakdown: Default::default(),
        });
        store.apply(seedbatch).await.unwrap();

        seed_reading(&store, id, at(2026, 4, 30, 8, 0), 0.25, true).await;
        DeviceRollup::new(60).run(&store, date(2026, 5, 1)).await.unwrap();

        let monthly = store.device_monthly(id, 2026, 4).await.unwrap().unwrap();
        // The recomputed 0.25, not the stale 99.0.
        assert!((monthly.total_kwh - 0.25).abs() < 1e-12);
        assert_eq!(monthly.breakdown.days.len(), 1);
    }

    #[tokio::test]
    async fn empty_month_writes_no_monthly_row() {
        let store = MemoryStore::new();
        let id = seed_device(&store).await;

        let report = DeviceRollup::new(60).run(&store, date(2026, 5, 1)).await.unwrap();
        assert_eq!(report.monthly_written, 0);
        assert!(store.device_monthly(id, 2026, 4).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn store_failure_surfaces_before_any_write() {
        use crate::repo::{MockTelemetryStore, StoreError};

        let device = Device {
            id: Uuid::new_v4(),
            room_id: None,
            name: "Heater".into(),
            category: DeviceCategory::Heating,
            number: Some(3),
            zone: "B".into(),
            is_unlocked: true,
            is_on: false,
            analogue_value: None,
            consumption_rate_w: Some(1_200.0),
        };
        let mut store = MockTelemetryStore::new();
        store.expect_devices().returning(move || Ok(vec![device.clone()]));
        store
            .expect_device_readings_on()
            .returning(|_, _| Err(StoreError::Backend("connection reset".into())));
        store.expect_apply().never();

        let err = DeviceRollup::new(60).run(&store, date(2026, 5, 10)).await.unwrap_err();
        assert!(matches!(err, RollupError::Store(StoreError::Backend(_))));
    }
}
