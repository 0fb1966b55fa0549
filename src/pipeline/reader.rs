use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate};

use crate::domain::{DeviceDaily, DeviceId, HomeId, RoomDaily, RoomId, RoomReading};
use crate::repo::{StoreError, TelemetryStore};

/// A Monday-to-Sunday window of room consumption.
#[derive(Debug, Clone)]
pub struct WeekUsage {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub days: Vec<RoomDaily>,
    pub total_kwh: f64,
}

/// One day of a home's consumption against its generation. Net is
/// generation minus consumption, so a surplus is positive.
#[derive(Debug, Clone, Copy)]
pub struct HomeDaySummary {
    pub date: NaiveDate,
    pub consumption_kwh: f64,
    pub generation_kwh: f64,
    pub net_kwh: f64,
}

/// One month of a home's consumption against its generation.
#[derive(Debug, Clone, Copy)]
pub struct HomeMonthSummary {
    pub year: i32,
    pub month: u32,
    pub consumption_kwh: f64,
    pub generation_kwh: f64,
    pub net_kwh: f64,
}

/// Read-side composition over stored summaries. Summaries lag by one
/// day, so asking about today legitimately comes back empty.
pub struct SummaryReader {
    store: Arc<dyn TelemetryStore>,
}

impl SummaryReader {
    pub fn new(store: Arc<dyn TelemetryStore>) -> Self {
        Self { store }
    }

    pub async fn device_day(
        &self,
        device_id: DeviceId,
        date: NaiveDate,
    ) -> Result<Option<DeviceDaily>, StoreError> {
        self.store.device_daily(device_id, date).await
    }

    pub async fn room_day(
        &self,
        room_id: RoomId,
        date: NaiveDate,
    ) -> Result<Option<RoomDaily>, StoreError> {
        self.store.room_daily(room_id, date).await
    }

    /// The calendar week containing `day`, summed per room.
    pub async fn room_week(
        &self,
        room_id: RoomId,
        day: NaiveDate,
    ) -> Result<WeekUsage, StoreError> {
        let start = day - Duration::days(day.weekday().num_days_from_monday() as i64);
        let end = start + Duration::days(6);
        let days = self.store.room_dailies_between(room_id, start, end).await?;
        let total_kwh = days.iter().map(|d| d.total_kwh).sum();
        Ok(WeekUsage { start, end, days, total_kwh })
    }

    /// Whole-home consumption versus generation for one day. Rooms or
    /// homes without a summary contribute zero.
    pub async fn home_day(
        &self,
        home_id: HomeId,
        date: NaiveDate,
    ) -> Result<HomeDaySummary, StoreError> {
        let mut consumption_kwh = 0.0;
        for room in self.store.rooms().await?.into_iter().filter(|r| r.home_id == home_id) {
            if let Some(daily) = self.store.room_daily(room.id, date).await? {
                consumption_kwh += daily.total_kwh;
            }
        }
        let generation_kwh = self
            .store
            .generation_daily(home_id, date)
            .await?
            .map(|g| g.total_kwh)
            .unwrap_or(0.0);
        Ok(HomeDaySummary {
            date,
            consumption_kwh,
            generation_kwh,
            net_kwh: generation_kwh - consumption_kwh,
        })
    }

    /// Whole-home consumption versus generation for one month.
    pub async fn home_month(
        &self,
        home_id: HomeId,
        year: i32,
        month: u32,
    ) -> Result<HomeMonthSummary, StoreError> {
        let mut consumption_kwh = 0.0;
        for room in self.store.rooms().await?.into_iter().filter(|r| r.home_id == home_id) {
            if let Some(monthly) = self.store.room_monthly(room.id, year, month).await? {
                consumption_kwh += monthly.total_kwh;
            }
        }
        let generation_kwh = self
            .store
            .generation_monthly(home_id, year, month)
            .await?
            .map(|g| g.total_kwh)
            .unwrap_or(0.0);
        Ok(HomeMonthSummary {
            year,
            month,
            consumption_kwh,
            generation_kwh,
            net_kwh: generation_kwh - consumption_kwh,
        })
    }

    /// The newest fanned-in reading for a room, for live dashboards.
    pub async fn live_room_power(
        &self,
        room_id: RoomId,
    ) -> Result<Option<RoomReading>, StoreError> {
        self.store.latest_room_reading(room_id).await
    }
}
