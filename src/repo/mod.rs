use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{
    Device, DeviceDaily, DeviceId, DeviceMonthly, DeviceReading, GenerationDaily,
    GenerationMonthly, GenerationReading, Home, HomeId, Room, RoomDaily, RoomId, RoomMonthly,
    RoomReading,
};

pub mod memory;

pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate row: {0}")]
    Duplicate(String),
    #[error("unknown entity: {0}")]
    UnknownEntity(Uuid),
    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Everything one rollup or fan-in invocation wants to persist. The store
/// applies a batch as a unit: either every row lands or none do.
#[derive(Debug, Clone, Default)]
pub struct SummaryBatch {
    pub room_readings: Vec<RoomReading>,
    pub device_dailies: Vec<DeviceDaily>,
    pub room_dailies: Vec<RoomDaily>,
    pub generation_dailies: Vec<GenerationDaily>,
    pub device_monthlies: Vec<DeviceMonthly>,
    pub room_monthlies: Vec<RoomMonthly>,
    pub generation_monthlies: Vec<GenerationMonthly>,
}

impl SummaryBatch {
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of rows staged across all tables.
    pub fn len(&self) -> usize {
        self.room_readings.len()
            + self.device_dailies.len()
            + self.room_dailies.len()
            + self.generation_dailies.len()
            + self.device_monthlies.len()
            + self.room_monthlies.len()
            + self.generation_monthlies.len()
    }
}

/// Storage backend for homes, readings and summaries.
///
/// Minute readings are append-only and keyed by (entity, timestamp).
/// Summaries are upserted by their calendar key, so re-running a rollup
/// replaces what an earlier run wrote. Dates address readings by the UTC
/// civil day their timestamp falls on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    async fn homes(&self) -> Result<Vec<Home>, StoreError>;
    async fn rooms(&self) -> Result<Vec<Room>, StoreError>;
    async fn devices(&self) -> Result<Vec<Device>, StoreError>;
    async fn room(&self, id: RoomId) -> Result<Option<Room>, StoreError>;
    async fn device(&self, id: DeviceId) -> Result<Option<Device>, StoreError>;

    async fn insert_home(&self, home: Home) -> Result<(), StoreError>;
    async fn insert_room(&self, room: Room) -> Result<(), StoreError>;
    async fn insert_device(&self, device: Device) -> Result<(), StoreError>;
    /// Replaces an existing device row. Fails with `UnknownEntity` when the
    /// device was never inserted.
    async fn update_device(&self, device: Device) -> Result<(), StoreError>;

    async fn insert_device_reading(&self, reading: DeviceReading) -> Result<(), StoreError>;
    async fn insert_generation_reading(
        &self,
        reading: GenerationReading,
    ) -> Result<(), StoreError>;

    /// All device readings stamped exactly `at`.
    async fn device_readings_at(
        &self,
        at: DateTime<Utc>,
    ) -> Result<Vec<DeviceReading>, StoreError>;
    async fn room_reading_exists(
        &self,
        room_id: RoomId,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
    async fn latest_room_reading(
        &self,
        room_id: RoomId,
    ) -> Result<Option<RoomReading>, StoreError>;

    /// A device's readings across one UTC day, ordered by timestamp.
    async fn device_readings_on(
        &self,
        device_id: DeviceId,
        date: NaiveDate,
    ) -> Result<Vec<DeviceReading>, StoreError>;
    /// Summed room energy for one UTC day; `None` when the room has no
    /// readings that day at all.
    async fn sum_room_energy_on(
        &self,
        room_id: RoomId,
        date: NaiveDate,
    ) -> Result<Option<f64>, StoreError>;
    async fn sum_generation_energy_on(
        &self,
        home_id: HomeId,
        date: NaiveDate,
    ) -> Result<Option<f64>, StoreError>;

    async fn device_daily(
        &self,
        device_id: DeviceId,
        date: NaiveDate,
    ) -> Result<Option<DeviceDaily>, StoreError>;
    async fn room_daily(
        &self,
        room_id: RoomId,
        date: NaiveDate,
    ) -> Result<Option<RoomDaily>, StoreError>;
    async fn generation_daily(
        &self,
        home_id: HomeId,
        date: NaiveDate,
    ) -> Result<Option<GenerationDaily>, StoreError>;

    /// Daily summaries inside the closed range [first, last], ascending.
    async fn device_dailies_between(
        &self,
        device_id: DeviceId,
        first: NaiveDate,
        last: NaiveDate,
    ) -> Result<Vec<DeviceDaily>, StoreError>;
    async fn room_dailies_between(
        &self,
        room_id: RoomId,
        first: NaiveDate,
        last: NaiveDate,
    ) -> Result<Vec<RoomDaily>, StoreError>;
    async fn generation_dailies_between(
        &self,
        home_id: HomeId,
        first: NaiveDate,
        last: NaiveDate,
    ) -> Result<Vec<GenerationDaily>, StoreError>;

    async fn device_monthly(
        &self,
        device_id: DeviceId,
        year: i32,
        month: u32,
    ) -> Result<Option<DeviceMonthly>, StoreError>;
    async fn room_monthly(
        &self,
        room_id: RoomId,
        year: i32,
        month: u32,
    ) -> Result<Option<RoomMonthly>, StoreError>;
    async fn generation_monthly(
        &self,
        home_id: HomeId,
        year: i32,
        month: u32,
    ) -> Result<Option<GenerationMonthly>, StoreError>;

    /// Persists a whole batch atomically. Staged room readings collide
    /// with existing rows as `Duplicate`; summaries always upsert.
    async fn apply(&self, batch: SummaryBatch) -> Result<(), StoreError>;
}
