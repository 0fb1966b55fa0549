use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;

use super::{StoreError, SummaryBatch, TelemetryStore};
use crate::domain::{
    day_bounds, Device, DeviceDaily, DeviceId, DeviceMonthly, DeviceReading, GenerationDaily,
    GenerationMonthly, GenerationReading, Home, HomeId, Room, RoomDaily, RoomId, RoomMonthly,
    RoomReading,
};

#[derive(Default)]
struct Tables {
    homes: HashMap<HomeId, Home>,
    rooms: HashMap<RoomId, Room>,
    devices: HashMap<DeviceId, Device>,
    device_readings: BTreeMap<(DeviceId, DateTime<Utc>), DeviceReading>,
    room_readings: BTreeMap<(RoomId, DateTime<Utc>), RoomReading>,
    generation_readings: BTreeMap<(HomeId, DateTime<Utc>), GenerationReading>,
    device_dailies: BTreeMap<(DeviceId, NaiveDate), DeviceDaily>,
    room_dailies: BTreeMap<(RoomId, NaiveDate), RoomDaily>,
    generation_dailies: BTreeMap<(HomeId, NaiveDate), GenerationDaily>,
    device_monthlies: BTreeMap<(DeviceId, i32, u32), DeviceMonthly>,
    room_monthlies: BTreeMap<(RoomId, i32, u32), RoomMonthly>,
    generation_monthlies: BTreeMap<(HomeId, i32, u32), GenerationMonthly>,
}

/// In-memory store. One lock guards all tables, which is what makes
/// `apply` atomic: the batch is validated and written under a single
/// write guard with nothing awaited in between.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TelemetryStore for MemoryStore {
    async fn homes(&self) -> Result<Vec<Home>, StoreError> {
        Ok(self.tables.read().homes.values().cloned().collect())
    }

    async fn rooms(&self) -> Result<Vec<Room>, StoreError> {
        Ok(self.tables.read().rooms.values().cloned().collect())
    }

    async fn devices(&self) -> Result<Vec<Device>, StoreError> {
        Ok(self.tables.read().devices.values().cloned().collect())
    }

    async fn room(&self, id: RoomId) -> Result<Option<Room>, StoreError> {
        Ok(self.tables.read().rooms.get(&id).cloned())
    }

    async fn device(&self, id: DeviceId) -> Result<Option<Device>, StoreError> {
        Ok(self.tables.read().devices.get(&id).cloned())
    }

    async fn insert_home(&self, home: Home) -> Result<(), StoreError> {
        let mut t = self.tables.write();
        if t.homes.contains_key(&home.id) {
            return Err(StoreError::Duplicate(format!("home {}", home.id)));
        }
        t.homes.insert(home.id, home);
        Ok(())
    }

    async fn insert_room(&self, room: Room) -> Result<(), StoreError> {
        let mut t = self.tables.write();
        if t.rooms.contains_key(&room.id) {
            return Err(StoreError::Duplicate(format!("room {}", room.id)));
        }
        t.rooms.insert(room.id, room);
        Ok(())
    }

    async fn insert_device(&self, device: Device) -> Result<(), StoreError> {
        let mut t = self.tables.write();
        if t.devices.contains_key(&device.id) {
            return Err(StoreError::Duplicate(format!("device {}", device.id)));
        }
        t.devices.insert(device.id, device);
        Ok(())
    }

    async fn update_device(&self, device: Device) -> Result<(), StoreError> {
        let mut t = self.tables.write();
        if !t.devices.contains_key(&device.id) {
            return Err(StoreError::UnknownEntity(device.id));
        }
        t.devices.insert(device.id, device);
        Ok(())
    }

    async fn insert_device_reading(&self, reading: DeviceReading) -> Result<(), StoreError> {
        let mut t = self.tables.write();
        let key = (reading.device_id, reading.timestamp);
        if t.device_readings.contains_key(&key) {
            return Err(StoreError::Duplicate(format!(
                "device reading {} @ {}",
                reading.device_id, reading.timestamp
            )));
        }
        t.device_readings.insert(key, reading);
        Ok(())
    }

    async fn insert_generation_reading(
        &self,
        reading: GenerationReading,
    ) -> Result<(), StoreError> {
        let mut t = self.tables.write();
        let key = (reading.home_id, reading.timestamp);
        if t.generation_readings.contains_key(&key) {
            return Err(StoreError::Duplicate(format!(
                "generation reading {} @ {}",
                reading.home_id, reading.timestamp
            )));
        }
        t.generation_readings.insert(key, reading);
        Ok(())
    }

    async fn device_readings_at(
        &self,
        at: DateTime<Utc>,
    ) -> Result<Vec<DeviceReading>, StoreError> {
        Ok(self
            .tables
            .read()
            .device_readings
            .values()
            .filter(|r| r.timestamp == at)
            .cloned()
            .collect())
    }

    async fn room_reading_exists(
        &self,
        room_id: RoomId,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        Ok(self.tables.read().room_readings.contains_key(&(room_id, at)))
    }

    async fn latest_room_reading(
        &self,
        room_id: RoomId,
    ) -> Result<Option<RoomReading>, StoreError> {
        let t = self.tables.read();
        Ok(t.room_readings
            .range((room_id, DateTime::<Utc>::MIN_UTC)..=(room_id, DateTime::<Utc>::MAX_UTC))
            .next_back()
            .map(|(_, r)| r.clone()))
    }

    async fn device_readings_on(
        &self,
        device_id: DeviceId,
        date: NaiveDate,
    ) -> Result<Vec<DeviceReading>, StoreError> {
        let (start, end) = day_bounds(date);
        let t = self.tables.read();
        Ok(t.device_readings
            .range((device_id, start)..(device_id, end))
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn sum_room_energy_on(
        &self,
        room_id: RoomId,
        date: NaiveDate,
    ) -> Result<Option<f64>, StoreError> {
        let (start, end) = day_bounds(date);
        let t = self.tables.read();
        let mut any = false;
        let mut total = 0.0;
        for (_, r) in t.room_readings.range((room_id, start)..(room_id, end)) {
            any = true;
            total += r.energy_kwh;
        }
        Ok(any.then_some(total))
    }

    async fn sum_generation_energy_on(
        &self,
        home_id: HomeId,
        date: NaiveDate,
    ) -> Result<Option<f64>, StoreError> {
        let (start, end) = day_bounds(date);
        let t = self.tables.read();
        let mut any = false;
        let mut total = 0.0;
        for (_, r) in t.generation_readings.range((home_id, start)..(home_id, end)) {
            any = true;
            total += r.energy_kwh;
        }
        Ok(any.then_some(total))
    }

    async fn device_daily(
        &self,
        device_id: DeviceId,
        date: NaiveDate,
    ) -> Result<Option<DeviceDaily>, StoreError> {
        Ok(self.tables.read().device_dailies.get(&(device_id, date)).cloned())
    }

    async fn room_daily(
        &self,
        room_id: RoomId,
        date: NaiveDate,
    ) -> Result<Option<RoomDaily>, StoreError> {
        Ok(self.tables.read().room_dailies.get(&(room_id, date)).cloned())
    }

    async fn generation_daily(
        &self,
        home_id: HomeId,
        date: NaiveDate,
    ) -> Result<Option<GenerationDaily>, StoreError> {
        Ok(self.tables.read().generation_dailies.get(&(home_id, date)).cloned())
    }

    async fn device_dailies_between(
        &self,
        device_id: DeviceId,
        first: NaiveDate,
        last: NaiveDate,
    ) -> Result<Vec<DeviceDaily>, StoreError> {
        let t = self.tables.read();
        Ok(t.device_dailies
            .range((device_id, first)..=(device_id, last))
            .map(|(_, d)| d.clone())
            .collect())
    }

    async fn room_dailies_between(
        &self,
        room_id: RoomId,
        first: NaiveDate,
        last: NaiveDate,
    ) -> Result<Vec<RoomDaily>, StoreError> {
        let t = self.tables.read();
        Ok(t.room_dailies
            .range((room_id, first)..=(room_id, last))
            .map(|(_, d)| d.clone())
            .collect())
    }

    async fn generation_dailies_between(
        &self,
        home_id: HomeId,
        first: NaiveDate,
        last: NaiveDate,
    ) -> Result<Vec<GenerationDaily>, StoreError> {
        let t = self.tables.read();
        Ok(t.generation_dailies
            .range((home_id, first)..=(home_id, last))
            .map(|(_, d)| d.clone())
            .collect())
    }

    async fn device_monthly(
        &self,
        device_id: DeviceId,
        year: i32,
        month: u32,
    ) -> Result<Option<DeviceMonthly>, StoreError> {
        Ok(self
            .tables
            .read()
            .device_monthlies
            .get(&(device_id, year, month))
            .cloned())
    }

    async fn room_monthly(
        &self,
        room_id: RoomId,
        year: i32,
        month: u32,
    ) -> Result<Option<RoomMonthly>, StoreError> {
        Ok(self.tables.read().room_monthlies.get(&(room_id, year, month)).cloned())
    }

    async fn generation_monthly(
        &self,
        home_id: HomeId,
        year: i32,
        month: u32,
    ) -> Result<Option<GenerationMonthly>, StoreError> {
        Ok(self
            .tables
            .read()
            .generation_monthlies
            .get(&(home_id, year, month))
            .cloned())
    }

    async fn apply(&self, batch: SummaryBatch) -> Result<(), StoreError> {
        let mut t = self.tables.write();

        // Validate before touching anything so a rejected batch leaves the
        // tables exactly as they were.
        for r in &batch.room_readings {
            if t.room_readings.contains_key(&(r.room_id, r.timestamp)) {
                return Err(StoreError::Duplicate(format!(
                    "room reading {} @ {}",
                    r.room_id, r.timestamp
                )));
            }
        }

        for r in batch.room_readings {
            t.room_readings.insert((r.room_id, r.timestamp), r);
        }
        for d in batch.device_dailies {
            t.device_dailies.insert((d.device_id, d.date), d);
        }
        for d in batch.room_dailies {
            t.room_dailies.insert((d.room_id, d.date), d);
        }
        for d in batch.generation_dailies {
            t.generation_dailies.insert((d.home_id, d.date), d);
        }
        for m in batch.device_monthlies {
            t.device_monthlies.insert((m.device_id, m.year, m.month), m);
        }
        for m in batch.room_monthlies {
            t.room_monthlies.insert((m.room_id, m.year, m.month), m);
        }
        for m in batch.generation_monthlies {
            t.generation_monthlies.insert((m.home_id, m.year, m.month), m);
        }
        Ok(())
    }
}
