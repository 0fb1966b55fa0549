use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::bridge::DeviceWriter;
use crate::domain::{Device, DeviceCategory, Home, Room};
use crate::repo::{StoreError, TelemetryStore};

/// Room-and-device template applied to every provisioned home.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LayoutTemplate {
    #[validate(length(min = 1), nested)]
    pub rooms: Vec<RoomTemplate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RoomTemplate {
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(length(min = 1))]
    pub zone: String,
    #[serde(default)]
    #[validate(nested)]
    pub devices: Vec<DeviceTemplate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DeviceTemplate {
    #[validate(length(min = 1))]
    pub name: String,
    #[serde(rename = "type")]
    pub category: DeviceCategory,
    #[serde(default)]
    pub number: Option<u16>,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub consumption_rate_w: Option<f64>,
}

/// Reads and validates a layout file.
pub fn load(path: &Path) -> Result<LayoutTemplate> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read layout file {}", path.display()))?;
    let layout: LayoutTemplate = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse layout file {}", path.display()))?;
    layout
        .validate()
        .with_context(|| format!("invalid layout in {}", path.display()))?;
    Ok(layout)
}

/// Creates one home from the template. Devices start switched off and
/// inherit their room's zone; device rows go through the writer so the
/// usual pre-commit hooks observe them.
pub async fn provision_home(
    store: &dyn TelemetryStore,
    devices: &DeviceWriter,
    layout: &LayoutTemplate,
    name: &str,
    start_unlocked: bool,
) -> Result<Home, StoreError> {
    let home = Home { id: Uuid::new_v4(), name: name.to_string() };
    store.insert_home(home.clone()).await?;

    let mut room_count = 0usize;
    let mut device_count = 0usize;
    for room_template in &layout.rooms {
        let room = Room {
            id: Uuid::new_v4(),
            home_id: home.id,
            name: room_template.name.clone(),
            zone: room_template.zone.clone(),
            is_unlocked: start_unlocked,
        };
        store.insert_room(room.clone()).await?;
        room_count += 1;

        for device_template in &room_template.devices {
            let device = Device {
                id: Uuid::new_v4(),
                room_id: Some(room.id),
                name: device_template.name.clone(),
                category: device_template.category.clone(),
                number: device_template.number,
                zone: room_template.zone.clone(),
                is_unlocked: start_unlocked,
                is_on: false,
                analogue_value: None,
                consumption_rate_w: device_template.consumption_rate_w,
            };
            devices.save(device).await?;
            device_count += 1;
        }
    }

    info!(home = %home.name, rooms = room_count, devices = device_count, "home provisioned");
    Ok(home)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::MemoryStore;
    use std::sync::Arc;

    const SAMPLE: &str = r#"{
        "rooms": [
            {
                "name": "Living Room",
                "zone": "A",
                "devices": [
                    { "name": "Ceiling Light", "type": "lighting", "number": 1, "consumption_rate_w": 60 },
                    { "name": "Motion Sensor", "type": "sensor" }
                ]
            },
            {
                "name": "Bedroom",
                "zone": "B",
                "devices": [
                    { "name": "Radiator", "type": "heating", "number": 2, "consumption_rate_w": 1500 }
                ]
            }
        ]
    }"#;

    fn sample() -> LayoutTemplate {
        let layout: LayoutTemplate = serde_json::from_str(SAMPLE).unwrap();
        layout.validate().unwrap();
        layout
    }

    #[test]
    fn parses_types_and_optional_fields() {
        let layout = sample();
        assert_eq!(layout.rooms.len(), 2);
        let sensor = &layout.rooms[0].devices[1];
        assert_eq!(sensor.category, DeviceCategory::Sensor);
        assert_eq!(sensor.number, None);
        assert_eq!(sensor.consumption_rate_w, None);
    }

    #[test]
    fn empty_layout_fails_validation() {
        let layout: LayoutTemplate = serde_json::from_str(r#"{ "rooms": [] }"#).unwrap();
        assert!(layout.validate().is_err());
    }

    #[test]
    fn negative_rate_fails_validation() {
        let raw = r#"{ "rooms": [ { "name": "R", "zone": "A", "devices": [
            { "name": "Bad", "type": "lighting", "consumption_rate_w": -5 }
        ] } ] }"#;
        let layout: LayoutTemplate = serde_json::from_str(raw).unwrap();
        assert!(layout.validate().is_err());
    }

    #[tokio::test]
    async fn provisions_rooms_and_devices_locked_and_off() {
        let store = Arc::new(MemoryStore::new());
        let writer = DeviceWriter::new(store.clone());
        let home = provision_home(store.as_ref(), &writer, &sample(), "Home 1", false)
            .await
            .unwrap();

        let rooms = store.rooms().await.unwrap();
        assert_eq!(rooms.len(), 2);
        assert!(rooms.iter().all(|r| r.home_id == home.id && !r.is_unlocked));

        let devices = store.devices().await.unwrap();
        assert_eq!(devices.len(), 3);
        assert!(devices.iter().all(|d| !d.is_on && !d.is_unlocked));

        // Devices carry their room's zone for later control commands.
        let radiator = devices.iter().find(|d| d.name == "Radiator").unwrap();
        assert_eq!(radiator.zone, "B");
        let bedroom = rooms.iter().find(|r| r.name == "Bedroom").unwrap();
        assert_eq!(radiator.room_id, Some(bedroom.id));
    }

    #[tokio::test]
    async fn unlocked_template_homes_start_live() {
        let store = Arc::new(MemoryStore::new());
        let writer = DeviceWriter::new(store.clone());
        provision_home(store.as_ref(), &writer, &sample(), "Home 1", true).await.unwrap();

        let devices = store.devices().await.unwrap();
        assert!(devices.iter().all(|d| d.is_unlocked && !d.is_on));
    }
}
