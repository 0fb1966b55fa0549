use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type HomeId = Uuid;
pub type RoomId = Uuid;
pub type DeviceId = Uuid;

/// A smart home. Owns rooms, which own devices; generation telemetry is
/// recorded against the home itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Home {
    pub id: HomeId,
    pub name: String,
}

/// A physical room inside a home. `zone` is the simulator zone label used
/// when building control paths for devices in this room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub home_id: HomeId,
    pub name: String,
    pub zone: String,
    pub is_unlocked: bool,
}

/// Device category, mapped from the layout's free-form type strings.
/// Only lighting, heating and shades have simulator control templates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DeviceCategory {
    Lighting,
    Heating,
    Shades,
    Sensor,
    Other(String),
}

impl std::fmt::Display for DeviceCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Lighting => "lighting",
            Self::Heating => "heating",
            Self::Shades => "shades",
            Self::Sensor => "sensor",
            Self::Other(other) => other.as_str(),
        };
        write!(f, "{s}")
    }
}

impl From<String> for DeviceCategory {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "lighting" => Self::Lighting,
            "heating" => Self::Heating,
            "shades" => Self::Shades,
            "sensor" => Self::Sensor,
            _ => Self::Other(s),
        }
    }
}

impl From<DeviceCategory> for String {
    fn from(c: DeviceCategory) -> Self {
        c.to_string()
    }
}

/// A device instance inside a room.
///
/// `number` and `zone` address the matching output in the external
/// simulator; devices without a `number` cannot be controlled remotely.
/// `consumption_rate_w` is the nominal draw while switched on; devices
/// without one are never sampled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub room_id: Option<RoomId>,
    pub name: String,
    pub category: DeviceCategory,
    pub number: Option<u16>,
    pub zone: String,
    pub is_unlocked: bool,
    pub is_on: bool,
    pub analogue_value: Option<f64>,
    pub consumption_rate_w: Option<f64>,
}

impl Device {
    /// True when the sampler should emit a reading for this device.
    pub fn is_sampleable(&self) -> bool {
        self.is_unlocked && self.consumption_rate_w.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parses_known_and_falls_back() {
        assert_eq!(DeviceCategory::from("lighting".to_string()), DeviceCategory::Lighting);
        assert_eq!(DeviceCategory::from("Shades".to_string()), DeviceCategory::Shades);
        assert_eq!(
            DeviceCategory::from("garage_door".to_string()),
            DeviceCategory::Other("garage_door".to_string())
        );
    }

    #[test]
    fn category_display_round_trips() {
        assert_eq!(DeviceCategory::Heating.to_string(), "heating");
        assert_eq!(DeviceCategory::Other("siren".into()).to_string(), "siren");
    }

    #[test]
    fn category_serde_uses_plain_strings() {
        let json = serde_json::to_string(&DeviceCategory::Lighting).unwrap();
        assert_eq!(json, "\"lighting\"");
        let back: DeviceCategory = serde_json::from_str("\"heating\"").unwrap();
        assert_eq!(back, DeviceCategory::Heating);
    }
}
