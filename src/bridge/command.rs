use std::collections::HashMap;

use once_cell::sync::Lazy;

use super::BridgeError;
use crate::domain::{Device, DeviceCategory};

struct ActionPaths {
    on: &'static str,
    off: &'static str,
    set: Option<&'static str>,
}

/// Control path templates per category. Categories absent from this
/// table cannot be driven through the simulator at all.
static ACTION_PATHS: Lazy<HashMap<DeviceCategory, ActionPaths>> = Lazy::new(|| {
    HashMap::from([
        (
            DeviceCategory::Lighting,
            ActionPaths {
                on: "lighting/turn_on",
                off: "lighting/turn_off",
                set: Some("lighting/set_level"),
            },
        ),
        (
            DeviceCategory::Heating,
            ActionPaths {
                on: "heating/turn_on",
                off: "heating/turn_off",
                set: Some("heating/set_level"),
            },
        ),
        (
            DeviceCategory::Shades,
            ActionPaths {
                on: "shades/open",
                off: "shades/close",
                set: Some("shades/set_position"),
            },
        ),
    ])
});

/// What changed between the stored row and the row being saved. A power
/// flip takes precedence when both fields moved in one save.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChangeKind {
    Power { on: bool },
    Analogue { value: f64 },
}

/// One GET request against the simulator, minus the base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlCommand {
    pub action: &'static str,
    pub device_number: u16,
    pub zone: String,
    pub value: Option<f64>,
}

impl ControlCommand {
    /// Path relative to the simulator base URL.
    pub fn path(&self) -> String {
        match self.value {
            Some(value) => {
                format!("{}/{}/{}/{}", self.action, self.device_number, self.zone, value)
            }
            None => format!("{}/{}/{}", self.action, self.device_number, self.zone),
        }
    }
}

/// Compares the two rows field by field. At most one command comes out
/// of a save; a device that is off and has no analogue movement yields
/// nothing.
pub fn detect_change(old: &Device, new: &Device) -> Option<ChangeKind> {
    if old.is_on != new.is_on {
        return Some(ChangeKind::Power { on: new.is_on });
    }
    if old.analogue_value != new.analogue_value {
        return new.analogue_value.map(|value| ChangeKind::Analogue { value });
    }
    None
}

/// Renders a detected change into the command for this device, or fails
/// when the category has no template or the device has no number.
pub fn build_command(device: &Device, change: ChangeKind) -> Result<ControlCommand, BridgeError> {
    let paths = ACTION_PATHS
        .get(&device.category)
        .ok_or_else(|| BridgeError::Unsupported(device.category.to_string()))?;
    let device_number =
        device.number.ok_or_else(|| BridgeError::Unaddressed(device.name.clone()))?;
    let (action, value) = match change {
        ChangeKind::Power { on: true } => (paths.on, None),
        ChangeKind::Power { on: false } => (paths.off, None),
        ChangeKind::Analogue { value } => {
            let set = paths
                .set
                .ok_or_else(|| BridgeError::Unsupported(device.category.to_string()))?;
            (set, Some(value))
        }
    };
    Ok(ControlCommand { action, device_number, zone: device.zone.clone(), value })
}
