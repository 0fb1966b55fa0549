use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::command::{build_command, detect_change};
use super::{BridgeOutcome, SimulatorClient};
use crate::domain::Device;
use crate::repo::{StoreError, TelemetryStore};

/// Runs just before a device row is persisted. The outcome is reported
/// back to the caller but never vetoes the save.
#[async_trait]
pub trait PreCommitHook: Send + Sync {
    /// `old` is the currently stored row, `None` when the device is new.
    async fn before_device_save(&self, old: Option<&Device>, new: &Device) -> BridgeOutcome;
}

/// The single write path for device rows. Every save runs the registered
/// hooks against the stored row first, then persists unconditionally.
pub struct DeviceWriter {
    store: Arc<dyn TelemetryStore>,
    hooks: Vec<Arc<dyn PreCommitHook>>,
}

impl DeviceWriter {
    pub fn new(store: Arc<dyn TelemetryStore>) -> Self {
        Self { store, hooks: Vec::new() }
    }

    pub fn with_hook(mut self, hook: Arc<dyn PreCommitHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Persists a device, inserting or updating as appropriate. A failed
    /// hook is logged and surfaced in the returned outcomes while the
    /// save still goes through, so stored state can drift ahead of the
    /// simulator until the next successful command.
    pub async fn save(&self, device: Device) -> Result<Vec<BridgeOutcome>, StoreError> {
        let old = self.store.device(device.id).await?;
        let mut outcomes = Vec::with_capacity(self.hooks.len());
        for hook in &self.hooks {
            let outcome = hook.before_device_save(old.as_ref(), &device).await;
            if let BridgeOutcome::Failed { command, reason } = &outcome {
                warn!(
                    device = %device.name,
                    action = command.action,
                    %reason,
                    "bridge command failed, saving anyway"
                );
            }
            outcomes.push(outcome);
        }
        match old {
            Some(_) => self.store.update_device(device).await?,
            None => self.store.insert_device(device).await?,
        }
        Ok(outcomes)
    }
}

/// Pre-commit hook that mirrors device state changes to the external
/// simulator. Fire and forget: one command per save, no retry, no
/// reconciliation afterwards.
pub struct StateBridge {
    client: Arc<dyn SimulatorClient>,
}

impl StateBridge {
    pub fn new(client: Arc<dyn SimulatorClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PreCommitHook for StateBridge {
    async fn before_device_save(&self, old: Option<&Device>, new: &Device) -> BridgeOutcome {
        let Some(old) = old else {
            return BridgeOutcome::NotSent;
        };
        let Some(change) = detect_change(old, new) else {
            return BridgeOutcome::NotSent;
        };
        info!(device = %new.name, ?change, "device state change detected");
        let command = match build_command(new, change) {
            Ok(command) => command,
            Err(err) => {
                info!(device = %new.name, %err, "change cannot be bridged, skipping");
                return BridgeOutcome::Skipped(err.to_string());
            }
        };
        debug!(device = %new.name, path = %command.path(), "command built");
        match self.client.send(&command).await {
            Ok(()) => BridgeOutcome::Acknowledged(command),
            Err(err) => BridgeOutcome::Failed { command, reason: err.to_string() },
        }
    }
}
