use reqwest::StatusCode;
use thiserror::Error;

pub mod client;
pub mod command;
pub mod hook;

pub use client::{HomeIoClient, SimulatorClient};
pub use command::{build_command, detect_change, ChangeKind, ControlCommand};
pub use hook::{DeviceWriter, PreCommitHook, StateBridge};

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("no control path for {0} devices")]
    Unsupported(String),
    #[error("device {0} has no simulator number")]
    Unaddressed(String),
    #[error("simulator answered {0}")]
    Status(StatusCode),
    #[error("simulator request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Terminal result of running the bridge for one device save.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeOutcome {
    /// No bridgeable change between the stored and incoming rows.
    NotSent,
    /// A change was detected but this device cannot be driven remotely.
    Skipped(String),
    /// The simulator confirmed the command with HTTP 200.
    Acknowledged(ControlCommand),
    /// The command was attempted and rejected or lost. The save still
    /// goes through, so stored state may run ahead of the simulator.
    Failed { command: ControlCommand, reason: String },
}

impl BridgeOutcome {
    /// False only when a command went out and was not acknowledged.
    pub fn passed(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }
}
