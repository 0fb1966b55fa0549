use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

use super::{BridgeError, ControlCommand};

/// The outbound side of the bridge. One call per command, no retries;
/// callers decide what a failure means.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SimulatorClient: Send + Sync {
    async fn send(&self, command: &ControlCommand) -> Result<(), BridgeError>;
}

/// Thin GET client for the Home I/O style simulator endpoint. Success is
/// HTTP 200 exactly; every other status or a transport error fails the
/// command.
pub struct HomeIoClient {
    base_url: String,
    http: reqwest::Client,
}

impl HomeIoClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, BridgeError> {
        let base_url: String = base_url.into();
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("home-energy-monitor/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { base_url: base_url.trim_end_matches('/').to_string(), http })
    }

    fn url_for(&self, command: &ControlCommand) -> String {
        format!("{}/{}", self.base_url, command.path())
    }
}

#[async_trait]
impl SimulatorClient for HomeIoClient {
    async fn send(&self, command: &ControlCommand) -> Result<(), BridgeError> {
        let url = self.url_for(command);
        debug!(%url, "dispatching control command");
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(BridgeError::Status(status));
        }
        Ok(())
    }
}
