//! HTTP bridge to an external simulator process.

use crate::control::VehicleControl;
use crate::simulation::*;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

pub const API_VERSION: u32 = 1;

#[derive(Deserialize)]
struct APIVersion {
    version: u32,
}

pub struct BridgeSimulator {
    client: reqwest::Client,
    api_url: String,
    world_url: String,
    control_url: String,
    tick_url: String,
}

impl BridgeSimulator {
    /// Every request to the simulator gives up after `timeout`.
    pub fn new(url: &str, timeout: Duration) -> Result<BridgeSimulator, SimulationError> {
        let url = url.trim_end_matches('/');
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(BridgeSimulator {
            client,
            api_url: url.to_owned() + "/api",
            world_url: url.to_owned() + "/world",
            control_url: url.to_owned() + "/control",
            tick_url: url.to_owned() + "/tick",
        })
    }

    /// Creates the bridge and checks the simulator speaks our API version.
    pub async fn connect(url: &str, timeout: Duration) -> Result<BridgeSimulator, SimulationError> {
        let bridge = BridgeSimulator::new(url, timeout)?;
        let response = bridge
            .client
            .get(&bridge.api_url)
            .send()
            .await?
            .error_for_status()?;
        let version: APIVersion = serde_json::from_str(&response.text().await?)
            .map_err(|err| SimulationError::Protocol(err.to_string()))?;
        if version.version != API_VERSION {
            return Err(SimulationError::ApiVersion {
                expected: API_VERSION,
                found: version.version,
            });
        }
        log::info!("Connected to simulator at {}", url);
        Ok(bridge)
    }
}

#[async_trait]
impl Simulator for BridgeSimulator {
    async fn world(&mut self) -> Result<Option<WorldSnapshot>, SimulationError> {
        let response = self
            .client
            .get(&self.world_url)
            .send()
            .await?
            .error_for_status()?;
        serde_json::from_str(&response.text().await?)
            .map_err(|err| SimulationError::Protocol(err.to_string()))
    }

    async fn apply_control(&mut self, control: &VehicleControl) -> Result<(), SimulationError> {
        let body = serde_json::to_string(control)
            .map_err(|err| SimulationError::Protocol(err.to_string()))?;
        self.client
            .post(&self.control_url)
            .body(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn tick(&mut self, timeout: Duration) -> Result<(), SimulationError> {
        let request = self
            .client
            .post(&self.tick_url)
            .body(serde_json::to_string(&timeout.as_secs_f64()).unwrap_or_default())
            .send();

        match tokio::time::timeout(timeout, request).await {
            Ok(response) => {
                response?.error_for_status()?;
                Ok(())
            }
            Err(_) => Err(SimulationError::Timeout(timeout)),
        }
    }
}
