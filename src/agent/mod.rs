//! The vehicle controller under test.
//!
//! The manager hands the agent one [`AgentInput`] per frame and expects a
//! [`VehicleControl`] back. Missing sensor data is reported separately from
//! any other failure so the host can tell the harness apart from the agent.

use crate::control::VehicleControl;
use crate::guard::Pose2D;
use crate::simulation::ActorState;
use serde::Serialize;
use thiserror::Error;

pub mod cruise;

pub use cruise::CruiseAgent;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("sensor delivered no data: {0}")]
    NoSensorData(String),
    #[error("agent failed: {0}")]
    Failure(String),
}

/// Perception snapshot for one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentInput {
    pub frame: u64,
    pub game_time: f64,
    pub throttle: f64,
    pub steer: f64,
    pub brake: f64,
    pub collisions: u32,
    /// Actors currently inside a danger zone.
    pub actors: Vec<String>,
    pub ego: Pose2D,
    pub speed: Option<f64>,
}

pub trait AutonomousAgent: Send {
    fn name(&self) -> &str;

    /// Called once the ego vehicle exists, before the first frame.
    fn setup(&mut self, _ego: &ActorState, _debug: bool) {}

    fn run_step(&mut self, input: &AgentInput) -> Result<VehicleControl, AgentError>;

    fn cleanup(&mut self) {}
}
