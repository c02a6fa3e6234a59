//! World access for the scenario loop.
//!
//! The manager only talks to the simulator through [`Simulator`]. Two backends
//! exist: an in-process kinematic world and, with the `simulation` feature, an
//! HTTP bridge to an external simulator.

use crate::control::VehicleControl;
use crate::guard::{ActorObservation, Pose2D};
use crate::math::Vec2;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub mod kinematic;

#[cfg(feature = "simulation")]
pub mod bridge;

pub use kinematic::KinematicWorld;

#[cfg(feature = "simulation")]
pub use bridge::BridgeSimulator;

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("simulator request failed: {0}")]
    Http(String),
    #[error("simulator sent an unexpected response: {0}")]
    Protocol(String),
    #[error("simulator API version {found} does not match expected {expected}")]
    ApiVersion { expected: u32, found: u32 },
    #[error("simulator did not tick within {0:?}")]
    Timeout(Duration),
    #[error("invalid traffic setup: {0}")]
    InvalidTraffic(String),
}

#[cfg(feature = "simulation")]
impl From<reqwest::Error> for SimulationError {
    fn from(err: reqwest::Error) -> SimulationError {
        SimulationError::Http(err.to_string())
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorKind {
    Vehicle,
    Walker,
    Other,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ActorState {
    pub id: u32,
    pub type_id: String,
    pub kind: ActorKind,
    pub alive: bool,
    pub pose: Pose2D,
    /// Bounding box half extent, x along the heading.
    pub extent: Vec2,
    #[serde(default)]
    pub speed: f64,
}

impl ActorState {
    /// Label used in guard decisions and logs.
    pub fn label(&self) -> String {
        format!("{}#{}", self.type_id, self.id)
    }
}

#[derive(Debug, PartialEq, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Timestamp {
    pub frame: u64,
    pub elapsed_seconds: f64,
    pub delta_seconds: f64,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub timestamp: Timestamp,
    pub ego: ActorState,
    pub actors: Vec<ActorState>,
    /// Collisions the ego suffered since the world was created.
    #[serde(default)]
    pub collisions: u32,
}

impl WorldSnapshot {
    /// Live vehicles and walkers within `radius` of the ego, ego excluded.
    pub fn nearby_observations(&self, radius: f64) -> Vec<ActorObservation<String>> {
        let origin = self.ego.pose.position();
        let radius_squared = radius * radius;

        self.actors
            .iter()
            .filter(|actor| actor.id != self.ego.id && actor.alive)
            .filter(|actor| matches!(actor.kind, ActorKind::Vehicle | ActorKind::Walker))
            .filter(|actor| actor.pose.position().distance_squared(&origin) < radius_squared)
            .map(|actor| ActorObservation::new(actor.label(), actor.pose.position()))
            .collect()
    }
}

#[async_trait]
pub trait Simulator: Send {
    /// Current world state, `None` while the world is not available yet.
    async fn world(&mut self) -> Result<Option<WorldSnapshot>, SimulationError>;

    async fn apply_control(&mut self, control: &VehicleControl) -> Result<(), SimulationError>;

    /// Advances the world by one frame.
    async fn tick(&mut self, timeout: Duration) -> Result<(), SimulationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(id: u32, kind: ActorKind, alive: bool, x: f64, y: f64) -> ActorState {
        ActorState {
            id,
            type_id: match kind {
                ActorKind::Vehicle => "vehicle.sedan".to_owned(),
                ActorKind::Walker => "walker.pedestrian".to_owned(),
                ActorKind::Other => "static.prop".to_owned(),
            },
            kind,
            alive,
            pose: Pose2D::new(x, y, 0.0),
            extent: Vec2::new(1.0, 0.5),
            speed: 0.0,
        }
    }

    #[test]
    fn test_nearby_observations_filters_like_the_host() {
        let ego = actor(1, ActorKind::Vehicle, true, 0.0, 0.0);
        let snapshot = WorldSnapshot {
            timestamp: Timestamp::default(),
            actors: vec![
                ego.clone(),
                actor(2, ActorKind::Vehicle, true, 5.0, 0.0),
                actor(3, ActorKind::Walker, true, 0.0, 20.0),
                actor(4, ActorKind::Vehicle, false, 3.0, 0.0),
                actor(5, ActorKind::Other, true, 2.0, 0.0),
                actor(6, ActorKind::Walker, true, 80.0, 0.0),
            ],
            ego,
            collisions: 0,
        };

        let ids: Vec<String> = snapshot
            .nearby_observations(50.0)
            .into_iter()
            .map(|observation| observation.id)
            .collect();
        assert_eq!(ids, vec!["vehicle.sedan#2", "walker.pedestrian#3"]);
    }

    #[test]
    fn test_snapshot_json() {
        let json = r#"{
            "timestamp": {"frame": 3, "elapsed_seconds": 0.15, "delta_seconds": 0.05},
            "ego": {"id": 7, "type_id": "vehicle.ego", "kind": "vehicle", "alive": true,
                    "pose": {"x": 1.0, "y": 2.0, "heading_degrees": 90.0},
                    "extent": {"x": 2.4, "y": 1.0}},
            "actors": []
        }"#;
        let snapshot: WorldSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.timestamp.frame, 3);
        assert_eq!(snapshot.ego.pose.heading_degrees, 90.0);
        assert_eq!(snapshot.collisions, 0);
        assert_eq!(snapshot.ego.speed, 0.0);
    }
}
