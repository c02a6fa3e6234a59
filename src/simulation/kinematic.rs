//! In-process world with a kinematic bicycle model for the ego vehicle and
//! constant-velocity traffic. Used for offline runs and tests.

use crate::control::VehicleControl;
use crate::guard::Pose2D;
use crate::math::{normalize_degrees, Vec2};
use crate::simulation::*;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

const EGO_ID: u32 = 1;
const WHEELBASE: f64 = 2.9;
const MAX_STEER_DEGREES: f64 = 35.0;
const MAX_ACCELERATION: f64 = 3.5;
const MAX_DECELERATION: f64 = 8.0;
const DRAG: f64 = 0.05;

/// Traffic participant placed in the world at start.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct TrafficActor {
    pub type_id: String,
    pub kind: ActorKind,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub heading_degrees: f64,
    #[serde(default)]
    pub speed: f64,
}

/// Scatters `count` actors along the +x axis between 15 and `route_length`
/// meters, laterally distributed around the lane.
pub fn random_traffic(
    seed: u64,
    count: usize,
    route_length: f64,
    lateral_spread: f64,
) -> Result<Vec<TrafficActor>, SimulationError> {
    let lateral = Normal::new(0.0, lateral_spread)
        .map_err(|err| SimulationError::InvalidTraffic(err.to_string()))?;
    if !(route_length > 15.0) {
        return Err(SimulationError::InvalidTraffic(format!(
            "route of {} m is too short for traffic",
            route_length
        )));
    }
    let mut rng = StdRng::seed_from_u64(seed);

    Ok((0..count)
        .map(|index| {
            let walker = rng.gen_bool(0.3);
            TrafficActor {
                type_id: if walker {
                    "walker.pedestrian".to_owned()
                } else {
                    "vehicle.sedan".to_owned()
                },
                kind: if walker {
                    ActorKind::Walker
                } else {
                    ActorKind::Vehicle
                },
                x: rng.gen_range(15.0..route_length),
                y: lateral.sample(&mut rng),
                heading_degrees: if walker { 90.0 } else { 0.0 },
                speed: if walker {
                    rng.gen_range(0.5..1.5)
                } else {
                    rng.gen_range(0.0..4.0) + (index % 2) as f64
                },
            }
        })
        .collect())
}

pub struct KinematicWorld {
    timestamp: Timestamp,
    ego: ActorState,
    control: VehicleControl,
    actors: Vec<ActorState>,
    collisions: u32,
    in_contact: BTreeSet<u32>,
}

impl KinematicWorld {
    pub fn new(ego_pose: Pose2D, ego_extent: Vec2, delta_seconds: f64) -> KinematicWorld {
        KinematicWorld {
            timestamp: Timestamp {
                frame: 0,
                elapsed_seconds: 0.0,
                delta_seconds,
            },
            ego: ActorState {
                id: EGO_ID,
                type_id: "vehicle.ego".to_owned(),
                kind: ActorKind::Vehicle,
                alive: true,
                pose: ego_pose,
                extent: ego_extent,
                speed: 0.0,
            },
            control: VehicleControl::default(),
            actors: Vec::new(),
            collisions: 0,
            in_contact: BTreeSet::new(),
        }
    }

    pub fn spawn(&mut self, traffic: &TrafficActor) -> u32 {
        let id = EGO_ID + 1 + self.actors.len() as u32;
        let extent = match traffic.kind {
            ActorKind::Walker => Vec2::new(0.3, 0.3),
            _ => Vec2::new(2.3, 1.0),
        };
        self.actors.push(ActorState {
            id,
            type_id: traffic.type_id.clone(),
            kind: traffic.kind,
            alive: true,
            pose: Pose2D::new(traffic.x, traffic.y, traffic.heading_degrees),
            extent,
            speed: traffic.speed,
        });
        id
    }

    pub fn with_traffic(mut self, traffic: &[TrafficActor]) -> KinematicWorld {
        for actor in traffic {
            self.spawn(actor);
        }
        self
    }

    pub fn ego(&self) -> &ActorState {
        &self.ego
    }

    pub fn last_control(&self) -> &VehicleControl {
        &self.control
    }

    fn snapshot(&self) -> WorldSnapshot {
        let mut actors = Vec::with_capacity(self.actors.len() + 1);
        actors.push(self.ego.clone());
        actors.extend(self.actors.iter().cloned());

        WorldSnapshot {
            timestamp: self.timestamp,
            ego: self.ego.clone(),
            actors,
            collisions: self.collisions,
        }
    }

    fn step_ego(&mut self, dt: f64) {
        let control = &self.control;
        let acceleration = if control.reverse {
            -control.throttle * MAX_ACCELERATION
        } else {
            control.throttle * MAX_ACCELERATION
        };
        let braking = if control.hand_brake {
            MAX_DECELERATION
        } else {
            control.brake * MAX_DECELERATION
        };

        let speed = self.ego.speed;
        let mut next = speed + (acceleration - DRAG * speed) * dt;
        // Braking only ever pulls the speed towards zero.
        if next > 0.0 {
            next = (next - braking * dt).max(0.0);
        } else {
            next = (next + braking * dt).min(0.0);
        }

        let steer_angle = (control.steer * MAX_STEER_DEGREES).to_radians();
        let yaw_rate = (next / WHEELBASE) * steer_angle.tan();

        let pose = &mut self.ego.pose;
        pose.heading_degrees = normalize_degrees(pose.heading_degrees + yaw_rate.to_degrees() * dt);
        let position = pose.position() + Vec2::from_heading_degrees(pose.heading_degrees) * (next * dt);
        pose.x = position.x;
        pose.y = position.y;
        self.ego.speed = next;
    }

    fn step_traffic(&mut self, dt: f64) {
        for actor in self.actors.iter_mut().filter(|actor| actor.alive) {
            let position = actor.pose.position()
                + Vec2::from_heading_degrees(actor.pose.heading_degrees) * (actor.speed * dt);
            actor.pose.x = position.x;
            actor.pose.y = position.y;
        }
    }

    fn detect_collisions(&mut self) {
        let ego_position = self.ego.pose.position();
        let ego_radius = self.ego.extent.x.max(self.ego.extent.y);

        for actor in self.actors.iter().filter(|actor| actor.alive) {
            let reach = ego_radius + actor.extent.x.max(actor.extent.y);
            let touching = actor.pose.position().distance_squared(&ego_position) < reach * reach;
            if touching {
                if self.in_contact.insert(actor.id) {
                    log::debug!("Ego collided with {}", actor.label());
                    self.collisions += 1;
                }
            } else {
                self.in_contact.remove(&actor.id);
            }
        }
    }
}

#[async_trait]
impl Simulator for KinematicWorld {
    async fn world(&mut self) -> Result<Option<WorldSnapshot>, SimulationError> {
        Ok(Some(self.snapshot()))
    }

    async fn apply_control(&mut self, control: &VehicleControl) -> Result<(), SimulationError> {
        self.control = control.clone().clamped();
        Ok(())
    }

    async fn tick(&mut self, _timeout: Duration) -> Result<(), SimulationError> {
        let dt = self.timestamp.delta_seconds;
        self.step_ego(dt);
        self.step_traffic(dt);
        self.detect_collisions();

        self.timestamp.frame += 1;
        self.timestamp.elapsed_seconds += dt;
        Ok(())
    }
}
