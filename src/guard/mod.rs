//! Proximity guard
//!
//! Decides once per frame whether the ego vehicle has to brake because a
//! nearby vehicle or pedestrian entered one of its danger zones.
//!
//! ```rust,ignore
//! use egoguard::guard::{ActorObservation, Pose2D, ProximityGuard, ZoneSpec};
//!
//! let guard = ProximityGuard::new(ZoneSpec::default_set(extent))?;
//! let decision = guard.decide(&ego_pose, &observations);
//! if decision.brake {
//!     control.brake = 1.0;
//! }
//! ```

mod zone;

pub use zone::*;

use crate::math::Vec2;
use std::collections::BTreeSet;
use thiserror::Error;

/// Actors farther away than this are ignored.
pub const DEFAULT_PROXIMITY_RADIUS: f64 = 50.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GuardError {
    #[error("invalid pose ({x}, {y}, {heading_degrees}°): values must be finite")]
    InvalidPose {
        x: f64,
        y: f64,
        heading_degrees: f64,
    },
    #[error("degenerate zone '{name}': {reason}")]
    DegenerateZone { name: String, reason: String },
    #[error("invalid proximity radius {0}")]
    InvalidRadius(f64),
}

/// A nearby actor as seen by the guard. `id` is only carried through for
/// reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct ActorObservation<T> {
    pub id: T,
    pub position: Vec2,
}

impl<T> ActorObservation<T> {
    pub fn new(id: T, position: Vec2) -> ActorObservation<T> {
        ActorObservation { id, position }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardDecision<T: Ord> {
    pub brake: bool,
    pub triggering_actor_ids: BTreeSet<T>,
}

impl<T: Ord> GuardDecision<T> {
    pub fn clear() -> GuardDecision<T> {
        GuardDecision {
            brake: false,
            triggering_actor_ids: BTreeSet::new(),
        }
    }

    /// Brake without naming a culprit, used when the inputs could not be judged.
    pub fn conservative() -> GuardDecision<T> {
        GuardDecision {
            brake: true,
            triggering_actor_ids: BTreeSet::new(),
        }
    }
}

fn evaluate_in<T: Ord + Clone>(
    ego: &Pose2D,
    actors: &[ActorObservation<T>],
    zones: &[ZoneSpec],
    proximity_radius: f64,
    handedness: Handedness,
) -> GuardDecision<T> {
    let origin = ego.position();
    let radius_squared = proximity_radius * proximity_radius;
    let frames: Vec<ZoneFrame> = zones
        .iter()
        .map(|zone| ZoneFrame::new(ego, zone, handedness))
        .collect();

    let mut triggering_actor_ids = BTreeSet::new();
    for actor in actors {
        if !(actor.position.distance_squared(&origin) < radius_squared) {
            continue;
        }
        if frames.iter().any(|frame| frame.contains(actor.position)) {
            triggering_actor_ids.insert(actor.id.clone());
        }
    }

    GuardDecision {
        brake: !triggering_actor_ids.is_empty(),
        triggering_actor_ids,
    }
}

/// Checks every actor within `proximity_radius` of the ego against every zone,
/// in the simulator frame.
pub fn evaluate<T: Ord + Clone>(
    ego: &Pose2D,
    actors: &[ActorObservation<T>],
    zones: &[ZoneSpec],
    proximity_radius: f64,
) -> GuardDecision<T> {
    evaluate_in(ego, actors, zones, proximity_radius, Handedness::Left)
}

/// Validated zone set plus the settings `evaluate` needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ProximityGuard {
    zones: Vec<ZoneSpec>,
    proximity_radius: f64,
    handedness: Handedness,
}

impl ProximityGuard {
    pub fn new(zones: Vec<ZoneSpec>) -> Result<ProximityGuard, GuardError> {
        for zone in &zones {
            zone.validate()?;
        }

        Ok(ProximityGuard {
            zones,
            proximity_radius: DEFAULT_PROXIMITY_RADIUS,
            handedness: Handedness::Left,
        })
    }

    pub fn with_radius(mut self, proximity_radius: f64) -> Result<ProximityGuard, GuardError> {
        if !(proximity_radius.is_finite() && proximity_radius > 0.0) {
            return Err(GuardError::InvalidRadius(proximity_radius));
        }
        self.proximity_radius = proximity_radius;
        Ok(self)
    }

    pub fn with_handedness(mut self, handedness: Handedness) -> ProximityGuard {
        self.handedness = handedness;
        self
    }

    pub fn zones(&self) -> &[ZoneSpec] {
        &self.zones
    }

    pub fn proximity_radius(&self) -> f64 {
        self.proximity_radius
    }

    pub fn evaluate<T: Ord + Clone>(
        &self,
        ego: &Pose2D,
        actors: &[ActorObservation<T>],
    ) -> GuardDecision<T> {
        evaluate_in(
            ego,
            actors,
            &self.zones,
            self.proximity_radius,
            self.handedness,
        )
    }

    pub fn try_evaluate<T: Ord + Clone>(
        &self,
        ego: &Pose2D,
        actors: &[ActorObservation<T>],
    ) -> Result<GuardDecision<T>, GuardError> {
        if !ego.is_finite() {
            return Err(GuardError::InvalidPose {
                x: ego.x,
                y: ego.y,
                heading_degrees: ego.heading_degrees,
            });
        }
        Ok(self.evaluate(ego, actors))
    }

    /// Like `try_evaluate`, but an unusable frame brakes instead of failing.
    pub fn decide<T: Ord + Clone>(
        &self,
        ego: &Pose2D,
        actors: &[ActorObservation<T>],
    ) -> GuardDecision<T> {
        match self.try_evaluate(ego, actors) {
            Ok(decision) => decision,
            Err(err) => {
                log::warn!("Proximity guard cannot judge this frame, braking: {}", err);
                GuardDecision::conservative()
            }
        }
    }
}
