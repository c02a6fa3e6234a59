//! Danger zone geometry.
//!
//! A zone is an oriented strip that starts at the ego position and extends
//! `forward_distance` along `heading + relative_angle`, `half_width` to each
//! side. Every boundary is kept as a directed line and a target is classified
//! by the sign of a 2D cross product, so no angle makes the test singular.

use crate::math::{normalize_degrees, Vec2};
use serde::{Deserialize, Serialize};

use super::GuardError;

/// Ground position and yaw of an actor for one frame.
#[derive(Debug, PartialEq, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Pose2D {
    pub x: f64,
    pub y: f64,
    pub heading_degrees: f64,
}

impl Pose2D {
    pub fn new(x: f64, y: f64, heading_degrees: f64) -> Pose2D {
        Pose2D {
            x,
            y,
            heading_degrees,
        }
    }

    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.heading_degrees.is_finite()
    }
}

/// Orientation of the world frame the poses are expressed in.
///
/// Relative zone angles always count positive towards the ego's right-hand
/// side. The simulator frame is left-handed (x forward, y right, yaw
/// clockwise seen from above), so there the zone direction is
/// `heading + relative`. In a right-handed frame it is `heading - relative`.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Handedness {
    #[default]
    Left,
    Right,
}

impl Handedness {
    pub fn zone_heading(&self, ego_heading: f64, relative_angle: f64) -> f64 {
        match self {
            Handedness::Left => ego_heading + relative_angle,
            Handedness::Right => ego_heading - relative_angle,
        }
    }
}

/// Static description of one danger zone relative to the ego heading.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ZoneSpec {
    pub name: String,
    pub relative_angle_degrees: f64,
    pub forward_distance: f64,
    pub half_width: f64,
}

impl ZoneSpec {
    pub fn new(
        name: &str,
        relative_angle_degrees: f64,
        forward_distance: f64,
        half_width: f64,
    ) -> ZoneSpec {
        ZoneSpec {
            name: name.to_owned(),
            relative_angle_degrees,
            forward_distance,
            half_width,
        }
    }

    /// Front, left and right zones sized from the ego bounding box half extent.
    pub fn default_set(ego_extent: Vec2) -> Vec<ZoneSpec> {
        vec![
            ZoneSpec::new("front", 0.0, 10.0, ego_extent.x),
            ZoneSpec::new("left", -90.0, 3.0, ego_extent.y * 2.0),
            ZoneSpec::new("right", 90.0, 3.0, ego_extent.y * 2.0),
        ]
    }

    pub fn validate(&self) -> Result<(), GuardError> {
        if !self.relative_angle_degrees.is_finite() {
            return Err(GuardError::DegenerateZone {
                name: self.name.clone(),
                reason: "relative angle is not finite".to_owned(),
            });
        }
        if !(self.forward_distance.is_finite() && self.forward_distance > 0.0) {
            return Err(GuardError::DegenerateZone {
                name: self.name.clone(),
                reason: format!(
                    "forward distance must be positive, got {}",
                    self.forward_distance
                ),
            });
        }
        if !(self.half_width.is_finite() && self.half_width > 0.0) {
            return Err(GuardError::DegenerateZone {
                name: self.name.clone(),
                reason: format!("half width must be positive, got {}", self.half_width),
            });
        }
        Ok(())
    }
}

/// Line through `point` running along `direction`.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct DirectedLine {
    pub point: Vec2,
    pub direction: Vec2,
}

impl DirectedLine {
    /// Signed side of `target`: positive on the left of the direction,
    /// negative on the right, zero on the line.
    pub fn side(&self, target: Vec2) -> f64 {
        self.direction.cross(&(target - self.point))
    }
}

/// Zone boundaries for one pose. Built fresh for every evaluation.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct ZoneFrame {
    pub origin: Vec2,
    pub direction: Vec2,
    pub apex: Vec2,
    /// Apex shifted by `+half_width` along the direction rotated by +90°.
    /// On the ego's right in the left-handed frame, on its left in the
    /// right-handed one.
    pub corner_ccw: Vec2,
    /// Mirror of `corner_ccw` across the zone axis.
    pub corner_cw: Vec2,
}

impl ZoneFrame {
    pub fn new(ego: &Pose2D, zone: &ZoneSpec, handedness: Handedness) -> ZoneFrame {
        let theta = normalize_degrees(
            handedness.zone_heading(ego.heading_degrees, zone.relative_angle_degrees),
        );
        let origin = ego.position();
        let direction = Vec2::from_heading_degrees(theta);
        let normal = direction.perpendicular();
        let apex = origin + direction * zone.forward_distance;

        ZoneFrame {
            origin,
            direction,
            apex,
            corner_ccw: apex + normal * zone.half_width,
            corner_cw: apex - normal * zone.half_width,
        }
    }

    pub fn back_line(&self) -> DirectedLine {
        DirectedLine {
            point: self.origin,
            direction: self.direction.perpendicular(),
        }
    }

    pub fn front_line(&self) -> DirectedLine {
        DirectedLine {
            point: self.apex,
            direction: self.direction.perpendicular(),
        }
    }

    pub fn lateral_lines(&self) -> (DirectedLine, DirectedLine) {
        (
            DirectedLine {
                point: self.corner_ccw,
                direction: self.direction,
            },
            DirectedLine {
                point: self.corner_cw,
                direction: self.direction,
            },
        )
    }

    /// The back line is exclusive, the front line inclusive (the apex is
    /// inside), the lateral lines exclusive.
    pub fn contains(&self, target: Vec2) -> bool {
        let back = self.back_line().side(target);
        let front = self.front_line().side(target);
        let longitudinal = back != 0.0 && back * front <= 0.0;

        let (left, right) = self.lateral_lines();
        let lateral = left.side(target) * right.side(target) < 0.0;

        longitudinal && lateral
    }
}

/// Whether `target` lies in `zone` for an ego in the simulator frame.
pub fn contains(ego: &Pose2D, zone: &ZoneSpec, target: Vec2) -> bool {
    ZoneFrame::new(ego, zone, Handedness::Left).contains(target)
}
