use crate::guard::GuardDecision;
use crate::math::clamp;
use serde::{Deserialize, Serialize};

pub const MAX_BRAKE: f64 = 1.0;

/// Command sent to the ego vehicle each frame.
#[derive(Debug, PartialEq, Clone, Default, Serialize, Deserialize)]
pub struct VehicleControl {
    pub throttle: f64,
    pub steer: f64,
    pub brake: f64,
    #[serde(default)]
    pub hand_brake: bool,
    #[serde(default)]
    pub reverse: bool,
}

impl VehicleControl {
    /// Clamps every axis into the range the vehicle accepts.
    pub fn clamped(mut self) -> VehicleControl {
        self.throttle = clamp(self.throttle, 0.0, 1.0);
        self.steer = clamp(self.steer, -1.0, 1.0);
        self.brake = clamp(self.brake, 0.0, MAX_BRAKE);
        self
    }
}

/// Forces full braking when the guard asks for it. Throttle and steer stay as
/// the agent left them.
pub fn apply_override<T: Ord>(
    mut control: VehicleControl,
    decision: &GuardDecision<T>,
) -> VehicleControl {
    if decision.brake {
        control.brake = MAX_BRAKE;
    }
    control
}
