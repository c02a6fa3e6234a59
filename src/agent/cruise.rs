use crate::agent::*;
use crate::math::{clamp, lerp, Vec2};

const SPEED_GAIN: f64 = 0.4;
const LATERAL_GAIN: f64 = 0.08;
const HEADING_GAIN: f64 = 0.02;
const STEER_SMOOTHING: f64 = 0.5;

/// Holds a target speed and keeps the ego on the line `y = lane_y`. With a
/// route length set it brakes to a stop once its odometer reaches it.
pub struct CruiseAgent {
    target_speed: f64,
    route_length: Option<f64>,
    lane_y: f64,
    steer: f64,
    odometer: f64,
    last_position: Option<Vec2>,
    debug: bool,
}

impl CruiseAgent {
    pub fn new(target_speed: f64) -> CruiseAgent {
        CruiseAgent {
            target_speed,
            route_length: None,
            lane_y: 0.0,
            steer: 0.0,
            odometer: 0.0,
            last_position: None,
            debug: false,
        }
    }

    pub fn with_route(mut self, route_length: f64) -> CruiseAgent {
        self.route_length = Some(route_length);
        self
    }

    fn route_done(&self) -> bool {
        matches!(self.route_length, Some(length) if self.odometer >= length)
    }
}

fn heading_error(heading_degrees: f64) -> f64 {
    let wrapped = heading_degrees.rem_euclid(360.0);
    if wrapped > 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

impl AutonomousAgent for CruiseAgent {
    fn name(&self) -> &str {
        "cruise"
    }

    fn setup(&mut self, ego: &ActorState, debug: bool) {
        self.lane_y = ego.pose.y;
        self.odometer = 0.0;
        self.last_position = None;
        self.debug = debug;
    }

    fn run_step(&mut self, input: &AgentInput) -> Result<VehicleControl, AgentError> {
        let speed = input
            .speed
            .ok_or_else(|| AgentError::NoSensorData("speedometer".to_owned()))?;
        if !speed.is_finite() || !input.ego.is_finite() {
            return Err(AgentError::Failure(format!(
                "cannot drive from state {:?} at {} m/s",
                input.ego, speed
            )));
        }

        let position = input.ego.position();
        if let Some(last) = self.last_position {
            self.odometer += (position - last).magnitude();
        }
        self.last_position = Some(position);

        let target_speed = if self.route_done() {
            0.0
        } else {
            self.target_speed
        };
        let speed_error = target_speed - speed;
        let (throttle, brake) = if speed_error >= 0.0 {
            (clamp(speed_error * SPEED_GAIN, 0.0, 1.0), 0.0)
        } else {
            (0.0, clamp(-speed_error * SPEED_GAIN, 0.0, 1.0))
        };

        // Positive steer turns clockwise, towards +y.
        let lateral = input.ego.y - self.lane_y;
        let desired = clamp(
            -(LATERAL_GAIN * lateral + HEADING_GAIN * heading_error(input.ego.heading_degrees)),
            -1.0,
            1.0,
        );
        self.steer = lerp(self.steer, desired, STEER_SMOOTHING);

        if self.debug {
            log::debug!(
                "cruise: speed {:.2} throttle {:.2} brake {:.2} steer {:.2} zones {:?}",
                speed,
                throttle,
                brake,
                self.steer,
                input.actors
            );
        }

        Ok(VehicleControl {
            throttle,
            steer: self.steer,
            brake,
            ..Default::default()
        })
    }
}
