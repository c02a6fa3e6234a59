//! Scenario behavior: the blackboard the scenario tree reads and the route
//! nodes built on top of the generic tree in [`bt`].

use crate::guard::Pose2D;
use crate::math::Vec2;
use crate::simulation::WorldSnapshot;

pub mod bt;
pub mod drive_route;
pub mod timeout;

pub use drive_route::BTDriveRoute;
pub use timeout::BTTimeout;

const STOPPED_SPEED: f64 = 0.1;

/// World facts the scenario tree and its criteria work from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScenarioBlackboard {
    pub game_time: f64,
    pub ego: Pose2D,
    pub ego_speed: f64,
    pub collisions: u32,
    pub travelled: f64,
    pub timed_out: bool,
    last_position: Option<Vec2>,
}

impl ScenarioBlackboard {
    pub fn observe(&mut self, game_time: f64, world: &WorldSnapshot) {
        let position = world.ego.pose.position();
        if let Some(last) = self.last_position {
            self.travelled += (position - last).magnitude();
        }
        self.last_position = Some(position);

        self.game_time = game_time;
        self.ego = world.ego.pose;
        self.ego_speed = world.ego.speed;
        self.collisions = world.collisions;
    }

    pub fn is_stopped(&self) -> bool {
        self.ego_speed.abs() < STOPPED_SPEED
    }
}

pub fn stop_at_goal(blackboard: &mut Box<ScenarioBlackboard>) -> bt::BTResult {
    if blackboard.is_stopped() {
        bt::BTResult::Success
    } else {
        bt::BTResult::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::{ActorKind, ActorState, Timestamp};

    fn world_at(x: f64, y: f64, speed: f64, collisions: u32) -> WorldSnapshot {
        let ego = ActorState {
            id: 1,
            type_id: "vehicle.ego".to_owned(),
            kind: ActorKind::Vehicle,
            alive: true,
            pose: Pose2D::new(x, y, 0.0),
            extent: Vec2::new(2.4, 1.0),
            speed,
        };
        WorldSnapshot {
            timestamp: Timestamp::default(),
            actors: vec![ego.clone()],
            ego,
            collisions,
        }
    }

    #[test]
    fn test_observe_accumulates_distance() {
        let mut blackboard = ScenarioBlackboard::default();
        blackboard.observe(0.0, &world_at(0.0, 0.0, 5.0, 0));
        assert_eq!(blackboard.travelled, 0.0);
        blackboard.observe(0.1, &world_at(3.0, 4.0, 5.0, 0));
        blackboard.observe(0.2, &world_at(6.0, 8.0, 0.0, 1));
        assert_eq!(blackboard.travelled, 10.0);
        assert_eq!(blackboard.collisions, 1);
        assert!(blackboard.is_stopped());

        let mut boxed = Box::new(blackboard);
        assert_eq!(stop_at_goal(&mut boxed), bt::BTResult::Success);
    }
}
