use crate::behavior::bt::*;
use crate::behavior::ScenarioBlackboard;

/// Succeeds once the ego has covered the route length.
pub struct BTDriveRoute {
    route_length: f64,
}

impl BTDriveRoute {
    pub fn new(route_length: f64) -> Box<BTDriveRoute> {
        Box::new(BTDriveRoute { route_length })
    }
}

impl BTNode<ScenarioBlackboard> for BTDriveRoute {
    fn name(&self) -> &str {
        "DriveRoute"
    }

    fn tick(&mut self, blackboard: &mut Box<ScenarioBlackboard>) -> BTResult {
        if blackboard.travelled >= self.route_length {
            BTResult::Success
        } else {
            BTResult::Pending
        }
    }
}
