use crate::behavior::bt::*;
use crate::behavior::ScenarioBlackboard;

/// Fails its subtree once the game time passes `limit` seconds and flags the
/// blackboard so the result analysis can tell a timeout from other failures.
pub struct BTTimeout {
    limit: f64,
    node: BoxedNode<ScenarioBlackboard>,
}

impl BTTimeout {
    pub fn new(limit: f64, node: BoxedNode<ScenarioBlackboard>) -> Box<BTTimeout> {
        Box::new(BTTimeout { limit, node })
    }
}

impl BTNode<ScenarioBlackboard> for BTTimeout {
    fn name(&self) -> &str {
        "Timeout"
    }

    fn tick(&mut self, blackboard: &mut Box<ScenarioBlackboard>) -> BTResult {
        if blackboard.game_time > self.limit {
            log::info!("Scenario timed out after {:.1}s", blackboard.game_time);
            blackboard.timed_out = true;
            return BTResult::Failure;
        }

        self.node.tick(blackboard)
    }
}
