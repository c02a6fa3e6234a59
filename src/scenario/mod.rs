//! Route scenario: behavior tree plus the criteria judged at the end.

use crate::behavior::bt::{BTAction, BTResult, BTSequence, BehaviorTree, BoxedNode};
use crate::behavior::{stop_at_goal, BTDriveRoute, BTTimeout, ScenarioBlackboard};
use crate::config::ScenarioConfig;
use crate::simulation::WorldSnapshot;

pub mod criteria;

pub use criteria::{Criterion, CriterionKind, TestStatus};

pub struct Scenario {
    name: String,
    tree: BehaviorTree<ScenarioBlackboard>,
    criteria: Vec<Criterion>,
}

impl Scenario {
    /// Drive `route_length` meters, come to a stop, within `timeout` game seconds.
    pub fn route(config: &ScenarioConfig) -> Scenario {
        let route: BoxedNode<ScenarioBlackboard> = Box::new(BTSequence::new(
            "Route",
            vec![
                BTDriveRoute::new(config.route_length) as BoxedNode<ScenarioBlackboard>,
                Box::new(BTAction::new("StopAtGoal", stop_at_goal)),
            ],
        ));

        Scenario {
            name: config.name.clone(),
            tree: BehaviorTree::new(
                BTTimeout::new(config.timeout, route),
                Box::new(ScenarioBlackboard::default()),
            ),
            criteria: vec![
                Criterion::collision_test(),
                Criterion::route_completion_test(config.route_length),
            ],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Feeds the frame's world state to the blackboard and the criteria.
    pub fn update(&mut self, game_time: f64, world: &WorldSnapshot) {
        self.tree.blackboard_mut().observe(game_time, world);
        let blackboard = self.tree.blackboard();
        for criterion in self.criteria.iter_mut() {
            criterion.update(blackboard);
        }
    }

    pub fn tick_once(&mut self) -> BTResult {
        self.tree.tick()
    }

    pub fn status(&self) -> BTResult {
        self.tree.status()
    }

    pub fn blackboard(&self) -> &ScenarioBlackboard {
        self.tree.blackboard()
    }

    pub fn criteria(&self) -> &[Criterion] {
        &self.criteria
    }

    pub fn timed_out(&self) -> bool {
        self.tree.blackboard().timed_out
    }

    pub fn terminate(&mut self) {
        for criterion in self.criteria.iter_mut() {
            criterion.terminate();
        }
    }
}
