use crate::behavior::ScenarioBlackboard;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TestStatus {
    Init,
    Running,
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CriterionKind {
    /// At most `expected_value` collisions.
    Collision,
    /// Percentage of the route covered, out of `expected_value`.
    RouteCompletion { route_length: f64 },
}

/// Pass/fail check evaluated alongside the scenario tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Criterion {
    pub name: String,
    pub kind: CriterionKind,
    pub expected_value: f64,
    pub actual_value: f64,
    pub test_status: TestStatus,
}

impl Criterion {
    pub fn collision_test() -> Criterion {
        Criterion {
            name: "CollisionTest".to_owned(),
            kind: CriterionKind::Collision,
            expected_value: 0.0,
            actual_value: 0.0,
            test_status: TestStatus::Init,
        }
    }

    pub fn route_completion_test(route_length: f64) -> Criterion {
        Criterion {
            name: "RouteCompletionTest".to_owned(),
            kind: CriterionKind::RouteCompletion { route_length },
            expected_value: 100.0,
            actual_value: 0.0,
            test_status: TestStatus::Init,
        }
    }

    pub fn update(&mut self, blackboard: &ScenarioBlackboard) {
        match self.kind {
            CriterionKind::Collision => {
                self.actual_value = blackboard.collisions as f64;
                if self.actual_value > self.expected_value {
                    self.test_status = TestStatus::Failure;
                } else if self.test_status != TestStatus::Failure {
                    self.test_status = TestStatus::Running;
                }
            }
            CriterionKind::RouteCompletion { route_length } => {
                self.actual_value = (100.0 * blackboard.travelled / route_length).min(100.0);
                if self.test_status == TestStatus::Init {
                    self.test_status = TestStatus::Running;
                }
            }
        }
    }

    /// Settles a criterion that was still running when the scenario ended.
    pub fn terminate(&mut self) {
        if self.test_status == TestStatus::Failure {
            return;
        }
        let passed = match self.kind {
            CriterionKind::Collision => self.actual_value <= self.expected_value,
            CriterionKind::RouteCompletion { .. } => self.actual_value >= self.expected_value,
        };
        self.test_status = if passed {
            TestStatus::Success
        } else {
            TestStatus::Failure
        };
    }
}
