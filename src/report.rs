use crate::scenario::{Criterion, Scenario, TestStatus};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs::OpenOptions;
use std::io::prelude::*;
use std::path::Path;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GlobalResult {
    Success,
    Failure,
}

impl std::fmt::Display for GlobalResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GlobalResult::Success => write!(f, "\x1b[92mSUCCESS\x1b[0m"),
            GlobalResult::Failure => write!(f, "\x1b[91mFAILURE\x1b[0m"),
        }
    }
}

/// FAILURE when any criterion failed or the scenario timed out.
pub fn analyze(scenario: &Scenario) -> GlobalResult {
    let failed = scenario
        .criteria()
        .iter()
        .any(|criterion| criterion.test_status != TestStatus::Success);

    if failed || scenario.timed_out() {
        GlobalResult::Failure
    } else {
        GlobalResult::Success
    }
}

/// Outcome of one scenario repetition.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub run_id: Uuid,
    pub scenario: String,
    pub agent: String,
    pub repetition: u32,
    pub result: GlobalResult,
    pub timed_out: bool,
    pub criteria: Vec<Criterion>,
    pub duration_system: f64,
    pub duration_game: f64,
    pub override_frames: u64,
    pub triggering_actors: BTreeSet<String>,
}

impl ScenarioReport {
    /// Game seconds simulated per wall-clock second.
    pub fn ratio(&self) -> f64 {
        if self.duration_system > 0.0 {
            self.duration_game / self.duration_system
        } else {
            0.0
        }
    }

    pub fn print(&self) {
        println!();
        println!(
            "========= Results of {} (repetition {}) ========= {}",
            self.scenario, self.repetition, self.result
        );
        println!("> Agent:              {}", self.agent);
        println!("> Duration (system):  {:.2}s", self.duration_system);
        println!("> Duration (game):    {:.2}s", self.duration_game);
        println!("> Ratio (game/sys):   {:.3}", self.ratio());
        println!("> Guard overrides:    {} frames", self.override_frames);
        if !self.triggering_actors.is_empty() {
            println!("> Triggered by:       {:?}", self.triggering_actors);
        }
        println!();
        println!("{:<24} {:>10} {:>10} {:>10}", "Criterion", "Result", "Actual", "Expected");
        for criterion in &self.criteria {
            println!(
                "{:<24} {:>10} {:>10.1} {:>10.1}",
                criterion.name,
                format!("{:?}", criterion.test_status).to_uppercase(),
                criterion.actual_value,
                criterion.expected_value
            );
        }
        println!(
            "{:<24} {:>10} {:>10.1} {:>10}",
            "Timeout",
            if self.timed_out { "FAILURE" } else { "SUCCESS" },
            self.duration_game,
            "-"
        );
        println!();
    }

    /// Appends the report as one JSON line.
    pub fn append_to<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let content = serde_json::to_string(self)?;
        let mut file = OpenOptions::new()
            .write(true)
            .append(true)
            .create(true)
            .open(path)?;

        writeln!(file, "{}", content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScenarioConfig;

    fn scenario() -> Scenario {
        Scenario::route(&ScenarioConfig {
            name: "straight".to_owned(),
            route_length: 10.0,
            timeout: 5.0,
            repetitions: 1,
        })
    }

    fn report(result: GlobalResult) -> ScenarioReport {
        ScenarioReport {
            run_id: Uuid::new_v4(),
            scenario: "straight".to_owned(),
            agent: "cruise".to_owned(),
            repetition: 0,
            result,
            timed_out: false,
            criteria: scenario().criteria().to_vec(),
            duration_system: 2.0,
            duration_game: 4.0,
            override_frames: 3,
            triggering_actors: ["walker.pedestrian#2".to_owned()].into_iter().collect(),
        }
    }

    #[test]
    fn test_unfinished_criteria_fail_the_run() {
        let scenario = scenario();
        assert_eq!(analyze(&scenario), GlobalResult::Failure);
    }

    #[test]
    fn test_ratio() {
        assert_eq!(report(GlobalResult::Success).ratio(), 2.0);
        let mut idle = report(GlobalResult::Success);
        idle.duration_system = 0.0;
        assert_eq!(idle.ratio(), 0.0);
    }

    #[test]
    fn test_append_writes_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.jsonl");
        report(GlobalResult::Success).append_to(&path).unwrap();
        report(GlobalResult::Failure).append_to(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["result"], "SUCCESS");
        assert_eq!(lines[1]["result"], "FAILURE");
        assert_eq!(lines[0]["criteria"][0]["name"], "CollisionTest");
        assert_eq!(lines[0]["criteria"][0]["test_status"], "INIT");
        assert_eq!(lines[0]["triggering_actors"][0], "walker.pedestrian#2");
    }
}
