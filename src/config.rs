use crate::guard::{GuardError, Handedness, Pose2D, ProximityGuard, ZoneSpec, DEFAULT_PROXIMITY_RADIUS};
use crate::math::Vec2;
use crate::simulation::kinematic::TrafficActor;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error(transparent)]
    Guard(#[from] GuardError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

fn default_timeout() -> f64 {
    10.0
}

fn default_delta() -> f64 {
    0.05
}

fn default_radius() -> f64 {
    DEFAULT_PROXIMITY_RADIUS
}

fn default_repetitions() -> u32 {
    1
}

fn default_results() -> String {
    "results.jsonl".to_owned()
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Simulation {
    pub url: String,
    pub port: u32,
    /// Seconds a world tick may take.
    #[serde(default = "default_timeout")]
    pub timeout: f64,
    /// Run against the in-process kinematic world instead of the bridge.
    #[serde(default)]
    pub offline: bool,
    /// Frame length of the kinematic world.
    #[serde(default = "default_delta")]
    pub delta_seconds: f64,
}

impl Simulation {
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.url.trim_end_matches('/'), self.port)
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Guard {
    #[serde(default = "default_radius")]
    pub proximity_radius: f64,
    #[serde(default)]
    pub handedness: Handedness,
    /// Explicit zones. When absent the front/left/right set is sized from the
    /// ego bounding box.
    #[serde(default)]
    pub zones: Option<Vec<ZoneSpec>>,
}

impl Default for Guard {
    fn default() -> Self {
        Guard {
            proximity_radius: DEFAULT_PROXIMITY_RADIUS,
            handedness: Handedness::default(),
            zones: None,
        }
    }
}

impl Guard {
    pub fn build(&self, ego_extent: Vec2) -> Result<ProximityGuard, GuardError> {
        let zones = match &self.zones {
            Some(zones) => zones.clone(),
            None => ZoneSpec::default_set(ego_extent),
        };
        Ok(ProximityGuard::new(zones)?
            .with_radius(self.proximity_radius)?
            .with_handedness(self.handedness))
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub name: String,
    pub route_length: f64,
    /// Game seconds before the scenario counts as timed out.
    pub timeout: f64,
    #[serde(default = "default_repetitions")]
    pub repetitions: u32,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub target_speed: f64,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Ego {
    pub extent: Vec2,
    #[serde(default)]
    pub start: Pose2D,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct RandomTraffic {
    pub seed: u64,
    pub count: usize,
    pub lateral_spread: f64,
}

#[derive(Debug, PartialEq, Clone, Default, Serialize, Deserialize)]
pub struct Traffic {
    #[serde(default)]
    pub actors: Vec<TrafficActor>,
    #[serde(default)]
    pub random: Option<RandomTraffic>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Config {
    pub simulation: Simulation,
    #[serde(default)]
    pub guard: Guard,
    pub scenario: ScenarioConfig,
    pub agent: AgentConfig,
    pub ego: Ego,
    #[serde(default)]
    pub traffic: Traffic,

    #[serde(default = "bool::default")]
    pub debug: bool,
    #[serde(default = "default_results")]
    pub results: String,
}

impl Config {
    pub fn from_yaml(content: &str) -> Result<Config, ConfigError> {
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        Config::from_yaml(&fs::read_to_string(path)?)
    }

    /// Catches configuration mistakes up front instead of per frame.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.ego.extent.x > 0.0 && self.ego.extent.y > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "ego extent must be positive, got {:?}",
                self.ego.extent
            )));
        }
        self.guard.build(self.ego.extent)?;

        if !(self.simulation.timeout > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "simulation timeout must be positive, got {}",
                self.simulation.timeout
            )));
        }
        if !(self.simulation.delta_seconds > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "frame length must be positive, got {}",
                self.simulation.delta_seconds
            )));
        }
        if !(self.scenario.route_length > 0.0 && self.scenario.timeout > 0.0) {
            return Err(ConfigError::Invalid(
                "scenario route length and timeout must be positive".to_owned(),
            ));
        }
        if self.scenario.repetitions == 0 {
            return Err(ConfigError::Invalid(
                "scenario needs at least one repetition".to_owned(),
            ));
        }
        Ok(())
    }

    fn apply_args(&mut self, args: Args) {
        if let Some(port) = args.simport {
            self.simulation.port = port;
        }

        if let Some(timeout) = args.timeout {
            self.simulation.timeout = timeout;
        }

        if let Some(repetitions) = args.repetitions {
            self.scenario.repetitions = repetitions;
        }

        if let Some(results) = args.results {
            self.results = results;
        }

        if args.debug {
            self.debug = true;
        }

        if let Some(Commands::Offline) = args.command {
            self.simulation.offline = true;
        }
    }
}

#[derive(Parser, Debug)]
struct Args {
    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    simport: Option<u32>,

    /// Seconds a world tick may take
    #[arg(long)]
    timeout: Option<f64>,

    #[arg(long)]
    repetitions: Option<u32>,

    /// File the scenario results are appended to
    #[arg(long)]
    results: Option<String>,

    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run against the built-in kinematic world instead of a simulator
    Offline,
}

pub fn read_from_disk() -> Result<Config, ConfigError> {
    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(|| "config.yaml".to_owned());
    let mut config = Config::from_file(config_path)?;
    config.apply_args(args);
    config.validate()?;

    if config.simulation.offline {
        log::info!("Running offline against the kinematic world");
    } else {
        log::info!("Simulation running at {}", config.simulation.endpoint());
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CONFIG: &str = r#"
simulation:
  url: http://127.0.0.1
  port: 2000
scenario:
  name: straight_road
  route_length: 120.0
  timeout: 60.0
agent:
  target_speed: 8.0
ego:
  extent: { x: 2.4, y: 1.0 }
traffic:
  actors:
    - { type_id: walker.pedestrian, kind: walker, x: 40.0, y: 0.5 }
"#;

    #[test]
    fn test_defaults_fill_in() {
        let config = Config::from_yaml(CONFIG).unwrap();
        assert_eq!(config.simulation.timeout, 10.0);
        assert_eq!(config.simulation.endpoint(), "http://127.0.0.1:2000");
        assert!(!config.simulation.offline);
        assert_eq!(config.guard.proximity_radius, 50.0);
        assert_eq!(config.guard.handedness, Handedness::Left);
        assert_eq!(config.scenario.repetitions, 1);
        assert_eq!(config.results, "results.jsonl");
        assert_eq!(config.traffic.actors.len(), 1);
        assert_eq!(config.traffic.actors[0].speed, 0.0);

        let guard = config.guard.build(config.ego.extent).unwrap();
        assert_eq!(guard.zones().len(), 3);
        assert_eq!(guard.zones()[0].half_width, 2.4);
    }

    #[test]
    fn test_degenerate_zone_rejected_at_load() {
        let content = CONFIG.to_owned()
            + r#"
guard:
  handedness: right
  zones:
    - { name: front, relative_angle_degrees: 0.0, forward_distance: 10.0, half_width: 0.0 }
"#;
        let err = Config::from_yaml(&content).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Guard(GuardError::DegenerateZone { .. })
        ));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let content = CONFIG.replace("timeout: 60.0", "timeout: 0.0");
        assert!(matches!(
            Config::from_yaml(&content),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_yaml("simulation: [1, 2]"),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn test_zero_extent_reported_as_extent() {
        let content = CONFIG.replace("{ x: 2.4, y: 1.0 }", "{ x: 0.0, y: 1.0 }");
        match Config::from_yaml(&content) {
            Err(ConfigError::Invalid(msg)) => assert!(msg.contains("ego extent")),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_args_override_file() {
        let mut config = Config::from_yaml(CONFIG).unwrap();
        let args = Args::parse_from([
            "egoguard",
            "--simport",
            "2010",
            "--repetitions",
            "3",
            "--debug",
            "offline",
        ]);
        config.apply_args(args);
        assert_eq!(config.simulation.port, 2010);
        assert_eq!(config.scenario.repetitions, 3);
        assert!(config.debug);
        assert!(config.simulation.offline);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.scenario.name, "straight_road");

        assert!(matches!(
            Config::from_file("/nonexistent/egoguard.yaml"),
            Err(ConfigError::Io(_))
        ));
    }
}
