//! Scenario manager
//!
//! Owns one scenario run: ticks the world, asks the agent for a control,
//! lets the proximity guard override it, applies it and advances the scenario
//! tree. Use it as
//!
//! 1. `ScenarioManager::new(...)`
//! 2. `load_scenario(...)`
//! 3. `run_scenario(...)`, which returns once the tree finished, an interrupt
//!    arrived or an error occurred
//! 4. `stop_scenario()` for the report, then `cleanup()` before the next run

use crate::agent::{AgentError, AgentInput, AutonomousAgent};
use crate::behavior::bt::BTResult;
use crate::config;
use crate::control::{apply_override, VehicleControl};
use crate::guard::{GuardDecision, GuardError, ProximityGuard};
use crate::report::{analyze, ScenarioReport};
use crate::scenario::Scenario;
use crate::simulation::{ActorState, SimulationError, Simulator, WorldSnapshot};
use crate::timer::{GameTime, Watchdog};
use std::collections::BTreeSet;
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::broadcast::Receiver;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("no scenario loaded")]
    NotLoaded,
    #[error("cannot {action} while {state:?}")]
    InvalidTransition { action: &'static str, state: RunState },
    #[error("sensor failure: {0}")]
    Sensor(String),
    #[error("agent failure: {0}")]
    Agent(String),
    #[error(transparent)]
    Guard(#[from] GuardError),
    #[error(transparent)]
    Simulation(#[from] SimulationError),
    #[error("simulation watchdog expired after {0:?}")]
    WatchdogExpired(Duration),
}

impl From<AgentError> for ManagerError {
    fn from(err: AgentError) -> ManagerError {
        match err {
            AgentError::NoSensorData(msg) => ManagerError::Sensor(msg),
            AgentError::Failure(msg) => ManagerError::Agent(msg),
        }
    }
}

/// Awaits a simulator call for at most `budget`, the time the watchdog has
/// left. A stopped watchdog (`None`) sets no limit.
async fn within_watchdog<T, F>(
    budget: Option<Duration>,
    limit: Duration,
    call: F,
) -> Result<T, ManagerError>
where
    F: Future<Output = Result<T, SimulationError>>,
{
    let Some(budget) = budget else {
        return Ok(call.await?);
    };

    match tokio::time::timeout(budget, call).await {
        Ok(result) => Ok(result?),
        Err(_) => {
            log::error!("Simulation did not respond within {:?}", limit);
            Err(ManagerError::WatchdogExpired(limit))
        }
    }
}

pub struct ScenarioManager {
    state: RunState,
    timeout: Duration,
    debug: bool,
    watchdog: Watchdog,
    agent_watchdog: Watchdog,
    game_time: GameTime,
    guard_config: config::Guard,
    guard: Option<ProximityGuard>,
    scenario: Option<Scenario>,
    agent: Option<Box<dyn AutonomousAgent>>,
    agent_name: String,
    repetition: u32,
    stop_rx: Receiver<()>,
    interrupted: bool,

    timestamp_last_run: f64,
    last_control: VehicleControl,
    start_system_time: Option<Instant>,
    start_game_time: f64,
    scenario_duration_system: f64,
    scenario_duration_game: f64,
    override_frames: u64,
    triggering_actors: BTreeSet<String>,
}

impl ScenarioManager {
    pub fn new(
        timeout_seconds: f64,
        debug: bool,
        guard_config: config::Guard,
        stop_rx: Receiver<()>,
    ) -> ScenarioManager {
        // Detects a simulator that stopped answering
        let watchdog_timeout = (timeout_seconds - 2.0).max(5.0);
        // Keeps the agent from freezing the simulation
        let agent_timeout = watchdog_timeout - 1.0;

        ScenarioManager {
            state: RunState::Idle,
            timeout: Duration::from_secs_f64(timeout_seconds),
            debug,
            watchdog: Watchdog::new(Duration::from_secs_f64(watchdog_timeout)),
            agent_watchdog: Watchdog::new(Duration::from_secs_f64(agent_timeout)),
            game_time: GameTime::new(),
            guard_config,
            guard: None,
            scenario: None,
            agent: None,
            agent_name: String::new(),
            repetition: 0,
            stop_rx,
            interrupted: false,
            timestamp_last_run: 0.0,
            last_control: VehicleControl::default(),
            start_system_time: None,
            start_game_time: 0.0,
            scenario_duration_system: 0.0,
            scenario_duration_game: 0.0,
            override_frames: 0,
            triggering_actors: BTreeSet::new(),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Whether the last run ended on a stop request.
    pub fn interrupted(&self) -> bool {
        self.interrupted
    }

    pub fn scenario(&self) -> Option<&Scenario> {
        self.scenario.as_ref()
    }

    /// Watchdog status, `false` once the simulator stopped responding.
    pub fn get_running_status(&self) -> bool {
        self.watchdog.status()
    }

    /// Resets the timing of the previous run so the manager can load again.
    pub fn cleanup(&mut self) {
        self.timestamp_last_run = 0.0;
        self.last_control = VehicleControl::default();
        self.start_system_time = None;
        self.start_game_time = 0.0;
        self.scenario_duration_system = 0.0;
        self.scenario_duration_game = 0.0;
        self.override_frames = 0;
        self.triggering_actors.clear();
        self.state = RunState::Idle;
    }

    pub fn load_scenario(
        &mut self,
        scenario: Scenario,
        mut agent: Box<dyn AutonomousAgent>,
        ego: &ActorState,
        repetition: u32,
    ) -> Result<(), ManagerError> {
        if let RunState::Running | RunState::Stopping = self.state {
            return Err(ManagerError::InvalidTransition {
                action: "load a scenario",
                state: self.state,
            });
        }

        self.game_time.restart();
        self.guard = Some(self.guard_config.build(ego.extent)?);
        agent.setup(ego, self.debug);

        log::info!(
            "Loaded scenario '{}' (repetition {}) with agent '{}'",
            scenario.name(),
            repetition,
            agent.name()
        );
        self.agent_name = agent.name().to_owned();
        self.agent = Some(agent);
        self.scenario = Some(scenario);
        self.repetition = repetition;
        self.interrupted = false;
        self.state = RunState::Idle;
        Ok(())
    }

    /// Moves a running scenario to `Stopping`; the loop exits after the
    /// current frame.
    pub fn interrupt(&mut self) {
        if self.state == RunState::Running {
            log::info!("Scenario interrupted");
            self.interrupted = true;
            self.state = RunState::Stopping;
        }
    }

    /// Consumes a pending stop request, if any.
    pub fn stop_requested(&mut self) -> bool {
        match self.stop_rx.try_recv() {
            Ok(()) | Err(TryRecvError::Lagged(_)) => true,
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => false,
        }
    }

    /// Runs frames until the scenario tree finishes or the run is interrupted.
    pub async fn run_scenario<S: Simulator + ?Sized>(
        &mut self,
        simulator: &mut S,
    ) -> Result<(), ManagerError> {
        if self.scenario.is_none() || self.agent.is_none() {
            return Err(ManagerError::NotLoaded);
        }
        if self.state != RunState::Idle {
            return Err(ManagerError::InvalidTransition {
                action: "start",
                state: self.state,
            });
        }

        self.start_system_time = Some(Instant::now());
        self.start_game_time = self.game_time.time();
        self.watchdog.start();
        self.state = RunState::Running;

        let result = self.run_loop(simulator).await;
        if result.is_err() {
            self.state = RunState::Stopping;
        }
        result
    }

    async fn run_loop<S: Simulator + ?Sized>(
        &mut self,
        simulator: &mut S,
    ) -> Result<(), ManagerError> {
        while self.state == RunState::Running {
            if self.stop_requested() {
                self.interrupt();
                break;
            }

            let world = within_watchdog(
                self.watchdog.remaining(),
                self.watchdog.timeout(),
                simulator.world(),
            )
            .await?;

            match world {
                Some(world) => self.tick_scenario(simulator, &world).await?,
                None => tokio::task::yield_now().await,
            }

            if !self.watchdog.status() {
                log::error!(
                    "Simulation did not respond within {:?}",
                    self.watchdog.timeout()
                );
                return Err(ManagerError::WatchdogExpired(self.watchdog.timeout()));
            }
        }
        Ok(())
    }

    fn guard_decision(&self, world: &WorldSnapshot) -> GuardDecision<String> {
        match &self.guard {
            Some(guard) => {
                let nearby = world.nearby_observations(guard.proximity_radius());
                guard.decide(&world.ego.pose, &nearby)
            }
            None => GuardDecision::conservative(),
        }
    }

    /// Runs the agent, the guard and the scenario tree for one new frame, then
    /// advances the world.
    async fn tick_scenario<S: Simulator + ?Sized>(
        &mut self,
        simulator: &mut S,
        world: &WorldSnapshot,
    ) -> Result<(), ManagerError> {
        let timestamp = world.timestamp;

        if self.timestamp_last_run < timestamp.elapsed_seconds && self.state == RunState::Running {
            self.timestamp_last_run = timestamp.elapsed_seconds;
            self.watchdog.update();
            self.game_time.on_tick(&timestamp);

            let decision = self.guard_decision(world);
            let game_time = self.game_time.time();

            let (Some(scenario), Some(agent)) = (self.scenario.as_mut(), self.agent.as_mut())
            else {
                return Err(ManagerError::NotLoaded);
            };
            scenario.update(game_time, world);

            let input = AgentInput {
                frame: timestamp.frame,
                game_time,
                throttle: self.last_control.throttle,
                steer: self.last_control.steer,
                brake: self.last_control.brake,
                collisions: world.collisions,
                actors: decision.triggering_actor_ids.iter().cloned().collect(),
                ego: world.ego.pose,
                speed: Some(world.ego.speed),
            };

            self.agent_watchdog.start();
            let agent_result = agent.run_step(&input);
            if !self.agent_watchdog.status() {
                log::warn!(
                    "Agent '{}' exceeded {:?} in frame {}",
                    self.agent_name,
                    self.agent_watchdog.timeout(),
                    timestamp.frame
                );
            }
            self.agent_watchdog.stop();
            let control = agent_result?.clamped();

            let control = apply_override(control, &decision);
            if decision.brake {
                self.override_frames += 1;
                log::debug!(
                    "Frame {}: guard forces braking for {:?}",
                    timestamp.frame,
                    decision.triggering_actor_ids
                );
                self.triggering_actors
                    .extend(decision.triggering_actor_ids.iter().cloned());
            }

            within_watchdog(
                self.watchdog.remaining(),
                self.watchdog.timeout(),
                simulator.apply_control(&control),
            )
            .await?;
            self.last_control = control;

            let status = scenario.tick_once();
            if self.debug {
                log::debug!(
                    "Frame {} t={:.2}s status {:?} {:?}",
                    timestamp.frame,
                    game_time,
                    status,
                    scenario.blackboard()
                );
            }

            if status != BTResult::Pending {
                log::info!(
                    "Scenario '{}' finished with {:?} after {:.2}s",
                    scenario.name(),
                    status,
                    game_time
                );
                self.state = RunState::Stopping;
            }
        }

        if self.state == RunState::Running && self.get_running_status() {
            within_watchdog(
                self.watchdog.remaining(),
                self.watchdog.timeout(),
                simulator.tick(self.timeout),
            )
            .await?;
        }
        Ok(())
    }

    /// Ends the run and, unless the simulator stopped responding, terminates
    /// the scenario, releases the agent and reports the result.
    pub fn stop_scenario(&mut self) -> Option<ScenarioReport> {
        let responsive = self.watchdog.status();
        self.watchdog.stop();

        if let Some(start) = self.start_system_time {
            self.scenario_duration_system = start.elapsed().as_secs_f64();
        }
        self.scenario_duration_game = self.game_time.time() - self.start_game_time;
        self.state = RunState::Stopped;

        if !responsive {
            log::error!("Simulation watchdog expired, skipping result analysis");
            return None;
        }

        if let Some(mut agent) = self.agent.take() {
            agent.cleanup();
        }

        let scenario = self.scenario.as_mut()?;
        scenario.terminate();
        Some(self.analyze_scenario())
    }

    fn analyze_scenario(&self) -> ScenarioReport {
        let (name, result, timed_out, criteria) = match &self.scenario {
            Some(scenario) => (
                scenario.name().to_owned(),
                analyze(scenario),
                scenario.timed_out(),
                scenario.criteria().to_vec(),
            ),
            None => (
                String::new(),
                crate::report::GlobalResult::Failure,
                false,
                vec![],
            ),
        };

        ScenarioReport {
            run_id: Uuid::new_v4(),
            scenario: name,
            agent: self.agent_name.clone(),
            repetition: self.repetition,
            result,
            timed_out,
            criteria,
            duration_system: self.scenario_duration_system,
            duration_game: self.scenario_duration_game,
            override_frames: self.override_frames,
            triggering_actors: self.triggering_actors.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::CruiseAgent;
    use crate::config::ScenarioConfig;
    use crate::guard::Pose2D;
    use crate::math::Vec2;
    use crate::report::GlobalResult;
    use crate::scenario::TestStatus;
    use crate::simulation::kinematic::TrafficActor;
    use crate::simulation::{ActorKind, KinematicWorld, Timestamp};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use tokio::sync::broadcast;

    fn scenario(route_length: f64, timeout: f64) -> Scenario {
        Scenario::route(&ScenarioConfig {
            name: "straight".to_owned(),
            route_length,
            timeout,
            repetitions: 1,
        })
    }

    fn world() -> KinematicWorld {
        KinematicWorld::new(Pose2D::new(0.0, 0.0, 0.0), Vec2::new(2.4, 1.0), 0.05)
    }

    fn pedestrian_at(x: f64) -> TrafficActor {
        TrafficActor {
            type_id: "walker.pedestrian".to_owned(),
            kind: ActorKind::Walker,
            x,
            y: 0.0,
            heading_degrees: 0.0,
            speed: 0.0,
        }
    }

    /// Serves every timestamp `repeats` times before advancing it.
    struct StutteringWorld {
        ego: ActorState,
        repeats: u64,
        ticks: u64,
        world_calls: u64,
    }

    #[async_trait]
    impl Simulator for StutteringWorld {
        async fn world(&mut self) -> Result<Option<WorldSnapshot>, SimulationError> {
            self.world_calls += 1;
            let step = self.ticks / self.repeats;
            Ok(Some(WorldSnapshot {
                timestamp: Timestamp {
                    frame: step,
                    elapsed_seconds: step as f64 / 10.0,
                    delta_seconds: 0.1,
                },
                ego: self.ego.clone(),
                actors: vec![],
                collisions: 0,
            }))
        }

        async fn apply_control(&mut self, _control: &VehicleControl) -> Result<(), SimulationError> {
            Ok(())
        }

        async fn tick(&mut self, _timeout: Duration) -> Result<(), SimulationError> {
            self.ticks += 1;
            Ok(())
        }
    }

    /// Never answers.
    struct HungWorld;

    #[async_trait]
    impl Simulator for HungWorld {
        async fn world(&mut self) -> Result<Option<WorldSnapshot>, SimulationError> {
            std::future::pending().await
        }

        async fn apply_control(&mut self, _control: &VehicleControl) -> Result<(), SimulationError> {
            std::future::pending().await
        }

        async fn tick(&mut self, _timeout: Duration) -> Result<(), SimulationError> {
            std::future::pending().await
        }
    }

    struct FrameRecorder {
        frames: Arc<Mutex<Vec<u64>>>,
    }

    impl AutonomousAgent for FrameRecorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn run_step(&mut self, input: &AgentInput) -> Result<VehicleControl, AgentError> {
            self.frames.lock().unwrap().push(input.frame);
            Ok(VehicleControl::default())
        }
    }

    struct BlindAgent;

    impl AutonomousAgent for BlindAgent {
        fn name(&self) -> &str {
            "blind"
        }

        fn run_step(&mut self, _input: &AgentInput) -> Result<VehicleControl, AgentError> {
            Err(AgentError::NoSensorData("camera".to_owned()))
        }
    }

    fn manager(stop_rx: Receiver<()>) -> ScenarioManager {
        ScenarioManager::new(10.0, false, config::Guard::default(), stop_rx)
    }

    #[tokio::test]
    async fn test_route_completes_without_traffic() {
        let (_stop_tx, stop_rx) = broadcast::channel(1);
        let mut world = world();
        let mut manager = manager(stop_rx);
        let ego = world.ego().clone();
        manager
            .load_scenario(
                scenario(20.0, 60.0),
                Box::new(CruiseAgent::new(8.0).with_route(20.0)),
                &ego,
                0,
            )
            .unwrap();

        manager.run_scenario(&mut world).await.unwrap();
        assert_eq!(manager.state(), RunState::Stopping);
        assert_eq!(manager.scenario().unwrap().status(), BTResult::Success);

        let report = manager.stop_scenario().unwrap();
        assert_eq!(manager.state(), RunState::Stopped);
        assert_eq!(report.result, GlobalResult::Success);
        assert_eq!(report.override_frames, 0);
        assert!(report.duration_game > 2.0);

        manager.cleanup();
        assert_eq!(manager.state(), RunState::Idle);
    }

    #[tokio::test]
    async fn test_guard_brakes_for_pedestrian_ahead() {
        let (_stop_tx, stop_rx) = broadcast::channel(1);
        let mut world = world().with_traffic(&[pedestrian_at(15.0)]);
        let mut manager = manager(stop_rx);
        let ego = world.ego().clone();
        manager
            .load_scenario(
                scenario(40.0, 5.0),
                Box::new(CruiseAgent::new(8.0).with_route(40.0)),
                &ego,
                0,
            )
            .unwrap();

        manager.run_scenario(&mut world).await.unwrap();
        let report = manager.stop_scenario().unwrap();

        assert_eq!(report.result, GlobalResult::Failure);
        assert!(report.timed_out);
        assert!(report.override_frames > 0);
        assert!(report.triggering_actors.contains("walker.pedestrian#2"));
        let collisions = report
            .criteria
            .iter()
            .find(|criterion| criterion.name == "CollisionTest")
            .unwrap();
        assert_eq!(collisions.test_status, TestStatus::Success);
        assert!(world.ego().pose.x < 15.0);
        assert_eq!(world.last_control().brake, 1.0);
    }

    #[tokio::test]
    async fn test_interrupt_stops_the_loop() {
        let (stop_tx, stop_rx) = broadcast::channel(1);
        let mut world = world();
        let mut manager = manager(stop_rx);
        let ego = world.ego().clone();
        manager
            .load_scenario(scenario(20.0, 60.0), Box::new(CruiseAgent::new(8.0)), &ego, 0)
            .unwrap();

        stop_tx.send(()).unwrap();
        manager.run_scenario(&mut world).await.unwrap();
        assert_eq!(manager.state(), RunState::Stopping);
        assert!(manager.interrupted());

        let report = manager.stop_scenario().unwrap();
        assert_eq!(report.result, GlobalResult::Failure);
    }

    #[tokio::test]
    async fn test_missing_sensor_data_is_a_sensor_error() {
        let (_stop_tx, stop_rx) = broadcast::channel(1);
        let mut world = world();
        let mut manager = manager(stop_rx);
        let ego = world.ego().clone();
        manager
            .load_scenario(scenario(20.0, 60.0), Box::new(BlindAgent), &ego, 0)
            .unwrap();

        let err = manager.run_scenario(&mut world).await.unwrap_err();
        assert!(matches!(err, ManagerError::Sensor(_)));
        assert_eq!(manager.state(), RunState::Stopping);
    }

    #[tokio::test]
    async fn test_repeated_timestamps_are_processed_once() {
        let (_stop_tx, stop_rx) = broadcast::channel(1);
        let mut manager = manager(stop_rx);
        let ego = world().ego().clone();
        let frames = Arc::new(Mutex::new(Vec::new()));
        manager
            .load_scenario(
                scenario(100.0, 0.55),
                Box::new(FrameRecorder {
                    frames: frames.clone(),
                }),
                &ego,
                0,
            )
            .unwrap();

        let mut simulator = StutteringWorld {
            ego,
            repeats: 4,
            ticks: 0,
            world_calls: 0,
        };
        manager.run_scenario(&mut simulator).await.unwrap();

        // Frame 0 never advances past the initial timestamp, frames 1 to 7
        // run once each until the time limit ends the scenario.
        assert_eq!(*frames.lock().unwrap(), vec![1, 2, 3, 4, 5, 6, 7]);
        assert!(simulator.world_calls > 3 * 7);
        assert!(manager.scenario().unwrap().timed_out());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_simulator_trips_the_watchdog() {
        let (_stop_tx, stop_rx) = broadcast::channel(1);
        let mut manager = ScenarioManager::new(5.0, false, config::Guard::default(), stop_rx);
        let ego = world().ego().clone();
        manager
            .load_scenario(scenario(20.0, 60.0), Box::new(CruiseAgent::new(8.0)), &ego, 0)
            .unwrap();

        let mut simulator = HungWorld;
        let result = tokio::time::timeout(
            Duration::from_secs(8),
            manager.run_scenario(&mut simulator),
        )
        .await
        .expect("the watchdog ends the run");

        assert!(matches!(
            result,
            Err(ManagerError::WatchdogExpired(limit)) if limit == Duration::from_secs(5)
        ));
        assert!(!manager.get_running_status());
        assert!(manager.stop_scenario().is_none());
        assert_eq!(manager.state(), RunState::Stopped);
    }

    #[test]
    fn test_stop_request_is_consumed_once() {
        let (stop_tx, stop_rx) = broadcast::channel(1);
        let mut manager = manager(stop_rx);
        assert!(!manager.stop_requested());
        stop_tx.send(()).unwrap();
        assert!(manager.stop_requested());
        assert!(!manager.stop_requested());
    }

    #[tokio::test]
    async fn test_run_requires_loaded_scenario() {
        let (_stop_tx, stop_rx) = broadcast::channel(1);
        let mut world = world();
        let mut manager = manager(stop_rx);
        assert!(matches!(
            manager.run_scenario(&mut world).await,
            Err(ManagerError::NotLoaded)
        ));
    }

    #[test]
    fn test_agent_errors_map_to_distinct_categories() {
        assert!(matches!(
            ManagerError::from(AgentError::NoSensorData("lidar".to_owned())),
            ManagerError::Sensor(_)
        ));
        assert!(matches!(
            ManagerError::from(AgentError::Failure("panic".to_owned())),
            ManagerError::Agent(_)
        ));
    }

    #[test]
    fn test_degenerate_guard_rejected_at_load() {
        let (_stop_tx, stop_rx) = broadcast::channel(1);
        let mut manager = manager(stop_rx);
        let mut ego = world().ego().clone();
        ego.extent = Vec2::new(0.0, 0.0);
        let err = manager
            .load_scenario(scenario(20.0, 60.0), Box::new(CruiseAgent::new(8.0)), &ego, 0)
            .unwrap_err();
        assert!(matches!(err, ManagerError::Guard(_)));
    }
}
