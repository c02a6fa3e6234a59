use egoguard::agent::CruiseAgent;
use egoguard::config::{self, Config};
use egoguard::manager::ScenarioManager;
use egoguard::scenario::Scenario;
use egoguard::simulation::kinematic::random_traffic;
use egoguard::simulation::{KinematicWorld, SimulationError, Simulator};
use std::error::Error;
use tokio::sync::broadcast;

fn custom_ctrlc_handler(ctrlc_tx: broadcast::Sender<()>) {
    let mut ctrlc_sent = false;
    let result = ctrlc::set_handler(move || {
        if !ctrlc_sent {
            println!(
                "Custom CTRL-C handler... stopping the scenario, press again to terminate forcefully"
            );
            if let Err(err) = ctrlc_tx.send(()) {
                log::warn!("Nobody listens for the stop signal: {}", err);
            }
            ctrlc_sent = true;
        } else {
            println!("Custom CTRL-C handler... terminating forcefully");
            std::process::exit(1);
        }
    });

    if let Err(err) = result {
        log::error!("Cannot install CTRL-C handler: {}", err);
    }
}

async fn create_simulator(config: &Config) -> Result<Box<dyn Simulator>, SimulationError> {
    if config.simulation.offline {
        let mut traffic = config.traffic.actors.clone();
        if let Some(random) = &config.traffic.random {
            traffic.extend(random_traffic(
                random.seed,
                random.count,
                config.scenario.route_length,
                random.lateral_spread,
            )?);
        }
        log::info!("Spawning {} traffic actors", traffic.len());

        let world = KinematicWorld::new(
            config.ego.start,
            config.ego.extent,
            config.simulation.delta_seconds,
        )
        .with_traffic(&traffic);
        return Ok(Box::new(world));
    }

    #[cfg(feature = "simulation")]
    {
        let bridge = egoguard::simulation::BridgeSimulator::connect(
            &config.simulation.endpoint(),
            std::time::Duration::from_secs_f64(config.simulation.timeout),
        )
        .await?;
        Ok(Box::new(bridge))
    }

    #[cfg(not(feature = "simulation"))]
    Err(SimulationError::Protocol(
        "built without the simulation feature, use the offline mode".to_owned(),
    ))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();

    // Read configuration file
    let config = config::read_from_disk()?;
    let level = if config.debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    log::set_max_level(log::max_level().min(level));

    // Create channel for CTRL-C
    let (ctrlc_tx, stop_rx) = broadcast::channel(1);
    custom_ctrlc_handler(ctrlc_tx);

    let mut manager = ScenarioManager::new(
        config.simulation.timeout,
        config.debug,
        config.guard.clone(),
        stop_rx,
    );

    for repetition in 0..config.scenario.repetitions {
        if manager.stop_requested() {
            log::info!("Stop requested, skipping the remaining repetitions");
            break;
        }

        let mut simulator = create_simulator(&config).await?;
        let Some(world) = simulator.world().await? else {
            log::error!("Simulator delivered no world, cannot place the ego vehicle");
            break;
        };

        let agent = CruiseAgent::new(config.agent.target_speed)
            .with_route(config.scenario.route_length);
        manager.load_scenario(
            Scenario::route(&config.scenario),
            Box::new(agent),
            &world.ego,
            repetition,
        )?;

        let run = manager.run_scenario(simulator.as_mut()).await;
        let report = manager.stop_scenario();
        if let Some(report) = &report {
            report.print();
            if let Err(err) = report.append_to(&config.results) {
                log::error!("Cannot write results to {}: {}", config.results, err);
            }
        }
        manager.cleanup();

        if let Err(err) = run {
            log::error!("Scenario run aborted: {}", err);
            return Err(err.into());
        }
        if report.is_none() || manager.interrupted() {
            break;
        }
    }

    Ok(())
}
