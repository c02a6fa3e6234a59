use crate::simulation::Timestamp;
use std::time::Duration;
use tokio::time::Instant;

/// Simulation clock, advanced from world timestamps.
#[derive(Debug, Clone, Default)]
pub struct GameTime {
    start: Option<f64>,
    current: f64,
}

impl GameTime {
    pub fn new() -> GameTime {
        GameTime::default()
    }

    pub fn restart(&mut self) {
        *self = GameTime::default();
    }

    pub fn on_tick(&mut self, timestamp: &Timestamp) {
        let start = *self.start.get_or_insert(timestamp.elapsed_seconds);
        self.current = timestamp.elapsed_seconds - start;
    }

    /// Seconds since the first tick after the last restart.
    pub fn time(&self) -> f64 {
        self.current
    }
}

/// Fails once `update` has not been called for longer than the timeout.
#[derive(Debug, Clone)]
pub struct Watchdog {
    timeout: Duration,
    last_update: Option<Instant>,
}

impl Watchdog {
    pub fn new(timeout: Duration) -> Watchdog {
        Watchdog {
            timeout,
            last_update: None,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn start(&mut self) {
        self.last_update = Some(Instant::now());
    }

    pub fn update(&mut self) {
        if self.last_update.is_some() {
            self.last_update = Some(Instant::now());
        }
    }

    pub fn stop(&mut self) {
        self.last_update = None;
    }

    /// `false` once the watchdog expired. A stopped watchdog never expires.
    pub fn status(&self) -> bool {
        match self.last_update {
            Some(last) => last.elapsed() < self.timeout,
            None => true,
        }
    }

    /// Time left before expiry, `None` while stopped.
    pub fn remaining(&self) -> Option<Duration> {
        self.last_update
            .map(|last| self.timeout.saturating_sub(last.elapsed()))
    }
}
