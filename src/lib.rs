pub mod agent;
pub mod behavior;
pub mod config;
pub mod control;
pub mod guard;
pub mod manager;
pub mod math;
pub mod report;
pub mod scenario;
pub mod simulation;
pub mod timer;
