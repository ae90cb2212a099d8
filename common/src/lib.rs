// Common library shared by the orchestrator binary and the control API

pub mod bootstrap;
pub mod config;
pub mod errors;
pub mod models;
pub mod publisher;
pub mod retry;
pub mod runner;
pub mod schedule;
pub mod scheduler;
pub mod store;
pub mod supervisor;
pub mod telemetry;
pub mod trending;
