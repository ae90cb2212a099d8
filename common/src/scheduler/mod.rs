// Scheduler module for cadence rule evaluation and job triggering

pub mod engine;

pub use engine::{Scheduler, SchedulerEngine};
