pub mod config;
pub mod core;
pub mod error;
pub mod metrics;
pub mod planner;
pub mod simulator;
pub mod test_util;
