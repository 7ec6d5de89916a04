pub mod capacity_planner;
pub mod interface;
pub mod prompt;
