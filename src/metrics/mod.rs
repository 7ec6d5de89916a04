pub mod collector;
pub mod occupancy;
pub mod policy;
pub mod printer;
