pub mod interface;
pub mod kube_scheduler;
pub mod plugin;
pub mod scheduler;
