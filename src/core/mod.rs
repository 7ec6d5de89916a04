pub mod common;
pub mod events;
pub mod node;
pub mod object;
pub mod persistent_storage;
pub mod pod;
pub mod rendezvous;
pub mod scheduler;
