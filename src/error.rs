//! Error types of the capacity planning simulator.
//!
//! Placement rejections and utilization policy violations are not errors: they are reported as
//! regular values in `SimulateResult` and `PolicyViolation`. Everything below aborts a run.

use thiserror::Error;

/// Errors of the in-memory cluster state store.
#[derive(Debug, Error, PartialEq)]
pub enum StorageError {
    #[error("{kind} {name:?} already exists")]
    DuplicateId { kind: String, name: String },

    #[error("{kind} {name:?} not found")]
    NotFound { kind: String, name: String },
}

/// Errors raised while reading configuration and input definitions, before any simulation runs.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("failed to convert {name} value {value:?} to an integer percentage")]
    MalformedCeiling { name: String, value: String },

    #[error("invalid quantity {value:?} for resource {resource}")]
    InvalidQuantity { resource: String, value: String },

    #[error("capacity increase requested, but no template for new nodes is configured")]
    MissingNodeTemplate,
}

/// Errors which abort an in-progress simulation run.
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("state store error: {0}")]
    Storage(#[from] StorageError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("placement engine failure: {0}")]
    Engine(String),

    #[error("placement engine is stopped")]
    EngineStopped,

    #[error("outcome of pod {pending} is still awaited, cannot submit pod {requested}")]
    RendezvousBusy { pending: String, requested: String },

    #[error("pod {pod} requests scheduler {scheduler:?} which is not served by the placement engine")]
    UnknownScheduler { pod: String, scheduler: String },
}

pub type SimulationResult<T> = Result<T, SimulationError>;
