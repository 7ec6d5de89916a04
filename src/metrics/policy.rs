//! Utilization-ceiling policy evaluated over the cluster occupancy of a finished run.

use std::fmt;

use log::warn;
use serde::Serialize;

use crate::core::common::{CPU, MEMORY};
use crate::error::ConfigError;
use crate::metrics::occupancy::ResourceAccountant;
use crate::simulator::ClusterNodeStatus;

/// Ceiling which never fails.
pub const UNCONSTRAINED: u64 = 100;

pub const ENV_MAX_CPU: &str = "MAX_CPU_OCCUPANCY";
pub const ENV_MAX_MEMORY: &str = "MAX_MEMORY_OCCUPANCY";
pub const ENV_MAX_EXTENDED: &str = "MAX_EXTENDED_OCCUPANCY";

/// Parses a percentage ceiling. Values which are not integers are an error, integers outside
/// `[0, 100]` fall back to [`UNCONSTRAINED`].
pub fn parse_ceiling(name: &str, raw: &str) -> Result<u64, ConfigError> {
    let value: i64 = raw
        .trim()
        .parse()
        .map_err(|_| ConfigError::MalformedCeiling {
            name: name.to_string(),
            value: raw.to_string(),
        })?;
    if !(0..=UNCONSTRAINED as i64).contains(&value) {
        warn!(
            "Ceiling {} = {} is out of [0, 100], using {}",
            name, value, UNCONSTRAINED
        );
        return Ok(UNCONSTRAINED);
    }
    Ok(value as u64)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtendedCeiling {
    pub resource: String,
    pub max: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UtilizationPolicy {
    pub max_cpu: u64,
    pub max_memory: u64,
    pub extended: Option<ExtendedCeiling>,
}

impl Default for UtilizationPolicy {
    fn default() -> Self {
        Self {
            max_cpu: UNCONSTRAINED,
            max_memory: UNCONSTRAINED,
            extended: None,
        }
    }
}

/// Cluster occupancy of `resource` is above the configured ceiling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyViolation {
    pub resource: String,
    pub occupancy: u64,
    pub ceiling: u64,
}

impl fmt::Display for PolicyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "the average occupancy rate({}%) of {} goes beyond the setting({}%)",
            self.occupancy, self.resource, self.ceiling
        )
    }
}

impl UtilizationPolicy {
    pub fn with_max_cpu(mut self, max_cpu: u64) -> Self {
        self.max_cpu = max_cpu;
        self
    }

    pub fn with_max_memory(mut self, max_memory: u64) -> Self {
        self.max_memory = max_memory;
        self
    }

    pub fn with_extended(mut self, resource: &str, max: u64) -> Self {
        self.extended = Some(ExtendedCeiling {
            resource: resource.to_string(),
            max,
        });
        self
    }

    fn ceilings(&self) -> Vec<(&str, u64)> {
        let mut ceilings = vec![(CPU, self.max_cpu), (MEMORY, self.max_memory)];
        if let Some(extended) = &self.extended {
            ceilings.push((extended.resource.as_str(), extended.max));
        }
        ceilings
    }

    /// Checks cpu, then memory, then the extended resource. Returns the first violation.
    pub fn evaluate(&self, node_status: &[ClusterNodeStatus]) -> Result<(), PolicyViolation> {
        let accountant =
            ResourceAccountant::new(self.extended.as_ref().map(|e| e.resource.as_str()));
        let occupancy = accountant.cluster_occupancy(node_status);

        for (resource, ceiling) in self.ceilings() {
            let Some(current) = occupancy.iter().find(|o| o.resource == resource) else {
                continue;
            };
            if current.percent > ceiling {
                return Err(PolicyViolation {
                    resource: resource.to_string(),
                    occupancy: current.percent,
                    ceiling,
                });
            }
        }
        Ok(())
    }
}
