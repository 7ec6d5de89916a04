//! Common object metadata and resource quantities shared by nodes and pods.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const CPU: &str = "cpu";
pub const MEMORY: &str = "memory";

pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_SCHEDULER_NAME: &str = "default_scheduler";

/// Label with the name of the application which owns a pod.
pub const LABEL_APP_NAME: &str = "app_name";
/// Label marking nodes created by the capacity planner.
pub const LABEL_ORIGIN: &str = "origin";
pub const CAPACITY_PLANNER_ORIGIN: &str = "capacity planner";

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl Default for ObjectMeta {
    fn default() -> Self {
        Self {
            name: Default::default(),
            namespace: default_namespace(),
            labels: Default::default(),
        }
    }
}

impl ObjectMeta {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// `namespace/name` identity of namespaced objects.
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// Mapping of resource name to a non-negative quantity.
///
/// Quantities are integers in base units: millicores for `cpu`, plain units (bytes for memory)
/// for every other resource. The set of resource names is open, so extended resources such as
/// accelerator memory are stored alongside cpu and memory.
#[derive(Default, Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(transparent)]
pub struct ResourceVector(BTreeMap<String, u64>);

impl ResourceVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_cpu_memory(cpu: u64, memory: u64) -> Self {
        let mut resources = Self::new();
        resources.insert(CPU, cpu);
        resources.insert(MEMORY, memory);
        resources
    }

    pub fn insert(&mut self, name: &str, quantity: u64) {
        self.0.insert(name.to_string(), quantity);
    }

    /// Quantity of the resource, zero if absent.
    pub fn get(&self, name: &str) -> u64 {
        self.0.get(name).copied().unwrap_or(0)
    }

    pub fn cpu(&self) -> u64 {
        self.get(CPU)
    }

    pub fn memory(&self) -> u64 {
        self.get(MEMORY)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(name, quantity)| (name.as_str(), *quantity))
    }

    pub fn add(&mut self, other: &ResourceVector) {
        for (name, quantity) in other.iter() {
            let entry = self.0.entry(name.to_string()).or_insert(0);
            *entry = entry.saturating_add(quantity);
        }
    }
}

impl FromIterator<(String, u64)> for ResourceVector {
    fn from_iter<T: IntoIterator<Item = (String, u64)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawQuantity {
    Integer(u64),
    Text(String),
}

impl<'de> Deserialize<'de> for ResourceVector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, RawQuantity>::deserialize(deserializer)?;
        raw.into_iter()
            .map(|(name, quantity)| match quantity {
                RawQuantity::Integer(value) => Ok((name, value)),
                RawQuantity::Text(text) => parse_quantity(&name, &text)
                    .map(|value| (name, value))
                    .map_err(de::Error::custom),
            })
            .collect()
    }
}

/// Parses a Kubernetes-style quantity string into base units of the resource.
///
/// `cpu` is converted to millicores (`"2"` -> 2000, `"500m"` -> 500, `"0.5"` -> 500), other
/// resources to plain units with decimal (`k`, `M`, `G`, `T`) or binary (`Ki`, `Mi`, `Gi`, `Ti`)
/// suffixes.
pub fn parse_quantity(resource: &str, raw: &str) -> Result<u64, ConfigError> {
    let invalid = || ConfigError::InvalidQuantity {
        resource: resource.to_string(),
        value: raw.to_string(),
    };

    let value = raw.trim();
    let split_at = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(value.len());
    let (number, suffix) = value.split_at(split_at);
    if number.is_empty() {
        return Err(invalid());
    }

    let is_cpu = resource == CPU;
    let multiplier: u128 = match suffix {
        "m" if is_cpu => 1,
        "" if is_cpu => 1000,
        "" => 1,
        "k" => 1_000,
        "M" => 1_000_000,
        "G" => 1_000_000_000,
        "T" => 1_000_000_000_000,
        "Ki" => 1 << 10,
        "Mi" => 1 << 20,
        "Gi" => 1 << 30,
        "Ti" => 1 << 40,
        _ => return Err(invalid()),
    };
    // Decimal suffixes for cpu still count whole cores.
    let multiplier = if is_cpu && !suffix.is_empty() && suffix != "m" {
        multiplier * 1000
    } else {
        multiplier
    };

    let (integral, fractional) = match number.split_once('.') {
        Some((integral, fractional)) => (integral, fractional),
        None => (number, ""),
    };
    if fractional.contains('.') || (integral.is_empty() && fractional.is_empty()) {
        return Err(invalid());
    }

    let integral_value: u128 = if integral.is_empty() {
        0
    } else {
        integral.parse().map_err(|_| invalid())?
    };
    let mut total = integral_value.checked_mul(multiplier).ok_or_else(invalid)?;
    if !fractional.is_empty() {
        let fractional_value: u128 = fractional.parse().map_err(|_| invalid())?;
        let scale = 10u128
            .checked_pow(fractional.len() as u32)
            .ok_or_else(invalid)?;
        total += fractional_value.checked_mul(multiplier).ok_or_else(invalid)? / scale;
    }

    u64::try_from(total).map_err(|_| invalid())
}

/// Human readable representation of a quantity in base units of the resource.
pub fn format_quantity(resource: &str, value: u64) -> String {
    if resource == CPU {
        return if value % 1000 == 0 {
            format!("{}", value / 1000)
        } else {
            format!("{}m", value)
        };
    }
    for (suffix, unit) in [("Ti", 1u64 << 40), ("Gi", 1 << 30), ("Mi", 1 << 20), ("Ki", 1 << 10)] {
        if value >= unit && value % unit == 0 {
            return format!("{}{}", value / unit, suffix);
        }
    }
    format!("{}", value)
}

impl fmt::Display for ResourceVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .iter()
            .map(|(name, value)| format!("{}={}", name, format_quantity(name, value)))
            .collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}
