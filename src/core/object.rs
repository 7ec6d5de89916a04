//! Ancillary cluster objects (services, config maps, storage classes, volume claims, disruption
//! budgets, ...). They are copied into the state store before scheduling starts and are never
//! interpreted by the simulator.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::common::ObjectMeta;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct InertObject {
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Everything else of the definition, kept verbatim.
    #[serde(flatten)]
    pub body: BTreeMap<String, serde_yaml::Value>,
}

impl InertObject {
    pub fn new(kind: &str, name: &str) -> Self {
        Self {
            kind: kind.to_string(),
            metadata: ObjectMeta::named(name),
            body: Default::default(),
        }
    }

    pub fn key(&self) -> String {
        self.metadata.key()
    }
}
