//! Type definition for Pod primitive in k8s cluster

use serde::{Deserialize, Serialize};

use crate::core::common::{ObjectMeta, ResourceVector, LABEL_APP_NAME};

/// Reason set on the `PodScheduled` condition of pods the placement engine rejected.
pub const UNSCHEDULABLE_REASON: &str = "Unschedulable";

#[derive(Default, Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct Resources {
    #[serde(default)]
    pub limits: ResourceVector,
    #[serde(default)]
    pub requests: ResourceVector,
}

#[derive(Default, Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct PodSpec {
    /// Simplified: instead of vector of containers - one container with resources
    #[serde(default)]
    pub resources: Resources,
    /// Name of the scheduler profile which should place the pod, default one if empty.
    #[serde(default)]
    pub scheduler_name: String,
    /// Node the pod is bound to. Empty until the placement engine binds the pod, unless the pod
    /// is already running somewhere.
    #[serde(default)]
    pub node_name: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub enum PodConditionType {
    // Placement decision is made: status "True" means bound, "False" means rejected
    PodScheduled,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PodCondition {
    // True, False or Unknown
    pub status: String,
    pub condition_type: PodConditionType,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Default, Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct PodStatus {
    #[serde(default)]
    pub conditions: Vec<PodCondition>,
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct Pod {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: PodSpec,
    #[serde(default)]
    pub status: PodStatus,
}

/// Terminal placement outcome of a single pod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PodOutcome {
    Bound(String),
    Rejected(String),
}

impl Pod {
    /// Pod with equal requests and limits for cpu (millicores) and memory (bytes).
    pub fn new(name: &str, cpu: u64, memory: u64) -> Self {
        let resources = ResourceVector::from_cpu_memory(cpu, memory);
        Self {
            metadata: ObjectMeta::named(name),
            spec: PodSpec {
                resources: Resources {
                    limits: resources.clone(),
                    requests: resources,
                },
                scheduler_name: Default::default(),
                node_name: Default::default(),
            },
            status: Default::default(),
        }
    }

    pub fn with_extended_request(mut self, name: &str, quantity: u64) -> Self {
        self.spec.resources.requests.insert(name, quantity);
        self.spec.resources.limits.insert(name, quantity);
        self
    }

    /// `namespace/name`, identity of the pod in the state store.
    pub fn key(&self) -> String {
        self.metadata.key()
    }

    pub fn requests(&self) -> &ResourceVector {
        &self.spec.resources.requests
    }

    pub fn app_name(&self) -> Option<&str> {
        self.metadata.labels.get(LABEL_APP_NAME).map(String::as_str)
    }

    pub fn is_assigned(&self) -> bool {
        !self.spec.node_name.is_empty()
    }

    pub fn update_condition(
        &mut self,
        status: &str,
        condition_type: PodConditionType,
        reason: Option<String>,
        message: Option<String>,
    ) {
        let conditions = &mut self.status.conditions;
        match conditions
            .iter_mut()
            .find(|elem| elem.condition_type == condition_type)
        {
            Some(condition) => {
                condition.status = status.to_string();
                condition.reason = reason;
                condition.message = message;
            }
            None => {
                conditions.push(PodCondition {
                    status: status.to_string(),
                    condition_type,
                    reason,
                    message,
                });
            }
        }
    }

    // Ref to condition if it exists else None.
    pub fn get_condition(&self, condition_type: PodConditionType) -> Option<&PodCondition> {
        self.status
            .conditions
            .iter()
            .find(|c| c.condition_type == condition_type)
    }

    /// Terminal outcome recorded on the pod, `None` while the decision is pending.
    pub fn outcome(&self) -> Option<PodOutcome> {
        let condition = self.get_condition(PodConditionType::PodScheduled)?;
        match condition.status.as_str() {
            "True" => Some(PodOutcome::Bound(self.spec.node_name.clone())),
            "False" => Some(PodOutcome::Rejected(
                condition.message.clone().unwrap_or_default(),
            )),
            _ => None,
        }
    }
}
