use std::collections::BTreeMap;

use dyn_clone::DynClone;
use thiserror::Error;

use crate::core::common::ResourceVector;
use crate::core::node::Node;
use crate::core::pod::Pod;

/// Node together with the sum of requests of pods already bound to it.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeInfo {
    pub node: Node,
    pub requested: ResourceVector,
    pub pod_count: usize,
}

impl NodeInfo {
    pub fn new(node: Node) -> Self {
        Self {
            node,
            requested: Default::default(),
            pod_count: 0,
        }
    }

    pub fn name(&self) -> &str {
        self.node.name()
    }

    pub fn allocatable(&self, resource: &str) -> u64 {
        self.node.status.allocatable.get(resource)
    }

    /// Allocatable minus already requested.
    pub fn free(&self, resource: &str) -> u64 {
        self.allocatable(resource)
            .saturating_sub(self.requested.get(resource))
    }

    pub fn add_pod(&mut self, pod: &Pod) {
        self.requested.add(pod.requests());
        self.pod_count += 1;
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ScheduleError {
    #[error("0/0 nodes are available: no nodes in cluster.")]
    NoNodesInCluster,

    /// Counts of nodes on which each requested resource does not fit.
    #[error("0/{total_nodes} nodes are available: {}.", format_insufficient(.insufficient))]
    NoSufficientResources {
        total_nodes: usize,
        insufficient: BTreeMap<String, usize>,
    },

    #[error("no scheduler profile {0:?}")]
    UnknownProfile(String),

    #[error("plugin {0:?} is not registered")]
    UnknownPlugin(String),

    #[error("plugin {name:?} is not a {expected} plugin")]
    WrongPluginType { name: String, expected: String },
}

fn format_insufficient(insufficient: &BTreeMap<String, usize>) -> String {
    insufficient
        .iter()
        .map(|(resource, count)| format!("{} Insufficient {}", count, resource))
        .collect::<Vec<String>>()
        .join(", ")
}

impl ScheduleError {
    /// Rejections are normal outcomes of a placement decision. Every other error is a failure
    /// of the engine itself.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ScheduleError::NoNodesInCluster | ScheduleError::NoSufficientResources { .. }
        )
    }
}

// Trait which should implement any placement algorithm plugged into the simulator.
// Algorithms are cloned for every simulation run, so each run starts with a fresh instance.
pub trait PodSchedulingAlgorithm: DynClone + Send + Sync {
    /// Scheduler names (profiles) this algorithm places pods for.
    fn scheduler_names(&self) -> Vec<String>;

    // A method to assign a node on which the pod will be placed.
    // `nodes` are ordered by name and carry requests of pods bound so far.
    // Returns Result consisting of name of assigned node or scheduling error.
    fn schedule_one(&self, pod: &Pod, nodes: &[NodeInfo]) -> Result<String, ScheduleError>;
}

dyn_clone::clone_trait_object!(PodSchedulingAlgorithm);
