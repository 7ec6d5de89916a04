use std::collections::{BTreeMap, HashMap};

use lazy_static::lazy_static;

use crate::core::common::{CPU, MEMORY};
use crate::core::pod::Pod;
use crate::core::scheduler::interface::NodeInfo;

pub enum PluginType {
    FilterPlugin(Box<dyn FilterPlugin>),
    ScorePlugin(Box<dyn ScorePlugin>),
}

lazy_static! {
    pub static ref PLUGIN_REGISTRY: HashMap<&'static str, PluginType> = {
        HashMap::from([
            ("Fit", PluginType::FilterPlugin(Box::new(Fit {}))),
            (
                "LeastAllocatedResources",
                PluginType::ScorePlugin(Box::new(LeastAllocatedResources {})),
            ),
        ])
    };
}

/// Why nodes were filtered out: resource name -> number of nodes where it does not fit.
pub type Diagnosis = BTreeMap<String, usize>;

pub trait FilterPlugin: Send + Sync {
    fn filter<'a>(
        &self,
        pod: &Pod,
        nodes: Vec<&'a NodeInfo>,
        diagnosis: &mut Diagnosis,
    ) -> Vec<&'a NodeInfo>;
}

pub trait ScorePlugin: Send + Sync {
    fn score(&self, pod: &Pod, node: &NodeInfo) -> f64;
}

// Fit is a plugin that checks if a node has sufficient resources for every requested resource,
// extended ones included.
pub struct Fit {}
impl FilterPlugin for Fit {
    fn filter<'a>(
        &self,
        pod: &Pod,
        nodes: Vec<&'a NodeInfo>,
        diagnosis: &mut Diagnosis,
    ) -> Vec<&'a NodeInfo> {
        nodes
            .into_iter()
            .filter(|&node| {
                let mut fits = true;
                for (resource, requested) in pod.requests().iter() {
                    if requested > node.free(resource) {
                        *diagnosis.entry(resource.to_string()).or_insert(0) += 1;
                        fits = false;
                    }
                }
                fits
            })
            .collect()
    }
}

// Least requested resources plugin is a score plugin. Its score means that after subtracting pod's
// requested resources from node's free resources, the node with the highest
// percentage (relatively to allocatable) is prioritized for scheduling.
//
// Weights for cpu and memory are equal by default.
pub struct LeastAllocatedResources {}
impl ScorePlugin for LeastAllocatedResources {
    fn score(&self, pod: &Pod, node: &NodeInfo) -> f64 {
        let resource_score = |resource: &str| {
            let allocatable = node.allocatable(resource);
            if allocatable == 0 {
                return 0.0;
            }
            let left = node
                .free(resource)
                .saturating_sub(pod.requests().get(resource));
            left as f64 * 100.0 / allocatable as f64
        };
        (resource_score(CPU) + resource_score(MEMORY)) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::node::Node;

    #[test]
    fn test_fit_counts_insufficient_resources() {
        let small = NodeInfo::new(Node::new("small", 1000, 1000));
        let large = NodeInfo::new(Node::new("large", 4000, 4000).with_extended_resource("gpu", 1));
        let pod = Pod::new("pod_1", 2000, 500).with_extended_request("gpu", 1);

        let mut diagnosis = Diagnosis::new();
        let filtered = Fit {}.filter(&pod, vec![&small, &large], &mut diagnosis);

        assert_eq!(1, filtered.len());
        assert_eq!("large", filtered[0].name());
        assert_eq!(
            Diagnosis::from([("cpu".to_string(), 1), ("gpu".to_string(), 1)]),
            diagnosis
        );
    }

    #[test]
    fn test_least_allocated_prefers_emptier_node() {
        let mut busy = NodeInfo::new(Node::new("busy", 4000, 4000));
        busy.add_pod(&Pod::new("pod_0", 2000, 2000));
        let idle = NodeInfo::new(Node::new("idle", 4000, 4000));
        let pod = Pod::new("pod_1", 1000, 1000);

        let plugin = LeastAllocatedResources {};
        // idle: (3000 * 100 / 4000 + 3000 * 100 / 4000) / 2 = 75
        // busy: (1000 * 100 / 4000 + 1000 * 100 / 4000) / 2 = 25
        assert_eq!(75.0, plugin.score(&pod, &idle));
        assert_eq!(25.0, plugin.score(&pod, &busy));
    }
}
