//! Requested versus allocatable occupancy of nodes and of the whole cluster.

use serde::Serialize;

use crate::core::common::{ResourceVector, CPU, MEMORY};
use crate::simulator::ClusterNodeStatus;

/// Occupancy of one resource dimension. `percent` is truncated to an integer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Occupancy {
    pub resource: String,
    pub requested: u64,
    pub allocatable: u64,
    pub percent: u64,
}

impl Occupancy {
    pub fn new(resource: &str, requested: u64, allocatable: u64) -> Self {
        Self {
            resource: resource.to_string(),
            requested,
            allocatable,
            percent: occupancy_percent(requested, allocatable),
        }
    }
}

/// `requested * 100 / allocatable` with floor division. Cpu quantities are millicores, so the
/// ratio never goes through floating point. Nothing allocatable counts as fully occupied unless
/// nothing is requested either.
pub fn occupancy_percent(requested: u64, allocatable: u64) -> u64 {
    if allocatable == 0 {
        return if requested == 0 { 0 } else { 100 };
    }
    (requested as u128 * 100 / allocatable as u128) as u64
}

/// Sum of requests of the pods bound to the node.
pub fn node_requests(status: &ClusterNodeStatus) -> ResourceVector {
    let mut requested = ResourceVector::new();
    for pod in status.pods.iter() {
        requested.add(pod.requests());
    }
    requested
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceAccountant {
    dimensions: Vec<String>,
}

impl Default for ResourceAccountant {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ResourceAccountant {
    /// Accounts cpu, memory and optionally one extended resource.
    pub fn new(extended_resource: Option<&str>) -> Self {
        let mut dimensions = vec![CPU.to_string(), MEMORY.to_string()];
        if let Some(extended) = extended_resource {
            if !dimensions.iter().any(|dimension| dimension == extended) {
                dimensions.push(extended.to_string());
            }
        }
        Self { dimensions }
    }

    pub fn dimensions(&self) -> &[String] {
        &self.dimensions
    }

    pub fn node_occupancy(&self, status: &ClusterNodeStatus) -> Vec<Occupancy> {
        let requested = node_requests(status);
        self.dimensions
            .iter()
            .map(|resource| {
                Occupancy::new(
                    resource,
                    requested.get(resource),
                    status.node.status.allocatable.get(resource),
                )
            })
            .collect()
    }

    /// Totals over all nodes, then one division per dimension.
    pub fn cluster_occupancy(&self, node_status: &[ClusterNodeStatus]) -> Vec<Occupancy> {
        let mut requested = ResourceVector::new();
        let mut allocatable = ResourceVector::new();
        for status in node_status.iter() {
            requested.add(&node_requests(status));
            allocatable.add(&status.node.status.allocatable);
        }
        self.dimensions
            .iter()
            .map(|resource| {
                Occupancy::new(resource, requested.get(resource), allocatable.get(resource))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::node::Node;
    use crate::core::pod::Pod;

    fn status(node: Node, pods: Vec<Pod>) -> ClusterNodeStatus {
        ClusterNodeStatus { node, pods }
    }

    #[test]
    fn test_occupancy_percent_truncates() {
        assert_eq!(33, occupancy_percent(1, 3));
        assert_eq!(66, occupancy_percent(2, 3));
        assert_eq!(100, occupancy_percent(3, 3));
        assert_eq!(0, occupancy_percent(0, 0));
        assert_eq!(100, occupancy_percent(1, 0));
        assert_eq!(99, occupancy_percent(1999, 2000));
    }

    #[test]
    fn test_node_and_cluster_occupancy() {
        let accountant = ResourceAccountant::new(Some("gpu-mem"));
        let node_status = vec![
            status(
                Node::new("node_1", 2000, 4 << 30).with_extended_resource("gpu-mem", 16),
                vec![
                    Pod::new("pod_1", 500, 1 << 30).with_extended_request("gpu-mem", 4),
                    Pod::new("pod_2", 1000, 1 << 30),
                ],
            ),
            status(Node::new("node_2", 2000, 4 << 30), vec![]),
        ];

        let node = accountant.node_occupancy(&node_status[0]);
        assert_eq!(
            vec![75, 50, 25],
            node.iter().map(|o| o.percent).collect::<Vec<u64>>()
        );

        let cluster = accountant.cluster_occupancy(&node_status);
        assert_eq!(Occupancy::new("cpu", 1500, 4000), cluster[0]);
        assert_eq!(37, cluster[0].percent);
        assert_eq!(25, cluster[1].percent);
        assert_eq!(Occupancy::new("gpu-mem", 4, 16), cluster[2]);
    }

    #[test]
    fn test_recomputing_is_idempotent() {
        let accountant = ResourceAccountant::default();
        let node_status = vec![status(
            Node::new("node_1", 3000, 3000),
            vec![Pod::new("pod_1", 1000, 2000)],
        )];
        let first = accountant.cluster_occupancy(&node_status);
        assert_eq!(first, accountant.cluster_occupancy(&node_status));
        assert_eq!(2, accountant.dimensions().len());
    }
}
