use crate::config::SimulationConfig;
use crate::core::node::Node;
use crate::core::pod::Pod;
use crate::simulator::{AppResource, ResourceTypes, SimulateResult};

pub const GI: u64 = 1 << 30;

pub fn default_test_simulation_config(with_suffix: Option<&str>) -> SimulationConfig {
    let mut default = r#"
    sim_name: "test_kubernetriks_planner"
    "#
    .to_string();

    if let Some(suffix) = with_suffix {
        default.push_str(suffix);
    }

    serde_yaml::from_str::<SimulationConfig>(&default).unwrap()
}

pub fn cluster(nodes: Vec<Node>, pods: Vec<Pod>) -> ResourceTypes {
    ResourceTypes {
        nodes,
        pods,
        objects: vec![],
    }
}

pub fn app(name: &str, pods: Vec<Pod>) -> AppResource {
    AppResource {
        name: name.to_string(),
        resource: ResourceTypes {
            pods,
            ..Default::default()
        },
    }
}

/// Pods named `<prefix>_<idx>` with equal requests.
pub fn pods(prefix: &str, count: usize, cpu: u64, memory: u64) -> Vec<Pod> {
    (0..count)
        .map(|idx| Pod::new(&format!("{}_{}", prefix, idx), cpu, memory))
        .collect()
}

/// Every submitted pod is either bound to a node or reported unscheduled.
pub fn check_pods_are_conserved(submitted: usize, result: &SimulateResult) {
    assert_eq!(
        submitted,
        result.bound_pod_count() + result.unscheduled_pods.len()
    );
}

/// `(pod key, node name)` of every bound pod, in node then pod order.
pub fn assignments(result: &SimulateResult) -> Vec<(String, String)> {
    result
        .node_status
        .iter()
        .flat_map(|status| {
            status
                .pods
                .iter()
                .map(|pod| (pod.key(), status.node.name().to_string()))
        })
        .collect()
}
