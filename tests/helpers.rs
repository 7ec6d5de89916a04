use kubernetriks_planner::core::node::Node;
use kubernetriks_planner::core::scheduler::kube_scheduler::KubeScheduler;
use kubernetriks_planner::planner::capacity_planner::CapacityPlanner;
use kubernetriks_planner::planner::prompt::ScriptedDecisions;
use kubernetriks_planner::planner::interface::Decision;
use kubernetriks_planner::simulator::{AppResource, ResourceTypes};
use kubernetriks_planner::test_util::helpers::{cluster, pods, GI};

/// One node with a whole core and 1Gi, two pods which need a whole core each.
pub fn one_core_cluster_with_two_pods() -> ResourceTypes {
    cluster(
        vec![Node::new("node_0", 1000, GI)],
        pods("pod", 2, 1000, 256 << 20),
    )
}

#[allow(dead_code)]
pub fn scripted_planner(
    cluster: ResourceTypes,
    apps: Vec<AppResource>,
    new_node: Option<Node>,
    decisions: Vec<Decision>,
) -> CapacityPlanner<ScriptedDecisions> {
    CapacityPlanner::new(
        cluster,
        apps,
        Box::new(KubeScheduler::default()),
        ScriptedDecisions::new(decisions),
    )
    .with_new_node(new_node)
}
