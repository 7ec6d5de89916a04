mod helpers;

use kubernetriks_planner::core::node::Node;
use kubernetriks_planner::error::{ConfigError, SimulationError};
use kubernetriks_planner::metrics::policy::{PolicyViolation, UtilizationPolicy};
use kubernetriks_planner::planner::capacity_planner::CapacityPlanner;
use kubernetriks_planner::planner::interface::{
    Decision, PlannerState, PlanningCondition, MAX_EXTRA_NODES,
};
use kubernetriks_planner::planner::prompt::AbortOnFailure;
use kubernetriks_planner::test_util::helpers::{
    check_pods_are_conserved, cluster, default_test_simulation_config, pods, GI,
};

use crate::helpers::{one_core_cluster_with_two_pods, scripted_planner};

fn template() -> Node {
    Node::new("new_node", 1000, GI)
}

#[tokio::test]
async fn test_adding_one_node_places_everything() {
    let mut planner = scripted_planner(
        one_core_cluster_with_two_pods(),
        vec![],
        Some(template()),
        vec![Decision::AddNodes(1)],
    );
    let outcome = planner.run().await.unwrap();

    assert_eq!(PlannerState::Success, outcome.state);
    assert_eq!(PlannerState::Success, planner.state());
    assert_eq!(1, outcome.extra_nodes);
    assert_eq!(2, outcome.runs);
    assert!(outcome.result.unscheduled_pods.is_empty());
    check_pods_are_conserved(2, &outcome.result);

    let synthetic: Vec<&str> = outcome
        .result
        .node_status
        .iter()
        .filter(|status| status.node.is_synthetic())
        .map(|status| status.node.name())
        .collect();
    assert_eq!(vec!["new_node_1"], synthetic);
    assert_eq!(1, outcome.result.metrics.nodes_synthetic);

    assert_eq!(
        vec![(PlanningCondition::Unscheduled { count: 1 }, 0)],
        planner.decision_maker().prompts
    );
}

#[tokio::test]
async fn test_capacity_increments_accumulate() {
    let mut planner = scripted_planner(
        cluster(
            vec![Node::new("node_0", 1000, GI)],
            pods("pod", 3, 1000, 128 << 20),
        ),
        vec![],
        Some(template()),
        vec![Decision::AddNodes(1), Decision::AddNodes(1)],
    );
    let outcome = planner.run().await.unwrap();

    assert_eq!(PlannerState::Success, outcome.state);
    assert_eq!(2, outcome.extra_nodes);
    assert_eq!(3, outcome.runs);
    assert_eq!(
        vec![
            (PlanningCondition::Unscheduled { count: 2 }, 0),
            (PlanningCondition::Unscheduled { count: 1 }, 1),
        ],
        planner.decision_maker().prompts
    );
}

#[tokio::test]
async fn test_policy_violation_is_reported() {
    let mut planner = scripted_planner(
        cluster(
            vec![Node::new("node_0", 1000, GI)],
            pods("pod", 2, 400, 128 << 20),
        ),
        vec![],
        Some(template()),
        vec![],
    )
    .with_policy(UtilizationPolicy::default().with_max_cpu(50));
    let outcome = planner.run().await.unwrap();

    // nothing left unscheduled, but 80% of cpu is requested
    assert!(outcome.result.unscheduled_pods.is_empty());
    assert_eq!(PlannerState::Aborted, outcome.state);
    let violation = PolicyViolation {
        resource: "cpu".to_string(),
        occupancy: 80,
        ceiling: 50,
    };
    assert_eq!(
        "the average occupancy rate(80%) of cpu goes beyond the setting(50%)",
        violation.to_string()
    );
    assert_eq!(
        vec![(PlanningCondition::PolicyViolated(violation), 0)],
        planner.decision_maker().prompts
    );
}

#[tokio::test]
async fn test_policy_violation_allows_adding_nodes() {
    let mut planner = scripted_planner(
        cluster(
            vec![Node::new("node_0", 1000, GI)],
            pods("pod", 2, 400, 128 << 20),
        ),
        vec![],
        Some(template()),
        vec![Decision::AddNodes(1)],
    )
    .with_policy(UtilizationPolicy::default().with_max_cpu(50));
    let outcome = planner.run().await.unwrap();

    // 800m of 2000m
    assert_eq!(PlannerState::Success, outcome.state);
    assert_eq!(1, outcome.extra_nodes);
    assert!(matches!(
        planner.decision_maker().prompts[0].0,
        PlanningCondition::PolicyViolated(_)
    ));
}

#[tokio::test]
async fn test_abort_returns_last_result() {
    let mut planner = scripted_planner(
        one_core_cluster_with_two_pods(),
        vec![],
        Some(template()),
        vec![Decision::Abort],
    );
    let outcome = planner.run().await.unwrap();

    assert_eq!(PlannerState::Aborted, outcome.state);
    assert_eq!(1, outcome.runs);
    assert_eq!(0, outcome.extra_nodes);
    assert_eq!(1, outcome.result.unscheduled_pods.len());
    assert_eq!("pod_1", outcome.result.unscheduled_pods[0].pod.metadata.name);
}

#[tokio::test]
async fn test_showing_unscheduled_does_not_rerun() {
    let mut planner = scripted_planner(
        one_core_cluster_with_two_pods(),
        vec![],
        Some(template()),
        vec![Decision::ShowUnscheduled, Decision::ShowUnscheduled, Decision::Abort],
    );
    let outcome = planner.run().await.unwrap();

    assert_eq!(1, outcome.runs);
    let decision_maker = planner.decision_maker();
    assert_eq!(3, decision_maker.prompts.len());
    assert_eq!(2, decision_maker.inspected.len());
    assert_eq!(outcome.result.unscheduled_pods, decision_maker.inspected[0]);
}

#[tokio::test]
async fn test_adding_nodes_without_template_is_config_error() {
    let mut planner = scripted_planner(
        one_core_cluster_with_two_pods(),
        vec![],
        None,
        vec![Decision::AddNodes(1)],
    );
    let result = planner.run().await;
    assert!(matches!(
        result,
        Err(SimulationError::Config(ConfigError::MissingNodeTemplate))
    ));
}

#[tokio::test]
async fn test_planner_from_config() {
    let config = default_test_simulation_config(Some(
        r#"
    cluster:
      node_groups:
      - node_count: 2
        node_template:
          metadata:
            name: worker
          status:
            allocatable:
              cpu: "2"
              memory: 4Gi
    apps:
    - name: shop
      pods:
      - pod_count: 4
        pod_template:
          metadata:
            name: cart
          spec:
            resources:
              requests:
                cpu: 500m
                memory: 1Gi
    policy:
      max_cpu: 60
    "#,
    ));
    let policy = config.policy_with_env(|_| None).unwrap();

    let mut planner = CapacityPlanner::new(
        config.cluster_resources(),
        config.app_resources(),
        Box::new(config.scheduler_algorithm()),
        AbortOnFailure::default(),
    )
    .with_new_node(config.new_node.clone())
    .with_policy(policy);
    let outcome = planner.run().await.unwrap();

    // 2000m of 4000m requested
    assert_eq!(PlannerState::Success, outcome.state);
    assert_eq!(4, outcome.result.bound_pod_count());
    // least allocated scoring spreads pods over both workers
    for status in outcome.result.node_status.iter() {
        assert_eq!(2, status.pods.len());
    }
}

#[tokio::test]
async fn test_template_named_like_a_node_group() {
    let config = default_test_simulation_config(Some(
        r#"
    cluster:
      node_groups:
      - node_count: 2
        node_template:
          metadata:
            name: worker
          status:
            allocatable:
              cpu: "1"
              memory: 4Gi
    apps:
    - name: batch
      pods:
      - pod_count: 3
        pod_template:
          metadata:
            name: job
          spec:
            resources:
              requests:
                cpu: "1"
                memory: 1Gi
    new_node:
      metadata:
        name: worker
      status:
        allocatable:
          cpu: "1"
          memory: 4Gi
    "#,
    ));

    let mut planner = scripted_planner(
        config.cluster_resources(),
        config.app_resources(),
        config.new_node.clone(),
        vec![Decision::AddNodes(1)],
    );
    let outcome = planner.run().await.unwrap();

    assert_eq!(PlannerState::Success, outcome.state);
    assert_eq!(2, outcome.runs);
    assert_eq!(3, outcome.result.bound_pod_count());
    let names: Vec<&str> = outcome
        .result
        .node_status
        .iter()
        .map(|status| status.node.name())
        .collect();
    assert_eq!(vec!["worker_0", "worker_1", "worker_2"], names);
    assert!(outcome.result.node_status[2].node.is_synthetic());
}

#[tokio::test]
async fn test_oversized_increments_are_refused() {
    // the second increment overflows the running total
    let mut planner = scripted_planner(
        cluster(
            vec![Node::new("node_0", 1000, GI)],
            pods("pod", 3, 1000, 128 << 20),
        ),
        vec![],
        Some(template()),
        vec![Decision::AddNodes(1), Decision::AddNodes(u64::MAX), Decision::Abort],
    );
    let outcome = planner.run().await.unwrap();

    assert_eq!(PlannerState::Aborted, outcome.state);
    assert_eq!(1, outcome.extra_nodes);
    assert_eq!(2, outcome.runs);
    assert_eq!(1, outcome.result.unscheduled_pods.len());

    let mut planner = scripted_planner(
        one_core_cluster_with_two_pods(),
        vec![],
        Some(template()),
        vec![Decision::AddNodes(MAX_EXTRA_NODES + 1), Decision::Abort],
    );
    let outcome = planner.run().await.unwrap();

    assert_eq!(PlannerState::Aborted, outcome.state);
    assert_eq!(0, outcome.extra_nodes);
    assert_eq!(1, outcome.runs);
    assert_eq!(2, planner.decision_maker().prompts.len());
}
