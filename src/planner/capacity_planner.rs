//! Capacity planner: reruns the simulation with more synthetic nodes until every pod is placed
//! and the utilization policy holds, or the decision maker gives up.

use log::{info, warn};

use crate::core::node::Node;
use crate::core::scheduler::interface::PodSchedulingAlgorithm;
use crate::error::{ConfigError, SimulationResult};
use crate::metrics::policy::UtilizationPolicy;
use crate::planner::interface::{
    Decision, DecisionMaker, PlanOutcome, PlannerState, PlanningCondition, PlanningPrompt,
    MAX_EXTRA_NODES,
};
use crate::simulator::{simulate, AppResource, ResourceTypes, SimulateResult};

pub struct CapacityPlanner<D: DecisionMaker> {
    cluster: ResourceTypes,
    apps: Vec<AppResource>,
    /// Template of synthetic nodes.
    new_node: Option<Node>,
    policy: UtilizationPolicy,
    scheduler_algorithm: Box<dyn PodSchedulingAlgorithm>,
    decision_maker: D,

    state: PlannerState,
    extra_nodes: u64,
    runs: u32,
}

impl<D: DecisionMaker> CapacityPlanner<D> {
    pub fn new(
        cluster: ResourceTypes,
        apps: Vec<AppResource>,
        scheduler_algorithm: Box<dyn PodSchedulingAlgorithm>,
        decision_maker: D,
    ) -> Self {
        Self {
            cluster,
            apps,
            new_node: None,
            policy: UtilizationPolicy::default(),
            scheduler_algorithm,
            decision_maker,
            state: PlannerState::Idle,
            extra_nodes: 0,
            runs: 0,
        }
    }

    pub fn with_new_node(mut self, new_node: Option<Node>) -> Self {
        self.new_node = new_node;
        self
    }

    pub fn with_policy(mut self, policy: UtilizationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn state(&self) -> PlannerState {
        self.state
    }

    pub fn extra_nodes(&self) -> u64 {
        self.extra_nodes
    }

    pub fn decision_maker(&self) -> &D {
        &self.decision_maker
    }

    fn transition(&mut self, next: PlannerState) {
        info!("Capacity planner: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Base cluster plus `extra_nodes` clones of the template.
    fn cluster_with_extra_nodes(&self) -> Result<ResourceTypes, ConfigError> {
        let mut cluster = self.cluster.clone();
        if self.extra_nodes == 0 {
            return Ok(cluster);
        }
        let template = self
            .new_node
            .as_ref()
            .ok_or(ConfigError::MissingNodeTemplate)?;
        let synthetic = Node::synthetic_from_template(template, self.extra_nodes, &cluster.nodes);
        cluster.nodes.extend(synthetic);
        Ok(cluster)
    }

    fn finish(&mut self, state: PlannerState, result: SimulateResult) -> PlanOutcome {
        self.transition(state);
        PlanOutcome {
            state,
            extra_nodes: self.extra_nodes,
            runs: self.runs,
            result,
        }
    }

    /// Runs the planning loop to `Success` or `Aborted`. Errors are configuration or engine
    /// failures only; an abort returns the last result.
    pub async fn run(&mut self) -> SimulationResult<PlanOutcome> {
        loop {
            self.transition(PlannerState::Simulating);
            let cluster = self.cluster_with_extra_nodes()?;
            let result = simulate(
                cluster,
                self.apps.clone(),
                self.scheduler_algorithm.as_ref(),
            )
            .await?;
            self.runs += 1;

            let condition = if !result.unscheduled_pods.is_empty() {
                self.transition(PlannerState::UnscheduledFound);
                PlanningCondition::Unscheduled {
                    count: result.unscheduled_pods.len(),
                }
            } else {
                match self.policy.evaluate(&result.node_status) {
                    Ok(()) => {
                        self.transition(PlannerState::Satisfied);
                        return Ok(self.finish(PlannerState::Success, result));
                    }
                    Err(violation) => {
                        self.transition(PlannerState::PolicyViolated);
                        warn!("{}", violation);
                        PlanningCondition::PolicyViolated(violation)
                    }
                }
            };

            // Showing unscheduled pods does not rerun the simulation.
            loop {
                let decision = self.decision_maker.decide(&PlanningPrompt {
                    condition: &condition,
                    extra_nodes: self.extra_nodes,
                    result: &result,
                });
                info!("Decision: {:?}", decision);
                match decision {
                    Decision::ShowUnscheduled => {
                        self.decision_maker.inspect(&result.unscheduled_pods)
                    }
                    Decision::AddNodes(count) => {
                        if count > 0 && self.new_node.is_none() {
                            return Err(ConfigError::MissingNodeTemplate.into());
                        }
                        match self
                            .extra_nodes
                            .checked_add(count)
                            .filter(|total| *total <= MAX_EXTRA_NODES)
                        {
                            Some(total) => {
                                self.extra_nodes = total;
                                break;
                            }
                            None => warn!(
                                "Refusing to add {} nodes to {}: at most {} synthetic nodes",
                                count, self.extra_nodes, MAX_EXTRA_NODES
                            ),
                        }
                    }
                    Decision::Abort => return Ok(self.finish(PlannerState::Aborted, result)),
                }
            }
        }
    }
}
