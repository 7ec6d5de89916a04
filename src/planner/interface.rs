use std::fmt;

use log::info;
use serde::Serialize;

use crate::metrics::policy::PolicyViolation;
use crate::simulator::{SimulateResult, UnscheduledPod};

/// Upper bound on synthetic nodes of a planning session.
pub const MAX_EXTRA_NODES: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlannerState {
    Idle,
    Simulating,
    UnscheduledFound,
    PolicyViolated,
    Satisfied,
    Success,
    Aborted,
}

/// Choice of the external decision maker after an unsatisfying run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Look at the unscheduled pods of the last run, then decide again.
    ShowUnscheduled,
    /// Add this many synthetic nodes on top of the ones added so far and run again.
    AddNodes(u64),
    Abort,
}

/// Why the last run is not acceptable yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanningCondition {
    Unscheduled { count: usize },
    PolicyViolated(PolicyViolation),
}

impl fmt::Display for PlanningCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanningCondition::Unscheduled { count } => {
                write!(f, "there are still {} pod(s) that can not be scheduled", count)
            }
            PlanningCondition::PolicyViolated(violation) => write!(f, "{}", violation),
        }
    }
}

pub struct PlanningPrompt<'a> {
    pub condition: &'a PlanningCondition,
    /// Synthetic nodes the last run was simulated with.
    pub extra_nodes: u64,
    pub result: &'a SimulateResult,
}

impl fmt::Display for PlanningPrompt<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} when add {} nodes, you can: show | add <number> | exit",
            self.condition, self.extra_nodes
        )
    }
}

// Trait which should implement any source of planning decisions: an operator at a terminal,
// a script, a fixed policy.
//
// `decide` is called synchronously from the async planner loop and may block for as long as it
// needs: the previous simulation is torn down, its engine task joined, before the planner asks.
// Implementations must not rely on other tasks of the runtime making progress meanwhile.
pub trait DecisionMaker {
    fn decide(&mut self, prompt: &PlanningPrompt) -> Decision;

    /// Called on `Decision::ShowUnscheduled`.
    fn inspect(&mut self, unscheduled_pods: &[UnscheduledPod]) {
        for (idx, unscheduled) in unscheduled_pods.iter().enumerate() {
            info!("{:4} {}: {}", idx, unscheduled.pod.key(), unscheduled.reason);
        }
    }
}

/// Result of a finished planning session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanOutcome {
    /// `Success` or `Aborted`.
    pub state: PlannerState,
    /// Synthetic nodes the returned result was simulated with.
    pub extra_nodes: u64,
    /// Number of simulation runs made.
    pub runs: u32,
    pub result: SimulateResult,
}
