//! Decision makers: an interactive terminal prompt, a scripted queue of decisions and a policy
//! which gives up on the first unsatisfying run.

use std::collections::VecDeque;
use std::io::{self, BufRead, Stdin, Stdout, Write};

use log::warn;

use crate::planner::interface::{
    Decision, DecisionMaker, PlanningCondition, PlanningPrompt, MAX_EXTRA_NODES,
};
use crate::simulator::UnscheduledPod;

/// Parses one line of operator input. `None` for anything unrecognized.
pub fn parse_decision(line: &str) -> Option<Decision> {
    let mut words = line.split_whitespace();
    let decision = match (words.next()?, words.next()) {
        ("show", None) => Decision::ShowUnscheduled,
        ("exit" | "abort", None) => Decision::Abort,
        ("add", Some(count)) => Decision::AddNodes(count.parse().ok()?),
        _ => return None,
    };
    if words.next().is_some() {
        return None;
    }
    Some(decision)
}

/// Reads decisions line by line. End of input or a read error aborts.
pub struct InteractivePrompt<R, W> {
    input: R,
    output: W,
}

impl InteractivePrompt<io::StdinLock<'static>, Stdout> {
    pub fn stdio() -> Self {
        let stdin: Stdin = io::stdin();
        Self::new(stdin.lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> InteractivePrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_output(self) -> W {
        self.output
    }
}

impl<R: BufRead, W: Write> DecisionMaker for InteractivePrompt<R, W> {
    fn decide(&mut self, prompt: &PlanningPrompt) -> Decision {
        loop {
            let _ = write!(self.output, "{}\n> ", prompt);
            let _ = self.output.flush();

            let mut line = String::new();
            match self.input.read_line(&mut line) {
                Ok(0) => return Decision::Abort,
                Ok(_) => {}
                Err(err) => {
                    warn!("Failed to read decision: {}", err);
                    return Decision::Abort;
                }
            }
            match parse_decision(&line) {
                Some(Decision::AddNodes(count))
                    if count > MAX_EXTRA_NODES.saturating_sub(prompt.extra_nodes) =>
                {
                    let _ = writeln!(
                        self.output,
                        "can not add {} nodes, at most {} synthetic nodes are allowed",
                        count, MAX_EXTRA_NODES
                    );
                }
                Some(decision) => return decision,
                None => {
                    let _ = writeln!(self.output, "unknown command: {:?}", line.trim());
                }
            }
        }
    }

    fn inspect(&mut self, unscheduled_pods: &[UnscheduledPod]) {
        for (idx, unscheduled) in unscheduled_pods.iter().enumerate() {
            let _ = writeln!(
                self.output,
                "{:4} {}: {}",
                idx,
                unscheduled.pod.key(),
                unscheduled.reason
            );
        }
    }
}

/// Replays a fixed list of decisions, aborting once it is exhausted. Remembers what it was asked.
#[derive(Debug, Default)]
pub struct ScriptedDecisions {
    decisions: VecDeque<Decision>,
    /// Conditions and extra node counts of every prompt, in order.
    pub prompts: Vec<(PlanningCondition, u64)>,
    /// Unscheduled pods shown on `ShowUnscheduled`.
    pub inspected: Vec<Vec<UnscheduledPod>>,
}

impl ScriptedDecisions {
    pub fn new(decisions: impl IntoIterator<Item = Decision>) -> Self {
        Self {
            decisions: decisions.into_iter().collect(),
            ..Default::default()
        }
    }
}

impl DecisionMaker for ScriptedDecisions {
    fn decide(&mut self, prompt: &PlanningPrompt) -> Decision {
        self.prompts
            .push((prompt.condition.clone(), prompt.extra_nodes));
        self.decisions.pop_front().unwrap_or(Decision::Abort)
    }

    fn inspect(&mut self, unscheduled_pods: &[UnscheduledPod]) {
        self.inspected.push(unscheduled_pods.to_vec());
    }
}

/// Non-interactive runs: any unscheduled pod or policy violation ends planning.
#[derive(Debug, Default)]
pub struct AbortOnFailure {}

impl DecisionMaker for AbortOnFailure {
    fn decide(&mut self, prompt: &PlanningPrompt) -> Decision {
        warn!("{}", prompt.condition);
        Decision::Abort
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pod::Pod;
    use crate::simulator::SimulateResult;

    #[test]
    fn test_parse_decision() {
        assert_eq!(Some(Decision::ShowUnscheduled), parse_decision("show\n"));
        assert_eq!(Some(Decision::AddNodes(3)), parse_decision("  add 3 "));
        assert_eq!(Some(Decision::Abort), parse_decision("exit"));
        assert_eq!(None, parse_decision("add"));
        assert_eq!(None, parse_decision("add -1"));
        assert_eq!(None, parse_decision("add 1 2"));
        assert_eq!(None, parse_decision(""));
    }

    #[test]
    fn test_interactive_prompt_retries_and_aborts_on_eof() {
        let result = SimulateResult::default();
        let condition = PlanningCondition::Unscheduled { count: 2 };
        let prompt = PlanningPrompt {
            condition: &condition,
            extra_nodes: 1,
            result: &result,
        };

        let input = "grow\nadd 2\n".as_bytes();
        let mut interactive = InteractivePrompt::new(input, Vec::new());
        assert_eq!(Decision::AddNodes(2), interactive.decide(&prompt));
        assert_eq!(Decision::Abort, interactive.decide(&prompt));

        let output = String::from_utf8(interactive.into_output()).unwrap();
        assert!(output.starts_with(
            "there are still 2 pod(s) that can not be scheduled when add 1 nodes, you can:"
        ));
        assert!(output.contains("unknown command: \"grow\""));
    }

    #[test]
    fn test_interactive_prompt_refuses_oversized_increments() {
        let result = SimulateResult::default();
        let condition = PlanningCondition::Unscheduled { count: 1 };
        let prompt = PlanningPrompt {
            condition: &condition,
            extra_nodes: 1,
            result: &result,
        };

        let input = "add 4000000000
add 10000
add 9999
".as_bytes();
        let mut interactive = InteractivePrompt::new(input, Vec::new());
        assert_eq!(Decision::AddNodes(9999), interactive.decide(&prompt));

        let output = String::from_utf8(interactive.into_output()).unwrap();
        assert_eq!(2, output.matches("can not add").count());
    }

    #[test]
    fn test_interactive_inspect_lists_reasons() {
        let mut interactive = InteractivePrompt::new("".as_bytes(), Vec::new());
        interactive.inspect(&[UnscheduledPod {
            pod: Pod::new("pod_1", 1, 1),
            reason: "no room".to_string(),
        }]);
        assert_eq!(
            "   0 default/pod_1: no room\n",
            String::from_utf8(interactive.into_output()).unwrap()
        );
    }
}
