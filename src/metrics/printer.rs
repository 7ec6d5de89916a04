use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use prettytable::{row, Cell, Row, Table};
use serde::Serialize;

use crate::core::common::format_quantity;
use crate::metrics::collector::RunMetrics;
use crate::metrics::occupancy::{Occupancy, ResourceAccountant};
use crate::planner::interface::{PlanOutcome, PlannerState};
use crate::simulator::{SimulateResult, UnscheduledPod};

fn occupancy_cells(occupancy: &[Occupancy]) -> Vec<Cell> {
    occupancy
        .iter()
        .flat_map(|o| {
            [
                Cell::new(&format_quantity(&o.resource, o.allocatable)),
                Cell::new(&format!(
                    "{}({}%)",
                    format_quantity(&o.resource, o.requested),
                    o.percent
                )),
            ]
        })
        .collect()
}

pub fn cluster_table(result: &SimulateResult, accountant: &ResourceAccountant) -> Table {
    let mut table = Table::new();
    let mut header = vec![Cell::new("Node")];
    for resource in accountant.dimensions() {
        header.push(Cell::new(&format!("{} Allocatable", resource)));
        header.push(Cell::new(&format!("{} Requests", resource)));
    }
    header.push(Cell::new("Pod Count"));
    header.push(Cell::new("New Node"));
    table.add_row(Row::new(header));

    for status in result.node_status.iter() {
        let mut cells = vec![Cell::new(status.node.name())];
        cells.extend(occupancy_cells(&accountant.node_occupancy(status)));
        cells.push(Cell::new(&status.pods.len().to_string()));
        cells.push(Cell::new(if status.node.is_synthetic() { "√" } else { "" }));
        table.add_row(Row::new(cells));
    }

    let mut total = vec![Cell::new("Total")];
    total.extend(occupancy_cells(&accountant.cluster_occupancy(&result.node_status)));
    total.push(Cell::new(&result.bound_pod_count().to_string()));
    total.push(Cell::new(""));
    table.add_row(Row::new(total));
    table
}

/// Pods of applications, with the node each one is bound to.
pub fn app_table(result: &SimulateResult) -> Table {
    let mut table = Table::new();
    table.add_row(row!["Pod", "App Name", "Node"]);
    for status in result.node_status.iter() {
        for pod in status.pods.iter() {
            if let Some(app_name) = pod.app_name() {
                table.add_row(row![pod.key(), app_name, status.node.name()]);
            }
        }
    }
    table
}

pub fn unscheduled_table(unscheduled_pods: &[UnscheduledPod]) -> Table {
    let mut table = Table::new();
    table.add_row(row!["Pod", "Reason"]);
    for unscheduled in unscheduled_pods.iter() {
        table.add_row(row![unscheduled.pod.key(), unscheduled.reason]);
    }
    table
}

pub fn metrics_tables(metrics: &RunMetrics) -> (Table, Table) {
    let mut aggregated_table = Table::new();
    aggregated_table.add_row(row!["Metric", "Count"]);
    aggregated_table.add_row(row!["Total nodes", metrics.nodes_total]);
    aggregated_table.add_row(row!["New nodes", metrics.nodes_synthetic]);
    aggregated_table.add_row(row!["Pods submitted", metrics.pods_submitted]);
    aggregated_table.add_row(row!["Pods bound", metrics.pods_bound]);
    aggregated_table.add_row(row!["Pods unschedulable", metrics.pods_unschedulable]);
    aggregated_table.add_row(row!["Pods already running", metrics.pods_passthrough]);

    let latency = &metrics.pod_scheduling_algorithm_latency;
    let mut stats_table = Table::new();
    stats_table.add_row(row!["Metric", "Min", "Max", "Mean", "Variance"]);
    stats_table.add_row(row![
        "Pod schedule time",
        latency.min,
        latency.max,
        latency.mean,
        latency.variance
    ]);
    (aggregated_table, stats_table)
}

pub fn print_outcome_as_pretty_table<W: Write>(
    out: &mut W,
    outcome: &PlanOutcome,
    accountant: &ResourceAccountant,
) -> io::Result<()> {
    match outcome.state {
        PlannerState::Success => writeln!(out, "Simulation success!")?,
        _ => writeln!(out, "Simulation aborted with {} extra nodes", outcome.extra_nodes)?,
    }

    writeln!(out, "Cluster Info")?;
    cluster_table(&outcome.result, accountant).print(out)?;

    let apps = app_table(&outcome.result);
    if apps.len() > 1 {
        writeln!(out, "App Info")?;
        apps.print(out)?;
    }
    if !outcome.result.unscheduled_pods.is_empty() {
        writeln!(out, "Unscheduled Pods")?;
        unscheduled_table(&outcome.result.unscheduled_pods).print(out)?;
    }

    let (aggregated_table, stats_table) = metrics_tables(&outcome.result.metrics);
    aggregated_table.print(out)?;
    stats_table.print(out)?;
    Ok(())
}

#[derive(Serialize)]
struct NodeReport {
    name: String,
    synthetic: bool,
    occupancy: Vec<Occupancy>,
    pods: Vec<String>,
}

#[derive(Serialize)]
struct OutcomeJSON<'a> {
    state: PlannerState,
    extra_nodes: u64,
    runs: u32,
    cluster_occupancy: Vec<Occupancy>,
    nodes: Vec<NodeReport>,
    unscheduled_pods: Vec<UnscheduledPodReport<'a>>,
    metrics: &'a RunMetrics,
}

#[derive(Serialize)]
struct UnscheduledPodReport<'a> {
    pod: String,
    reason: &'a str,
}

pub fn outcome_as_json(
    outcome: &PlanOutcome,
    accountant: &ResourceAccountant,
) -> serde_json::Result<String> {
    let result = &outcome.result;
    let report = OutcomeJSON {
        state: outcome.state,
        extra_nodes: outcome.extra_nodes,
        runs: outcome.runs,
        cluster_occupancy: accountant.cluster_occupancy(&result.node_status),
        nodes: result
            .node_status
            .iter()
            .map(|status| NodeReport {
                name: status.node.name().to_string(),
                synthetic: status.node.is_synthetic(),
                occupancy: accountant.node_occupancy(status),
                pods: status.pods.iter().map(|pod| pod.key()).collect(),
            })
            .collect(),
        unscheduled_pods: result
            .unscheduled_pods
            .iter()
            .map(|unscheduled| UnscheduledPodReport {
                pod: unscheduled.pod.key(),
                reason: &unscheduled.reason,
            })
            .collect(),
        metrics: &result.metrics,
    };
    serde_json::to_string_pretty(&report)
}

pub fn print_outcome_as_json(
    output_file: &Path,
    outcome: &PlanOutcome,
    accountant: &ResourceAccountant,
) -> io::Result<()> {
    let serialized_json = outcome_as_json(outcome, accountant)?;
    let mut report_file = File::create(output_file)?;
    report_file.write_all(serialized_json.as_bytes())
}
