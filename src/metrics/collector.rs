//! Implements centralized storage for metrics of one simulation run. The placement engine and the
//! simulation driver report into it, the report printer reads a [`RunMetrics`] snapshot.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use average::{concatenate, Estimate, Max, Mean, Min, Variance};
use serde::Serialize;

concatenate!(
    Estimator,
    [Min, min],
    [Max, max],
    [Mean, mean],
    [Variance, population_variance]
);

impl std::fmt::Debug for Estimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Estimator")
            .field("min", &self.min())
            .field("max", &self.max())
            .field("mean", &self.mean())
            .field("population_variance", &self.population_variance())
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct EstimatorWrapper {
    estimator: Estimator,
    count: u64,
}

impl EstimatorWrapper {
    pub fn new() -> Self {
        Self {
            estimator: Estimator::new(),
            count: 0,
        }
    }

    pub fn add(&mut self, value: f64) {
        self.estimator.add(value);
        self.count += 1;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Statistics of the added values, all zeros if nothing was added.
    pub fn stats(&self) -> TimingsStats {
        if self.count == 0 {
            return TimingsStats::default();
        }
        TimingsStats {
            count: self.count,
            min: self.estimator.min(),
            max: self.estimator.max(),
            mean: self.estimator.mean(),
            variance: self.estimator.population_variance(),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct TimingsStats {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub variance: f64,
}

/// Counters and timings of a finished simulation run.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct RunMetrics {
    pub nodes_total: u64,
    pub nodes_synthetic: u64,
    pub pods_submitted: u64,
    pub pods_bound: u64,
    pub pods_unschedulable: u64,
    pub pods_passthrough: u64,
    /// Seconds spent by the placement algorithm on a single decision.
    pub pod_scheduling_algorithm_latency: TimingsStats,
}

#[derive(Debug, Default)]
pub struct MetricsCollector {
    /// The number of nodes copied into the state store, synthetic ones included.
    pub nodes_total: u64,
    /// The number of nodes added by the capacity planner.
    pub nodes_synthetic: u64,
    /// The number of pods submitted to the placement engine.
    pub pods_submitted: u64,
    /// The number of submitted pods which were bound to a node.
    pub pods_bound: u64,
    /// The number of pods which could not be placed, passthrough pods with a missing node
    /// included.
    pub pods_unschedulable: u64,
    /// The number of pods which arrived with an assigned node and skipped the placement engine.
    pub pods_passthrough: u64,

    /// Estimations for the time the placement algorithm took to decide on a pod, rejections
    /// included.
    pub pod_scheduling_algorithm_latency_stats: EstimatorWrapper,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_pod_scheduling_algorithm_latency(&mut self, value: f64) {
        self.pod_scheduling_algorithm_latency_stats.add(value);
    }

    pub fn snapshot(&self) -> RunMetrics {
        RunMetrics {
            nodes_total: self.nodes_total,
            nodes_synthetic: self.nodes_synthetic,
            pods_submitted: self.pods_submitted,
            pods_bound: self.pods_bound,
            pods_unschedulable: self.pods_unschedulable,
            pods_passthrough: self.pods_passthrough,
            pod_scheduling_algorithm_latency: self.pod_scheduling_algorithm_latency_stats.stats(),
        }
    }
}

/// Collector shared between the placement engine task and the simulation driver.
pub type SharedMetricsCollector = Arc<Mutex<MetricsCollector>>;

pub fn lock_collector(collector: &SharedMetricsCollector) -> MutexGuard<'_, MetricsCollector> {
    collector.lock().unwrap_or_else(PoisonError::into_inner)
}
