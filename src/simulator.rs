//! Represents entry point for simulator: the driver which pushes pods through the placement
//! engine one at a time and collects the results.

use std::sync::Arc;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};

use crate::core::common::{ObjectMeta, DEFAULT_SCHEDULER_NAME, LABEL_APP_NAME};
use crate::core::node::Node;
use crate::core::object::InertObject;
use crate::core::persistent_storage::PersistentStorage;
use crate::core::pod::{Pod, PodOutcome};
use crate::core::rendezvous::{OutcomeReceiver, Rendezvous};
use crate::core::scheduler::interface::PodSchedulingAlgorithm;
use crate::core::scheduler::scheduler::Scheduler;
use crate::error::{SimulationError, SimulationResult, StorageError};
use crate::metrics::collector::{lock_collector, RunMetrics, SharedMetricsCollector};

const SENTINEL_POD_NAME: &str = "simulator-sentinel";
const SENTINEL_POD_NAMESPACE: &str = "simulator-system";

/// Objects of a cluster or of an application, as produced by the config loader.
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct ResourceTypes {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub pods: Vec<Pod>,
    /// Ancillary objects copied into the store verbatim.
    #[serde(default)]
    pub objects: Vec<InertObject>,
}

#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct AppResource {
    pub name: String,
    pub resource: ResourceTypes,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnscheduledPod {
    pub pod: Pod,
    pub reason: String,
}

/// Node together with the pods bound to it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterNodeStatus {
    pub node: Node,
    pub pods: Vec<Pod>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct SimulateResult {
    pub unscheduled_pods: Vec<UnscheduledPod>,
    pub node_status: Vec<ClusterNodeStatus>,
    pub metrics: RunMetrics,
}

impl SimulateResult {
    pub fn bound_pod_count(&self) -> usize {
        self.node_status.iter().map(|status| status.pods.len()).sum()
    }
}

fn engine_error(joined: Result<SimulationResult<()>, JoinError>) -> SimulationError {
    match joined {
        Ok(Err(err)) => err,
        Ok(Ok(())) => SimulationError::EngineStopped,
        Err(err) => SimulationError::Engine(err.to_string()),
    }
}

pub struct Simulator {
    storage: PersistentStorage,
    rendezvous: Arc<Rendezvous>,
    scheduler_names: Vec<String>,
    shutdown: watch::Sender<bool>,
    engine: Option<JoinHandle<SimulationResult<()>>>,
    metrics_collector: SharedMetricsCollector,
}

impl Simulator {
    /// Creates an empty store and starts the placement engine on it.
    pub async fn new(scheduler_algorithm: Box<dyn PodSchedulingAlgorithm>) -> Self {
        let storage = PersistentStorage::new();
        let rendezvous = Arc::new(Rendezvous::new());
        let metrics_collector = SharedMetricsCollector::default();
        let scheduler_names = scheduler_algorithm.scheduler_names();

        let scheduler = Scheduler::new(
            storage.clone(),
            rendezvous.clone(),
            scheduler_algorithm,
            metrics_collector.clone(),
        )
        .await;
        let (shutdown, shutdown_rx) = watch::channel(false);
        let engine = tokio::spawn(scheduler.run(shutdown_rx));

        Self {
            storage,
            rendezvous,
            scheduler_names,
            shutdown,
            engine: Some(engine),
            metrics_collector,
        }
    }

    pub fn storage(&self) -> &PersistentStorage {
        &self.storage
    }

    /// Copies nodes and ancillary objects of the cluster into the store, then schedules the
    /// cluster's pods.
    pub async fn run_cluster(&mut self, cluster: ResourceTypes) -> SimulationResult<SimulateResult> {
        info!(
            "Running cluster: {} nodes, {} pods, {} objects",
            cluster.nodes.len(),
            cluster.pods.len(),
            cluster.objects.len()
        );
        for node in cluster.nodes {
            let synthetic = node.is_synthetic();
            self.storage.create_node(node).await?;
            let mut metrics = lock_collector(&self.metrics_collector);
            metrics.nodes_total += 1;
            if synthetic {
                metrics.nodes_synthetic += 1;
            }
        }
        self.copy_objects(cluster.objects).await?;

        let unscheduled_pods = self.schedule_pods(cluster.pods).await?;
        Ok(self.result(unscheduled_pods).await)
    }

    /// Copies ancillary objects of the application into the store, labels its pods with the
    /// application name and schedules them.
    pub async fn schedule_app(&mut self, app: AppResource) -> SimulationResult<SimulateResult> {
        info!(
            "Scheduling app {:?}: {} pods",
            app.name,
            app.resource.pods.len()
        );
        if !app.resource.nodes.is_empty() {
            warn!(
                "Ignoring {} nodes defined by app {:?}",
                app.resource.nodes.len(),
                app.name
            );
        }
        self.copy_objects(app.resource.objects).await?;

        let pods = app
            .resource
            .pods
            .into_iter()
            .map(|mut pod| {
                pod.metadata
                    .labels
                    .insert(LABEL_APP_NAME.to_string(), app.name.clone());
                pod
            })
            .collect();
        let unscheduled_pods = self.schedule_pods(pods).await?;
        Ok(self.result(unscheduled_pods).await)
    }

    async fn copy_objects(&self, objects: Vec<InertObject>) -> SimulationResult<()> {
        for object in objects {
            self.storage.create_object(object).await?;
        }
        Ok(())
    }

    /// Empty scheduler names are replaced by the default one, names the engine does not serve are
    /// rejected before anything is submitted.
    fn normalize_scheduler_names(&self, pods: &mut [Pod]) -> SimulationResult<()> {
        for pod in pods.iter_mut() {
            if pod.spec.scheduler_name.is_empty() {
                pod.spec.scheduler_name = DEFAULT_SCHEDULER_NAME.to_string();
            }
            if !pod.is_assigned() && !self.scheduler_names.contains(&pod.spec.scheduler_name) {
                return Err(SimulationError::UnknownScheduler {
                    pod: pod.key(),
                    scheduler: pod.spec.scheduler_name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Submits pods one at a time in input order. Each pod reaches its terminal outcome before the
    /// next one is submitted. Rejected pods are deleted from the store and returned.
    pub async fn schedule_pods(&mut self, mut pods: Vec<Pod>) -> SimulationResult<Vec<UnscheduledPod>> {
        self.normalize_scheduler_names(&mut pods)?;

        let mut unscheduled_pods = Vec::new();
        for pod in pods {
            let pod_key = pod.key();

            if pod.is_assigned() {
                if self.storage.get_node(&pod.spec.node_name).await.is_none() {
                    let reason = format!("assigned node {} does not exist", pod.spec.node_name);
                    warn!("Pod {:?} is not placed: {}", pod_key, reason);
                    lock_collector(&self.metrics_collector).pods_unschedulable += 1;
                    unscheduled_pods.push(UnscheduledPod { pod, reason });
                    continue;
                }
                debug!("Pod {:?} is already running on {:?}", pod_key, pod.spec.node_name);
                self.storage.create_pod(pod).await?;
                lock_collector(&self.metrics_collector).pods_passthrough += 1;
                continue;
            }

            let receiver = self.rendezvous.expect(&pod_key)?;
            if let Err(err) = self.storage.create_pod(pod.clone()).await {
                self.rendezvous.cancel(&pod_key);
                return Err(err.into());
            }
            lock_collector(&self.metrics_collector).pods_submitted += 1;

            match self.await_outcome(receiver).await? {
                PodOutcome::Bound(node_name) => {
                    debug!("Pod {:?} is bound to {:?}", pod_key, node_name);
                    lock_collector(&self.metrics_collector).pods_bound += 1;
                }
                PodOutcome::Rejected(reason) => {
                    self.storage.delete_pod(&pod_key).await?;
                    lock_collector(&self.metrics_collector).pods_unschedulable += 1;
                    unscheduled_pods.push(UnscheduledPod { pod, reason });
                }
            }
        }
        Ok(unscheduled_pods)
    }

    /// Waits for the outcome of the pod in flight. If the engine stops first, its error is
    /// returned instead.
    async fn await_outcome(&mut self, receiver: OutcomeReceiver) -> SimulationResult<PodOutcome> {
        let Some(mut engine) = self.engine.take() else {
            return Err(SimulationError::EngineStopped);
        };
        let finished = tokio::select! {
            biased;
            outcome = receiver => match outcome {
                Ok(outcome) => Ok(outcome),
                // the rendezvous was closed, the engine is on its way out
                Err(_) => Err(None),
            },
            joined = &mut engine => Err(Some(joined)),
        };
        match finished {
            Ok(outcome) => {
                self.engine = Some(engine);
                Ok(outcome)
            }
            Err(Some(joined)) => Err(engine_error(joined)),
            Err(None) => Err(engine_error(engine.await)),
        }
    }

    /// Per-node status of the current store content, nodes and pods in name order.
    pub async fn node_status(&self) -> Vec<ClusterNodeStatus> {
        let snapshot = self.storage.snapshot().await;
        snapshot
            .nodes
            .values()
            .map(|node| ClusterNodeStatus {
                node: node.clone(),
                pods: snapshot
                    .pods
                    .values()
                    .filter(|pod| pod.spec.node_name == node.metadata.name)
                    .cloned()
                    .collect(),
            })
            .collect()
    }

    async fn result(&self, unscheduled_pods: Vec<UnscheduledPod>) -> SimulateResult {
        SimulateResult {
            unscheduled_pods,
            node_status: self.node_status().await,
            metrics: lock_collector(&self.metrics_collector).snapshot(),
        }
    }

    /// Pushes a pod without requests through the whole pipeline, so every decision made before
    /// it is finished.
    async fn flush(&mut self) -> SimulationResult<()> {
        let Some(scheduler_name) = self
            .scheduler_names
            .iter()
            .find(|name| name.as_str() == DEFAULT_SCHEDULER_NAME)
            .or_else(|| self.scheduler_names.first())
            .cloned()
        else {
            return Ok(());
        };
        if self.engine.is_none() || self.rendezvous.is_closed() {
            return Ok(());
        }

        let mut sentinel = Pod::new(SENTINEL_POD_NAME, 0, 0);
        sentinel.metadata = ObjectMeta {
            namespace: SENTINEL_POD_NAMESPACE.to_string(),
            ..ObjectMeta::named(SENTINEL_POD_NAME)
        };
        sentinel.spec.scheduler_name = scheduler_name;
        let sentinel_key = sentinel.key();

        let receiver = self.rendezvous.expect(&sentinel_key)?;
        if let Err(err) = self.storage.create_pod(sentinel).await {
            self.rendezvous.cancel(&sentinel_key);
            return Err(err.into());
        }
        let outcome = self.await_outcome(receiver).await?;
        debug!("Sentinel pod flushed: {:?}", outcome);
        match self.storage.delete_pod(&sentinel_key).await {
            Ok(_) | Err(StorageError::NotFound { .. }) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Tears the simulation down: drain in-flight decisions, stop the engine, close the
    /// rendezvous, release the store.
    pub async fn close(mut self) -> SimulationResult<()> {
        let flushed = self.flush().await;

        let _ = self.shutdown.send(true);
        self.rendezvous.close();
        let stopped = match self.engine.take() {
            Some(engine) => match engine.await {
                Ok(result) => result,
                Err(err) => Err(SimulationError::Engine(err.to_string())),
            },
            None => Ok(()),
        };
        drop(self.storage);

        info!("Simulator closed");
        flushed.and(stopped)
    }

    async fn run_all(
        &mut self,
        cluster: ResourceTypes,
        apps: Vec<AppResource>,
    ) -> SimulationResult<SimulateResult> {
        let mut unscheduled_pods = self.run_cluster(cluster).await?.unscheduled_pods;
        for app in apps {
            unscheduled_pods.extend(self.schedule_app(app).await?.unscheduled_pods);
        }
        Ok(self.result(unscheduled_pods).await)
    }
}

/// Runs one complete simulation: fresh store and engine, the cluster, every app in order,
/// teardown. The algorithm is cloned, so the caller's instance stays untouched.
pub async fn simulate(
    cluster: ResourceTypes,
    apps: Vec<AppResource>,
    scheduler_algorithm: &(dyn PodSchedulingAlgorithm + 'static),
) -> SimulationResult<SimulateResult> {
    let mut simulator = Simulator::new(dyn_clone::clone_box(scheduler_algorithm)).await;
    let result = simulator.run_all(cluster, apps).await;
    let closed = simulator.close().await;

    let result = result?;
    closed?;
    info!(
        "Simulation finished: {} pods bound, {} pods unscheduled",
        result.bound_pod_count(),
        result.unscheduled_pods.len()
    );
    Ok(result)
}
