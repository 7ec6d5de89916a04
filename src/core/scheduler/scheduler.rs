//! Implementation of scheduler component which is responsible for placing pods onto nodes.
//!
//! The scheduler runs as an independent task for the lifetime of a simulation. It consumes pods
//! waiting for placement from the state store, asks the pluggable algorithm exactly once per pod
//! and writes the terminal outcome back: the pod is either bound to a node or marked
//! unschedulable with a reason. The outcome is then handed to the simulation driver through the
//! rendezvous.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, error, info, trace};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::watch;

use crate::core::events::PodEvent;
use crate::core::persistent_storage::{PersistentStorage, PlacementWriter, StorageData};
use crate::core::pod::{Pod, PodOutcome, UNSCHEDULABLE_REASON};
use crate::core::rendezvous::Rendezvous;
use crate::core::scheduler::interface::{NodeInfo, PodSchedulingAlgorithm};
use crate::error::{SimulationError, SimulationResult};
use crate::metrics::collector::{lock_collector, SharedMetricsCollector};

/// Nodes of the snapshot ordered by name, each with the requests of pods bound to it.
pub fn node_infos(snapshot: &StorageData) -> Vec<NodeInfo> {
    let mut infos: Vec<NodeInfo> = snapshot
        .nodes
        .values()
        .cloned()
        .map(NodeInfo::new)
        .collect();
    for pod in snapshot.pods.values().filter(|pod| pod.is_assigned()) {
        if let Ok(idx) = infos.binary_search_by(|info| info.name().cmp(pod.spec.node_name.as_str())) {
            infos[idx].add_pod(pod);
        }
    }
    infos
}

pub struct Scheduler {
    storage: PersistentStorage,
    writer: PlacementWriter,
    rendezvous: Arc<Rendezvous>,
    scheduler_algorithm: Box<dyn PodSchedulingAlgorithm>,
    /// Changes of pods which should be placed by this scheduler.
    pod_events: UnboundedReceiver<PodEvent>,
    metrics_collector: SharedMetricsCollector,
}

impl Scheduler {
    pub async fn new(
        storage: PersistentStorage,
        rendezvous: Arc<Rendezvous>,
        scheduler_algorithm: Box<dyn PodSchedulingAlgorithm>,
        metrics_collector: SharedMetricsCollector,
    ) -> Self {
        let scheduler_names: HashSet<String> =
            scheduler_algorithm.scheduler_names().into_iter().collect();
        let pod_events = storage
            .subscribe(move |pod| scheduler_names.contains(&pod.spec.scheduler_name))
            .await;
        Self {
            writer: storage.placement_writer(),
            storage,
            rendezvous,
            scheduler_algorithm,
            pod_events,
            metrics_collector,
        }
    }

    /// Decision loop. Returns when `shutdown` fires, or with an error on the first engine failure.
    /// On failure the rendezvous is closed, so a driver waiting for an outcome wakes up.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> SimulationResult<()> {
        info!("Scheduler started");

        let result = loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    info!("Scheduler shutting down");
                    break Ok(());
                }
                event = self.pod_events.recv() => match event {
                    Some(PodEvent::Added(pod)) => {
                        if let Err(err) = self.schedule_pod(pod).await {
                            break Err(err);
                        }
                    }
                    Some(other) => trace!("Skipping event {:?}", other),
                    None => break Ok(()),
                }
            }
        };

        if let Err(err) = &result {
            error!("Scheduler stopped: {}", err);
            self.rendezvous.close();
        }
        result
    }

    async fn schedule_pod(&mut self, pod: Pod) -> SimulationResult<()> {
        let pod_key = pod.key();
        if pod.is_assigned() {
            trace!("Pod {:?} is already assigned to {:?}", pod_key, pod.spec.node_name);
            return Ok(());
        }

        let nodes = node_infos(&self.storage.snapshot().await);

        let pod_schedule_time = Instant::now();
        let decision = self.scheduler_algorithm.schedule_one(&pod, &nodes);
        lock_collector(&self.metrics_collector)
            .increment_pod_scheduling_algorithm_latency(pod_schedule_time.elapsed().as_secs_f64());

        let outcome = match decision {
            Ok(assigned_node) => {
                self.writer.bind(&pod_key, &assigned_node).await?;
                debug!("Pod {:?} has been assigned a Node {:?}", pod_key, assigned_node);
                PodOutcome::Bound(assigned_node)
            }
            Err(err) if err.is_rejection() => {
                self.writer.reject(&pod_key, &err.to_string()).await?;
                let reason = format!(
                    "failed to schedule pod ({}): {}: {}",
                    pod_key, UNSCHEDULABLE_REASON, err
                );
                debug!("{}", reason);
                PodOutcome::Rejected(reason)
            }
            Err(err) => {
                return Err(SimulationError::Engine(format!(
                    "failed to schedule pod {}: {}",
                    pod_key, err
                )))
            }
        };

        self.rendezvous.deliver(&pod_key, outcome);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::core::common::DEFAULT_SCHEDULER_NAME;
    use crate::core::node::Node;
    use crate::core::scheduler::interface::ScheduleError;
    use crate::core::scheduler::kube_scheduler::KubeScheduler;
    use crate::metrics::collector::MetricsCollector;

    fn pod(name: &str, cpu: u64, memory: u64) -> Pod {
        let mut pod = Pod::new(name, cpu, memory);
        pod.spec.scheduler_name = DEFAULT_SCHEDULER_NAME.to_string();
        pod
    }

    #[tokio::test]
    async fn test_node_infos_sum_bound_pods() {
        let storage = PersistentStorage::new();
        storage.create_node(Node::new("node_b", 1000, 1000)).await.unwrap();
        storage.create_node(Node::new("node_a", 1000, 1000)).await.unwrap();
        let mut bound = Pod::new("bound", 300, 400);
        bound.spec.node_name = "node_b".to_string();
        storage.create_pod(bound).await.unwrap();
        storage.create_pod(Pod::new("pending", 100, 100)).await.unwrap();

        let infos = node_infos(&storage.snapshot().await);
        assert_eq!("node_a", infos[0].name());
        assert_eq!(0, infos[0].pod_count);
        assert_eq!(700, infos[1].free("cpu"));
        assert_eq!(1, infos[1].pod_count);
    }

    #[tokio::test]
    async fn test_scheduler_delivers_outcomes_and_stops() {
        let storage = PersistentStorage::new();
        storage.create_node(Node::new("node_1", 1000, 1000)).await.unwrap();
        let rendezvous = Arc::new(Rendezvous::new());
        let metrics = Arc::new(Mutex::new(MetricsCollector::new()));
        let scheduler = Scheduler::new(
            storage.clone(),
            rendezvous.clone(),
            Box::new(KubeScheduler::default()),
            metrics.clone(),
        )
        .await;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(scheduler.run(shutdown_rx));

        let receiver = rendezvous.expect("default/pod_1").unwrap();
        storage.create_pod(pod("pod_1", 600, 100)).await.unwrap();
        assert_eq!(PodOutcome::Bound("node_1".to_string()), receiver.await.unwrap());

        let receiver = rendezvous.expect("default/pod_2").unwrap();
        storage.create_pod(pod("pod_2", 600, 100)).await.unwrap();
        assert_eq!(
            PodOutcome::Rejected(
                "failed to schedule pod (default/pod_2): Unschedulable: \
                 0/1 nodes are available: 1 Insufficient cpu."
                    .to_string()
            ),
            receiver.await.unwrap()
        );

        shutdown_tx.send(true).unwrap();
        assert!(handle.await.unwrap().is_ok());
        assert_eq!(
            2,
            lock_collector(&metrics).pod_scheduling_algorithm_latency_stats.count()
        );
    }

    #[derive(Clone)]
    struct BindsToMissingNode {}

    impl PodSchedulingAlgorithm for BindsToMissingNode {
        fn scheduler_names(&self) -> Vec<String> {
            vec![DEFAULT_SCHEDULER_NAME.to_string()]
        }

        fn schedule_one(&self, _pod: &Pod, _nodes: &[NodeInfo]) -> Result<String, ScheduleError> {
            Ok("missing".to_string())
        }
    }

    #[tokio::test]
    async fn test_engine_failure_closes_rendezvous() {
        let storage = PersistentStorage::new();
        let rendezvous = Arc::new(Rendezvous::new());
        let scheduler = Scheduler::new(
            storage.clone(),
            rendezvous.clone(),
            Box::new(BindsToMissingNode {}),
            Default::default(),
        )
        .await;
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(scheduler.run(shutdown_rx));

        let receiver = rendezvous.expect("default/pod_1").unwrap();
        storage.create_pod(pod("pod_1", 100, 100)).await.unwrap();

        assert!(receiver.await.is_err());
        assert!(matches!(
            handle.await.unwrap(),
            Err(SimulationError::Storage(_))
        ));
        assert!(rendezvous.is_closed());
    }
}
