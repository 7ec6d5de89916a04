//! Implementation of persistent storage for saving all information about kubernetes objects.
//! In k8s etcd plays this role, in our simulator it is an in-memory store shared by the
//! simulation driver and the placement engine.
//!
//! All mutations take the write lock, snapshots take the read lock, so both sides observe a
//! single order of changes. Placement fields of pods (assigned node, scheduling condition) can
//! only be changed through a [`PlacementWriter`], which is handed out to the placement engine
//! exclusively.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, trace};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::RwLock;

use crate::core::events::PodEvent;
use crate::core::node::Node;
use crate::core::object::InertObject;
use crate::core::pod::{Pod, PodConditionType, UNSCHEDULABLE_REASON};
use crate::error::StorageError;

const NODE_KIND: &str = "node";
const POD_KIND: &str = "pod";

#[derive(Default, Debug, Clone)]
pub struct StorageData {
    // State about current nodes of a cluster: <Node name, Node>
    pub nodes: BTreeMap<String, Node>,
    // State about current pods of a cluster: <namespace/name, Pod>
    pub pods: BTreeMap<String, Pod>,
    // Inert objects: <(kind, namespace/name), object>
    pub objects: BTreeMap<(String, String), InertObject>,
}

type PodFilter = Box<dyn Fn(&Pod) -> bool + Send + Sync>;

struct Subscriber {
    filter: PodFilter,
    sender: UnboundedSender<PodEvent>,
}

#[derive(Default)]
struct Inner {
    data: StorageData,
    subscribers: Vec<Subscriber>,
}

impl Inner {
    fn notify(&mut self, event: PodEvent) {
        // Subscribers whose receiver is gone are dropped on the way.
        self.subscribers.retain(|subscriber| {
            if !(subscriber.filter)(event.pod()) {
                return true;
            }
            subscriber.sender.send(event.clone()).is_ok()
        });
    }

    fn pod_mut(&mut self, pod_key: &str) -> Result<&mut Pod, StorageError> {
        self.data
            .pods
            .get_mut(pod_key)
            .ok_or_else(|| not_found(POD_KIND, pod_key))
    }
}

fn not_found(kind: &str, name: &str) -> StorageError {
    StorageError::NotFound {
        kind: kind.to_string(),
        name: name.to_string(),
    }
}

fn duplicate(kind: &str, name: &str) -> StorageError {
    StorageError::DuplicateId {
        kind: kind.to_string(),
        name: name.to_string(),
    }
}

#[derive(Clone, Default)]
pub struct PersistentStorage {
    inner: Arc<RwLock<Inner>>,
}

impl PersistentStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_node(&self, node: Node) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        if inner.data.nodes.contains_key(node.name()) {
            return Err(duplicate(NODE_KIND, node.name()));
        }
        debug!("Created node {:?}", node.name());
        inner.data.nodes.insert(node.metadata.name.clone(), node);
        Ok(())
    }

    pub async fn create_pod(&self, pod: Pod) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        let pod_key = pod.key();
        if inner.data.pods.contains_key(&pod_key) {
            return Err(duplicate(POD_KIND, &pod_key));
        }
        trace!("Created pod {:?}", pod_key);
        inner.data.pods.insert(pod_key, pod.clone());
        inner.notify(PodEvent::Added(pod));
        Ok(())
    }

    pub async fn create_object(&self, object: InertObject) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        let id = (object.kind.clone(), object.key());
        if inner.data.objects.contains_key(&id) {
            return Err(duplicate(&id.0, &id.1));
        }
        inner.data.objects.insert(id, object);
        Ok(())
    }

    pub async fn delete_node(&self, node_name: &str) -> Result<Node, StorageError> {
        self.inner
            .write()
            .await
            .data
            .nodes
            .remove(node_name)
            .ok_or_else(|| not_found(NODE_KIND, node_name))
    }

    pub async fn delete_pod(&self, pod_key: &str) -> Result<Pod, StorageError> {
        let mut inner = self.inner.write().await;
        let pod = inner
            .data
            .pods
            .remove(pod_key)
            .ok_or_else(|| not_found(POD_KIND, pod_key))?;
        trace!("Deleted pod {:?}", pod_key);
        inner.notify(PodEvent::Deleted(pod.clone()));
        Ok(pod)
    }

    pub async fn delete_object(&self, kind: &str, key: &str) -> Result<InertObject, StorageError> {
        self.inner
            .write()
            .await
            .data
            .objects
            .remove(&(kind.to_string(), key.to_string()))
            .ok_or_else(|| not_found(kind, key))
    }

    pub async fn get_node(&self, node_name: &str) -> Option<Node> {
        self.inner.read().await.data.nodes.get(node_name).cloned()
    }

    pub async fn get_pod(&self, pod_key: &str) -> Option<Pod> {
        self.inner.read().await.data.pods.get(pod_key).cloned()
    }

    /// Nodes ordered by name.
    pub async fn list_nodes(&self) -> Vec<Node> {
        self.inner.read().await.data.nodes.values().cloned().collect()
    }

    pub async fn list_objects(&self, kind: &str) -> Vec<InertObject> {
        self.inner
            .read()
            .await
            .data
            .objects
            .values()
            .filter(|object| object.kind == kind)
            .cloned()
            .collect()
    }

    pub async fn node_count(&self) -> usize {
        self.inner.read().await.data.nodes.len()
    }

    pub async fn pod_count(&self) -> usize {
        self.inner.read().await.data.pods.len()
    }

    /// Consistent copy of the whole store.
    pub async fn snapshot(&self) -> StorageData {
        self.inner.read().await.data.clone()
    }

    /// Registers a subscriber for changes of pods accepted by `filter`.
    pub async fn subscribe<F>(&self, filter: F) -> UnboundedReceiver<PodEvent>
    where
        F: Fn(&Pod) -> bool + Send + Sync + 'static,
    {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.inner.write().await.subscribers.push(Subscriber {
            filter: Box::new(filter),
            sender,
        });
        receiver
    }

    pub(crate) fn placement_writer(&self) -> PlacementWriter {
        PlacementWriter {
            inner: self.inner.clone(),
        }
    }
}

/// Exclusive writer of placement fields, owned by the placement engine.
pub struct PlacementWriter {
    inner: Arc<RwLock<Inner>>,
}

impl PlacementWriter {
    /// Sets the assigned node of the pod and marks it scheduled.
    pub async fn bind(&self, pod_key: &str, node_name: &str) -> Result<Pod, StorageError> {
        let mut inner = self.inner.write().await;
        if !inner.data.nodes.contains_key(node_name) {
            return Err(not_found(NODE_KIND, node_name));
        }
        let pod = inner.pod_mut(pod_key)?;
        pod.spec.node_name = node_name.to_string();
        pod.update_condition("True", PodConditionType::PodScheduled, None, None);
        let pod = pod.clone();
        inner.notify(PodEvent::Updated(pod.clone()));
        Ok(pod)
    }

    /// Marks the pod as permanently unschedulable with a human readable reason.
    pub async fn reject(&self, pod_key: &str, message: &str) -> Result<Pod, StorageError> {
        let mut inner = self.inner.write().await;
        let pod = inner.pod_mut(pod_key)?;
        pod.update_condition(
            "False",
            PodConditionType::PodScheduled,
            Some(UNSCHEDULABLE_REASON.to_string()),
            Some(message.to_string()),
        );
        let pod = pod.clone();
        inner.notify(PodEvent::Updated(pod.clone()));
        Ok(pod)
    }
}
