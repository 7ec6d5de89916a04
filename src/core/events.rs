//! Change notifications which the cluster state store publishes to its subscribers.
//!
//! Every notification carries a snapshot of the pod taken right after the mutation, while the
//! store was still locked, so all subscribers observe mutations in the same order.

use crate::core::pod::Pod;

#[derive(Debug, Clone, PartialEq)]
pub enum PodEvent {
    /// Pod is created in the store. Pods without an assigned node are waiting for a placement
    /// decision.
    Added(Pod),
    /// Placement fields of the pod changed: it was bound to a node or rejected.
    Updated(Pod),
    /// Pod is removed from the store.
    Deleted(Pod),
}

impl PodEvent {
    pub fn pod(&self) -> &Pod {
        match self {
            PodEvent::Added(pod) | PodEvent::Updated(pod) | PodEvent::Deleted(pod) => pod,
        }
    }
}
