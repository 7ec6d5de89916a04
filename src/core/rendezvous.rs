//! Single-slot rendezvous between the simulation driver and the placement engine.
//!
//! The driver registers the pod it is about to submit with [`Rendezvous::expect`] and awaits the
//! returned receiver. The engine delivers the terminal outcome of that pod exactly once with
//! [`Rendezvous::deliver`]. Only one pod may be in flight: an outcome for any other pod identity
//! is dropped, so outcomes can never be attributed to the wrong pod.
//!
//! After [`Rendezvous::close`] a pending receiver observes a closed channel and later deliveries
//! are ignored, which keeps a late decision from blocking or crashing the engine.

use std::sync::{Mutex, MutexGuard, PoisonError};

use log::warn;
use tokio::sync::oneshot;

use crate::core::pod::PodOutcome;
use crate::error::{SimulationError, SimulationResult};

pub type OutcomeReceiver = oneshot::Receiver<PodOutcome>;

enum Slot {
    Empty,
    Awaiting {
        pod_key: String,
        sender: oneshot::Sender<PodOutcome>,
    },
    Closed,
}

pub struct Rendezvous {
    slot: Mutex<Slot>,
}

impl Default for Rendezvous {
    fn default() -> Self {
        Self::new()
    }
}

impl Rendezvous {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::Empty),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Occupies the slot for `pod_key`. Must be called before the pod is submitted, so that an
    /// outcome produced right after submission has somewhere to go.
    pub fn expect(&self, pod_key: &str) -> SimulationResult<OutcomeReceiver> {
        let mut slot = self.lock();
        let pending = match &*slot {
            Slot::Closed => return Err(SimulationError::EngineStopped),
            Slot::Awaiting { pod_key, sender } if !sender.is_closed() => Some(pod_key.clone()),
            // Empty, or the previous receiver was dropped without an outcome.
            _ => None,
        };
        if let Some(pending) = pending {
            return Err(SimulationError::RendezvousBusy {
                pending,
                requested: pod_key.to_string(),
            });
        }

        let (sender, receiver) = oneshot::channel();
        *slot = Slot::Awaiting {
            pod_key: pod_key.to_string(),
            sender,
        };
        Ok(receiver)
    }

    /// Hands the outcome to the driver if it awaits exactly this pod. Returns whether the outcome
    /// was accepted.
    pub fn deliver(&self, pod_key: &str, outcome: PodOutcome) -> bool {
        let mut slot = self.lock();
        let matches = matches!(&*slot, Slot::Awaiting { pod_key: pending, .. } if pending == pod_key);
        if !matches {
            warn!(
                "Dropping outcome {:?} of pod {:?}: nobody awaits it",
                outcome, pod_key
            );
            return false;
        }
        match std::mem::replace(&mut *slot, Slot::Empty) {
            Slot::Awaiting { sender, .. } => sender.send(outcome).is_ok(),
            other => {
                *slot = other;
                false
            }
        }
    }

    /// Frees the slot without an outcome, e.g. when submitting the pod failed.
    pub fn cancel(&self, pod_key: &str) {
        let mut slot = self.lock();
        if matches!(&*slot, Slot::Awaiting { pod_key: pending, .. } if pending == pod_key) {
            *slot = Slot::Empty;
        }
    }

    /// Closes the rendezvous for good. A pending receiver gets `RecvError`.
    pub fn close(&self) {
        *self.lock() = Slot::Closed;
    }

    pub fn is_closed(&self) -> bool {
        matches!(&*self.lock(), Slot::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_outcome_is_delivered_to_awaited_pod_only() {
        let rendezvous = Rendezvous::new();
        let receiver = rendezvous.expect("default/pod_1").unwrap();

        assert!(!rendezvous.deliver("default/pod_2", PodOutcome::Bound("node".to_string())));
        assert!(rendezvous.deliver("default/pod_1", PodOutcome::Rejected("full".to_string())));
        assert_eq!(PodOutcome::Rejected("full".to_string()), receiver.await.unwrap());

        // Slot is free again, a second delivery for the same pod is dropped.
        assert!(!rendezvous.deliver("default/pod_1", PodOutcome::Bound("node".to_string())));
    }

    #[tokio::test]
    async fn test_single_pod_in_flight() {
        let rendezvous = Rendezvous::new();
        let _receiver = rendezvous.expect("default/pod_1").unwrap();
        assert!(matches!(
            rendezvous.expect("default/pod_2"),
            Err(SimulationError::RendezvousBusy { .. })
        ));

        rendezvous.cancel("default/pod_1");
        assert!(rendezvous.expect("default/pod_2").is_ok());
    }

    #[tokio::test]
    async fn test_dropped_receiver_frees_the_slot() {
        let rendezvous = Rendezvous::new();
        drop(rendezvous.expect("default/pod_1").unwrap());
        assert!(rendezvous.expect("default/pod_2").is_ok());
    }

    #[tokio::test]
    async fn test_close_wakes_pending_receiver_and_ignores_late_outcomes() {
        let rendezvous = Rendezvous::new();
        let receiver = rendezvous.expect("default/pod_1").unwrap();
        rendezvous.close();

        assert!(receiver.await.is_err());
        assert!(rendezvous.is_closed());
        assert!(!rendezvous.deliver("default/pod_1", PodOutcome::Bound("node".to_string())));
        assert!(matches!(
            rendezvous.expect("default/pod_2"),
            Err(SimulationError::EngineStopped)
        ));
    }
}
