//! Push channel for continuously displayed front-ends.
//!
//! Subscribers receive `StatusPayload` snapshots through crossbeam channels;
//! observers are plain callbacks. Delivery is best-effort: a subscriber whose
//! buffer is full misses that update, disconnected subscribers are pruned,
//! and there is no ordering guarantee across subscribers.

use std::sync::{Arc, Mutex};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::debug;

use crate::types::StatusPayload;

/// Updates buffered per subscriber before new ones are dropped.
pub const SUBSCRIBER_CAPACITY: usize = 16;

/// Callback invoked with every pushed status.
pub type StatusObserver = Arc<dyn Fn(&StatusPayload) + Send + Sync>;

/// Fan-out of status snapshots.
#[derive(Default)]
pub struct StatusBroadcaster {
    subscribers: Mutex<Vec<Sender<StatusPayload>>>,
    observers: Mutex<Vec<StatusObserver>>,
}

impl StatusBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a channel subscriber.
    pub fn subscribe(&self) -> Receiver<StatusPayload> {
        let (tx, rx) = bounded(SUBSCRIBER_CAPACITY);
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx);
        rx
    }

    /// Registers a callback subscriber.
    pub fn add_observer(&self, observer: StatusObserver) {
        self.observers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(observer);
    }

    /// Number of live channel subscribers plus observers.
    pub fn subscriber_count(&self) -> usize {
        let channels = self.subscribers.lock().unwrap_or_else(|e| e.into_inner()).len();
        let observers = self.observers.lock().unwrap_or_else(|e| e.into_inner()).len();
        channels + observers
    }

    /// Returns true if anyone is listening.
    pub fn has_subscribers(&self) -> bool {
        self.subscriber_count() > 0
    }

    /// Sends `status` to every subscriber and observer.
    pub fn publish(&self, status: &StatusPayload) {
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|tx| match tx.try_send(status.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    debug!("status subscriber is lagging, update dropped");
                    true
                }
                Err(TrySendError::Disconnected(_)) => false,
            });

        // Observers run without holding the lock so they may subscribe.
        let observers: Vec<StatusObserver> = self
            .observers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for observer in observers {
            observer(status);
        }
    }
}
