//! Pending work registry
//!
//! Tracks the in-flight polling task of every running node, keyed by node
//! id, and provides structured cancellation through watch channels. The
//! registry is the only handle on a poll loop: deleting a node or
//! re-running it cancels the previous loop through here.
//!
//! Each registration carries a generation number so a superseded run can
//! never clear the entry of the run that replaced it: `finished` only
//! removes an entry when the caller's token still owns it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::watch;

use crate::types::NodeId;

/// Cancellation handle carried by a polling task
///
/// Cheap to clone; observes the cancel signal of the registration it was
/// created from. A dropped registry entry counts as cancelled.
#[derive(Debug, Clone)]
pub struct CancelToken {
    generation: u64,
    receiver: watch::Receiver<bool>,
}

impl CancelToken {
    /// True once cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Wait until cancellation is requested
    pub async fn cancelled(&mut self) {
        // A closed channel means the registry entry is gone: same outcome
        while !*self.receiver.borrow_and_update() {
            if self.receiver.changed().await.is_err() {
                return;
            }
        }
    }
}

#[derive(Debug)]
struct Registration {
    generation: u64,
    sender: watch::Sender<bool>,
}

/// Registry of in-flight per-node work
#[derive(Debug, Default)]
pub struct PendingWork {
    entries: Mutex<HashMap<NodeId, Registration>>,
    generations: AtomicU64,
}

impl PendingWork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register work for a node, returning its cancellation token
    ///
    /// Registering over an existing entry cancels the previous work first:
    /// a node has at most one live poll loop.
    pub fn register(&self, node: NodeId) -> CancelToken {
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = watch::channel(false);
        let previous = self
            .entries
            .lock()
            .unwrap()
            .insert(node, Registration { generation, sender });
        if let Some(previous) = previous {
            let _ = previous.sender.send(true);
        }
        CancelToken {
            generation,
            receiver,
        }
    }

    /// Cancel the node's pending work, if any
    ///
    /// Returns true if there was work to cancel.
    pub fn cancel(&self, node: NodeId) -> bool {
        match self.entries.lock().unwrap().remove(&node) {
            Some(registration) => {
                let _ = registration.sender.send(true);
                true
            }
            None => false,
        }
    }

    /// Cancel every registered entry
    pub fn cancel_all(&self) {
        for (_, registration) in self.entries.lock().unwrap().drain() {
            let _ = registration.sender.send(true);
        }
    }

    /// Remove a node's entry without signalling (normal completion)
    ///
    /// Only removes the entry that `token` was issued for: a superseded
    /// run completing late leaves the current registration in place.
    pub fn finished(&self, node: NodeId, token: &CancelToken) {
        let mut entries = self.entries.lock().unwrap();
        if entries
            .get(&node)
            .is_some_and(|r| r.generation == token.generation)
        {
            entries.remove(&node);
        }
    }

    /// True if the node has registered work
    pub fn is_pending(&self, node: NodeId) -> bool {
        self.entries.lock().unwrap().contains_key(&node)
    }

    /// Number of registered entries
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}
