//! Correlation of outgoing requests with their responses.
//!
//! Every reverse call into the host gets a fresh id; the response packet with
//! that id completes the call exactly once. Responses with an unknown id
//! (stale, duplicated or forged) are dropped.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::oneshot;

use crate::bridge::Value;
use crate::bridge::packet::MAX_PACKET_ID;

pub type ResponseCallback = Box<dyn FnOnce(Value) + Send + 'static>;

#[derive(Default)]
struct Inner {
    next_id: u32,
    pending: HashMap<u32, ResponseCallback>,
}

impl Inner {
    /// Ids wrap within the 31 bits the packet header carries, skipping any id
    /// still waiting for its response.
    fn allocate(&mut self) -> u32 {
        loop {
            let id = self.next_id;
            self.next_id = (self.next_id + 1) & MAX_PACKET_ID;
            if !self.pending.contains_key(&id) {
                return id;
            }
        }
    }
}

#[derive(Default)]
pub struct CorrelationRegistry {
    inner: Mutex<Inner>,
}

impl CorrelationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Each critical section is a single map operation, so the state is
        // consistent even if a holder panicked.
        self.inner.lock().unwrap_or_else(|poisoned| {
            tracing::error!("Correlation registry mutex poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Allocate an id without registering a callback.
    pub fn next_id(&self) -> u32 {
        self.lock().allocate()
    }

    /// Store `callback` under a fresh id and return the id.
    pub fn register(&self, callback: impl FnOnce(Value) + Send + 'static) -> u32 {
        let mut inner = self.lock();
        let id = inner.allocate();
        inner.pending.insert(id, Box::new(callback));
        id
    }

    /// Register a call whose response is delivered through a oneshot channel.
    pub fn register_oneshot(&self) -> (u32, oneshot::Receiver<Value>) {
        let (tx, rx) = oneshot::channel();
        let id = self.register(move |value| {
            // Receiver gone means the caller stopped waiting.
            let _ = tx.send(value);
        });
        (id, rx)
    }

    /// Complete the call registered under `id`. Returns false if no call was
    /// waiting for it.
    pub fn resolve(&self, id: u32, value: Value) -> bool {
        // Removed under the lock, invoked outside it.
        let callback = self.lock().pending.remove(&id);
        match callback {
            Some(callback) => {
                callback(value);
                true
            }
            None => {
                tracing::trace!(id, "Dropping response with no pending request");
                false
            }
        }
    }

    /// Forget a call without completing it.
    pub fn cancel(&self, id: u32) -> bool {
        self.lock().pending.remove(&id).is_some()
    }

    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }
}
