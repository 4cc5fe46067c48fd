//! Outstanding-work counter used to drain before exit.
//!
//! Every accepted frame (and every reverse call into the host) holds an
//! `InFlightGuard`. Final responses hand their guard to the output sequencer,
//! which drops it only after the bytes reached the stream, so `wait_idle`
//! returning means every started response has been written.

use std::sync::Arc;

use tokio::sync::watch;

#[derive(Clone)]
pub struct InFlight {
    count: Arc<watch::Sender<usize>>,
}

impl Default for InFlight {
    fn default() -> Self {
        Self::new()
    }
}

impl InFlight {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self {
            count: Arc::new(tx),
        }
    }

    /// Count one more unit of work until the returned guard is dropped.
    pub fn begin(&self) -> InFlightGuard {
        self.count.send_modify(|n| *n += 1);
        InFlightGuard {
            count: Arc::clone(&self.count),
        }
    }

    pub fn count(&self) -> usize {
        *self.count.borrow()
    }

    /// Resolve once the count reaches zero.
    pub async fn wait_idle(&self) {
        let mut rx = self.count.subscribe();
        // The sender lives in self, so the channel cannot close here.
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

#[must_use = "dropping the guard immediately ends the tracked work"]
pub struct InFlightGuard {
    count: Arc<watch::Sender<usize>>,
}

impl std::fmt::Debug for InFlightGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InFlightGuard").finish_non_exhaustive()
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.count.send_modify(|n| *n = n.saturating_sub(1));
    }
}
