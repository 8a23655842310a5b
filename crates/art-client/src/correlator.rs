//! Pending-request table.
//!
//! Responses from the device are matched to waiters by correlation key:
//! the request id when the device echoes it, otherwise a well-known
//! sub-event name. Each key has at most one waiter.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use frameart_protocol::ServiceMessage;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::error::RequestError;

#[derive(Default)]
struct Table {
    next_generation: u64,
    waiters: HashMap<String, (u64, oneshot::Sender<ServiceMessage>)>,
}

/// Shared table of outstanding requests.
#[derive(Clone, Default)]
pub struct PendingRequests {
    table: Arc<Mutex<Table>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a waiter under `key`.
    ///
    /// Fails with [`RequestError::KeyInUse`] while another live waiter holds
    /// the key.
    pub fn register(&self, key: &str) -> Result<Waiter, RequestError> {
        let mut table = self.lock();
        if let Some((_, tx)) = table.waiters.get(key)
            && !tx.is_closed()
        {
            return Err(RequestError::KeyInUse(key.to_owned()));
        }

        table.next_generation += 1;
        let generation = table.next_generation;
        let (tx, rx) = oneshot::channel();
        table.waiters.insert(key.to_owned(), (generation, tx));
        trace!(key, generation, "waiter registered");

        Ok(Waiter {
            key: key.to_owned(),
            generation,
            rx,
            pending: self.clone(),
        })
    }

    fn take(&self, key: &str) -> Option<oneshot::Sender<ServiceMessage>> {
        self.lock().waiters.remove(key).map(|(_, tx)| tx)
    }

    /// Hands `msg` to at most one waiter: by request id first, then by
    /// sub-event name. Returns whether a waiter took it.
    pub fn resolve(&self, msg: ServiceMessage) -> bool {
        let mut msg = msg;

        if let Some(id) = msg.request_id()
            && let Some(tx) = self.take(&id)
        {
            match tx.send(msg) {
                Ok(()) => {
                    debug!(key = %id, "matched by request id");
                    return true;
                }
                Err(returned) => msg = returned,
            }
        }

        let sub_event = msg.sub_event().to_owned();
        if !sub_event.is_empty()
            && let Some(tx) = self.take(&sub_event)
            && tx.send(msg).is_ok()
        {
            debug!(key = %sub_event, "matched by sub-event");
            return true;
        }
        false
    }

    /// Drops every waiter; each one observes [`RequestError::Cancelled`].
    pub fn cancel_all(&self) {
        let drained: Vec<_> = self.lock().waiters.drain().collect();
        if !drained.is_empty() {
            debug!(count = drained.len(), "cancelling pending requests");
        }
    }

    /// Generation of the most recently registered waiter.
    pub(crate) fn generation(&self) -> u64 {
        self.lock().next_generation
    }

    /// Drops waiters registered at or before `generation`, leaving newer
    /// ones in place.
    pub(crate) fn cancel_through(&self, generation: u64) {
        let mut table = self.lock();
        let before = table.waiters.len();
        table.waiters.retain(|_, (g, _)| *g > generation);
        let count = before - table.waiters.len();
        if count > 0 {
            debug!(count, generation, "cancelling pending requests");
        }
    }

    pub fn len(&self) -> usize {
        self.lock().waiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().waiters.contains_key(key)
    }

    fn remove_generation(&self, key: &str, generation: u64) {
        let mut table = self.lock();
        if table.waiters.get(key).is_some_and(|(g, _)| *g == generation) {
            table.waiters.remove(key);
        }
    }
}

/// Receiving half of a registered request. Dropping it frees the key.
pub struct Waiter {
    key: String,
    generation: u64,
    rx: oneshot::Receiver<ServiceMessage>,
    pending: PendingRequests,
}

impl Waiter {
    /// Waits up to `timeout` for the matching message.
    pub async fn wait(mut self, timeout: Duration) -> Result<ServiceMessage, RequestError> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(msg)) => Ok(msg),
            Ok(Err(_)) => Err(RequestError::Cancelled),
            Err(_) => {
                debug!(key = %self.key, ?timeout, "timed out waiting for response");
                Err(RequestError::Timeout)
            }
        }
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        self.pending.remove_generation(&self.key, self.generation);
    }
}
