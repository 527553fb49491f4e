//! In-flight message registry and per-message visibility renewal.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::OwnedSemaphorePermit;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::traits::TopicConsumer;

/// State tracked for one in-flight message.
///
/// The entry owns the consumer's backpressure permit: the slot is only freed
/// when the entry is removed and dropped by the registry's owner.
pub struct InFlightEntry {
    pub receipt_handle: String,
    pub extender: Option<JoinHandle<()>>,
    pub permit: OwnedSemaphorePermit,
}

/// Messages currently being handled, keyed by broker message id.
///
/// All mutation happens on the consumer task (worker completions are routed
/// back to it as signals); the interior mutex only guards reads like `len`
/// from other tasks.
#[derive(Default)]
pub struct InFlightRegistry {
    inner: Mutex<HashMap<String, InFlightEntry>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a message as in flight, parking its slot permit in the
    /// entry. Returns `false` when the id is already registered (a
    /// redelivery racing the running attempt); the rejected permit is
    /// dropped here, releasing the caller's slot.
    pub fn register(
        &self,
        message_id: &str,
        receipt_handle: &str,
        permit: OwnedSemaphorePermit,
    ) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.contains_key(message_id) {
            return false;
        }
        inner.insert(
            message_id.to_string(),
            InFlightEntry {
                receipt_handle: receipt_handle.to_string(),
                extender: None,
                permit,
            },
        );
        true
    }

    /// Attach the renewal task for a registered message. If the message has
    /// already completed, the task is aborted immediately.
    pub fn attach_extender(&self, message_id: &str, handle: JoinHandle<()>) {
        let mut inner = self.inner.lock().unwrap();
        match inner.get_mut(message_id) {
            Some(entry) => entry.extender = Some(handle),
            None => handle.abort(),
        }
    }

    /// Remove and return the entry for a completed message; `None` when it
    /// was not registered. Dropping the returned entry releases its slot.
    pub fn unregister(&self, message_id: &str) -> Option<InFlightEntry> {
        self.inner.lock().unwrap().remove(message_id)
    }

    pub fn contains(&self, message_id: &str) -> bool {
        self.inner.lock().unwrap().contains_key(message_id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Spawns per-message renewal tasks that re-arm the broker's visibility
/// timeout while a handler is still running.
pub struct VisibilityExtender {
    consumer: Arc<dyn TopicConsumer>,
    visibility_timeout_secs: u32,
}

impl VisibilityExtender {
    pub fn new(consumer: Arc<dyn TopicConsumer>, visibility_timeout_secs: u32) -> Self {
        Self {
            consumer,
            visibility_timeout_secs,
        }
    }

    /// Start renewing one message's lease. Fires at ⅔ of the timeout so a
    /// renewal always lands before expiry. The caller aborts the returned
    /// task when the message completes.
    ///
    /// Renewal failures are logged and the loop keeps going: the message may
    /// be redelivered, which the in-flight registry absorbs.
    pub fn spawn(&self, message_id: String, receipt_handle: String) -> JoinHandle<()> {
        let consumer = Arc::clone(&self.consumer);
        let timeout = self.visibility_timeout_secs;
        let interval = Duration::from_secs(((timeout as u64) * 2 / 3).max(1));

        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                match consumer.extend_visibility(&receipt_handle, timeout).await {
                    Ok(()) => debug!(message_id = %message_id, "visibility extended"),
                    Err(e) => warn!(
                        message_id = %message_id,
                        error = %e,
                        "visibility extension failed"
                    ),
                }
            }
        })
    }
}
