//! Bounded worker dispatch for message handlers.
//!
//! `submit` never blocks the caller: each message is handed to a spawned
//! worker task and the caller gets a future for the handler's boolean
//! verdict. Backpressure lives in the consumer's acquire-before-read
//! semaphore sized to `max_worker_count`, not here.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{warn, Instrument, Span};

use pulse_core::message::Envelope;

/// Processes one envelope. `true` means the message is durably handled and
/// may be acked; `false` means handling failed but redelivery is undesired —
/// the message is still acked and the failure surfaces in request state.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: Envelope) -> bool;
}

/// Runs a [`MessageHandler`] on worker tasks, re-establishing the caller's
/// span inside the worker so handler spans parent correctly across the
/// submit boundary.
pub struct Dispatcher {
    handler: Arc<dyn MessageHandler>,
    max_worker_count: usize,
    closed: AtomicBool,
}

impl Dispatcher {
    pub fn new(handler: Arc<dyn MessageHandler>, max_worker_count: usize) -> Self {
        Self {
            handler,
            max_worker_count,
            closed: AtomicBool::new(false),
        }
    }

    /// Pool size; the consumer sizes its backpressure semaphore to this.
    pub fn max_worker_count(&self) -> usize {
        self.max_worker_count
    }

    /// Submit one message for handling. Returns immediately with a future for
    /// the handler's verdict. After `close()`, messages are not handled and
    /// the future resolves `true` so the caller still acks.
    pub fn submit(&self, message: Envelope) -> JoinHandle<bool> {
        if self.closed.load(Ordering::SeqCst) {
            warn!(
                request_id = %message.request_id(),
                "dispatcher closed, skipping message"
            );
            return tokio::spawn(async { true });
        }

        let handler = Arc::clone(&self.handler);
        let span = Span::current();
        tokio::spawn(async move { handler.handle(message).await }.instrument(span))
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
