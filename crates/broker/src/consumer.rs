//! The broker consumer loop.
//!
//! One task polls the topic and fans work out to the dispatcher. Backpressure
//! is an acquire-before-read semaphore sized to the dispatcher's worker
//! count: a permit is taken before every poll and parked inside the in-flight
//! registry entry, so in-flight handler invocations never exceed
//! `max_worker_count`.
//!
//! Worker tasks never touch the registry or the semaphore. When a handler
//! finishes, its watcher sends a completion signal over an mpsc channel back
//! to the consumer task, which is the sole place that deregisters, cancels
//! the extender, acks the broker (handler `false` also acks — the failure is
//! recorded in request state) and drops the permit. Available permits
//! therefore always equal `max_worker_count − in_flight`, up to the one
//! permit the loop holds transiently while polling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Notify, OwnedSemaphorePermit, Semaphore};
use tracing::{error, info, warn};

use pulse_core::message::Envelope;
use pulse_core::telemetry::{self, TraceContext};

use crate::dispatcher::Dispatcher;
use crate::extender::{InFlightRegistry, VisibilityExtender};
use crate::traits::{BrokerMessage, TopicConsumer};

/// Signal from a worker watcher back to the consumer task. Carries no
/// resources: the registry entry (receipt handle, extender, permit) stays
/// with the consumer task.
struct Completion {
    message_id: String,
    handled: bool,
}

pub struct MessageConsumer {
    topic: String,
    consumer: Arc<dyn TopicConsumer>,
    dispatcher: Arc<Dispatcher>,
    registry: Arc<InFlightRegistry>,
    extender: VisibilityExtender,
    semaphore: Arc<Semaphore>,
    closed: Arc<AtomicBool>,
    close_notify: Arc<Notify>,
}

impl MessageConsumer {
    pub fn new(
        topic: &str,
        consumer: Arc<dyn TopicConsumer>,
        dispatcher: Arc<Dispatcher>,
        visibility_timeout_secs: u32,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(dispatcher.max_worker_count()));
        let extender = VisibilityExtender::new(Arc::clone(&consumer), visibility_timeout_secs);
        Self {
            topic: topic.to_string(),
            consumer,
            dispatcher,
            registry: Arc::new(InFlightRegistry::new()),
            extender,
            semaphore,
            closed: Arc::new(AtomicBool::new(false)),
            close_notify: Arc::new(Notify::new()),
        }
    }

    /// Messages currently being handled.
    pub fn in_flight(&self) -> usize {
        self.registry.len()
    }

    /// Free worker slots.
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Run until closed. Poll errors are logged and retried; nothing escapes
    /// the loop.
    pub async fn run(&self) {
        let (completion_tx, mut completion_rx) = mpsc::unbounded_channel::<Completion>();

        info!(topic = %self.topic, "consumer started");

        while !self.closed.load(Ordering::SeqCst) {
            // Completions are drained here, on this task, before more work
            // is pulled: registry entries and slot permits have exactly one
            // owner. Acquiring a permit before the poll is the only
            // backpressure mechanism.
            let permit = tokio::select! {
                biased;
                Some(done) = completion_rx.recv() => {
                    self.finalize_message(done).await;
                    continue;
                }
                _ = self.close_notify.notified() => break,
                permit = Arc::clone(&self.semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            if self.closed.load(Ordering::SeqCst) {
                break;
            }

            let messages = match self.consumer.poll_batch(1).await {
                Ok(messages) => messages,
                Err(e) => {
                    warn!(topic = %self.topic, error = %e, "poll failed");
                    drop(permit);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            let Some(message) = messages.into_iter().next() else {
                continue;
            };
            self.handle_message(message, permit, &completion_tx).await;
        }

        info!(topic = %self.topic, "consumer stopped");
    }

    async fn handle_message(
        &self,
        message: BrokerMessage,
        permit: OwnedSemaphorePermit,
        completion_tx: &mpsc::UnboundedSender<Completion>,
    ) {
        let envelope = match Envelope::parse(&message.body) {
            Ok(envelope) => envelope,
            Err(e) => {
                // Permanent for this message: ack so it is not redelivered.
                warn!(
                    message_id = %message.id,
                    error = %e,
                    "malformed payload, acking and dropping"
                );
                if let Err(e) = self.consumer.ack(&message.receipt_handle).await {
                    error!(message_id = %message.id, error = %e, "failed to ack dropped message");
                }
                drop(permit);
                return;
            }
        };

        // The permit is parked in the registry entry. A redelivery racing a
        // running attempt is rejected, its permit released by the registry on
        // this same task; the running attempt owns the ack.
        if !self
            .registry
            .register(&message.id, &message.receipt_handle, permit)
        {
            warn!(message_id = %message.id, "message already in flight, skipping");
            return;
        }

        if self.consumer.supports_visibility_extension() {
            let task = self
                .extender
                .spawn(message.id.clone(), message.receipt_handle.clone());
            self.registry.attach_extender(&message.id, task);
        }

        let ctx = TraceContext::extract(envelope.telemetry_headers());
        let span = telemetry::consumer_span(&self.topic, &message.id, ctx.as_ref());
        let verdict = {
            let _entered = span.enter();
            self.dispatcher.submit(envelope)
        };

        // The watcher only signals; resource release happens back on the
        // consumer task in finalize_message.
        let completion_tx = completion_tx.clone();
        let message_id = message.id;
        tokio::spawn(async move {
            let handled = match verdict.await {
                Ok(handled) => handled,
                Err(e) => {
                    error!(message_id = %message_id, error = %e, "handler task failed");
                    false
                }
            };
            let _ = completion_tx.send(Completion { message_id, handled });
        });
    }

    /// Completion handling, always on the consumer task: deregister, cancel
    /// the extender, ack, release the slot.
    async fn finalize_message(&self, done: Completion) {
        let Some(entry) = self.registry.unregister(&done.message_id) else {
            warn!(message_id = %done.message_id, "no in-flight entry at completion");
            return;
        };
        if let Some(extender) = &entry.extender {
            extender.abort();
        }

        if !done.handled {
            warn!(
                message_id = %done.message_id,
                "handler reported failure; acking, failure surfaces in request state"
            );
        }
        if let Err(e) = self.consumer.ack(&entry.receipt_handle).await {
            error!(message_id = %done.message_id, error = %e, "failed to ack message");
        }

        // Dropping the entry releases its permit.
        drop(entry);
    }

    /// Flag the loop to stop. In-flight work is not cancelled; it completes
    /// and acks as usual.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.close_notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
