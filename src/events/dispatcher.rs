use std::sync::Arc;

use crate::api::ApiTransport;
use crate::events::event::Event;
use crate::events::queue::EventQueue;

/// Routes analytics events to the ingestion endpoint.
///
/// Unpaused events are sent immediately on a spawned task, fire-and-forget: delivery
/// failures are logged and the event is discarded (at-most-once). While paused, events
/// accumulate in the queue until [`EventDispatcher::flush`] or a resume drains them in
/// FIFO order, one request per event, with no batching.
pub(crate) struct EventDispatcher {
    queue: Arc<EventQueue>,
    transport: Arc<ApiTransport>,
}

impl EventDispatcher {
    pub(crate) fn new(transport: Arc<ApiTransport>) -> EventDispatcher {
        EventDispatcher {
            queue: Arc::new(EventQueue::new()),
            transport,
        }
    }

    /// Send `event` immediately, or enqueue it if the dispatcher is paused.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn dispatch(&self, event: Event) {
        if self.queue.is_paused() {
            log::debug!(target: "schematic", "dispatcher paused, queueing event");
            self.queue.push(event);
            return;
        }

        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            deliver(&transport, &event).await;
        });
    }

    /// Stop sending immediately; subsequent events queue up until resume or flush.
    pub(crate) fn pause(&self) {
        self.queue.set_paused(true);
    }

    /// Resume immediate sending and drain anything queued while paused.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn resume(&self) {
        self.queue.set_paused(false);
        let queue = Arc::clone(&self.queue);
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            drain(&queue, &transport).await;
        });
    }

    /// Drain the queue in FIFO order, one request per event. Failures are logged and
    /// skipped so a dead endpoint cannot wedge the drain.
    pub(crate) async fn flush(&self) {
        drain(&self.queue, &self.transport).await;
    }

    #[cfg(test)]
    pub(crate) fn queued_event_count(&self) -> usize {
        self.queue.len()
    }
}

async fn drain(queue: &EventQueue, transport: &ApiTransport) {
    while let Some(event) = queue.pop() {
        deliver(transport, &event).await;
    }
}

async fn deliver(transport: &ApiTransport, event: &Event) {
    if let Err(err) = transport.post_event(event).await {
        log::warn!(target: "schematic", "failed to deliver event: {err}");
    }
}
