//! In-process broker
//!
//! [`InMemoryBroker`] is a complete transport variant: it publishes through
//! [`MessagePublisher`] and hands out one [`InMemorySource`] per queue.
//! Settlement follows broker semantics. A requeued message goes to the back
//! of its queue until it reaches the maximum delivery count, after which it
//! is dead-lettered together with discarded messages.
//!
//! Faults can be queued per binding to drive resilience paths in tests.
//! Settlement and dead-letter history is kept per queue, bounded to the most
//! recent [`DEFAULT_HISTORY_LIMIT`] entries.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use conduit_core::{
    DeliveryTag, MessagePublisher, MessageSource, OutboundMessage, RawMessage, TransportError,
};
use conduit_domain::{AckDecision, Headers};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, trace};

pub const DEFAULT_MAX_DELIVERY_COUNT: u32 = 10;

/// Settlements and dead letters remembered per queue
pub const DEFAULT_HISTORY_LIMIT: usize = 1024;

/// Why a message left the queue without being acknowledged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadLetterReason {
    Discarded,
    MaxDeliveryCountExceeded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    pub body: Vec<u8>,
    pub headers: Headers,
    pub delivery_count: u32,
    pub reason: DeadLetterReason,
}

#[derive(Debug, Clone)]
struct StoredMessage {
    body: Vec<u8>,
    headers: Headers,
    delivery_count: u32,
}

impl From<OutboundMessage> for StoredMessage {
    fn from(message: OutboundMessage) -> Self {
        Self { body: message.body, headers: message.headers, delivery_count: 0 }
    }
}

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<StoredMessage>,
    in_flight: HashMap<DeliveryTag, StoredMessage>,
    dead_letters: VecDeque<DeadLetter>,
    settlements: VecDeque<(DeliveryTag, AckDecision)>,
    publish_faults: VecDeque<TransportError>,
    receive_faults: VecDeque<TransportError>,
    closed: bool,
}

#[derive(Debug)]
struct BrokerInner {
    queues: Mutex<HashMap<String, QueueState>>,
    changed: Notify,
    next_tag: AtomicU64,
    max_delivery_count: u32,
    history_limit: usize,
}

/// Shared in-memory broker; clones refer to the same queues
#[derive(Debug, Clone)]
pub struct InMemoryBroker {
    inner: Arc<BrokerInner>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::with_max_delivery_count(DEFAULT_MAX_DELIVERY_COUNT)
    }

    /// Broker that dead-letters a message once it has been delivered
    /// `max_delivery_count` times without an ack
    pub fn with_max_delivery_count(max_delivery_count: u32) -> Self {
        Self::with_limits(max_delivery_count, DEFAULT_HISTORY_LIMIT)
    }

    /// Broker remembering at most `history_limit` settlements and dead
    /// letters per queue; older entries are dropped first
    pub fn with_history_limit(history_limit: usize) -> Self {
        Self::with_limits(DEFAULT_MAX_DELIVERY_COUNT, history_limit)
    }

    fn with_limits(max_delivery_count: u32, history_limit: usize) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                queues: Mutex::new(HashMap::new()),
                changed: Notify::new(),
                next_tag: AtomicU64::new(1),
                max_delivery_count: max_delivery_count.max(1),
                history_limit: history_limit.max(1),
            }),
        }
    }

    /// Source reading from `binding`
    pub fn source(&self, binding: impl Into<String>) -> InMemorySource {
        InMemorySource { broker: self.clone(), binding: binding.into() }
    }

    /// Stop delivering from `binding` once its ready messages are drained
    pub fn close(&self, binding: &str) {
        self.with_queue(binding, |queue| queue.closed = true);
        self.inner.changed.notify_waiters();
    }

    /// Fail the next publish (or batch) to `binding` with `error`
    pub fn fail_next_publish(&self, binding: &str, error: TransportError) {
        self.with_queue(binding, |queue| queue.publish_faults.push_back(error));
    }

    /// Fail the next receive from `binding` with `error`
    pub fn fail_next_receive(&self, binding: &str, error: TransportError) {
        self.with_queue(binding, |queue| queue.receive_faults.push_back(error));
    }

    /// Messages waiting for delivery, oldest first
    pub fn ready_messages(&self, binding: &str) -> Vec<OutboundMessage> {
        self.with_queue(binding, |queue| {
            queue
                .ready
                .iter()
                .map(|m| OutboundMessage::new(m.body.clone(), m.headers.clone()))
                .collect()
        })
    }

    pub fn ready_len(&self, binding: &str) -> usize {
        self.with_queue(binding, |queue| queue.ready.len())
    }

    pub fn in_flight_len(&self, binding: &str) -> usize {
        self.with_queue(binding, |queue| queue.in_flight.len())
    }

    /// Most recent dead letters of `binding`, oldest first
    pub fn dead_letters(&self, binding: &str) -> Vec<DeadLetter> {
        self.with_queue(binding, |queue| queue.dead_letters.iter().cloned().collect())
    }

    /// Most recent settlements applied to `binding`, in order
    pub fn settlements(&self, binding: &str) -> Vec<(DeliveryTag, AckDecision)> {
        self.with_queue(binding, |queue| queue.settlements.iter().cloned().collect())
    }

    fn with_queue<R>(&self, binding: &str, f: impl FnOnce(&mut QueueState) -> R) -> R {
        let mut queues = self.inner.queues.lock();
        f(queues.entry(binding.to_string()).or_default())
    }

    fn enqueue(
        &self,
        binding: &str,
        messages: Vec<OutboundMessage>,
    ) -> Result<(), TransportError> {
        self.with_queue(binding, |queue| {
            if let Some(fault) = queue.publish_faults.pop_front() {
                return Err(fault);
            }
            if queue.closed {
                return Err(TransportError::rejected(format!("queue '{binding}' is closed")));
            }
            queue.ready.extend(messages.into_iter().map(StoredMessage::from));
            Ok(())
        })?;
        self.inner.changed.notify_waiters();
        Ok(())
    }

    /// `None` when the caller has to wait for a change
    fn try_receive(&self, binding: &str) -> Option<Result<Option<RawMessage>, TransportError>> {
        self.with_queue(binding, |queue| {
            if let Some(fault) = queue.receive_faults.pop_front() {
                return Some(Err(fault));
            }
            match queue.ready.pop_front() {
                Some(mut message) => {
                    message.delivery_count += 1;
                    let tag = DeliveryTag(self.inner.next_tag.fetch_add(1, Ordering::Relaxed));
                    let raw = RawMessage {
                        tag,
                        body: message.body.clone(),
                        headers: message.headers.clone(),
                        delivery_count: message.delivery_count,
                    };
                    queue.in_flight.insert(tag, message);
                    Some(Ok(Some(raw)))
                }
                None if queue.closed => Some(Ok(None)),
                None => None,
            }
        })
    }

    fn settle_delivery(
        &self,
        binding: &str,
        tag: DeliveryTag,
        decision: AckDecision,
    ) -> Result<(), TransportError> {
        let max_delivery_count = self.inner.max_delivery_count;
        let history_limit = self.inner.history_limit;
        let requeued = self.with_queue(binding, |queue| {
            let message = queue.in_flight.remove(&tag).ok_or_else(|| {
                TransportError::not_found(format!("delivery {tag} is not in flight on '{binding}'"))
            })?;
            remember(&mut queue.settlements, (tag, decision), history_limit);

            let reason = match decision {
                AckDecision::Ack => return Ok(false),
                AckDecision::NackRequeue if message.delivery_count < max_delivery_count => {
                    queue.ready.push_back(message);
                    return Ok(true);
                }
                AckDecision::NackRequeue => DeadLetterReason::MaxDeliveryCountExceeded,
                AckDecision::NackDiscard => DeadLetterReason::Discarded,
            };

            debug!(binding, %tag, ?reason, "Message dead-lettered");
            let dead = DeadLetter {
                body: message.body,
                headers: message.headers,
                delivery_count: message.delivery_count,
                reason,
            };
            remember(&mut queue.dead_letters, dead, history_limit);
            Ok(false)
        })?;

        if requeued {
            self.inner.changed.notify_waiters();
        }
        Ok(())
    }
}

fn remember<T>(history: &mut VecDeque<T>, entry: T, limit: usize) {
    if history.len() >= limit {
        history.pop_front();
    }
    history.push_back(entry);
}

#[async_trait]
impl MessagePublisher for InMemoryBroker {
    async fn publish(
        &self,
        destination: &str,
        message: OutboundMessage,
    ) -> Result<(), TransportError> {
        trace!(destination, "Publishing message");
        self.enqueue(destination, vec![message])
    }

    async fn publish_batch(
        &self,
        destination: &str,
        messages: Vec<OutboundMessage>,
    ) -> Result<(), TransportError> {
        trace!(destination, count = messages.len(), "Publishing batch");
        self.enqueue(destination, messages)
    }
}

/// One queue of an [`InMemoryBroker`]
#[derive(Debug, Clone)]
pub struct InMemorySource {
    broker: InMemoryBroker,
    binding: String,
}

#[async_trait]
impl MessageSource for InMemorySource {
    fn binding(&self) -> &str {
        &self.binding
    }

    async fn receive(&self) -> Result<Option<RawMessage>, TransportError> {
        loop {
            let changed = self.broker.inner.changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();

            if let Some(outcome) = self.broker.try_receive(&self.binding) {
                return outcome;
            }
            changed.await;
        }
    }

    async fn settle(&self, tag: DeliveryTag, decision: AckDecision) -> Result<(), TransportError> {
        self.broker.settle_delivery(&self.binding, tag, decision)
    }
}
