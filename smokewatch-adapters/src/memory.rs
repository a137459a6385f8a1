//! Process-local message broker.
//!
//! Mirrors the parts of a durable-queue broker smokewatch relies on:
//! named FIFO queues, manual acknowledgement, and redelivery of
//! unacknowledged messages when a consumer goes away.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;

use crate::{Delivery, Subscription, Transport, TransportError};

#[derive(Debug, Default)]
struct Inner {
    queues: Mutex<HashMap<String, VecDeque<Vec<u8>>>>,
    /// Bumped each time a queue is deleted and re-declared.
    generations: Mutex<HashMap<String, u64>>,
    arrivals: Notify,
    closed: AtomicBool,
}

/// An in-memory broker shared by any number of transports and subscriptions.
///
/// Cloning the broker yields another handle to the same queues.
///
/// # Example
///
/// ```rust
/// use smokewatch_adapters::memory::MemoryBroker;
///
/// let broker = MemoryBroker::new();
/// broker.inject("02-food-A", "stale, 1.0");
/// assert_eq!(broker.queue_len("02-food-A"), Some(1));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

impl MemoryBroker {
    /// Create an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// A producer-side handle.
    pub fn transport(&self) -> MemoryTransport {
        MemoryTransport {
            broker: self.clone(),
            closed: false,
        }
    }

    /// Consume from `destination`, declaring it if needed.
    pub fn subscribe(&self, destination: &str) -> MemorySubscription {
        self.declare(destination);
        MemorySubscription {
            broker: self.clone(),
            destination: destination.to_string(),
            description: format!("memory: {}", destination),
            generation: self.generation(destination),
            next_tag: 1,
            unacked: BTreeMap::new(),
            orphaned: BTreeSet::new(),
            resubscribed: 0,
            closed: false,
        }
    }

    /// Declare a queue; existing queues keep their messages.
    pub fn declare(&self, destination: &str) {
        self.inner
            .queues
            .lock()
            .entry(destination.to_string())
            .or_default();
    }

    /// Append a message directly, declaring the queue if needed.
    pub fn inject(&self, destination: &str, payload: impl Into<Vec<u8>>) {
        self.inner
            .queues
            .lock()
            .entry(destination.to_string())
            .or_default()
            .push_back(payload.into());
        self.inner.arrivals.notify_waiters();
    }

    /// Number of ready (undelivered) messages, or `None` if undeclared.
    pub fn queue_len(&self, destination: &str) -> Option<usize> {
        self.inner.queues.lock().get(destination).map(VecDeque::len)
    }

    /// Copy of the ready messages in `destination`, oldest first.
    pub fn messages(&self, destination: &str) -> Vec<Vec<u8>> {
        self.inner
            .queues
            .lock()
            .get(destination)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Shut the broker down.
    ///
    /// Subscriptions drain what is still queued and then report end of stream.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.arrivals.notify_waiters();
    }

    /// Check if [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Delete and re-declare `destination`. Live subscriptions see their
    /// consumer cancelled, the way a broker cancels consumers of a deleted
    /// queue.
    fn reset(&self, destination: &str) -> usize {
        let purged = {
            let mut queues = self.inner.queues.lock();
            let purged = queues.remove(destination).map_or(0, |q| q.len());
            queues.insert(destination.to_string(), VecDeque::new());
            purged
        };
        *self
            .inner
            .generations
            .lock()
            .entry(destination.to_string())
            .or_default() += 1;
        self.inner.arrivals.notify_waiters();
        purged
    }

    fn generation(&self, destination: &str) -> u64 {
        self.inner
            .generations
            .lock()
            .get(destination)
            .copied()
            .unwrap_or_default()
    }

    fn push_back(&self, destination: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        {
            let mut queues = self.inner.queues.lock();
            let queue = queues
                .get_mut(destination)
                .ok_or_else(|| TransportError::UnknownDestination(destination.to_string()))?;
            queue.push_back(payload);
        }
        self.inner.arrivals.notify_waiters();
        Ok(())
    }

    fn pop_front(&self, destination: &str) -> Option<Vec<u8>> {
        self.inner.queues.lock().get_mut(destination)?.pop_front()
    }

    /// Put unsettled messages back at the head of the queue, preserving order.
    fn requeue_front(&self, destination: &str, payloads: impl DoubleEndedIterator<Item = Vec<u8>>) {
        {
            let mut queues = self.inner.queues.lock();
            let queue = queues.entry(destination.to_string()).or_default();
            for payload in payloads.rev() {
                queue.push_front(payload);
            }
        }
        self.inner.arrivals.notify_waiters();
    }
}

/// Producer handle onto a [`MemoryBroker`].
#[derive(Debug)]
pub struct MemoryTransport {
    broker: MemoryBroker,
    closed: bool,
}

impl MemoryTransport {
    fn check_open(&self) -> Result<(), TransportError> {
        if self.closed || self.broker.is_closed() {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn reset_destination(&mut self, destination: &str) -> Result<u32, TransportError> {
        self.check_open()?;
        let purged = self.broker.reset(destination);
        debug!(destination, purged, "reset memory queue");
        Ok(purged as u32)
    }

    async fn publish(&mut self, destination: &str, payload: &[u8]) -> Result<(), TransportError> {
        self.check_open()?;
        self.broker.push_back(destination, payload.to_vec())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed = true;
        Ok(())
    }

    fn description(&self) -> &str {
        "memory"
    }
}

/// Consumer handle onto one queue of a [`MemoryBroker`].
///
/// Dropping or closing the subscription requeues every delivery that was
/// never acknowledged or rejected.
///
/// When the queue is deleted and re-declared underneath it, the
/// subscription consumes from the new queue and keeps waiting. Deliveries
/// from the deleted queue can still be settled but are never requeued.
#[derive(Debug)]
pub struct MemorySubscription {
    broker: MemoryBroker,
    destination: String,
    description: String,
    generation: u64,
    next_tag: u64,
    unacked: BTreeMap<u64, Vec<u8>>,
    orphaned: BTreeSet<u64>,
    resubscribed: u32,
    closed: bool,
}

impl MemorySubscription {
    /// Number of deliveries handed out but not yet settled.
    pub fn unacked(&self) -> usize {
        self.unacked.len() + self.orphaned.len()
    }

    /// How many times the consumer was cancelled by a queue reset and
    /// started again.
    pub fn resubscribed(&self) -> u32 {
        self.resubscribed
    }

    fn settle(&mut self, tag: u64) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if self.unacked.remove(&tag).is_some() || self.orphaned.remove(&tag) {
            return Ok(());
        }
        Err(TransportError::Ack {
            tag,
            reason: "unknown delivery tag".to_string(),
        })
    }

    /// Follow a delete and re-declare of the queue.
    fn resubscribe_if_reset(&mut self) {
        let current = self.broker.generation(&self.destination);
        if current == self.generation {
            return;
        }
        self.generation = current;
        self.resubscribed += 1;
        // the deleted queue took these with it
        self.orphaned.extend(std::mem::take(&mut self.unacked).into_keys());
        debug!(destination = %self.destination, "queue was reset, consuming again");
    }

    fn requeue_unacked(&mut self) {
        self.resubscribe_if_reset();
        self.orphaned.clear();
        if self.unacked.is_empty() {
            return;
        }
        let unacked = std::mem::take(&mut self.unacked);
        debug!(
            destination = %self.destination,
            count = unacked.len(),
            "requeueing unacknowledged deliveries"
        );
        self.broker
            .requeue_front(&self.destination, unacked.into_values());
    }
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn recv(&mut self) -> Result<Option<Delivery>, TransportError> {
        let inner = Arc::clone(&self.broker.inner);
        loop {
            // Register for wakeups before looking, so a publish between the
            // check and the await is not missed.
            let mut arrived = pin!(inner.arrivals.notified());
            arrived.as_mut().enable();

            if self.closed {
                return Err(TransportError::Closed);
            }
            self.resubscribe_if_reset();
            if let Some(payload) = self.broker.pop_front(&self.destination) {
                let tag = self.next_tag;
                self.next_tag += 1;
                self.unacked.insert(tag, payload.clone());
                return Ok(Some(Delivery::new(tag, payload)));
            }
            if self.broker.is_closed() {
                return Ok(None);
            }

            arrived.await;
        }
    }

    async fn ack(&mut self, tag: u64) -> Result<(), TransportError> {
        self.settle(tag)
    }

    async fn reject(&mut self, tag: u64) -> Result<(), TransportError> {
        self.settle(tag)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.requeue_unacked();
        self.closed = true;
        Ok(())
    }

    fn description(&self) -> &str {
        &self.description
    }
}

impl Drop for MemorySubscription {
    fn drop(&mut self) {
        self.requeue_unacked();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_reset_purges_stale_messages() {
        let broker = MemoryBroker::new();
        broker.inject("01-smoker", "old, 1.0");
        broker.inject("01-smoker", "old, 2.0");

        let mut transport = broker.transport();
        let purged = transport.reset_destination("01-smoker").await.unwrap();

        assert_eq!(purged, 2);
        assert_eq!(broker.queue_len("01-smoker"), Some(0));
    }

    #[tokio::test]
    async fn test_reset_declares_missing_destination() {
        let broker = MemoryBroker::new();
        let mut transport = broker.transport();

        assert_eq!(transport.reset_destination("03-food-B").await.unwrap(), 0);
        assert_eq!(broker.queue_len("03-food-B"), Some(0));
    }

    #[tokio::test]
    async fn test_publish_to_undeclared_destination_fails() {
        let broker = MemoryBroker::new();
        let mut transport = broker.transport();

        let err = transport.publish("nowhere", b"t1, 1.0").await.unwrap_err();
        assert!(matches!(err, TransportError::UnknownDestination(d) if d == "nowhere"));
    }

    #[tokio::test]
    async fn test_publish_after_close_fails() {
        let broker = MemoryBroker::new();
        let mut transport = broker.transport();
        transport.reset_destination("q").await.unwrap();
        transport.close().await.unwrap();

        assert!(matches!(
            transport.publish("q", b"t1, 1.0").await,
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_deliveries_are_fifo_with_increasing_tags() {
        let broker = MemoryBroker::new();
        let mut transport = broker.transport();
        transport.reset_destination("q").await.unwrap();
        transport.publish("q", b"t1, 1.0").await.unwrap();
        transport.publish("q", b"t2, 2.0").await.unwrap();

        let mut sub = broker.subscribe("q");
        let first = sub.recv().await.unwrap().unwrap();
        let second = sub.recv().await.unwrap().unwrap();

        assert_eq!(first.payload, b"t1, 1.0");
        assert_eq!(second.payload, b"t2, 2.0");
        assert!(second.tag > first.tag);
        assert_eq!(sub.unacked(), 2);

        sub.ack(first.tag).await.unwrap();
        sub.reject(second.tag).await.unwrap();
        assert_eq!(sub.unacked(), 0);
        assert_eq!(broker.queue_len("q"), Some(0));
    }

    #[tokio::test]
    async fn test_ack_unknown_tag_fails() {
        let broker = MemoryBroker::new();
        let mut sub = broker.subscribe("q");

        assert!(matches!(
            sub.ack(42).await,
            Err(TransportError::Ack { tag: 42, .. })
        ));
    }

    #[tokio::test]
    async fn test_unacked_deliveries_are_redelivered_after_drop() {
        let broker = MemoryBroker::new();
        broker.inject("q", "t1, 1.0");
        broker.inject("q", "t2, 2.0");
        broker.inject("q", "t3, 3.0");

        {
            let mut sub = broker.subscribe("q");
            let first = sub.recv().await.unwrap().unwrap();
            sub.ack(first.tag).await.unwrap();
            let _second = sub.recv().await.unwrap().unwrap();
            // dropped with t2 unsettled
        }

        let messages = broker.messages("q");
        assert_eq!(messages, vec![b"t2, 2.0".to_vec(), b"t3, 3.0".to_vec()]);

        let mut sub = broker.subscribe("q");
        let redelivered = sub.recv().await.unwrap().unwrap();
        assert_eq!(redelivered.payload, b"t2, 2.0");
    }

    #[tokio::test(start_paused = true)]
    async fn test_recv_waits_for_publish() {
        let broker = MemoryBroker::new();
        let mut sub = broker.subscribe("q");

        let publisher = broker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            let mut transport = publisher.transport();
            transport.publish("q", b"late, 9.5").await.unwrap();
        });

        let delivery = sub.recv().await.unwrap().unwrap();
        assert_eq!(delivery.payload, b"late, 9.5");
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let broker = MemoryBroker::new();
        broker.inject("q", "t1, 1.0");
        let mut sub = broker.subscribe("q");
        broker.close();

        assert!(sub.recv().await.unwrap().is_some());
        assert!(sub.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_closed_subscription_requeues() {
        let broker = MemoryBroker::new();
        broker.inject("q", "t1, 1.0");
        let mut sub = broker.subscribe("q");
        let _ = sub.recv().await.unwrap().unwrap();

        sub.close().await.unwrap();

        assert_eq!(broker.queue_len("q"), Some(1));
        assert!(matches!(sub.recv().await, Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn test_reset_cancels_and_resubscribes_live_consumer() {
        let broker = MemoryBroker::new();
        broker.inject("q", "stale, 1.0");
        let mut sub = broker.subscribe("q");
        let stale = sub.recv().await.unwrap().unwrap();

        let mut transport = broker.transport();
        transport.reset_destination("q").await.unwrap();
        transport.publish("q", b"t1, 2.0").await.unwrap();

        let fresh = sub.recv().await.unwrap().unwrap();
        assert_eq!(fresh.payload, b"t1, 2.0");
        assert_eq!(sub.resubscribed(), 1);

        // the stale delivery can still be settled, but never comes back
        sub.ack(stale.tag).await.unwrap();
        sub.ack(fresh.tag).await.unwrap();
        sub.close().await.unwrap();
        assert_eq!(broker.queue_len("q"), Some(0));
    }

    #[tokio::test]
    async fn test_waiting_consumer_survives_reset() {
        let broker = MemoryBroker::new();
        let mut sub = broker.subscribe("q");

        let publisher = broker.clone();
        let handle = tokio::spawn(async move {
            tokio::task::yield_now().await;
            let mut transport = publisher.transport();
            transport.reset_destination("q").await.unwrap();
            tokio::task::yield_now().await;
            transport.publish("q", b"t1, 3.0").await.unwrap();
        });

        let delivery = sub.recv().await.unwrap().unwrap();
        handle.await.unwrap();
        assert_eq!(delivery.payload, b"t1, 3.0");
        assert_eq!(sub.resubscribed(), 1);
    }
}
