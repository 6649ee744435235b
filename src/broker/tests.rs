use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use super::message::{dead_letter_topic, message_id};
use super::queue::DeliveryQueue;
use super::topic::TopicRegistry;
use super::{Broker, Delivery, DeliverySink, Notification, SubscriptionEnd};
use crate::config::BrokerSettings;
use crate::persistence::in_memory_factory;
use crate::utils::error::{BrokerError, StoreError, TransportError};

const WAIT: Duration = Duration::from_secs(2);

fn broker() -> Arc<Broker> {
    Arc::new(Broker::new(&BrokerSettings::default()))
}

/// Spawns a subscriber loop that forwards deliveries into a channel.
fn spawn_subscriber(
    broker: &Arc<Broker>,
    topic: &str,
) -> (
    mpsc::UnboundedReceiver<Delivery>,
    CancellationToken,
    tokio::task::JoinHandle<Result<SubscriptionEnd, BrokerError>>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let broker = broker.clone();
    let topic = topic.to_string();
    let token = cancel.clone();
    let handle = tokio::spawn(async move {
        let mut sink = tx;
        broker.subscribe(&topic, &mut sink, &token).await
    });
    (rx, cancel, handle)
}

async fn wait_for_subscribers(broker: &Broker, topic: &str, count: usize) {
    timeout(WAIT, async {
        loop {
            if let Ok(Some(entry)) = broker.topic(topic) {
                if entry.subscribers() == count {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("subscribers never attached");
    // let the loops reach the queue
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// Sink whose connection is already broken.
struct BrokenSink;

impl DeliverySink for BrokenSink {
    async fn deliver(&mut self, _delivery: &Delivery) -> Result<(), TransportError> {
        Err(TransportError::Closed)
    }
}

#[test]
fn test_message_id_format() {
    assert_eq!(message_id("orders", 0), "orders-0");
    assert_eq!(Notification::new("orders", 12).id, "orders-12");
    assert_eq!(dead_letter_topic("jobs"), "jobs.deadletter");
}

#[test]
fn test_delivery_frame_field_names() {
    let delivery = Delivery {
        topic: "orders".to_string(),
        message_id: "orders-0".to_string(),
        value: "A".to_string(),
    };
    let json = serde_json::to_value(&delivery).unwrap();
    assert_eq!(
        json,
        serde_json::json!({"topic": "orders", "messageId": "orders-0", "value": "A"})
    );
}

#[test]
fn test_registry_creates_topics_lazily() {
    let registry = TopicRegistry::default();
    assert!(registry.list_topics().unwrap().is_empty());
    assert!(registry.get("orders").unwrap().is_none());

    registry.ensure_topic("orders").unwrap();

    assert_eq!(registry.list_topics().unwrap(), vec!["orders".to_string()]);
}

#[test]
fn test_registry_returns_same_instance() {
    let registry = TopicRegistry::default();
    let a = registry.ensure_topic("orders").unwrap();
    let b = registry.ensure_topic("orders").unwrap();
    assert!(Arc::ptr_eq(&a, &b));
}

#[test]
fn test_registry_concurrent_first_reference_builds_one_topic() {
    let registry = Arc::new(TopicRegistry::new(in_memory_factory(), 8));
    let handles: Vec<_> = (0..16)
        .map(|_| {
            let registry = registry.clone();
            std::thread::spawn(move || registry.ensure_topic("race").unwrap())
        })
        .collect();

    let topics: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(topics.iter().all(|t| Arc::ptr_eq(t, &topics[0])));
    assert_eq!(registry.list_topics().unwrap().len(), 1);
}

#[test]
fn test_topics_have_independent_stores() {
    let broker = broker();
    broker.publish("a", "one".to_string()).unwrap();
    broker.publish("b", "two".to_string()).unwrap();

    let a = broker.topic("a").unwrap().unwrap();
    let b = broker.topic("b").unwrap().unwrap();
    assert_eq!(a.store().get(0).unwrap(), "one");
    assert_eq!(b.store().get(0).unwrap(), "two");
}

#[test]
fn test_publish_assigns_sequential_offsets() {
    let broker = broker();
    let receipts: Vec<_> = ["A", "B", "C"]
        .iter()
        .map(|body| broker.publish("orders", body.to_string()).unwrap())
        .collect();

    let offsets: Vec<_> = receipts.iter().map(|r| r.offset).collect();
    assert_eq!(offsets, vec![0, 1, 2]);
    assert_eq!(receipts[1].message_id, "orders-1");

    let topic = broker.topic("orders").unwrap().unwrap();
    assert_eq!(topic.store().get(2).unwrap(), "C");
    assert_eq!(topic.pending_deliveries(), 3);
}

#[test]
fn test_publish_without_consumer_never_runs_out_of_backlog() {
    let broker = broker();

    let offsets: Vec<_> = (0..1100)
        .map(|i| broker.publish("orders", format!("m{i}")).unwrap().offset)
        .collect();

    assert_eq!(offsets, (0..1100).collect::<Vec<u64>>());
    let topic = broker.topic("orders").unwrap().unwrap();
    assert_eq!(topic.pending_deliveries(), 1100);
    assert_eq!(topic.queue().limit(), None);
}

#[test]
fn test_publish_rejects_empty_topic() {
    let broker = broker();
    let err = broker.publish("", "x".to_string()).unwrap_err();
    assert!(matches!(err, BrokerError::InvalidTopic(_)));
    assert!(broker.list_topics().unwrap().is_empty());
}

#[test]
fn test_publish_accepts_whitespace_topic() {
    let broker = broker();
    let receipt = broker.publish(" ", "x".to_string()).unwrap();
    assert_eq!(receipt.message_id, " -0");
    assert_eq!(broker.list_topics().unwrap(), vec![" ".to_string()]);
}

#[test]
fn test_read_returns_stored_message_without_consuming_it() {
    let broker = broker();
    broker.publish("orders", "A".to_string()).unwrap();

    let message = broker.read("orders", 0).unwrap();

    assert_eq!(message.id, "orders-0");
    assert_eq!(message.offset, 0);
    assert_eq!(message.body, "A");
    assert_eq!(broker.read("orders", 0).unwrap(), message);
}

#[test]
fn test_read_unknown_topic_or_offset_is_not_found() {
    let broker = broker();
    broker.publish("orders", "A".to_string()).unwrap();

    assert!(matches!(
        broker.read("orders", 5),
        Err(BrokerError::Store(StoreError::NotFound(5)))
    ));
    assert!(matches!(
        broker.read("missing", 0),
        Err(BrokerError::Store(StoreError::NotFound(0)))
    ));
    assert_eq!(broker.list_topics().unwrap(), vec!["orders".to_string()]);
}

#[test]
fn test_publish_fails_when_backlog_is_full_without_storing() {
    let broker = Broker::new(&BrokerSettings {
        delivery_backlog: 2,
    });
    broker.publish("orders", "A".to_string()).unwrap();
    broker.publish("orders", "B".to_string()).unwrap();

    let err = broker.publish("orders", "C".to_string()).unwrap_err();

    assert!(matches!(err, BrokerError::Backlogged { capacity: 2, .. }));
    let topic = broker.topic("orders").unwrap().unwrap();
    assert_eq!(topic.store().len().unwrap(), 2);
    assert_eq!(topic.pending_deliveries(), 2);
}

#[tokio::test]
async fn test_taking_from_a_full_backlog_makes_room() {
    let queue = DeliveryQueue::new(1);
    queue.reserve().unwrap().send(Notification::new("t", 0));
    assert!(queue.reserve().is_none());

    let notification = timeout(WAIT, queue.take()).await.unwrap().unwrap();

    assert_eq!(notification.offset, 0);
    assert_eq!(queue.pending(), 0);
    assert!(queue.reserve().is_some());
}

#[tokio::test]
async fn test_queue_hands_each_notification_to_one_taker() {
    let queue = Arc::new(DeliveryQueue::new(4));
    let takers: Vec<_> = (0..2)
        .map(|_| {
            let queue = queue.clone();
            tokio::spawn(async move { queue.take().await })
        })
        .collect();
    tokio::time::sleep(Duration::from_millis(20)).await;

    queue.reserve().unwrap().send(Notification::new("t", 0));
    queue.reserve().unwrap().send(Notification::new("t", 1));

    let mut offsets = HashSet::new();
    for taker in takers {
        let notification = timeout(WAIT, taker).await.unwrap().unwrap().unwrap();
        offsets.insert(notification.offset);
    }
    assert_eq!(offsets, HashSet::from([0, 1]));
    assert_eq!(queue.pending(), 0);
}

#[tokio::test]
async fn test_dropped_reservation_frees_the_slot() {
    let queue = DeliveryQueue::new(1);
    let slot = queue.reserve().unwrap();
    assert!(queue.reserve().is_none());

    drop(slot);

    assert_eq!(queue.pending(), 0);
    assert!(queue.reserve().is_some());
}

#[tokio::test]
async fn test_round_trip_single_subscriber() {
    let broker = broker();
    let receipt = broker.publish("orders", "A".to_string()).unwrap();

    let (mut rx, cancel, handle) = spawn_subscriber(&broker, "orders");
    let delivery = timeout(WAIT, rx.recv()).await.unwrap().unwrap();

    assert_eq!(delivery.topic, "orders");
    assert_eq!(delivery.value, "A");
    assert_eq!(delivery.message_id, receipt.message_id);
    assert_eq!(delivery.message_id, "orders-0");

    cancel.cancel();
    let end = timeout(WAIT, handle).await.unwrap().unwrap().unwrap();
    assert_eq!(end, SubscriptionEnd::Cancelled);
}

#[tokio::test]
async fn test_delivery_is_a_destructive_read() {
    let broker = broker();
    let receipt = broker.publish("orders", "A".to_string()).unwrap();

    let (mut rx, cancel, _handle) = spawn_subscriber(&broker, "orders");
    timeout(WAIT, rx.recv()).await.unwrap().unwrap();

    let topic = broker.topic("orders").unwrap().unwrap();
    assert_eq!(
        topic.store().get(receipt.offset),
        Err(StoreError::NotFound(receipt.offset))
    );
    assert!(matches!(
        broker.read("orders", receipt.offset),
        Err(BrokerError::Store(StoreError::NotFound(0)))
    ));
    cancel.cancel();
}

#[tokio::test]
async fn test_single_subscriber_preserves_publish_order() {
    let broker = broker();
    assert_eq!(broker.publish("orders", "A".to_string()).unwrap().offset, 0);
    assert_eq!(broker.publish("orders", "B".to_string()).unwrap().offset, 1);

    let (mut rx, cancel, _handle) = spawn_subscriber(&broker, "orders");
    let first = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    let second = timeout(WAIT, rx.recv()).await.unwrap().unwrap();

    assert_eq!((first.value.as_str(), second.value.as_str()), ("A", "B"));
    cancel.cancel();
}

#[tokio::test]
async fn test_competing_subscribers_each_get_one_message() {
    let broker = broker();
    let (mut rx_a, cancel_a, _a) = spawn_subscriber(&broker, "work");
    let (mut rx_b, cancel_b, _b) = spawn_subscriber(&broker, "work");
    wait_for_subscribers(&broker, "work", 2).await;

    broker.publish("work", "one".to_string()).unwrap();
    broker.publish("work", "two".to_string()).unwrap();

    let a = timeout(WAIT, rx_a.recv()).await.unwrap().unwrap();
    let b = timeout(WAIT, rx_b.recv()).await.unwrap().unwrap();

    let received: HashSet<_> = [a.value, b.value].into_iter().collect();
    assert_eq!(received, HashSet::from(["one".to_string(), "two".to_string()]));

    // nothing duplicated
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx_a.try_recv().is_err());
    assert!(rx_b.try_recv().is_err());

    cancel_a.cancel();
    cancel_b.cancel();
}

#[tokio::test]
async fn test_subscribe_creates_topic() {
    let broker = broker();
    let (_rx, cancel, _handle) = spawn_subscriber(&broker, "fresh");
    wait_for_subscribers(&broker, "fresh", 1).await;

    assert_eq!(broker.list_topics().unwrap(), vec!["fresh".to_string()]);
    cancel.cancel();
}

#[tokio::test]
async fn test_cancel_unblocks_waiting_subscriber_and_detaches() {
    let broker = broker();
    let (_rx, cancel, handle) = spawn_subscriber(&broker, "idle");
    wait_for_subscribers(&broker, "idle", 1).await;

    cancel.cancel();
    let end = timeout(WAIT, handle).await.unwrap().unwrap().unwrap();

    assert_eq!(end, SubscriptionEnd::Cancelled);
    assert_eq!(broker.topic("idle").unwrap().unwrap().subscribers(), 0);
}

#[tokio::test]
async fn test_cancelled_subscriber_leaves_messages_for_the_next_one() {
    let broker = broker();
    let (_rx, cancel, handle) = spawn_subscriber(&broker, "orders");
    wait_for_subscribers(&broker, "orders", 1).await;
    cancel.cancel();
    timeout(WAIT, handle).await.unwrap().unwrap().unwrap();

    broker.publish("orders", "A".to_string()).unwrap();

    let (mut rx, cancel, _handle) = spawn_subscriber(&broker, "orders");
    let delivery = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(delivery.value, "A");
    cancel.cancel();
}

#[tokio::test]
async fn test_push_failure_ends_loop_and_loses_message() {
    let broker = broker();
    let receipt = broker.publish("orders", "A".to_string()).unwrap();
    broker.publish("orders", "B".to_string()).unwrap();

    let cancel = CancellationToken::new();
    let err = timeout(WAIT, broker.subscribe("orders", &mut BrokenSink, &cancel))
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, BrokerError::Transport(TransportError::Closed)));

    let topic = broker.topic("orders").unwrap().unwrap();
    // The first message was deleted before the failed push.
    assert_eq!(
        topic.store().get(receipt.offset),
        Err(StoreError::NotFound(receipt.offset))
    );
    // The second one is still waiting for a subscriber.
    assert_eq!(topic.store().get(1).unwrap(), "B");
    assert_eq!(topic.pending_deliveries(), 1);
    assert_eq!(topic.subscribers(), 0);
}

#[tokio::test]
async fn test_missing_body_is_skipped_and_loop_continues() {
    let broker = broker();
    broker.publish("orders", "gone".to_string()).unwrap();
    broker.publish("orders", "kept".to_string()).unwrap();
    broker
        .topic("orders")
        .unwrap()
        .unwrap()
        .store()
        .delete(0)
        .unwrap();

    let (mut rx, cancel, _handle) = spawn_subscriber(&broker, "orders");
    let delivery = timeout(WAIT, rx.recv()).await.unwrap().unwrap();

    assert_eq!(delivery.value, "kept");
    assert_eq!(delivery.message_id, "orders-1");
    cancel.cancel();
}

#[tokio::test]
async fn test_channel_sink_reports_closed_receiver() {
    let (mut tx, rx) = mpsc::channel::<Delivery>(1);
    drop(rx);
    let delivery = Delivery {
        topic: "t".to_string(),
        message_id: "t-0".to_string(),
        value: "v".to_string(),
    };
    assert!(matches!(
        tx.deliver(&delivery).await,
        Err(TransportError::Closed)
    ));
}
