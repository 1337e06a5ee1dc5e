use super::mock::{eventually, Ack, MockBroker};
use crate::broker::transport::QueueDeclaration;
use crate::broker::{BackoffPolicy, BrokerError, ConnectionState, DurableQueueAdapter};
use crate::message::{codec, Message};
use crate::queue::{HandlerOutcome, MessageHandler, QueueError, QueuePort};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn adapter(broker: &Arc<MockBroker>) -> DurableQueueAdapter {
    DurableQueueAdapter::new(broker.connector(), BackoffPolicy::default())
}

fn payload(content: &str) -> Vec<u8> {
    codec::encode(&Message::new(content, "alice", "bob")).unwrap()
}

/// Handler returning `outcome` for every message and remembering the contents
fn recording(outcome: HandlerOutcome) -> (Arc<Mutex<Vec<String>>>, Arc<dyn MessageHandler>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let handler: Arc<dyn MessageHandler> = Arc::new(move |message: Message| {
        let sink = Arc::clone(&sink);
        let outcome = outcome.clone();
        async move {
            sink.lock().unwrap().push(message.content);
            outcome
        }
    });
    (seen, handler)
}

#[tokio::test(start_paused = true)]
async fn test_publish_declares_durable_queue_and_sends_persistent() {
    let broker = MockBroker::new();
    let queue = adapter(&broker);
    let message = Message::new("hello", "alice", "bob");

    queue.publish("messages", message.clone()).await.unwrap();

    let declarations = broker.declarations();
    assert_eq!(declarations.len(), 1);
    let (name, declaration) = &declarations[0];
    assert_eq!(name, "messages");
    assert!(declaration.durable);
    assert_eq!(declaration.message_ttl_ms(), 86_400_000);

    let published = broker.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].queue, "messages");
    assert!(published[0].persistent);
    assert_eq!(codec::decode(&published[0].payload).unwrap(), message);
}

#[tokio::test(start_paused = true)]
async fn test_custom_declaration_is_used() {
    let broker = MockBroker::new();
    let declaration = QueueDeclaration {
        durable: false,
        message_ttl: Duration::from_secs(60),
        persistent: false,
    };
    let queue = adapter(&broker).with_declaration(declaration);

    queue
        .publish("scratch", Message::new("x", "a", "b"))
        .await
        .unwrap();

    assert_eq!(broker.declarations()[0].1, declaration);
    assert!(!broker.published()[0].persistent);
}

#[tokio::test(start_paused = true)]
async fn test_publish_fails_without_connection_and_does_not_retry() {
    let broker = MockBroker::new();
    broker.refuse_connections(true);
    let queue = adapter(&broker);

    let err = queue
        .publish("messages", Message::new("hello", "alice", "bob"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        QueueError::Broker(BrokerError::ChannelUnavailable { .. })
    ));
    assert!(broker.published().is_empty());
    assert_eq!(broker.connect_count(), 1);
    queue.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_send_error_fails_publish_and_triggers_reconnect() {
    let broker = MockBroker::new();
    broker.fail_next_publishes(1);
    let queue = adapter(&broker);
    let mut transitions = queue.supervisor().subscribe_transitions();

    let err = queue
        .publish("messages", Message::new("lost", "alice", "bob"))
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::Broker(_)));
    assert_eq!(queue.supervisor().state(), ConnectionState::Reconnecting);

    loop {
        if transitions.recv().await.unwrap().to == ConnectionState::Connected
            && broker.connect_count() == 2
        {
            break;
        }
    }

    queue
        .publish("messages", Message::new("kept", "alice", "bob"))
        .await
        .unwrap();
    assert_eq!(broker.published().len(), 1);
    assert_eq!(broker.closes(), vec!["channel", "connection"]);
}

#[tokio::test(start_paused = true)]
async fn test_successful_handler_acknowledges() {
    let broker = MockBroker::new();
    let queue = adapter(&broker);
    let (seen, handler) = recording(HandlerOutcome::Success);

    queue.subscribe("messages", handler).await.unwrap();
    let body = payload("hello");
    assert!(broker.deliver("messages", body.clone()));

    eventually(|| !broker.acks().is_empty()).await;
    assert_eq!(broker.acks(), vec![(body, Ack::Acked)]);
    assert_eq!(*seen.lock().unwrap(), vec!["hello"]);
    assert_eq!(broker.declarations()[0].0, "messages");
}

#[tokio::test(start_paused = true)]
async fn test_rejecting_handler_nacks_without_requeue() {
    let broker = MockBroker::new();
    let queue = adapter(&broker);
    let (seen, handler) = recording(HandlerOutcome::reject("unroutable"));

    queue.subscribe("messages", handler).await.unwrap();
    broker.deliver("messages", payload("bad"));

    eventually(|| !broker.acks().is_empty()).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(broker.acks().len(), 1);
    assert_eq!(broker.acks()[0].1, Ack::Nacked { requeue: false });
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failing_handler_is_redelivered_without_cap() {
    let broker = MockBroker::new();
    let queue = adapter(&broker);
    let (seen, handler) = recording(HandlerOutcome::retry("database down"));

    queue.subscribe("messages", handler).await.unwrap();
    broker.deliver("messages", payload("stubborn"));

    eventually(|| seen.lock().unwrap().len() >= 20).await;
    queue.close().await.unwrap();

    assert!(broker
        .acks()
        .iter()
        .all(|(_, ack)| *ack == Ack::Nacked { requeue: true }));
    assert!(seen.lock().unwrap().iter().all(|c| c == "stubborn"));
}

#[tokio::test(start_paused = true)]
async fn test_panicking_handler_is_requeued() {
    let broker = MockBroker::new();
    let queue = adapter(&broker);
    let calls = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&calls);

    queue
        .subscribe(
            "messages",
            Arc::new(move |_message: Message| {
                let counter = Arc::clone(&counter);
                async move {
                    let first = {
                        let mut calls = counter.lock().unwrap();
                        *calls += 1;
                        *calls == 1
                    };
                    if first {
                        panic!("handler blew up");
                    }
                    HandlerOutcome::Success
                }
            }),
        )
        .await
        .unwrap();
    broker.deliver("messages", payload("boom"));

    eventually(|| broker.acks().len() >= 2).await;
    let acks: Vec<Ack> = broker.acks().into_iter().map(|(_, ack)| ack).collect();
    assert_eq!(acks, vec![Ack::Nacked { requeue: true }, Ack::Acked]);
    assert_eq!(*calls.lock().unwrap(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_undecodable_delivery_is_requeued_without_calling_handler() {
    let broker = MockBroker::new();
    let queue = adapter(&broker);
    let (seen, handler) = recording(HandlerOutcome::Success);

    queue.subscribe("messages", handler).await.unwrap();
    broker.deliver("messages", b"{not json".to_vec());

    eventually(|| broker.acks().len() >= 3).await;
    queue.close().await.unwrap();

    assert!(broker
        .acks()
        .iter()
        .all(|(body, ack)| body == b"{not json" && *ack == Ack::Nacked { requeue: true }));
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_consumer_resubscribes_after_connection_loss() {
    let broker = MockBroker::new();
    let queue = adapter(&broker);
    let (seen, handler) = recording(HandlerOutcome::Success);

    queue.subscribe("messages", handler).await.unwrap();
    assert_eq!(broker.consume_calls("messages"), 1);

    broker.drop_connection();
    eventually(|| broker.consume_calls("messages") == 2).await;
    assert_eq!(queue.supervisor().state(), ConnectionState::Connected);

    assert!(broker.deliver("messages", payload("after reconnect")));
    eventually(|| !seen.lock().unwrap().is_empty()).await;
    assert_eq!(*seen.lock().unwrap(), vec!["after reconnect"]);
    assert_eq!(queue.active_consumers(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_queues_have_independent_consumers() {
    let broker = MockBroker::new();
    let queue = adapter(&broker);
    let (first, first_handler) = recording(HandlerOutcome::Success);
    let (second, second_handler) = recording(HandlerOutcome::Success);

    queue.subscribe("first", first_handler).await.unwrap();
    queue.subscribe("second", second_handler).await.unwrap();
    broker.deliver("second", payload("two"));
    broker.deliver("first", payload("one"));

    eventually(|| broker.acks().len() == 2).await;
    assert_eq!(*first.lock().unwrap(), vec!["one"]);
    assert_eq!(*second.lock().unwrap(), vec!["two"]);
    assert_eq!(queue.active_consumers(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_close_stops_consumers_and_is_idempotent() {
    let broker = MockBroker::new();
    let queue = adapter(&broker);
    let (_, handler) = recording(HandlerOutcome::Success);
    queue.subscribe("messages", handler).await.unwrap();

    queue.close().await.unwrap();
    queue.close().await.unwrap();

    assert_eq!(queue.active_consumers(), 0);
    assert_eq!(broker.closes(), vec!["channel", "connection"]);
    assert!(!broker.deliver("messages", payload("late")));
    assert!(matches!(
        queue.publish("messages", Message::new("late", "a", "b")).await,
        Err(QueueError::Broker(BrokerError::Closed))
    ));
}

#[tokio::test]
async fn test_close_without_ever_connecting() {
    let broker = MockBroker::new();
    let queue = adapter(&broker);

    queue.close().await.unwrap();

    assert_eq!(broker.connect_count(), 0);
    assert!(broker.closes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_dropping_adapter_stops_consumers() {
    let broker = MockBroker::new();
    let queue = adapter(&broker);
    let (_, handler) = recording(HandlerOutcome::Success);
    queue.subscribe("messages", handler).await.unwrap();

    drop(queue);

    eventually(|| !broker.deliver("messages", payload("orphan"))).await;
}

/// Handler that sleeps for `delay` per message and tracks how many run at once
fn slow(delay: Duration) -> (Arc<AtomicUsize>, Arc<AtomicUsize>, Arc<dyn MessageHandler>) {
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let (now, max) = (Arc::clone(&running), Arc::clone(&peak));
    let handler: Arc<dyn MessageHandler> = Arc::new(move |_message: Message| {
        let (now, max) = (Arc::clone(&now), Arc::clone(&max));
        async move {
            let current = now.fetch_add(1, Ordering::SeqCst) + 1;
            max.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            now.fetch_sub(1, Ordering::SeqCst);
            HandlerOutcome::Success
        }
    });
    (running, peak, handler)
}

#[tokio::test(start_paused = true)]
async fn test_subscription_handles_one_message_at_a_time() {
    let broker = MockBroker::new();
    let queue = adapter(&broker);
    let (_running, peak, handler) = slow(Duration::from_millis(50));
    queue.subscribe("slow", handler).await.unwrap();

    for n in 0..5 {
        assert!(broker.deliver("slow", payload(&format!("m{n}"))));
    }

    eventually(|| broker.acks().len() == 5).await;
    assert_eq!(peak.load(Ordering::SeqCst), 1);
    assert!(broker
        .acks()
        .iter()
        .all(|(_, ack)| *ack == Ack::Acked));
    queue.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_blocked_subscription_does_not_stall_other_queues() {
    let broker = MockBroker::new();
    let queue = adapter(&broker);
    let (running, _peak, blocked) = slow(Duration::from_secs(3600));
    let (seen, handler) = recording(HandlerOutcome::Success);
    queue.subscribe("slow", blocked).await.unwrap();
    queue.subscribe("fast", handler).await.unwrap();

    assert!(broker.deliver("slow", payload("stuck")));
    eventually(|| running.load(Ordering::SeqCst) == 1).await;

    let body = payload("through");
    assert!(broker.deliver("fast", body.clone()));
    eventually(|| broker.acks().len() == 1).await;

    assert_eq!(broker.acks(), vec![(body, Ack::Acked)]);
    assert_eq!(*seen.lock().unwrap(), vec!["through"]);
    assert_eq!(running.load(Ordering::SeqCst), 1);
    queue.close().await.unwrap();
}
