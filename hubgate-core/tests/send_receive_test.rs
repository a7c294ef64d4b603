use hubgate_core::bus::InMemoryEventHub;
use hubgate_core::{
    BusConnectionConfig, EventReceiver, EventRecord, EventSender, HubError, ProducerClientManager,
    PublishEvents, ReceiveEvents, ReceiveOutcome, Received, ReceiverOptions, RetryPolicy,
};
use std::sync::Arc;
use std::time::Duration;

struct Fixture {
    hub: InMemoryEventHub,
    sender: Arc<EventSender>,
    receiver: Arc<EventReceiver>,
}

fn fixture(max_wait: Duration) -> Fixture {
    let hub = InMemoryEventHub::new();
    hub.create_hub("h1", 4);
    let config = BusConnectionConfig::new("Endpoint=memory://local/;EntityPath=h1", "h1", "0");

    let producer = Arc::new(ProducerClientManager::new(
        Arc::new(hub.clone()),
        config.clone(),
        RetryPolicy::default(),
    ));
    let receiver = EventReceiver::new(
        Arc::new(hub.clone()),
        config,
        ReceiverOptions {
            max_wait,
            ..ReceiverOptions::default()
        },
    );

    Fixture {
        hub,
        sender: Arc::new(EventSender::new(producer)),
        receiver: Arc::new(receiver),
    }
}

#[tokio::test]
async fn test_fresh_partition_returns_sentinel() {
    let fixture = fixture(Duration::from_secs(1));

    let received = fixture.receiver.receive_latest().await.unwrap();
    assert_eq!(received.outcome(), ReceiveOutcome::PartitionEmpty);

    let record = received.into_record();
    assert_eq!(
        serde_json::to_value(&record).unwrap(),
        serde_json::json!({"id": null, "value": 0})
    );
    assert_eq!(fixture.hub.stats().readers_opened, 0);
}

#[tokio::test]
async fn test_send_then_receive_latest() {
    let fixture = fixture(Duration::from_secs(5));
    // make the partition non-empty so the receiver attaches a reader
    fixture
        .sender
        .publish(&EventRecord::new("warmup", 0))
        .await
        .unwrap();

    let receiver = fixture.receiver.clone();
    let pending = tokio::spawn(async move { receiver.receive_latest().await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let sent = EventRecord::new("e1", 42);
    fixture.sender.publish(&sent).await.unwrap();

    let received = pending.await.unwrap().unwrap();
    assert_eq!(received, Received::Event(sent));
}

#[tokio::test]
async fn test_nothing_new_within_wait_matches_empty_output() {
    let fixture = fixture(Duration::from_millis(50));
    fixture
        .sender
        .publish(&EventRecord::new("before-attach", 1))
        .await
        .unwrap();

    let received = fixture.receiver.receive_latest().await.unwrap();
    assert_eq!(received.outcome(), ReceiveOutcome::NoNewEvent);
    assert_eq!(received.into_record(), EventRecord::default());
}

#[tokio::test]
async fn test_oversized_send_leaves_log_untouched() {
    let hub = InMemoryEventHub::with_max_batch_size(64);
    hub.create_hub("h1", 1);
    let config = BusConnectionConfig::new("Endpoint=memory://local", "h1", "0");
    let producer = Arc::new(ProducerClientManager::new(
        Arc::new(hub.clone()),
        config,
        RetryPolicy::default(),
    ));
    let sender = EventSender::new(producer);

    let record = EventRecord::new("big", 1).with_attribute("blob", "x".repeat(128));
    let result = sender.publish(&record).await;
    assert!(matches!(result, Err(HubError::PayloadTooLarge { .. })));
    assert!(hub.events("h1", "0").await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sends_share_one_producer() {
    let fixture = fixture(Duration::from_secs(1));

    let tasks: Vec<_> = (0..20)
        .map(|i| {
            let sender = fixture.sender.clone();
            tokio::spawn(async move { sender.publish(&EventRecord::new(format!("e{}", i), i)).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let stats = fixture.hub.stats();
    assert_eq!(stats.producers_created, 1);
    assert_eq!(stats.batches_published, 20);
    assert_eq!(fixture.hub.events("h1", "0").await.unwrap().len(), 20);
}
