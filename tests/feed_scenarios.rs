//! End-to-end feed behavior: catch-up, overlap filtering, limits, deadlines.

mod common;

use changefeed::{
    stream_key, ChangeAction, ChangeFeedService, ChangeId, ChangeInput, ChangeWriter, Channel,
    Delivery, EndReason, FeedConfig, FeedConsumer, FeedMerger, FeedState, MemoryBroker,
    SingleResponse, SubscribeParams, SubscriptionRequest, TenantId,
};
use serde_json::json;
use common::{ids, init_tracing, log_with_history, wire, ScriptedBroker, CHANNEL};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn wait_for_live(broker: &MemoryBroker, room: Option<&str>) {
    let key = stream_key(CHANNEL.tenant, CHANNEL.id, room);
    let start = Instant::now();
    while broker.subscription_count_for(&key) == 0 {
        assert!(start.elapsed() < Duration::from_secs(2), "live tap never opened");
        thread::sleep(Duration::from_millis(1));
    }
}

// --- Catch-up ---

#[test]
fn test_catch_up_delivers_in_order_and_opens_live_with_remaining() {
    init_tracing();
    let log = log_with_history(8);
    let broker = Arc::new(ScriptedBroker::silent());
    let merger = FeedMerger::new(log, broker.clone());

    let request = SubscriptionRequest::new(CHANNEL, 10, Duration::from_millis(50))
        .with_last_id(ChangeId(5));
    let mut output = merger.open(request).unwrap();

    assert_eq!(output.caught_up(), 3);
    assert_eq!(*broker.capacities.lock(), vec![7]);

    let summary = output.join().unwrap();
    assert_eq!(summary.end, EndReason::Deadline);
    assert_eq!(ids(output), vec![6, 7, 8]);
    assert_eq!(broker.open_subscriptions(), 0);
}

#[test]
fn test_overlap_duplicate_discarded_then_latch_clears() {
    let log = log_with_history(8);
    let broker = Arc::new(ScriptedBroker::new(vec![wire(7), wire(9), wire(10)]));
    let merger = FeedMerger::new(log, broker.clone());

    let request = SubscriptionRequest::new(CHANNEL, 10, Duration::from_millis(50))
        .with_last_id(ChangeId(5));
    let mut output = merger.open(request).unwrap();

    let summary = output.join().unwrap();
    assert_eq!(summary.discarded, 1);
    assert_eq!(summary.delivered, 5);
    assert_eq!(ids(output), vec![6, 7, 8, 9, 10]);
}

#[test]
fn test_filter_disabled_after_first_new_id() {
    // Once 9 passes, a stray 4 is no longer inspected and goes through as-is
    let log = log_with_history(8);
    let broker = Arc::new(ScriptedBroker::new(vec![wire(8), wire(9), wire(4)]));
    let merger = FeedMerger::new(log, broker);

    let request = SubscriptionRequest::new(CHANNEL, 10, Duration::from_millis(30))
        .with_last_id(ChangeId(5));
    let mut output = merger.open(request).unwrap();
    output.join().unwrap();

    assert_eq!(ids(output), vec![6, 7, 8, 9, 4]);
}

#[test]
fn test_limit_filled_by_history_never_subscribes() {
    let log = log_with_history(3);
    let broker = Arc::new(ScriptedBroker::silent());
    let merger = FeedMerger::new(log, broker.clone());

    let request = SubscriptionRequest::new(CHANNEL, 3, Duration::from_secs(10))
        .with_last_id(ChangeId(0));
    let started = Instant::now();
    let mut output = merger.open(request).unwrap();

    assert_eq!(output.state(), FeedState::Done);
    assert_eq!(ids(output.by_ref()), vec![1, 2, 3]);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(broker.subscribe_calls(), 0);
    assert_eq!(output.join().unwrap().end, EndReason::CatchUpOnly);
}

#[test]
fn test_no_cursor_skips_history() {
    let log = log_with_history(5);
    let broker = Arc::new(ScriptedBroker::new(vec![wire(6)]));
    let merger = FeedMerger::new(log, broker.clone());

    let request = SubscriptionRequest::new(CHANNEL, 1, Duration::from_secs(5));
    let mut output = merger.open(request).unwrap();

    assert_eq!(output.caught_up(), 0);
    assert_eq!(*broker.capacities.lock(), vec![1]);
    assert_eq!(output.join().unwrap().end, EndReason::CapacityReached);
    assert_eq!(ids(output), vec![6]);
}

#[test]
fn test_duplicates_beyond_live_capacity_are_absorbed() {
    // One slot left after catch-up, eight overlap duplicates ahead of the new id
    let log = log_with_history(8);
    let broker = Arc::new(ScriptedBroker::new((1..=9).map(wire).collect()));
    let merger = FeedMerger::new(log, broker.clone());

    let request = SubscriptionRequest::new(CHANNEL, 4, Duration::from_secs(5))
        .with_last_id(ChangeId(5));
    let mut output = merger.open(request).unwrap();
    assert_eq!(*broker.capacities.lock(), vec![1]);

    let summary = output.join().unwrap();
    assert_eq!(summary.end, EndReason::CapacityReached);
    assert_eq!(summary.discarded, 8);
    assert_eq!(ids(output), vec![6, 7, 8, 9]);
}

#[test]
fn test_published_duplicates_do_not_cost_the_new_event() {
    let log = log_with_history(0);
    let broker = MemoryBroker::new();
    let merger = FeedMerger::new(log, Arc::new(broker.clone()));

    let request = SubscriptionRequest::new(CHANNEL, 1, Duration::from_secs(5))
        .with_last_id(ChangeId(4));
    let output = merger.open(request).unwrap();
    wait_for_live(&broker, None);

    let key = stream_key(CHANNEL.tenant, CHANNEL.id, None);
    for id in [3, 4, 5] {
        assert_eq!(broker.publish(&key, wire(id)), 1);
    }

    let started = Instant::now();
    match SingleResponse.consume(output).unwrap() {
        Delivery::Content(bytes) => {
            assert_eq!(changefeed::extract_id(&bytes), Some(ChangeId(5)));
        }
        other => panic!("expected content, got {:?}", other),
    }
    assert!(started.elapsed() < Duration::from_secs(2));
}

// --- Tenancy ---

#[test]
fn test_history_is_tenant_scoped() {
    let log = log_with_history(0);
    let neighbor = Channel::new(TenantId(CHANNEL.tenant.0 + 1), CHANNEL.id);

    log.append(
        CHANNEL,
        None,
        ChangeInput::new(ChangeAction::Create).with_payload(json!({ "secret": "A" })),
    )
    .unwrap();
    log.append(neighbor, None, ChangeInput::new(ChangeAction::Create))
        .unwrap();
    log.append(neighbor, None, ChangeInput::new(ChangeAction::Update))
        .unwrap();

    let broker = Arc::new(ScriptedBroker::silent());
    let merger = FeedMerger::new(log, broker);

    let request = SubscriptionRequest::new(neighbor, 5, Duration::from_millis(20))
        .with_last_id(ChangeId(0));
    let output = merger.open(request).unwrap();
    assert_eq!(output.caught_up(), 2);

    let items: Vec<Vec<u8>> = output.collect();
    assert_eq!(ids(items.clone()), vec![1, 2]);
    for item in &items {
        let value: serde_json::Value = serde_json::from_slice(item).unwrap();
        assert!(value["payload"].get("secret").is_none());
    }
}

#[test]
fn test_retrieve_is_tenant_scoped() {
    let log = log_with_history(1);
    let svc = service(log, MemoryBroker::new());
    let neighbor = Channel::new(TenantId(CHANNEL.tenant.0 + 1), CHANNEL.id);

    assert!(svc.retrieve(CHANNEL, None, ChangeId(1)).unwrap().is_some());
    assert!(svc.retrieve(neighbor, None, ChangeId(1)).unwrap().is_none());
}

// --- Deadlines ---

#[test]
fn test_deadline_not_before_timeout() {
    let log = log_with_history(0);
    let broker = Arc::new(ScriptedBroker::silent());
    let merger = FeedMerger::new(log, broker.clone());

    let timeout = Duration::from_millis(80);
    let started = Instant::now();
    let mut output = merger.open(SubscriptionRequest::new(CHANNEL, 5, timeout)).unwrap();

    assert!(output.recv().is_none());
    assert!(started.elapsed() >= timeout);
    assert_eq!(output.join().unwrap().end, EndReason::Deadline);
    assert_eq!(broker.open_subscriptions(), 0);
}

#[test]
fn test_deadline_does_not_drift_with_traffic() {
    // A steady trickle of duplicates must not push the deadline out
    let log = log_with_history(50);
    let broker = MemoryBroker::new();
    let merger = FeedMerger::new(log, Arc::new(broker.clone()));

    let timeout = Duration::from_millis(100);
    let started = Instant::now();
    let request = SubscriptionRequest::new(CHANNEL, 60, timeout).with_last_id(ChangeId(0));
    let mut output = merger.open(request).unwrap();
    wait_for_live(&broker, None);

    let key = stream_key(CHANNEL.tenant, CHANNEL.id, None);
    while started.elapsed() < Duration::from_millis(300) && output.state() == FeedState::LiveTail {
        broker.publish(&key, wire(1));
        thread::sleep(Duration::from_millis(5));
    }

    let summary = output.join().unwrap();
    assert_eq!(summary.end, EndReason::Deadline);
    assert!(started.elapsed() < Duration::from_millis(300));
}

// --- Live bus ---

#[test]
fn test_rooms_are_isolated() {
    let log = log_with_history(0);
    let broker = MemoryBroker::new();
    let merger = FeedMerger::new(log, Arc::new(broker.clone()));

    let request = SubscriptionRequest::new(CHANNEL, 1, Duration::from_secs(5)).with_room("blue");
    let mut output = merger.open(request).unwrap();
    wait_for_live(&broker, Some("blue"));

    broker.publish(&stream_key(CHANNEL.tenant, CHANNEL.id, Some("red")), wire(1));
    broker.publish(&stream_key(CHANNEL.tenant, CHANNEL.id, None), wire(2));
    broker.publish(&stream_key(CHANNEL.tenant, CHANNEL.id, Some("blue")), wire(3));

    assert_eq!(output.join().unwrap().end, EndReason::CapacityReached);
    assert_eq!(ids(output), vec![3]);
}

#[test]
fn test_live_end_closes_feed_without_error() {
    let log = log_with_history(0);
    let broker = Arc::new(ScriptedBroker::closing(vec![wire(1), wire(2)]));
    let merger = FeedMerger::new(log, broker);

    let mut output = merger
        .open(SubscriptionRequest::new(CHANNEL, 10, Duration::from_secs(5)))
        .unwrap();

    let summary = output.join().unwrap();
    assert_eq!(summary.end, EndReason::LiveClosed);
    assert!(output.live_error().is_none());
    assert_eq!(ids(output), vec![1, 2]);
}

#[test]
fn test_consumer_disconnect_does_not_leak_subscription() {
    let log = log_with_history(0);
    let broker = MemoryBroker::new();
    let merger = FeedMerger::new(log, Arc::new(broker.clone()));

    let output = merger
        .open(SubscriptionRequest::new(CHANNEL, 5, Duration::from_millis(40)))
        .unwrap();
    wait_for_live(&broker, None);
    drop(output);

    let start = Instant::now();
    while broker.subscription_count() > 0 {
        assert!(start.elapsed() < Duration::from_secs(2), "subscription leaked");
        thread::sleep(Duration::from_millis(5));
    }
}

// --- Service ---

fn service(log: Arc<changefeed::MemoryChangeLog>, broker: MemoryBroker) -> ChangeFeedService {
    let config = FeedConfig {
        stream_limit: 4,
        single_limit: 1,
        subscribe_timeout: Duration::from_millis(60),
    };
    ChangeFeedService::new(config, log, Arc::new(broker))
}

#[test]
fn test_single_response_without_events_is_no_content() {
    let svc = service(log_with_history(0), MemoryBroker::new());
    let started = Instant::now();

    let mut frames: Vec<Vec<u8>> = Vec::new();
    let delivery = svc
        .handle(CHANNEL, &SubscribeParams::default(), &mut frames)
        .unwrap();

    assert_eq!(delivery, Delivery::NoContent);
    assert!(started.elapsed() >= Duration::from_millis(60));
}

#[test]
fn test_single_response_returns_first_live_event() {
    let log = log_with_history(0);
    let broker = MemoryBroker::new();
    let svc = service(log.clone(), broker.clone());

    let publisher = {
        let broker = broker.clone();
        let log = log.clone();
        thread::spawn(move || {
            wait_for_live(&broker, Some("lobby"));
            let change = log
                .append(
                    CHANNEL,
                    Some("lobby"),
                    ChangeInput::new(ChangeAction::Create),
                )
                .unwrap();
            let key = stream_key(CHANNEL.tenant, CHANNEL.id, Some("lobby"));
            broker.publish(&key, changefeed::encode_change(&change).unwrap());
        })
    };

    let params = SubscribeParams::default().with_room("lobby");
    let delivery = svc.handle(CHANNEL, &params, Vec::<Vec<u8>>::new()).unwrap();
    publisher.join().unwrap();

    match delivery {
        Delivery::Content(bytes) => {
            assert_eq!(changefeed::extract_id(&bytes), Some(ChangeId(1)));
        }
        other => panic!("expected content, got {:?}", other),
    }
}

#[test]
fn test_streaming_spans_history_and_live() {
    let log = log_with_history(2);
    let broker = MemoryBroker::new();
    let svc = service(log, broker.clone());

    let publisher = {
        let broker = broker.clone();
        thread::spawn(move || {
            wait_for_live(&broker, None);
            let key = stream_key(CHANNEL.tenant, CHANNEL.id, None);
            for id in [3, 4] {
                broker.publish(&key, wire(id));
            }
        })
    };

    let params = SubscribeParams::default()
        .with_last_id("0")
        .with_transport("websocket");
    let mut frames: Vec<Vec<u8>> = Vec::new();
    let delivery = svc.handle(CHANNEL, &params, &mut frames).unwrap();
    publisher.join().unwrap();

    assert_eq!(
        delivery,
        Delivery::Streamed {
            sent: 4,
            peer_closed: false
        }
    );
    assert_eq!(ids(frames), vec![1, 2, 3, 4]);
}
