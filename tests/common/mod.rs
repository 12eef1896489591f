//! Shared fixtures for integration tests.

#![allow(dead_code)]

use changefeed::{
    encode_change, Broker, Change, ChangeAction, ChangeId, ChangeInput, ChangeReader,
    ChangeWriter, Channel, ChannelId, FeedError, LiveSubscription, MemoryChangeLog, Result,
    SubscriptionId, TenantId, TopicKey,
};
use crossbeam_channel::{bounded, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

pub const CHANNEL: Channel = Channel {
    id: ChannelId(21),
    tenant: TenantId(5),
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Log pre-filled with `n` changes on CHANNEL (no room).
pub fn log_with_history(n: usize) -> Arc<MemoryChangeLog> {
    let log = Arc::new(MemoryChangeLog::new());
    for _ in 0..n {
        log.append(CHANNEL, None, ChangeInput::new(ChangeAction::Create))
            .unwrap();
    }
    log
}

/// Wire form of a change with the given id, as the publish side sends it.
pub fn wire(id: u64) -> Vec<u8> {
    let change: Change =
        ChangeInput::new(ChangeAction::Update).into_change(ChangeId(id), CHANNEL, None);
    encode_change(&change).unwrap()
}

pub fn ids<I: IntoIterator<Item = Vec<u8>>>(items: I) -> Vec<u64> {
    items
        .into_iter()
        .map(|bytes| changefeed::extract_id(&bytes).unwrap().0)
        .collect()
}

/// Broker whose subscriptions start with a scripted backlog of payloads.
///
/// The queue has exactly the requested capacity. As much of the backlog as
/// fits is queued before `subscribe` returns; a feeder thread pushes the rest
/// with blocking sends, the same backpressure a real publisher sees.
/// Subscriptions stay open (no end of stream) unless `close_after_backlog`
/// is set.
pub struct ScriptedBroker {
    backlog: Vec<Vec<u8>>,
    close_after_backlog: bool,
    /// Capacity requested by each subscribe call.
    pub capacities: Mutex<Vec<usize>>,
    /// Subscriptions not yet released.
    pub open: Arc<AtomicUsize>,
    senders: Mutex<Vec<Sender<Vec<u8>>>>,
}

impl ScriptedBroker {
    pub fn new(backlog: Vec<Vec<u8>>) -> Self {
        Self {
            backlog,
            close_after_backlog: false,
            capacities: Mutex::new(Vec::new()),
            open: Arc::new(AtomicUsize::new(0)),
            senders: Mutex::new(Vec::new()),
        }
    }

    pub fn silent() -> Self {
        Self::new(Vec::new())
    }

    pub fn closing(backlog: Vec<Vec<u8>>) -> Self {
        Self {
            close_after_backlog: true,
            ..Self::new(backlog)
        }
    }

    pub fn subscribe_calls(&self) -> usize {
        self.capacities.lock().len()
    }

    pub fn open_subscriptions(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

impl Broker for ScriptedBroker {
    fn subscribe(&self, key: &TopicKey, capacity: usize) -> Result<LiveSubscription> {
        self.capacities.lock().push(capacity);

        let (sender, receiver) = bounded(capacity);
        let split = capacity.min(self.backlog.len());
        for payload in &self.backlog[..split] {
            sender.send(payload.clone()).unwrap();
        }
        if !self.close_after_backlog {
            self.senders.lock().push(sender.clone());
        }

        let rest = self.backlog[split..].to_vec();
        thread::spawn(move || {
            for payload in rest {
                // Fails once the subscription is released
                if sender.send(payload).is_err() {
                    break;
                }
            }
        });

        self.open.fetch_add(1, Ordering::SeqCst);
        let open = Arc::clone(&self.open);
        let id = SubscriptionId(self.subscribe_calls() as u64);
        Ok(LiveSubscription::new(id, key.clone(), receiver, move |_| {
            open.fetch_sub(1, Ordering::SeqCst);
        }))
    }
}

/// Broker that refuses every subscription.
pub struct RefusingBroker {
    pub calls: AtomicUsize,
}

impl RefusingBroker {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

impl Broker for RefusingBroker {
    fn subscribe(&self, key: &TopicKey, _capacity: usize) -> Result<LiveSubscription> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(FeedError::Broker(format!("connection refused for {key}")))
    }
}

/// Reader whose store is down.
pub struct FailingReader;

impl ChangeReader for FailingReader {
    fn fetch_since(
        &self,
        _channel: Channel,
        _room: Option<&str>,
        _after: Option<ChangeId>,
        _max_count: usize,
    ) -> Result<Vec<Change>> {
        Err(FeedError::Storage("connection to store lost".into()))
    }

    fn get(&self, _channel: Channel, _room: Option<&str>, _id: ChangeId) -> Result<Option<Change>> {
        Err(FeedError::Storage("connection to store lost".into()))
    }
}
