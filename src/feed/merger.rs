//! Splices catch-up and the live tail into one feed.

use super::output::FeedOutput;
use super::types::{EndReason, FeedState, MergeSummary, SubscriptionRequest};
use crate::broker::{Broker, LiveSubscription};
use crate::codec::{encode_change, extract_id};
use crate::error::{FeedError, Result};
use crate::records::ChangeReader;
use crate::topic::stream_key;
use crate::types::ChangeId;
use crossbeam_channel::{at, bounded, select, Receiver, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, warn};

/// Opens feeds over a historical reader and a broadcast bus.
pub struct FeedMerger {
    reader: Arc<dyn ChangeReader>,
    broker: Arc<dyn Broker>,
    /// Counter for naming merge threads.
    next_feed: AtomicU64,
}

impl FeedMerger {
    pub fn new(reader: Arc<dyn ChangeReader>, broker: Arc<dyn Broker>) -> Self {
        Self {
            reader,
            broker,
            next_feed: AtomicU64::new(1),
        }
    }

    /// Open a feed.
    ///
    /// Catch-up runs on the calling thread. Storage errors abort before any
    /// live resource is allocated. If the live tap fails to open after
    /// catch-up produced items, those items are still returned and the
    /// failure is available via [`FeedOutput::live_error`].
    pub fn open(&self, request: SubscriptionRequest) -> Result<FeedOutput> {
        if request.limit == 0 {
            return Err(FeedError::InvalidRequest(
                "delivery limit must be positive".into(),
            ));
        }

        let feed = self.next_feed.fetch_add(1, Ordering::Relaxed);
        let channel = request.channel;
        let room = request.room.as_deref();
        let (output, receiver) = bounded(request.limit);

        // The cursor itself seeds the high-water mark: nothing at or below it
        // may come through the live tap either.
        let mut high_water = request.last_id.unwrap_or_default();
        let mut delivered = 0;

        if let Some(after) = request.last_id {
            debug!(feed, state = ?FeedState::CatchingUp, %after, limit = request.limit, "catching up");

            let changes = self
                .reader
                .fetch_since(channel, room, Some(after), request.limit)?;

            for change in changes.iter().take(request.limit) {
                let bytes = encode_change(change)?;
                if output.send(bytes).is_err() {
                    break;
                }
                high_water = high_water.max(change.id);
                delivered += 1;
            }
        }

        let remaining = request.limit - delivered;
        if remaining == 0 {
            debug!(feed, delivered, "catch-up filled the limit, skipping live tap");
            return Ok(FeedOutput::closed(receiver, delivered));
        }

        let key = stream_key(channel.tenant, channel.id, room);
        let live = match self.broker.subscribe(&key, remaining) {
            Ok(live) => live,
            Err(err) => return Self::live_failed(receiver, delivered, err),
        };

        debug!(
            feed,
            state = ?FeedState::LiveTail,
            key = %key,
            remaining,
            high_water = high_water.0,
            "live tap opened"
        );

        let merge = MergeLoop {
            feed,
            output,
            high_water,
            remaining,
            delivered,
            discarded: 0,
        };
        let deadline = request.deadline;

        match thread::Builder::new()
            .name(format!("changefeed-merge-{feed}"))
            .spawn(move || merge.run(live, deadline))
        {
            Ok(handle) => Ok(FeedOutput::live(receiver, delivered, handle)),
            Err(e) => Self::live_failed(
                receiver,
                delivered,
                FeedError::Broker(format!("failed to start merge task: {e}")),
            ),
        }
    }

    /// Report a live-side failure, keeping catch-up items if there are any.
    fn live_failed(
        receiver: Receiver<Vec<u8>>,
        delivered: usize,
        err: FeedError,
    ) -> Result<FeedOutput> {
        if delivered == 0 {
            return Err(err);
        }

        warn!(delivered, error = %err, "live tap failed after catch-up");
        Ok(FeedOutput::closed(receiver, delivered).with_live_error(err))
    }
}

/// State owned by the merge task. Nothing else reads or writes it.
struct MergeLoop {
    feed: u64,
    output: Sender<Vec<u8>>,
    /// Last id already delivered (or the cursor); zero disables filtering.
    high_water: ChangeId,
    remaining: usize,
    delivered: usize,
    discarded: usize,
}

impl MergeLoop {
    /// Forward live payloads until capacity, deadline or end of the live tap.
    /// Dropping `live` and `self.output` on return releases the subscription
    /// and closes the feed.
    fn run(mut self, live: LiveSubscription, deadline: Instant) -> MergeSummary {
        let timeout = at(deadline);

        let end = loop {
            select! {
                recv(live.receiver()) -> msg => match msg {
                    Ok(payload) => {
                        if let Some(end) = self.accept(payload) {
                            break end;
                        }
                    }
                    Err(_) => break EndReason::LiveClosed,
                },
                recv(timeout) -> _ => break EndReason::Deadline,
            }
        };

        drop(live);
        debug!(
            feed = self.feed,
            state = ?FeedState::Done,
            end = ?end,
            delivered = self.delivered,
            discarded = self.discarded,
            "feed closed"
        );

        MergeSummary {
            delivered: self.delivered,
            discarded: self.discarded,
            end,
        }
    }

    /// Handle one live payload. Returns the end reason once the feed is done.
    fn accept(&mut self, payload: Vec<u8>) -> Option<EndReason> {
        if self.high_water > ChangeId(0) {
            match extract_id(&payload) {
                Some(id) if id <= self.high_water => {
                    self.discarded += 1;
                    return None;
                }
                // First change past catch-up: the overlap window is over for good.
                Some(_) => self.high_water = ChangeId(0),
                None => {
                    warn!(feed = self.feed, "discarding live payload without readable id");
                    self.discarded += 1;
                    return None;
                }
            }
        }

        if self.output.send(payload).is_err() {
            return Some(EndReason::OutputClosed);
        }
        self.delivered += 1;
        self.remaining -= 1;

        if self.remaining == 0 {
            return Some(EndReason::CapacityReached);
        }
        None
    }
}
