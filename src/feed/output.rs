//! Consumer side of a feed.

use super::types::{EndReason, FeedState, MergeSummary};
use crate::error::FeedError;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::Duration;

/// Ordered, bounded sequence of serialized changes.
///
/// Closed exactly once: when the limit is reached, the deadline elapses or
/// the live tap ends. A closed output with no items is a valid empty result.
pub struct FeedOutput {
    receiver: Receiver<Vec<u8>>,

    /// Items produced by catch-up before the live tap opened.
    caught_up: usize,

    /// Subscribe-time broker failure after a partial catch-up.
    live_error: Option<FeedError>,

    /// Background merge task, if the live tap was opened.
    merge: Option<JoinHandle<MergeSummary>>,

    /// Final summary when no merge task runs (or once it has been joined).
    summary: Option<MergeSummary>,
}

impl FeedOutput {
    /// Output that is already closed; everything it will ever hold is buffered.
    pub(crate) fn closed(receiver: Receiver<Vec<u8>>, caught_up: usize) -> Self {
        Self {
            receiver,
            caught_up,
            live_error: None,
            merge: None,
            summary: Some(MergeSummary {
                delivered: caught_up,
                discarded: 0,
                end: EndReason::CatchUpOnly,
            }),
        }
    }

    pub(crate) fn live(
        receiver: Receiver<Vec<u8>>,
        caught_up: usize,
        merge: JoinHandle<MergeSummary>,
    ) -> Self {
        Self {
            receiver,
            caught_up,
            live_error: None,
            merge: Some(merge),
            summary: None,
        }
    }

    pub(crate) fn with_live_error(mut self, err: FeedError) -> Self {
        self.live_error = Some(err);
        self
    }

    /// Next item, blocking until one is available. `None` once closed and
    /// drained.
    pub fn recv(&self) -> Option<Vec<u8>> {
        self.receiver.recv().ok()
    }

    /// Next item with an upper bound on the wait.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Vec<u8>, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Items currently buffered.
    pub fn buffered(&self) -> usize {
        self.receiver.len()
    }

    /// Number of items catch-up produced.
    pub fn caught_up(&self) -> usize {
        self.caught_up
    }

    /// Broker failure hit while opening the live tap after catch-up.
    pub fn live_error(&self) -> Option<&FeedError> {
        self.live_error.as_ref()
    }

    pub fn take_live_error(&mut self) -> Option<FeedError> {
        self.live_error.take()
    }

    /// Current phase as seen from the consumer.
    pub fn state(&self) -> FeedState {
        match &self.merge {
            Some(handle) if !handle.is_finished() => FeedState::LiveTail,
            _ => FeedState::Done,
        }
    }

    /// Wait for the feed to finish and return its summary.
    ///
    /// Returns `None` only if the merge task panicked.
    pub fn join(&mut self) -> Option<MergeSummary> {
        if let Some(handle) = self.merge.take() {
            self.summary = handle.join().ok();
        }
        self.summary
    }
}

impl Iterator for FeedOutput {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        self.recv()
    }
}

impl std::fmt::Debug for FeedOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedOutput")
            .field("buffered", &self.receiver.len())
            .field("caught_up", &self.caught_up)
            .field("state", &self.state())
            .field("live_error", &self.live_error)
            .finish()
    }
}
