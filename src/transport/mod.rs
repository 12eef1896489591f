//! Delivery of a feed to a client.
//!
//! Both transports consume the same [`FeedOutput`]: streaming pushes every
//! item to a persistent connection, single-response takes the first item or
//! answers "no content".

mod sink;

pub use sink::{is_peer_closed, FrameSink, LineSink};

use crate::error::{FeedError, Result};
use crate::feed::FeedOutput;
use tracing::{debug, warn};

/// Delivery shape requested by the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportKind {
    /// Persistent connection receiving items incrementally.
    Streaming,
    /// One request yielding at most one item.
    SingleResponse,
}

impl TransportKind {
    /// Parse the `transport` request parameter. Only `websocket` selects
    /// streaming.
    pub fn from_param(param: Option<&str>) -> Self {
        match param {
            Some("websocket") => TransportKind::Streaming,
            _ => TransportKind::SingleResponse,
        }
    }
}

/// Result of delivering a feed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Items pushed to a persistent connection.
    Streamed {
        sent: usize,
        /// The peer went away before the feed closed.
        peer_closed: bool,
    },
    /// The first item of the feed.
    Content(Vec<u8>),
    /// The feed closed without producing an item.
    NoContent,
}

/// A transport that drains a feed.
pub trait FeedConsumer {
    fn consume(self, output: FeedOutput) -> Result<Delivery>;
}

/// Push every item to a connection, in order, until the feed closes.
pub struct Streaming<S: FrameSink> {
    sink: S,
}

impl<S: FrameSink> Streaming<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }
}

impl<S: FrameSink> FeedConsumer for Streaming<S> {
    fn consume(mut self, mut output: FeedOutput) -> Result<Delivery> {
        let mut sent = 0;

        while let Some(item) = output.recv() {
            match self.sink.send_frame(&item) {
                Ok(()) => sent += 1,
                Err(e) if is_peer_closed(&e) => {
                    debug!(sent, "peer closed connection");
                    return Ok(Delivery::Streamed {
                        sent,
                        peer_closed: true,
                    });
                }
                Err(e) => return Err(FeedError::Transport(e)),
            }
        }

        if let Some(err) = output.take_live_error() {
            return Err(err);
        }

        Ok(Delivery::Streamed {
            sent,
            peer_closed: false,
        })
    }
}

/// Take at most the first item.
pub struct SingleResponse;

impl FeedConsumer for SingleResponse {
    fn consume(self, mut output: FeedOutput) -> Result<Delivery> {
        let first = output.recv();
        let live_error = output.take_live_error();

        match (first, live_error) {
            (Some(item), Some(err)) => {
                warn!(error = %err, "delivering catch-up despite live tap failure");
                Ok(Delivery::Content(item))
            }
            (Some(item), None) => Ok(Delivery::Content(item)),
            (None, Some(err)) => Err(err),
            (None, None) => Ok(Delivery::NoContent),
        }
    }
}
