//! Request entry point for channel subscriptions.
//!
//! Turns raw request parameters into a [`SubscriptionRequest`], opens the
//! feed and hands it to the transport the client asked for.

use crate::broker::Broker;
use crate::codec::encode_change;
use crate::config::FeedConfig;
use crate::error::Result;
use crate::feed::{FeedMerger, FeedOutput, SubscriptionRequest};
use crate::records::ChangeReader;
use crate::transport::{Delivery, FeedConsumer, FrameSink, SingleResponse, Streaming, TransportKind};
use crate::types::{ChangeId, Channel};
use std::sync::Arc;
use tracing::debug;

/// Raw query parameters of a subscribe request.
#[derive(Clone, Debug, Default)]
pub struct SubscribeParams {
    /// Partition within the channel.
    pub room: Option<String>,
    /// Resume cursor as sent by the client.
    pub last_id: Option<String>,
    /// `websocket` selects streaming; anything else a single response.
    pub transport: Option<String>,
}

impl SubscribeParams {
    pub fn with_room(mut self, room: impl Into<String>) -> Self {
        self.room = Some(room.into());
        self
    }

    pub fn with_last_id(mut self, last_id: impl Into<String>) -> Self {
        self.last_id = Some(last_id.into());
        self
    }

    pub fn with_transport(mut self, transport: impl Into<String>) -> Self {
        self.transport = Some(transport.into());
        self
    }

    pub fn transport_kind(&self) -> TransportKind {
        TransportKind::from_param(self.transport.as_deref())
    }

    /// Parsed resume cursor.
    ///
    /// `0` asks for history from the first change. Negative or non-numeric
    /// values are treated as no cursor at all: a malformed cursor yields a
    /// live-only feed, never a replay from the start.
    pub fn resume_cursor(&self) -> Option<ChangeId> {
        let raw = self.last_id.as_deref()?.trim();
        match raw.parse::<i64>() {
            Ok(id) if id >= 0 => Some(ChangeId(id as u64)),
            _ => None,
        }
    }
}

/// Subscription front end for one process.
pub struct ChangeFeedService {
    config: FeedConfig,
    reader: Arc<dyn ChangeReader>,
    merger: FeedMerger,
}

impl ChangeFeedService {
    pub fn new(config: FeedConfig, reader: Arc<dyn ChangeReader>, broker: Arc<dyn Broker>) -> Self {
        let merger = FeedMerger::new(Arc::clone(&reader), broker);
        Self {
            config,
            reader,
            merger,
        }
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Build the feed request for `params`, with limit and deadline taken
    /// from the configuration of the requested transport.
    pub fn request_for(&self, channel: Channel, params: &SubscribeParams) -> SubscriptionRequest {
        let limit = match params.transport_kind() {
            TransportKind::Streaming => self.config.stream_limit,
            TransportKind::SingleResponse => self.config.single_limit,
        };

        let mut request = SubscriptionRequest::new(channel, limit, self.config.subscribe_timeout);
        if let Some(room) = &params.room {
            request = request.with_room(room.clone());
        }
        if let Some(last_id) = params.resume_cursor() {
            request = request.with_last_id(last_id);
        }
        request
    }

    /// Open the feed for a request without delivering it.
    pub fn subscribe(
        &self,
        channel: Channel,
        params: &SubscribeParams,
    ) -> Result<(TransportKind, FeedOutput)> {
        let kind = params.transport_kind();
        let request = self.request_for(channel, params);
        debug!(
            channel = %channel.id,
            tenant = %channel.tenant,
            transport = ?kind,
            limit = request.limit,
            "subscribe"
        );
        Ok((kind, self.merger.open(request)?))
    }

    /// Open the feed and deliver it over the requested transport. `sink` is
    /// only written to for streaming requests.
    pub fn handle<S: FrameSink>(
        &self,
        channel: Channel,
        params: &SubscribeParams,
        sink: S,
    ) -> Result<Delivery> {
        let (kind, output) = self.subscribe(channel, params)?;
        match kind {
            TransportKind::Streaming => Streaming::new(sink).consume(output),
            TransportKind::SingleResponse => SingleResponse.consume(output),
        }
    }

    /// A single change rendered in its wire form.
    pub fn retrieve(
        &self,
        channel: Channel,
        room: Option<&str>,
        id: ChangeId,
    ) -> Result<Option<Vec<u8>>> {
        self.reader
            .get(channel, room, id)?
            .map(|change| encode_change(&change))
            .transpose()
    }
}
