//! Connecting side of an exchanger.

use std::time::Duration;

use bytes::Bytes;
use switchyard_core::Url;

use crate::channel::ExchangeChannel;
use crate::correlator::ResponseFuture;
use crate::error::ExchangeError;

/// An outbound connection wrapping a single [`ExchangeChannel`].
#[derive(Clone, Debug)]
pub struct ExchangeClient {
    channel: ExchangeChannel,
}

impl ExchangeClient {
    /// Wrap an open channel.
    pub fn new(channel: ExchangeChannel) -> Self {
        Self { channel }
    }

    /// The underlying channel.
    pub fn channel(&self) -> &ExchangeChannel {
        &self.channel
    }

    /// Url the client connected with.
    pub fn url(&self) -> &Url {
        self.channel.url()
    }

    /// Send a two-way request.
    pub fn request(&self, payload: Bytes, timeout: Duration) -> Result<ResponseFuture, ExchangeError> {
        self.channel.request(payload, timeout)
    }

    /// Send a two-way request with the configured default timeout.
    pub fn request_default(&self, payload: Bytes) -> Result<ResponseFuture, ExchangeError> {
        self.channel.request_default(payload)
    }

    /// Send a one-way request.
    pub fn send(&self, payload: Bytes) -> Result<(), ExchangeError> {
        self.channel.send(payload)
    }

    /// Whether the connection has closed.
    pub fn is_closed(&self) -> bool {
        self.channel.is_closed()
    }

    /// Close immediately.
    pub fn close(&self) {
        self.channel.close();
    }

    /// Close after pending requests complete, or `timeout` elapses.
    pub async fn close_gracefully(&self, timeout: Duration) {
        self.channel.close_gracefully(timeout).await;
    }
}
