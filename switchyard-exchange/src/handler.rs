//! Application callbacks invoked by a channel.

use async_trait::async_trait;
use bytes::Bytes;

use crate::channel::ExchangeChannel;
use crate::error::{ExchangeError, HandlerError};
use crate::message::Request;

/// Application logic attached to a channel.
///
/// For a given channel, `connected` runs before any other callback and
/// `disconnected` runs exactly once, after every handler call has finished.
/// Requests are dispatched in arrival order but each call runs as its own
/// task, so replies may complete out of order.
#[async_trait]
pub trait ExchangeHandler: Send + Sync {
    /// The channel is open.
    async fn connected(&self, channel: &ExchangeChannel) {
        tracing::debug!(channel = %channel.id(), remote = channel.remote_address(), "connected");
    }

    /// The channel has closed and all handler calls have finished.
    async fn disconnected(&self, channel: &ExchangeChannel) {
        tracing::debug!(channel = %channel.id(), "disconnected");
    }

    /// Handle a one-way request. The default drops it.
    async fn handle(&self, channel: &ExchangeChannel, request: Request) {
        tracing::debug!(
            channel = %channel.id(),
            bytes = request.payload.len(),
            "ignoring one-way request"
        );
    }

    /// Produce the reply payload for a two-way request.
    ///
    /// An error is sent back to the requester as a
    /// [`crate::Status::Error`] response carrying the error text.
    async fn reply(&self, channel: &ExchangeChannel, request: Request) -> Result<Bytes, HandlerError>;

    /// A non-fatal error occurred on the channel.
    async fn caught(&self, channel: &ExchangeChannel, error: &ExchangeError) {
        tracing::warn!(channel = %channel.id(), error = %error, "exchange error");
    }
}
