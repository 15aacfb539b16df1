//! A live connection endpoint.
//!
//! An [`ExchangeChannel`] pairs a transport with a [`Correlator`] for the
//! requests it sends and an [`ExchangeHandler`] for the requests it
//! receives. Opening a channel spawns its inbound loop:
//!
//! ```text
//! inbound ──► Request (one-way)  ──► task: handler.handle
//!         ──► Request (two-way)  ──► task: handler.reply ──► transport.send(Response)
//!         ──► Response           ──► correlator.on_response_received
//!                                     └─ unmatched ──► handler.caught
//! end / close ──► correlator closed ──► drain handler tasks ──► handler.disconnected
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use switchyard_core::Url;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::ExchangeConfig;
use crate::correlator::{Correlator, CorrelatorState, ResponseFuture};
use crate::error::ExchangeError;
use crate::handler::ExchangeHandler;
use crate::message::{Message, Request, Response};
use crate::transport::{Transport, TransportConnection};

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique channel identifier, for logs and server bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(u64);

impl ChannelId {
    fn next() -> Self {
        Self(NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch-{}", self.0)
    }
}

/// Whether closing the channel also closes its transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportOwnership {
    /// The channel owns the transport and closes it.
    #[default]
    Exclusive,
    /// The transport is shared; closing the channel only drops its reference.
    Shared,
}

struct ChannelInner {
    id: ChannelId,
    url: Url,
    remote_address: String,
    config: ExchangeConfig,
    ownership: TransportOwnership,
    transport: Arc<dyn Transport>,
    correlator: Correlator,
    handler: Arc<dyn ExchangeHandler>,
    shutdown: CancellationToken,
    terminated: CancellationToken,
}

/// Request/response endpoint over one transport connection.
///
/// Cheap to clone; all clones refer to the same channel.
#[derive(Clone)]
pub struct ExchangeChannel {
    inner: Arc<ChannelInner>,
}

impl ExchangeChannel {
    /// Open a channel that exclusively owns the connection's transport.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(
        url: Url,
        connection: TransportConnection,
        handler: Arc<dyn ExchangeHandler>,
        config: ExchangeConfig,
    ) -> Self {
        Self::open_with_ownership(url, connection, handler, config, TransportOwnership::Exclusive)
    }

    /// Open a channel with explicit transport ownership.
    pub fn open_with_ownership(
        url: Url,
        connection: TransportConnection,
        handler: Arc<dyn ExchangeHandler>,
        config: ExchangeConfig,
        ownership: TransportOwnership,
    ) -> Self {
        let TransportConnection {
            transport,
            inbound,
            remote_address,
        } = connection;

        let channel = Self {
            inner: Arc::new(ChannelInner {
                id: ChannelId::next(),
                url,
                remote_address,
                config,
                ownership,
                correlator: Correlator::new(Arc::clone(&transport)),
                transport,
                handler,
                shutdown: CancellationToken::new(),
                terminated: CancellationToken::new(),
            }),
        };

        tracing::debug!(
            channel = %channel.id(),
            remote = channel.remote_address(),
            ownership = ?ownership,
            "channel opened"
        );
        tokio::spawn(channel.clone().run_inbound(inbound));
        channel
    }

    /// Channel identifier.
    pub fn id(&self) -> ChannelId {
        self.inner.id
    }

    /// Url the channel was opened with.
    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    /// Address of the peer.
    pub fn remote_address(&self) -> &str {
        &self.inner.remote_address
    }

    /// Channel configuration.
    pub fn config(&self) -> &ExchangeConfig {
        &self.inner.config
    }

    /// Transport ownership mode.
    pub fn ownership(&self) -> TransportOwnership {
        self.inner.ownership
    }

    /// Send a two-way request.
    ///
    /// # Errors
    ///
    /// See [`Correlator::request`].
    pub fn request(&self, payload: Bytes, timeout: Duration) -> Result<ResponseFuture, ExchangeError> {
        self.inner.correlator.request(payload, timeout)
    }

    /// Send a two-way request with the configured default timeout.
    pub fn request_default(&self, payload: Bytes) -> Result<ResponseFuture, ExchangeError> {
        self.request(payload, self.inner.config.default_timeout)
    }

    /// Send a one-way request.
    pub fn send(&self, payload: Bytes) -> Result<(), ExchangeError> {
        self.inner.correlator.send(payload)
    }

    /// Number of our requests awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.inner.correlator.pending_count()
    }

    /// Whether the channel has closed.
    pub fn is_closed(&self) -> bool {
        self.inner.correlator.state() == CorrelatorState::Closed
    }

    /// Close immediately. Pending requests resolve with `ChannelClosed`.
    pub fn close(&self) {
        let already_closed = self.is_closed();
        self.inner.correlator.begin_close();
        self.inner.correlator.on_channel_closed();
        self.release_transport();
        self.inner.shutdown.cancel();
        if !already_closed {
            tracing::debug!(channel = %self.id(), "channel closed");
        }
    }

    /// Stop accepting new requests, wait up to `timeout` for pending ones,
    /// then close.
    pub async fn close_gracefully(&self, timeout: Duration) {
        self.inner.correlator.begin_close();
        if !self.inner.correlator.wait_drained(timeout).await {
            tracing::warn!(
                channel = %self.id(),
                pending = self.pending_count(),
                "graceful close timed out"
            );
        }
        self.close();
    }

    /// Wait until the inbound loop has finished and `disconnected` has run.
    pub async fn terminated(&self) {
        self.inner.terminated.cancelled().await;
    }

    fn release_transport(&self) {
        if self.inner.ownership == TransportOwnership::Exclusive {
            self.inner.transport.close();
        }
    }

    async fn run_inbound(self, mut inbound: mpsc::Receiver<Message>) {
        let handler = Arc::clone(&self.inner.handler);
        handler.connected(&self).await;

        let mut tasks = JoinSet::new();
        loop {
            let message = tokio::select! {
                biased;
                _ = self.inner.shutdown.cancelled() => break,
                message = inbound.recv() => match message {
                    Some(message) => message,
                    None => {
                        tracing::debug!(channel = %self.id(), "inbound stream ended");
                        break;
                    }
                },
            };

            while let Some(finished) = tasks.try_join_next() {
                self.log_task_failure(finished);
            }

            match message {
                Message::Request(request) => {
                    let channel = self.clone();
                    tasks.spawn(async move { channel.dispatch(request).await });
                }
                Message::Response(response) => {
                    let id = response.id;
                    if !self.inner.correlator.on_response_received(response) {
                        handler
                            .caught(&self, &ExchangeError::UnmatchedResponse { id })
                            .await;
                    }
                }
            }
        }

        self.inner.correlator.on_channel_closed();
        self.release_transport();
        self.inner.shutdown.cancel();

        while let Some(finished) = tasks.join_next().await {
            self.log_task_failure(finished);
        }
        handler.disconnected(&self).await;
        self.inner.terminated.cancel();
    }

    fn log_task_failure(&self, finished: Result<(), tokio::task::JoinError>) {
        if let Err(err) = finished {
            tracing::error!(channel = %self.id(), error = %err, "handler task failed");
        }
    }

    async fn dispatch(&self, request: Request) {
        if request.one_way {
            self.inner.handler.handle(self, request).await;
            return;
        }

        let id = request.id;
        let handler = Arc::clone(&self.inner.handler);
        let channel = self.clone();
        let outcome = tokio::spawn(async move { handler.reply(&channel, request).await }).await;

        let response = match outcome {
            Ok(Ok(payload)) => Response::ok(id, payload),
            Ok(Err(err)) => {
                tracing::warn!(channel = %self.id(), id, error = %err, "handler returned an error");
                Response::error(id, Bytes::from(err.to_string()))
            }
            Err(err) => {
                tracing::error!(channel = %self.id(), id, error = %err, "handler panicked");
                Response::error(id, Bytes::from_static(b"handler panicked"))
            }
        };

        if self.inner.shutdown.is_cancelled() {
            tracing::debug!(channel = %self.id(), id, "channel closed, dropping response");
            return;
        }
        if let Err(err) = self.inner.transport.send(Message::Response(response)) {
            tracing::debug!(channel = %self.id(), id, error = %err, "could not send response");
            self.inner
                .handler
                .caught(self, &ExchangeError::Transport(err))
                .await;
        }
    }
}

impl fmt::Debug for ExchangeChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangeChannel")
            .field("id", &self.inner.id)
            .field("url", &self.inner.url.to_string())
            .field("remote_address", &self.inner.remote_address)
            .field("closed", &self.is_closed())
            .finish()
    }
}
