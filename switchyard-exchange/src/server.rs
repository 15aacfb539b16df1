//! Listening side of an exchanger.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use switchyard_core::Url;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::channel::{ChannelId, ExchangeChannel};
use crate::config::ExchangeConfig;
use crate::handler::ExchangeHandler;
use crate::transport::TransportListener;

struct ServerInner {
    url: Url,
    local_address: String,
    listener: Arc<dyn TransportListener>,
    channels: Mutex<BTreeMap<ChannelId, ExchangeChannel>>,
    shutdown: CancellationToken,
}

impl ServerInner {
    fn stop_accepting(&self) {
        if !self.shutdown.is_cancelled() {
            self.shutdown.cancel();
            self.listener.close();
        }
    }

    fn take_channels(&self) -> Vec<ExchangeChannel> {
        std::mem::take(&mut *self.channels.lock())
            .into_values()
            .collect()
    }
}

/// A bound endpoint that opens one channel per inbound connection.
///
/// Every channel gets its own correlator. Dropping the server stops
/// accepting but leaves established channels running; use
/// [`ExchangeServer::close`] to tear them down too.
pub struct ExchangeServer {
    inner: Arc<ServerInner>,
}

impl ExchangeServer {
    /// Start accepting on `listener`, attaching `handler` to every channel.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        url: Url,
        listener: Box<dyn TransportListener>,
        handler: Arc<dyn ExchangeHandler>,
        config: ExchangeConfig,
    ) -> Self {
        let listener: Arc<dyn TransportListener> = Arc::from(listener);
        let inner = Arc::new(ServerInner {
            url,
            local_address: listener.local_address(),
            listener,
            channels: Mutex::new(BTreeMap::new()),
            shutdown: CancellationToken::new(),
        });

        tracing::debug!(address = %inner.local_address, "exchange server started");
        tokio::spawn(accept_loop(Arc::clone(&inner), handler, config));
        Self { inner }
    }

    /// Url the server was bound with.
    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    /// Address the listener is bound to.
    pub fn local_address(&self) -> &str {
        &self.inner.local_address
    }

    /// Currently open channels, in creation order.
    pub fn channels(&self) -> Vec<ExchangeChannel> {
        let mut channels = self.inner.channels.lock();
        channels.retain(|_, channel| !channel.is_closed());
        channels.values().cloned().collect()
    }

    /// Whether the server has stopped accepting.
    pub fn is_closed(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Stop accepting and close every channel immediately.
    pub fn close(&self) {
        self.inner.stop_accepting();
        for channel in self.inner.take_channels() {
            channel.close();
        }
        tracing::debug!(address = %self.inner.local_address, "exchange server closed");
    }

    /// Stop accepting, then close every channel gracefully within a shared
    /// `timeout`.
    pub async fn close_gracefully(&self, timeout: Duration) {
        self.inner.stop_accepting();
        let deadline = Instant::now() + timeout;
        for channel in self.inner.take_channels() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            channel.close_gracefully(remaining).await;
        }
        tracing::debug!(address = %self.inner.local_address, "exchange server closed gracefully");
    }
}

impl Drop for ExchangeServer {
    fn drop(&mut self) {
        self.inner.stop_accepting();
    }
}

impl std::fmt::Debug for ExchangeServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeServer")
            .field("local_address", &self.inner.local_address)
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn accept_loop(
    inner: Arc<ServerInner>,
    handler: Arc<dyn ExchangeHandler>,
    config: ExchangeConfig,
) {
    loop {
        let connection = tokio::select! {
            biased;
            _ = inner.shutdown.cancelled() => break,
            connection = inner.listener.accept() => match connection {
                Some(connection) => connection,
                None => break,
            },
        };

        let channel = ExchangeChannel::open(
            inner.url.clone(),
            connection,
            Arc::clone(&handler),
            config.clone(),
        );
        tracing::debug!(
            address = %inner.local_address,
            channel = %channel.id(),
            remote = channel.remote_address(),
            "accepted connection"
        );

        let mut channels = inner.channels.lock();
        // close() cancels before taking the map, so this check cannot miss it.
        if inner.shutdown.is_cancelled() {
            drop(channels);
            tracing::debug!(channel = %channel.id(), "server closed during accept");
            channel.close();
            break;
        }
        channels.retain(|_, channel| !channel.is_closed());
        channels.insert(channel.id(), channel);
    }
    tracing::debug!(address = %inner.local_address, "accept loop stopped");
}
