//! Transport collaborator abstraction.
//!
//! The exchange layer never touches sockets or frames. A [`Transporter`]
//! hands it connected [`TransportConnection`]s: an outbound [`Transport`]
//! handle plus an inbound stream of decoded [`Message`]s. Ending the inbound
//! stream is how a transport reports that the connection went away.
//!
//! ```text
//!              Transporter
//!            bind │   │ connect
//!                 ▼   ▼
//!   TransportListener   TransportConnection { transport, inbound, remote_address }
//!        accept ──────────────▲
//! ```

mod memory;

pub use memory::{MemoryNetwork, MemoryTransporter};

use std::sync::Arc;

use async_trait::async_trait;
use switchyard_core::{Capability, Url};
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::message::Message;

/// Outbound half of a connection.
pub trait Transport: Send + Sync {
    /// Hand a message to the transport without suspending.
    fn send(&self, message: Message) -> Result<(), TransportError>;

    /// Close the transport. The peer's inbound stream ends once drained.
    fn close(&self);

    /// Whether the transport no longer accepts messages.
    fn is_closed(&self) -> bool;
}

/// A connected transport and the stream of messages arriving on it.
pub struct TransportConnection {
    /// Outbound handle.
    pub transport: Arc<dyn Transport>,
    /// Inbound messages. Ends when the peer closes.
    pub inbound: mpsc::Receiver<Message>,
    /// Address of the peer, for diagnostics.
    pub remote_address: String,
}

impl std::fmt::Debug for TransportConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportConnection")
            .field("remote_address", &self.remote_address)
            .field("closed", &self.transport.is_closed())
            .finish_non_exhaustive()
    }
}

/// A bound listening endpoint.
#[async_trait]
pub trait TransportListener: Send + Sync {
    /// Wait for the next inbound connection. `None` once the listener is closed.
    async fn accept(&self) -> Option<TransportConnection>;

    /// The address this listener is bound to.
    fn local_address(&self) -> String;

    /// Stop accepting connections and release the address.
    fn close(&self);
}

/// Factory for listeners and outbound connections.
#[async_trait]
pub trait Transporter: Send + Sync {
    /// Bind a listener at the url's address.
    async fn bind(&self, url: &Url) -> Result<Box<dyn TransportListener>, TransportError>;

    /// Connect to the listener at the url's address.
    async fn connect(&self, url: &Url) -> Result<TransportConnection, TransportError>;
}

impl Capability for dyn Transporter {
    const NAME: &'static str = "transporter";
    const DEFAULT_EXTENSION: Option<&'static str> = Some(MemoryTransporter::NAME);
}
