//! In-process transport.
//!
//! Listeners live in a [`MemoryNetwork`] keyed by `host:port`. Each
//! connection is a pair of bounded mpsc queues, one per direction. Closing
//! one side drops its sender so the other side's inbound stream ends.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use switchyard_core::Url;
use tokio::sync::mpsc;

use super::{Transport, TransportConnection, TransportListener, Transporter};
use crate::config::ExchangeConfig;
use crate::error::TransportError;
use crate::message::Message;

/// Pending connections a listener buffers before `accept` picks them up.
const ACCEPT_BACKLOG: usize = 128;

/// Registry of in-process listeners.
#[derive(Default)]
pub struct MemoryNetwork {
    listeners: Mutex<HashMap<String, ListenerSlot>>,
    next_listener: AtomicU64,
    next_ephemeral_port: AtomicU64,
}

struct ListenerSlot {
    listener_id: u64,
    backlog: mpsc::Sender<TransportConnection>,
}

impl MemoryNetwork {
    /// Create an empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Addresses with a live listener, sorted.
    pub fn bound_addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self.listeners.lock().keys().cloned().collect();
        addresses.sort();
        addresses
    }

    fn release(&self, address: &str, listener_id: u64) {
        let mut listeners = self.listeners.lock();
        if listeners
            .get(address)
            .is_some_and(|slot| slot.listener_id == listener_id)
        {
            listeners.remove(address);
        }
    }

    fn ephemeral_address(&self) -> String {
        let port = 40000 + self.next_ephemeral_port.fetch_add(1, Ordering::Relaxed) % 20000;
        format!("memory-client:{port}")
    }
}

/// [`Transporter`] over a shared [`MemoryNetwork`].
#[derive(Clone)]
pub struct MemoryTransporter {
    network: Arc<MemoryNetwork>,
}

impl MemoryTransporter {
    /// Extension name under which the memory transporter is registered.
    pub const NAME: &'static str = "memory";

    /// Create a transporter on the given network.
    pub fn new(network: Arc<MemoryNetwork>) -> Self {
        Self { network }
    }

    /// The underlying network.
    pub fn network(&self) -> &Arc<MemoryNetwork> {
        &self.network
    }
}

fn address_of(url: &Url) -> Result<String, TransportError> {
    url.address().ok_or_else(|| TransportError::InvalidAddress {
        url: url.to_string(),
    })
}

#[async_trait]
impl Transporter for MemoryTransporter {
    async fn bind(&self, url: &Url) -> Result<Box<dyn TransportListener>, TransportError> {
        let address = address_of(url)?;
        let (backlog, incoming) = mpsc::channel(ACCEPT_BACKLOG);
        let listener_id = self.network.next_listener.fetch_add(1, Ordering::Relaxed);

        {
            let mut listeners = self.network.listeners.lock();
            if listeners
                .get(&address)
                .is_some_and(|slot| !slot.backlog.is_closed())
            {
                return Err(TransportError::AddressInUse { address });
            }
            listeners.insert(
                address.clone(),
                ListenerSlot {
                    listener_id,
                    backlog,
                },
            );
        }

        tracing::debug!(address = %address, "memory listener bound");
        Ok(Box::new(MemoryListener {
            address,
            listener_id,
            network: Arc::clone(&self.network),
            incoming: tokio::sync::Mutex::new(incoming),
        }))
    }

    async fn connect(&self, url: &Url) -> Result<TransportConnection, TransportError> {
        let address = address_of(url)?;
        let backlog = self
            .network
            .listeners
            .lock()
            .get(&address)
            .map(|slot| slot.backlog.clone())
            .ok_or_else(|| TransportError::ConnectionRefused {
                address: address.clone(),
            })?;

        let capacity = ExchangeConfig::from_url(url).inbound_capacity;
        let (to_server, server_inbound) = mpsc::channel(capacity);
        let (to_client, client_inbound) = mpsc::channel(capacity);
        let client_address = self.network.ephemeral_address();

        let server_side = TransportConnection {
            transport: Arc::new(MemoryTransport::new(to_client, capacity)),
            inbound: server_inbound,
            remote_address: client_address,
        };
        if backlog.send(server_side).await.is_err() {
            return Err(TransportError::ConnectionRefused { address });
        }

        tracing::debug!(address = %address, "memory connection established");
        Ok(TransportConnection {
            transport: Arc::new(MemoryTransport::new(to_server, capacity)),
            inbound: client_inbound,
            remote_address: address,
        })
    }
}

struct MemoryListener {
    address: String,
    listener_id: u64,
    network: Arc<MemoryNetwork>,
    incoming: tokio::sync::Mutex<mpsc::Receiver<TransportConnection>>,
}

#[async_trait]
impl TransportListener for MemoryListener {
    async fn accept(&self) -> Option<TransportConnection> {
        self.incoming.lock().await.recv().await
    }

    fn local_address(&self) -> String {
        self.address.clone()
    }

    fn close(&self) {
        self.network.release(&self.address, self.listener_id);
        tracing::debug!(address = %self.address, "memory listener closed");
    }
}

impl Drop for MemoryListener {
    fn drop(&mut self) {
        self.network.release(&self.address, self.listener_id);
    }
}

/// Outbound half of a memory connection.
///
/// Sends never wait: a full peer queue is [`TransportError::QueueFull`].
/// For responses that means the reply is lost and the requester times out.
struct MemoryTransport {
    outbound: Mutex<Option<mpsc::Sender<Message>>>,
    capacity: usize,
}

impl MemoryTransport {
    fn new(outbound: mpsc::Sender<Message>, capacity: usize) -> Self {
        Self {
            outbound: Mutex::new(Some(outbound)),
            capacity,
        }
    }
}

impl Transport for MemoryTransport {
    fn send(&self, message: Message) -> Result<(), TransportError> {
        let outbound = self.outbound.lock();
        let sender = outbound.as_ref().ok_or(TransportError::Closed)?;
        sender.try_send(message).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => TransportError::QueueFull {
                capacity: self.capacity,
            },
            mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
        })
    }

    fn close(&self) {
        self.outbound.lock().take();
    }

    fn is_closed(&self) -> bool {
        self.outbound
            .lock()
            .as_ref()
            .is_none_or(|sender| sender.is_closed())
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::message::Request;

    fn url(port: u16) -> Url {
        Url::new("memory", "node", port)
    }

    #[tokio::test]
    async fn test_connect_and_exchange() {
        let transporter = MemoryTransporter::new(Arc::new(MemoryNetwork::new()));
        let listener = transporter.bind(&url(1)).await.expect("bind");
        assert_eq!(listener.local_address(), "node:1");

        let mut client = transporter.connect(&url(1)).await.expect("connect");
        let mut server = listener.accept().await.expect("accept");
        assert_eq!(client.remote_address, "node:1");

        client
            .transport
            .send(Request::two_way(1, Bytes::from_static(b"ping")).into())
            .expect("send");
        let received = server.inbound.recv().await.expect("message");
        assert_eq!(
            received,
            Message::Request(Request::two_way(1, Bytes::from_static(b"ping")))
        );

        server
            .transport
            .send(Request::one_way(Bytes::from_static(b"pong")).into())
            .expect("send back");
        assert!(client.inbound.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_bind_address_in_use() {
        let transporter = MemoryTransporter::new(Arc::new(MemoryNetwork::new()));
        let _listener = transporter.bind(&url(2)).await.expect("bind");
        let err = transporter.bind(&url(2)).await.err().expect("should fail");
        assert_eq!(
            err,
            TransportError::AddressInUse {
                address: "node:2".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_close_releases_address() {
        let network = Arc::new(MemoryNetwork::new());
        let transporter = MemoryTransporter::new(Arc::clone(&network));
        let listener = transporter.bind(&url(3)).await.expect("bind");
        assert_eq!(network.bound_addresses(), vec!["node:3".to_string()]);

        listener.close();
        assert!(network.bound_addresses().is_empty());
        assert!(listener.accept().await.is_none());
        transporter.bind(&url(3)).await.expect("rebind");
    }

    #[tokio::test]
    async fn test_connect_refused_without_listener() {
        let transporter = MemoryTransporter::new(Arc::new(MemoryNetwork::new()));
        let err = transporter.connect(&url(4)).await.err().expect("should fail");
        assert!(matches!(err, TransportError::ConnectionRefused { .. }));
    }

    #[tokio::test]
    async fn test_invalid_address() {
        let transporter = MemoryTransporter::new(Arc::new(MemoryNetwork::new()));
        let hostless = Url::parse("memory:///only/a/path").expect("parse");
        let err = transporter.bind(&hostless).await.err().expect("should fail");
        assert!(matches!(err, TransportError::InvalidAddress { .. }));
    }

    #[tokio::test]
    async fn test_close_ends_peer_inbound() {
        let transporter = MemoryTransporter::new(Arc::new(MemoryNetwork::new()));
        let listener = transporter.bind(&url(5)).await.expect("bind");
        let client = transporter.connect(&url(5)).await.expect("connect");
        let mut server = listener.accept().await.expect("accept");

        client.transport.close();
        assert!(client.transport.is_closed());
        assert!(server.inbound.recv().await.is_none());
        assert_eq!(
            client
                .transport
                .send(Request::one_way(Bytes::new()).into())
                .err(),
            Some(TransportError::Closed)
        );
    }

    #[tokio::test]
    async fn test_queue_full() {
        let transporter = MemoryTransporter::new(Arc::new(MemoryNetwork::new()));
        let bounded = url(6).with_parameter("inbound.capacity", "1");
        let listener = transporter.bind(&bounded).await.expect("bind");
        let client = transporter.connect(&bounded).await.expect("connect");
        let _server = listener.accept().await.expect("accept");

        client
            .transport
            .send(Request::one_way(Bytes::new()).into())
            .expect("first fits");
        let err = client
            .transport
            .send(Request::one_way(Bytes::new()).into())
            .err();
        assert_eq!(err, Some(TransportError::QueueFull { capacity: 1 }));
    }
}
