//! # switchyard-exchange
//!
//! Request/response exchange over a message transport.
//!
//! This crate provides:
//!
//! - **[`Correlator`]**: per-channel id allocation, pending-request table,
//!   timeouts and close handling
//! - **[`ExchangeChannel`]**: a connection endpoint that sends requests through
//!   its correlator and dispatches inbound requests to an [`ExchangeHandler`]
//! - **[`Exchanger`]**: the capability that binds [`ExchangeServer`]s and
//!   connects [`ExchangeClient`]s, with [`StandardExchanger`] as the default
//!   and [`AdaptiveExchanger`] choosing per url
//! - **[`transport`]**: the collaborator traits the exchange layer runs on,
//!   plus an in-process [`MemoryTransporter`]
//!
//! Payloads are opaque [`bytes::Bytes`]. Timeouts and channel closure are
//! reported as [`Status`] values on the [`Response`], never as errors.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

mod adaptive;
mod builtin;
mod channel;
mod client;
mod config;
mod correlator;
mod error;
mod exchanger;
mod handler;
mod message;
mod server;
pub mod transport;

// Channel exports
pub use channel::{ChannelId, ExchangeChannel, TransportOwnership};
pub use client::ExchangeClient;
pub use handler::ExchangeHandler;
pub use server::ExchangeServer;

// Configuration exports
pub use config::{CLOSE_TIMEOUT_KEY, ExchangeConfig, INBOUND_CAPACITY_KEY, TIMEOUT_KEY};

// Correlation exports
pub use correlator::{Correlator, CorrelatorState, ResponseFuture};

// Error exports
pub use error::{ExchangeError, HandlerError, TransportError};

// Exchanger exports
pub use adaptive::AdaptiveExchanger;
pub use builtin::BuiltinExtensions;
pub use exchanger::{EXCHANGER_KEY, Exchanger, StandardExchanger};

// Message exports
pub use message::{Message, ONE_WAY_ID, Request, Response, Status};

// Transport exports
pub use transport::{
    MemoryNetwork, MemoryTransporter, Transport, TransportConnection, TransportListener,
    Transporter,
};
