//! Request and response messages exchanged over a channel.
//!
//! Payloads are opaque [`Bytes`]; encoding them is the application's
//! business. Ids are allocated per channel by the [`crate::Correlator`],
//! starting at 1. One-way requests carry id 0 and are never tracked.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Id carried by one-way requests. Never allocated to a tracked request.
pub const ONE_WAY_ID: u64 = 0;

/// Outcome carried by a [`Response`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// The handler produced a reply.
    Ok,
    /// The handler failed; the payload holds an error description.
    Error,
    /// No response arrived before the request's timeout.
    Timeout,
    /// The channel closed while the request was pending.
    ChannelClosed,
}

/// A request sent over a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Correlation id, unique within the channel.
    pub id: u64,
    /// Whether the sender expects no response.
    pub one_way: bool,
    /// Opaque payload.
    pub payload: Bytes,
}

impl Request {
    /// A two-way request with the given id.
    pub fn two_way(id: u64, payload: Bytes) -> Self {
        Self {
            id,
            one_way: false,
            payload,
        }
    }

    /// A one-way request.
    pub fn one_way(payload: Bytes) -> Self {
        Self {
            id: ONE_WAY_ID,
            one_way: true,
            payload,
        }
    }
}

/// A response answering the request with the same id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Id of the request this answers.
    pub id: u64,
    /// Outcome.
    pub status: Status,
    /// Opaque payload (reply or error description).
    pub payload: Bytes,
}

impl Response {
    /// Successful reply.
    pub fn ok(id: u64, payload: Bytes) -> Self {
        Self {
            id,
            status: Status::Ok,
            payload,
        }
    }

    /// Failed reply carrying an error description.
    pub fn error(id: u64, payload: Bytes) -> Self {
        Self {
            id,
            status: Status::Error,
            payload,
        }
    }

    /// Local timeout marker.
    pub fn timeout(id: u64) -> Self {
        Self {
            id,
            status: Status::Timeout,
            payload: Bytes::new(),
        }
    }

    /// Local channel-closed marker.
    pub fn channel_closed(id: u64) -> Self {
        Self {
            id,
            status: Status::ChannelClosed,
            payload: Bytes::new(),
        }
    }

    /// Whether the status is [`Status::Ok`].
    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }
}

/// Anything a transport can deliver to a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// An inbound request for the local handler.
    Request(Request),
    /// A response to one of our requests.
    Response(Response),
}

impl From<Request> for Message {
    fn from(request: Request) -> Self {
        Message::Request(request)
    }
}

impl From<Response> for Message {
    fn from(response: Response) -> Self {
        Message::Response(response)
    }
}
