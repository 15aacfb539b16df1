//! Request/response correlation for a single channel.
//!
//! Every two-way request gets a fresh id and a pending entry holding the
//! caller's completion handle and a timer task. The pending entry is removed
//! exactly once, by whichever comes first:
//!
//! ```text
//!   request() ──► pending[id] ──┬── on_response_received(id) ──► Ok / Error
//!                               ├── timer fires              ──► Timeout
//!                               ├── on_channel_closed()      ──► ChannelClosed
//!                               └── ResponseFuture dropped   ──► (nobody listening)
//! ```
//!
//! State transitions are `Open → Closing → Closed`. `Closing` rejects new
//! requests but still completes in-flight ones; `Closed` fails all of them.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{Notify, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::ExchangeError;
use crate::message::{Message, Request, Response};
use crate::transport::Transport;

/// Lifecycle state of a [`Correlator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrelatorState {
    /// Accepting new requests.
    Open,
    /// Rejecting new requests, completing in-flight ones.
    Closing,
    /// All pending requests have been failed.
    Closed,
}

struct PendingRequest {
    created_at: Instant,
    completion: oneshot::Sender<Response>,
    timer: Option<JoinHandle<()>>,
}

impl PendingRequest {
    fn complete(mut self, response: Response) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        let id = response.id;
        if self.completion.send(response).is_err() {
            tracing::debug!(id, "response future dropped before completion");
        }
    }
}

struct CorrelatorInner {
    state: CorrelatorState,
    next_id: u64,
    pending: BTreeMap<u64, PendingRequest>,
}

struct Shared {
    inner: Mutex<CorrelatorInner>,
    transport: Arc<dyn Transport>,
    drained: Notify,
}

impl Shared {
    /// Remove a pending entry, waking drain waiters if it was the last one.
    /// A closing correlator becomes closed once it has drained.
    fn take(&self, id: u64) -> Option<PendingRequest> {
        let mut inner = self.inner.lock();
        let pending = inner.pending.remove(&id);
        if pending.is_some() && inner.pending.is_empty() {
            if inner.state == CorrelatorState::Closing {
                inner.state = CorrelatorState::Closed;
                tracing::debug!("correlator drained and closed");
            }
            self.drained.notify_waiters();
        }
        pending
    }

    fn expire(&self, id: u64) {
        if let Some(mut pending) = self.take(id) {
            // Called from the timer task itself.
            pending.timer.take();
            tracing::debug!(
                id,
                elapsed_ms = pending.created_at.elapsed().as_millis() as u64,
                "request timed out"
            );
            pending.complete(Response::timeout(id));
        }
    }

    fn cancel(&self, id: u64) {
        if let Some(pending) = self.take(id) {
            tracing::debug!(id, "request cancelled");
            if let Some(timer) = pending.timer {
                timer.abort();
            }
        }
    }
}

/// Matches responses to the requests that caused them.
///
/// One correlator per channel. All state sits behind a single lock so that
/// id allocation, pending insertion and timer arming happen atomically.
/// Must be used from within a tokio runtime, since every two-way request
/// spawns its timeout timer.
#[derive(Clone)]
pub struct Correlator {
    shared: Arc<Shared>,
}

impl Correlator {
    /// Create an open correlator sending through `transport`.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(CorrelatorInner {
                    state: CorrelatorState::Open,
                    next_id: 1,
                    pending: BTreeMap::new(),
                }),
                transport,
                drained: Notify::new(),
            }),
        }
    }

    /// Send a two-way request and return a future for its response.
    ///
    /// The future resolves to the matching response, or to a
    /// [`crate::Status::Timeout`] / [`crate::Status::ChannelClosed`] marker.
    ///
    /// # Errors
    ///
    /// [`ExchangeError::ChannelClosed`] if the correlator is not open,
    /// [`ExchangeError::Transport`] if the transport refused the request.
    pub fn request(&self, payload: Bytes, timeout: Duration) -> Result<ResponseFuture, ExchangeError> {
        let (completion, receiver) = oneshot::channel();
        let id = {
            let mut inner = self.shared.inner.lock();
            if inner.state != CorrelatorState::Open {
                return Err(ExchangeError::ChannelClosed);
            }
            let id = inner.next_id;
            inner.next_id += 1;
            let timer = self.arm_timer(id, timeout);
            inner.pending.insert(
                id,
                PendingRequest {
                    created_at: Instant::now(),
                    completion,
                    timer: Some(timer),
                },
            );
            id
        };

        let future = ResponseFuture {
            id,
            receiver,
            correlator: Arc::downgrade(&self.shared),
            completed: false,
        };

        if let Err(err) = self
            .shared
            .transport
            .send(Message::Request(Request::two_way(id, payload)))
        {
            tracing::warn!(id, error = %err, "transport refused request");
            self.shared.cancel(id);
            return Err(err.into());
        }

        tracing::trace!(id, timeout_ms = timeout.as_millis() as u64, "request sent");
        Ok(future)
    }

    fn arm_timer(&self, id: u64, timeout: Duration) -> JoinHandle<()> {
        let shared = Arc::downgrade(&self.shared);
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(shared) = shared.upgrade() {
                shared.expire(id);
            }
        })
    }

    /// Send a one-way request. Nothing is tracked and no id is consumed.
    ///
    /// # Errors
    ///
    /// [`ExchangeError::ChannelClosed`] if the correlator is not open,
    /// [`ExchangeError::Transport`] if the transport refused the message.
    pub fn send(&self, payload: Bytes) -> Result<(), ExchangeError> {
        if self.state() != CorrelatorState::Open {
            return Err(ExchangeError::ChannelClosed);
        }
        self.shared
            .transport
            .send(Message::Request(Request::one_way(payload)))?;
        Ok(())
    }

    /// Complete the pending request matching `response.id`.
    ///
    /// Returns `false` when no request with that id is pending (late,
    /// duplicate or unknown); the response is then discarded.
    pub fn on_response_received(&self, response: Response) -> bool {
        match self.shared.take(response.id) {
            Some(pending) => {
                pending.complete(response);
                true
            }
            None => {
                tracing::warn!(
                    id = response.id,
                    status = ?response.status,
                    "discarding response with no pending request"
                );
                false
            }
        }
    }

    /// Stop accepting new requests. In-flight requests still complete, and
    /// the correlator moves to `Closed` once none is left.
    pub fn begin_close(&self) {
        let mut inner = self.shared.inner.lock();
        if inner.state == CorrelatorState::Open {
            inner.state = if inner.pending.is_empty() {
                CorrelatorState::Closed
            } else {
                CorrelatorState::Closing
            };
            tracing::debug!(
                pending = inner.pending.len(),
                state = ?inner.state,
                "correlator closing"
            );
        }
    }

    /// Fail every pending request with `ChannelClosed`, in ascending id order.
    ///
    /// Returns the ids that were failed. Calling this again returns nothing.
    pub fn on_channel_closed(&self) -> Vec<u64> {
        let pending = {
            let mut inner = self.shared.inner.lock();
            inner.state = CorrelatorState::Closed;
            std::mem::take(&mut inner.pending)
        };
        self.shared.drained.notify_waiters();

        if !pending.is_empty() {
            tracing::debug!(count = pending.len(), "failing pending requests on close");
        }
        pending
            .into_iter()
            .map(|(id, request)| {
                request.complete(Response::channel_closed(id));
                id
            })
            .collect()
    }

    /// Wait until no request is pending, or `timeout` elapses.
    ///
    /// Returns whether the correlator drained in time.
    pub async fn wait_drained(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let drained = self.shared.drained.notified();
            if self.pending_count() == 0 {
                return true;
            }
            if tokio::time::timeout_at(deadline, drained).await.is_err() {
                return self.pending_count() == 0;
            }
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CorrelatorState {
        self.shared.inner.lock().state
    }

    /// Number of requests awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.shared.inner.lock().pending.len()
    }

    /// Whether a request with this id is pending.
    pub fn is_pending(&self, id: u64) -> bool {
        self.shared.inner.lock().pending.contains_key(&id)
    }
}

/// Future resolving to the response of one request.
///
/// Dropping it before completion cancels the request: the pending entry is
/// removed and its timer aborted, so a late response is discarded.
pub struct ResponseFuture {
    id: u64,
    receiver: oneshot::Receiver<Response>,
    correlator: Weak<Shared>,
    completed: bool,
}

impl ResponseFuture {
    /// Id of the underlying request.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Cancel the request explicitly.
    pub fn cancel(self) {
        drop(self);
    }
}

impl Future for ResponseFuture {
    type Output = Response;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(result) => {
                self.completed = true;
                // Sender gone without completing means the correlator was dropped.
                let id = self.id;
                Poll::Ready(result.unwrap_or_else(|_| Response::channel_closed(id)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for ResponseFuture {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        if let Some(shared) = self.correlator.upgrade() {
            shared.cancel(self.id);
        }
    }
}

impl std::fmt::Debug for ResponseFuture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseFuture")
            .field("id", &self.id)
            .field("completed", &self.completed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::error::TransportError;
    use crate::message::Status;

    #[derive(Default)]
    struct RecordingTransport {
        sent: parking_lot::Mutex<Vec<Message>>,
        refuse: AtomicBool,
    }

    impl RecordingTransport {
        fn requests(&self) -> Vec<Request> {
            self.sent
                .lock()
                .iter()
                .filter_map(|message| match message {
                    Message::Request(request) => Some(request.clone()),
                    Message::Response(_) => None,
                })
                .collect()
        }
    }

    impl Transport for RecordingTransport {
        fn send(&self, message: Message) -> Result<(), TransportError> {
            if self.refuse.load(Ordering::SeqCst) {
                return Err(TransportError::Closed);
            }
            self.sent.lock().push(message);
            Ok(())
        }

        fn close(&self) {}

        fn is_closed(&self) -> bool {
            false
        }
    }

    fn correlator() -> (Correlator, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::default());
        (Correlator::new(transport.clone()), transport)
    }

    const LONG: Duration = Duration::from_secs(30);

    #[tokio::test]
    async fn test_round_trip() {
        let (correlator, transport) = correlator();
        let future = correlator
            .request(Bytes::from_static(b"P"), LONG)
            .expect("request");
        assert_eq!(future.id(), 1);
        assert_eq!(
            transport.requests(),
            vec![Request::two_way(1, Bytes::from_static(b"P"))]
        );

        assert!(correlator.on_response_received(Response::ok(1, Bytes::from_static(b"Q"))));
        let response = future.await;
        assert_eq!(response.status, Status::Ok);
        assert_eq!(response.payload, Bytes::from_static(b"Q"));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_out_of_order() {
        let (correlator, transport) = correlator();
        let mut callers = Vec::new();
        for i in 0..1000u32 {
            let correlator = correlator.clone();
            callers.push(tokio::spawn(async move {
                let payload = Bytes::from(i.to_be_bytes().to_vec());
                let future = correlator.request(payload.clone(), LONG).expect("request");
                let response = future.await;
                assert_eq!(response.status, Status::Ok);
                assert_eq!(response.payload, payload);
            }));
        }

        while transport.requests().len() < 1000 {
            tokio::task::yield_now().await;
        }

        let mut requests = transport.requests();
        let ids: HashSet<u64> = requests.iter().map(|request| request.id).collect();
        assert_eq!(ids.len(), 1000);
        assert!(!ids.contains(&0));

        requests.sort_by_key(|request| std::cmp::Reverse(request.id));
        for request in requests {
            assert!(correlator.on_response_received(Response::ok(request.id, request.payload)));
        }

        for caller in futures::future::join_all(callers).await {
            caller.expect("caller task");
        }
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let (correlator, _transport) = correlator();
        let started = Instant::now();
        let future = correlator
            .request(Bytes::new(), Duration::from_millis(50))
            .expect("request");

        let response = future.await;
        assert_eq!(response.status, Status::Timeout);
        assert_eq!(response.id, 1);
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert!(started.elapsed() < Duration::from_millis(100));
        assert_eq!(correlator.pending_count(), 0);

        assert!(!correlator.on_response_received(Response::ok(1, Bytes::new())));
    }

    #[tokio::test]
    async fn test_close_fails_pending_in_order() {
        let (correlator, _transport) = correlator();
        let futures: Vec<ResponseFuture> = (0..5)
            .map(|_| correlator.request(Bytes::new(), LONG).expect("request"))
            .collect();

        assert_eq!(correlator.on_channel_closed(), vec![1, 2, 3, 4, 5]);
        assert_eq!(correlator.state(), CorrelatorState::Closed);
        assert!(correlator.on_channel_closed().is_empty());

        for (future, expected) in futures.into_iter().zip(1u64..) {
            let response = future.await;
            assert_eq!(response.id, expected);
            assert_eq!(response.status, Status::ChannelClosed);
        }

        assert!(matches!(
            correlator.request(Bytes::new(), LONG),
            Err(ExchangeError::ChannelClosed)
        ));
        assert!(matches!(
            correlator.send(Bytes::new()),
            Err(ExchangeError::ChannelClosed)
        ));
    }

    #[tokio::test]
    async fn test_one_way_is_untracked() {
        let (correlator, transport) = correlator();
        correlator.send(Bytes::from_static(b"fire")).expect("send");
        correlator.send(Bytes::from_static(b"forget")).expect("send");
        assert_eq!(correlator.pending_count(), 0);

        let sent = transport.requests();
        assert!(sent.iter().all(|request| request.one_way && request.id == 0));

        let future = correlator.request(Bytes::new(), LONG).expect("request");
        assert_eq!(future.id(), 1);
    }

    #[tokio::test]
    async fn test_late_and_duplicate_responses_discarded() {
        let (correlator, _transport) = correlator();
        let first = correlator.request(Bytes::new(), LONG).expect("request");
        let second = correlator.request(Bytes::new(), LONG).expect("request");

        assert!(correlator.on_response_received(Response::ok(1, Bytes::from_static(b"one"))));
        assert!(!correlator.on_response_received(Response::ok(1, Bytes::from_static(b"again"))));
        assert!(!correlator.on_response_received(Response::ok(99, Bytes::new())));
        assert!(correlator.is_pending(2));

        assert_eq!(first.await.payload, Bytes::from_static(b"one"));
        assert!(correlator.on_response_received(Response::ok(2, Bytes::from_static(b"two"))));
        assert_eq!(second.await.payload, Bytes::from_static(b"two"));
    }

    #[tokio::test]
    async fn test_dropping_future_cancels() {
        let (correlator, _transport) = correlator();
        let future = correlator.request(Bytes::new(), LONG).expect("request");
        assert!(correlator.is_pending(1));

        drop(future);
        assert_eq!(correlator.pending_count(), 0);
        assert!(!correlator.on_response_received(Response::ok(1, Bytes::new())));

        let future = correlator.request(Bytes::new(), LONG).expect("request");
        future.cancel();
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_transport_refusal_removes_pending() {
        let (correlator, transport) = correlator();
        transport.refuse.store(true, Ordering::SeqCst);

        let err = correlator.request(Bytes::new(), LONG).err().expect("should fail");
        assert!(matches!(err, ExchangeError::Transport(TransportError::Closed)));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_closing_completes_in_flight() {
        let (correlator, _transport) = correlator();
        let future = correlator.request(Bytes::new(), LONG).expect("request");

        correlator.begin_close();
        assert_eq!(correlator.state(), CorrelatorState::Closing);
        assert!(matches!(
            correlator.request(Bytes::new(), LONG),
            Err(ExchangeError::ChannelClosed)
        ));

        assert!(correlator.on_response_received(Response::ok(1, Bytes::from_static(b"done"))));
        assert_eq!(future.await.status, Status::Ok);
        assert_eq!(correlator.pending_count(), 0);
        assert_eq!(correlator.state(), CorrelatorState::Closed);
    }

    #[tokio::test]
    async fn test_closing_without_pending_closes_immediately() {
        let (correlator, _transport) = correlator();
        correlator.begin_close();
        assert_eq!(correlator.state(), CorrelatorState::Closed);
        assert!(correlator.on_channel_closed().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_closing_drains_through_timeout_and_cancel() {
        let (correlator, _transport) = correlator();
        let timed = correlator
            .request(Bytes::new(), Duration::from_millis(50))
            .expect("request");
        let dropped = correlator.request(Bytes::new(), LONG).expect("request");

        correlator.begin_close();
        drop(dropped);
        assert_eq!(correlator.state(), CorrelatorState::Closing);

        assert_eq!(timed.await.status, Status::Timeout);
        assert_eq!(correlator.state(), CorrelatorState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_drained() {
        let (correlator, _transport) = correlator();
        assert!(correlator.wait_drained(Duration::from_millis(10)).await);

        let _future = correlator.request(Bytes::new(), LONG).expect("request");
        assert!(!correlator.wait_drained(Duration::from_millis(10)).await);

        let responder = correlator.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            responder.on_response_received(Response::ok(1, Bytes::new()));
        });
        assert!(correlator.wait_drained(Duration::from_millis(100)).await);
    }
}
