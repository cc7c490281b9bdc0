//! Transport session and its I/O tasks.
//!
//! A session owns one duplex byte stream. It multiplexes concurrent requests
//! over it by correlation id, and on server-side sessions hands inbound
//! requests to a [`RequestHandler`].
//!
//! # Tasks
//!
//! Each session spawns two tokio tasks:
//!
//! - **Reader**: socket → deframer → assembler → decode chain → dispatch
//! - **Writer**: drains a bounded queue of framed packets, writing and
//!   flushing each frame in order
//!
//! ```text
//!             send/request
//!                  │
//!           encode chain → framer
//!                  │
//!           [write queue] ──► writer task ──► socket
//!                                               │
//!  pending table ◄── dispatch ◄── reader task ◄─┘
//!                       │
//!               RequestHandler / SessionEvent
//! ```
//!
//! # Teardown
//!
//! A fatal framing error, an I/O error, end of stream, [`TransportSession::destroy`]
//! or dropping the session tears it down once: pending requests fail with
//! [`Error::SessionClosed`], subscribers see [`SessionEvent::Closed`] and are
//! then unsubscribed, and both tasks stop. The socket is not closed; after
//! `destroy` it can be recovered with [`TransportSession::take_socket`].

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{Semaphore, broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::codec::{Assembled, Deframer, FrameAssembler, FrameConfig, Framer};
use crate::error::{Error, Result};
use crate::identifiers::{PacketId, SessionId};
use crate::interceptor::{DecodeChain, EncodeChain};
use crate::protocol::{Packet, WirePacket};

use super::allocator::PacketIdAllocator;
use super::options::SessionOptions;
use super::protocol::Protocol;

// ============================================================================
// Types
// ============================================================================

/// Pending requests and the ids they hold.
type PendingMap = FxHashMap<PacketId, PendingRequest>;

// ============================================================================
// RequestHandler
// ============================================================================

/// Serves inbound requests on a server-side session.
///
/// Returning `Ok(Some(response))` sends the response back on the same
/// session; a response without an id inherits the request's id. Returning
/// `Ok(None)` sends nothing. An `Err` is answered with an error response when
/// the request carries an id.
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    /// Handles one request.
    async fn handle(&self, request: Packet) -> Result<Option<Packet>>;
}

// ============================================================================
// SessionEvent / SessionState
// ============================================================================

/// Notification broadcast to subscribers.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A packet could not be decoded and no request was waiting for it.
    Error {
        /// Error description.
        message: String,
    },
    /// A packet arrived on a client-side session without a matching request.
    Unsolicited(Packet),
    /// The session was torn down. Always the last event.
    Closed {
        /// Why the session closed.
        reason: String,
    },
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Sending and receiving.
    Open,
    /// Teardown in progress.
    Closing,
    /// Torn down.
    Closed,
}

// ============================================================================
// Internal types
// ============================================================================

/// A request awaiting its response.
struct PendingRequest {
    /// Resolves the caller.
    tx: oneshot::Sender<Result<Packet>>,
    /// Reply topic the response must arrive on, when matched by topic.
    reply_to: Option<String>,
    /// Distinguishes this entry from a later one reusing the same id.
    token: u64,
}

/// Correlation state guarded by one lock.
struct PendingTable {
    entries: PendingMap,
    allocator: PacketIdAllocator,
}

impl PendingTable {
    /// Removes `id`, returning its id to the allocator.
    fn take(&mut self, id: &PacketId) -> Option<PendingRequest> {
        let entry = self.entries.remove(id)?;
        if let Some(num) = id.as_num() {
            self.allocator.free(num);
        }
        Some(entry)
    }
}

/// Frames of one packet queued for the writer.
struct WriteRequest {
    frames: Vec<Bytes>,
    done: oneshot::Sender<Result<()>>,
}

/// Join handles of the I/O tasks.
struct IoTasks<S> {
    reader: JoinHandle<ReadHalf<S>>,
    writer: JoinHandle<WriteHalf<S>>,
}

// ============================================================================
// Shared
// ============================================================================

/// State shared between the session handle and its tasks.
struct Shared {
    id: SessionId,
    protocol: Protocol,
    options: SessionOptions,
    framer: Framer,
    encode: Arc<EncodeChain>,
    decode: Arc<DecodeChain>,
    state: Mutex<SessionState>,
    pending: Mutex<PendingTable>,
    next_token: AtomicU64,
    events: Mutex<Option<broadcast::Sender<SessionEvent>>>,
    handler: Mutex<Option<Arc<dyn RequestHandler>>>,
    write_tx: mpsc::Sender<WriteRequest>,
    shutdown: watch::Sender<bool>,
}

impl Shared {
    fn ensure_open(&self) -> Result<()> {
        if *self.state.lock() == SessionState::Open {
            Ok(())
        } else {
            Err(Error::SessionClosed)
        }
    }

    /// Encodes, frames and writes one packet.
    async fn send(&self, packet: Packet) -> Result<()> {
        self.ensure_open()?;

        let wire = self.encode.handle(packet).await?;
        let frames = self.framer.encode(&wire)?;
        trace!(
            session_id = %self.id,
            id = ?wire.meta.id,
            frames = frames.len(),
            "Packet queued"
        );

        let (done, done_rx) = oneshot::channel();
        self.write_tx
            .send(WriteRequest { frames, done })
            .await
            .map_err(|_| Error::SessionClosed)?;
        done_rx.await.map_err(|_| Error::SessionClosed)?
    }

    /// Sends a request and waits for the reply routed to `rx`.
    async fn exchange(
        &self,
        packet: Packet,
        rx: oneshot::Receiver<Result<Packet>>,
    ) -> Result<Packet> {
        self.send(packet).await?;
        rx.await.map_err(|_| Error::SessionClosed)?
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(events) = self.events.lock().as_ref() {
            // No subscribers is fine.
            let _ = events.send(event);
        }
    }

    /// Tears the session down. Returns `false` if it already was.
    fn teardown(&self, reason: &str) -> bool {
        {
            let mut state = self.state.lock();
            if *state != SessionState::Open {
                return false;
            }
            *state = SessionState::Closing;
        }

        self.shutdown.send_replace(true);
        self.handler.lock().take();

        let pending: Vec<_> = {
            let mut table = self.pending.lock();
            table.allocator = PacketIdAllocator::new();
            table.entries.drain().collect()
        };
        let count = pending.len();
        for (_, entry) in pending {
            let _ = entry.tx.send(Err(Error::SessionClosed));
        }

        if let Some(events) = self.events.lock().take() {
            let _ = events.send(SessionEvent::Closed {
                reason: reason.to_string(),
            });
        }

        *self.state.lock() = SessionState::Closed;
        debug!(session_id = %self.id, reason, failed_pending = count, "Session torn down");
        true
    }

    /// Tears down after a fatal error, reporting it to subscribers first.
    fn fail(&self, error: &Error) {
        if *self.state.lock() != SessionState::Open {
            return;
        }
        warn!(session_id = %self.id, error = %error, "Session failed");
        self.emit(SessionEvent::Error {
            message: error.to_string(),
        });
        self.teardown(&error.to_string());
    }

    /// Delivers a response to the pending request it answers.
    ///
    /// Hands the packet back if no pending request matches.
    fn resolve(&self, packet: Packet) -> Option<Packet> {
        let Some(id) = packet.id.clone() else {
            return Some(packet);
        };
        let entry = {
            let mut table = self.pending.lock();
            let matches = table.entries.get(&id).is_some_and(|entry| {
                !self.protocol.matches_reply_topic()
                    || entry.reply_to.is_none()
                    || entry.reply_to == packet.topic
            });
            if !matches {
                return Some(packet);
            }
            table.take(&id)
        };

        if let Some(entry) = entry {
            trace!(session_id = %self.id, %id, "Response matched");
            if entry.tx.send(Ok(packet)).is_err() {
                debug!(session_id = %self.id, %id, "Requester went away before delivery");
            }
        }
        None
    }

    /// Fails the pending request `id` with `error`.
    ///
    /// Hands the error back if no request is pending under `id`.
    fn reject(&self, id: &PacketId, error: Error) -> Option<Error> {
        let entry = self.pending.lock().take(id);
        match entry {
            Some(entry) => {
                let _ = entry.tx.send(Err(error));
                None
            }
            None => Some(error),
        }
    }
}

// ============================================================================
// PendingGuard
// ============================================================================

/// Removes a request's table entry when the request ends for any reason.
struct PendingGuard<'a> {
    shared: &'a Shared,
    id: PacketId,
    token: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let mut table = self.shared.pending.lock();
        if table
            .entries
            .get(&self.id)
            .is_some_and(|entry| entry.token == self.token)
        {
            table.take(&self.id);
            trace!(session_id = %self.shared.id, id = %self.id, "Pending request removed");
        }
    }
}

// ============================================================================
// TransportSession
// ============================================================================

/// A packet session over one duplex stream.
///
/// Created by [`TransportSessionFactory`](super::TransportSessionFactory).
/// Dropping the session tears it down without closing the socket.
pub struct TransportSession<S> {
    shared: Arc<Shared>,
    tasks: tokio::sync::Mutex<Option<IoTasks<S>>>,
    socket: Mutex<Option<S>>,
}

impl<S> TransportSession<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    /// Starts a session over `socket`. Must be called within a tokio runtime.
    pub(crate) fn start(
        socket: S,
        protocol: Protocol,
        options: SessionOptions,
        encode: Arc<EncodeChain>,
        decode: Arc<DecodeChain>,
    ) -> Self {
        let id = SessionId::next();
        let config = options.frame_config(protocol.frame_profile());
        let (write_tx, write_rx) = mpsc::channel(options.write_queue);
        let (shutdown, _) = watch::channel(false);
        let (events, _) = broadcast::channel(options.event_capacity);

        let shared = Arc::new(Shared {
            id,
            protocol,
            framer: Framer::new(config),
            encode,
            decode,
            state: Mutex::new(SessionState::Open),
            pending: Mutex::new(PendingTable {
                entries: PendingMap::default(),
                allocator: PacketIdAllocator::new(),
            }),
            next_token: AtomicU64::new(1),
            events: Mutex::new(Some(events)),
            handler: Mutex::new(None),
            write_tx,
            shutdown,
            options,
        });

        let (read_half, write_half) = tokio::io::split(socket);
        let reader = tokio::spawn(run_reader(
            read_half,
            config,
            Arc::clone(&shared),
            shared.shutdown.subscribe(),
        ));
        let writer = tokio::spawn(run_writer(
            write_half,
            write_rx,
            Arc::clone(&shared),
            shared.shutdown.subscribe(),
        ));

        debug!(
            session_id = %id,
            protocol = %protocol,
            server_side = shared.options.server_side,
            "Session started"
        );

        Self {
            shared,
            tasks: tokio::sync::Mutex::new(Some(IoTasks { reader, writer })),
            socket: Mutex::new(None),
        }
    }

    /// Sends a packet without waiting for a reply.
    ///
    /// Completes once every frame of the packet has been written and flushed.
    ///
    /// # Errors
    ///
    /// - [`Error::SessionClosed`] if the session is not open
    /// - Any error raised by the encode chain or the framer
    /// - [`Error::Io`] if the write fails
    pub async fn send(&self, packet: Packet) -> Result<()> {
        self.shared.send(packet).await
    }

    /// Sends a request and waits for its response with the default timeout.
    ///
    /// # Errors
    ///
    /// See [`TransportSession::request_with_timeout`].
    pub async fn request(&self, packet: Packet) -> Result<Packet> {
        let request_timeout = self.shared.options.request_timeout;
        self.request_with_timeout(packet, request_timeout).await
    }

    /// Sends a request and waits for its response.
    ///
    /// A packet without an id gets one from the session's allocator. The id
    /// is released when the request completes, fails, times out, or the
    /// returned future is dropped.
    ///
    /// # Errors
    ///
    /// - [`Error::TooManyPending`] if the pending cap is reached
    /// - [`Error::AllocationExhausted`] if no id is free
    /// - [`Error::DuplicateId`] if the packet's id is already in flight
    /// - [`Error::RequestTimeout`] if the packet is not written and answered
    ///   in time
    /// - [`Error::Request`] if the response reports an error
    /// - [`Error::SessionClosed`] if the session closes first
    pub async fn request_with_timeout(
        &self,
        mut packet: Packet,
        request_timeout: Duration,
    ) -> Result<Packet> {
        let shared = &*self.shared;
        shared.ensure_open()?;

        let (tx, rx) = oneshot::channel();
        let token = shared.next_token.fetch_add(1, Ordering::Relaxed);
        let id = {
            let mut table = shared.pending.lock();
            let max = shared.options.max_pending_requests;
            if table.entries.len() >= max {
                warn!(
                    session_id = %shared.id,
                    pending = table.entries.len(),
                    max,
                    "Too many pending requests"
                );
                return Err(Error::too_many_pending(table.entries.len(), max));
            }

            let id = match packet.id.take() {
                None => PacketId::Num(table.allocator.alloc()?),
                Some(PacketId::Num(num)) => {
                    table.allocator.reserve(num)?;
                    PacketId::Num(num)
                }
                Some(id) => {
                    if table.entries.contains_key(&id) {
                        return Err(Error::duplicate_id(id));
                    }
                    id
                }
            };
            table.entries.insert(
                id.clone(),
                PendingRequest {
                    tx,
                    reply_to: packet.reply_to.clone(),
                    token,
                },
            );
            id
        };

        let _guard = PendingGuard {
            shared,
            id: id.clone(),
            token,
        };
        packet.id = Some(id.clone());

        // The deadline covers the write as well as the reply.
        match timeout(request_timeout, shared.exchange(packet, rx)).await {
            Ok(result) => result?.into_result(),
            Err(_) => {
                debug!(session_id = %shared.id, %id, "Request timed out");
                Err(Error::request_timeout(
                    id,
                    u64::try_from(request_timeout.as_millis()).unwrap_or(u64::MAX),
                ))
            }
        }
    }

    /// Subscribes to session events.
    ///
    /// After teardown the returned receiver is already closed.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        match self.shared.events.lock().as_ref() {
            Some(events) => events.subscribe(),
            None => broadcast::channel(1).1,
        }
    }

    /// Sets the handler for inbound requests on a server-side session.
    pub fn set_request_handler(&self, handler: Arc<dyn RequestHandler>) {
        *self.shared.handler.lock() = Some(handler);
    }

    /// Clears the request handler. Inbound requests are then dropped.
    pub fn clear_request_handler(&self) {
        self.shared.handler.lock().take();
    }

    /// Tears the session down and stops its tasks.
    ///
    /// Idempotent. Pending requests fail with [`Error::SessionClosed`]. The
    /// socket stays open and can be recovered with
    /// [`TransportSession::take_socket`].
    pub async fn destroy(&self) {
        if self.shared.teardown("session destroyed") {
            debug!(session_id = %self.shared.id, "Session destroyed");
        }

        let mut tasks = self.tasks.lock().await;
        let Some(IoTasks { reader, writer }) = tasks.take() else {
            return;
        };
        match (reader.await, writer.await) {
            (Ok(read_half), Ok(write_half)) => {
                *self.socket.lock() = Some(read_half.unsplit(write_half));
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!(session_id = %self.shared.id, error = %e, "I/O task failed, socket lost");
            }
        }
    }

    /// Destroys the session and shuts down the socket.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if shutting down the socket fails.
    pub async fn close(&self) -> Result<()> {
        self.destroy().await;
        let socket = self.socket.lock().take();
        if let Some(mut socket) = socket {
            socket.shutdown().await?;
            debug!(session_id = %self.shared.id, "Socket shut down");
        }
        Ok(())
    }

    /// Takes the socket back after [`TransportSession::destroy`].
    #[must_use]
    pub fn take_socket(&self) -> Option<S> {
        self.socket.lock().take()
    }
}

impl<S> TransportSession<S> {
    /// Returns the session id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.shared.id
    }

    /// Returns the hosted protocol.
    #[inline]
    #[must_use]
    pub fn protocol(&self) -> Protocol {
        self.shared.protocol
    }

    /// Returns the session options.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &SessionOptions {
        &self.shared.options
    }

    /// Returns the lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.shared.state.lock()
    }

    /// Returns `true` while the session is open.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }

    /// Returns `true` if the session serves inbound requests.
    #[inline]
    #[must_use]
    pub fn is_server_side(&self) -> bool {
        self.shared.options.server_side
    }

    /// Returns the number of requests awaiting a response.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.shared.pending.lock().entries.len()
    }
}

impl<S> Drop for TransportSession<S> {
    fn drop(&mut self) {
        self.shared.teardown("session dropped");
    }
}

impl<S> std::fmt::Debug for TransportSession<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportSession")
            .field("id", &self.shared.id)
            .field("protocol", &self.shared.protocol)
            .field("state", &self.state())
            .field("pending", &self.pending_count())
            .finish()
    }
}

// ============================================================================
// Writer task
// ============================================================================

async fn run_writer<S>(
    mut writer: WriteHalf<S>,
    mut write_rx: mpsc::Receiver<WriteRequest>,
    shared: Arc<Shared>,
    mut shutdown: watch::Receiver<bool>,
) -> WriteHalf<S>
where
    S: AsyncWrite + Send,
{
    loop {
        let request = tokio::select! {
            biased;
            () = stopped(&mut shutdown) => break,
            request = write_rx.recv() => match request {
                Some(request) => request,
                None => break,
            },
        };

        let result = tokio::select! {
            result = write_frames(&mut writer, &request.frames) => result,
            () = stopped(&mut shutdown) => Err(Error::SessionClosed),
        };

        match result {
            Ok(()) => {
                let _ = request.done.send(Ok(()));
            }
            Err(Error::SessionClosed) => {
                let _ = request.done.send(Err(Error::SessionClosed));
                break;
            }
            Err(e) => {
                shared.fail(&e);
                let _ = request.done.send(Err(e));
                break;
            }
        }
    }

    trace!(session_id = %shared.id, "Writer stopped");
    writer
}

/// Resolves once shutdown is signalled or the signal is gone.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    loop {
        let stop = *shutdown.borrow_and_update();
        if stop || shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Writes and flushes each frame in order.
async fn write_frames<W>(writer: &mut W, frames: &[Bytes]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    for frame in frames {
        writer.write_all(frame).await?;
        writer.flush().await?;
    }
    Ok(())
}

// ============================================================================
// Reader task
// ============================================================================

async fn run_reader<S>(
    mut reader: ReadHalf<S>,
    config: FrameConfig,
    shared: Arc<Shared>,
    mut shutdown: watch::Receiver<bool>,
) -> ReadHalf<S>
where
    S: AsyncRead + Send,
{
    let mut deframer = Deframer::new(&config);
    let mut assembler = FrameAssembler::new(config);
    let handlers = Arc::new(Semaphore::new(shared.options.max_concurrent_handlers));

    loop {
        let read = tokio::select! {
            biased;
            () = stopped(&mut shutdown) => break,
            read = reader.read_buf(deframer.buffer_mut()) => read,
        };

        match read {
            Ok(0) => {
                if deframer.is_mid_frame() {
                    debug!(
                        session_id = %shared.id,
                        buffered = deframer.buffered(),
                        "Stream ended mid-frame"
                    );
                }
                shared.teardown("connection closed by peer");
                break;
            }
            Ok(n) => {
                trace!(session_id = %shared.id, len = n, "Bytes received");
                let processed = process_frames(
                    &mut deframer,
                    &mut assembler,
                    &shared,
                    &handlers,
                    &mut shutdown,
                )
                .await;
                if let Err(e) = processed {
                    shared.fail(&e);
                    break;
                }
            }
            Err(e) => {
                shared.fail(&Error::Io(e));
                break;
            }
        }
    }

    trace!(session_id = %shared.id, "Reader stopped");
    reader
}

/// Handles every complete frame in the buffer. `Err` is fatal.
async fn process_frames(
    deframer: &mut Deframer,
    assembler: &mut FrameAssembler,
    shared: &Arc<Shared>,
    handlers: &Arc<Semaphore>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<()> {
    while let Some(frame) = deframer.next_frame()? {
        match assembler.push(frame)? {
            Assembled::Partial => {}
            Assembled::Rejected { id, error } => reject(shared, id, error),
            Assembled::Packet(wire) => {
                if !decode_and_dispatch(wire, shared, handlers, shutdown).await {
                    // Shutdown while waiting for a handler slot.
                    return Ok(());
                }
            }
        }
    }
    Ok(())
}

/// Routes a per-packet failure to its requester or to subscribers.
fn reject(shared: &Shared, id: Option<PacketId>, error: Error) {
    let unmatched = match &id {
        Some(id) => shared.reject(id, error),
        None => Some(error),
    };
    if let Some(error) = unmatched {
        debug!(session_id = %shared.id, ?id, error = %error, "Packet rejected");
        shared.emit(SessionEvent::Error {
            message: error.to_string(),
        });
    }
}

/// Decodes one packet and dispatches it. Returns `false` on shutdown.
async fn decode_and_dispatch(
    wire: WirePacket,
    shared: &Arc<Shared>,
    handlers: &Arc<Semaphore>,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    let wire_id = wire.meta.id.clone();
    let packet = match shared.decode.handle(wire).await {
        Ok(packet) => packet,
        Err(e) => {
            reject(shared, wire_id, e);
            return true;
        }
    };

    let Some(packet) = shared.resolve(packet) else {
        return true;
    };

    if packet.id.is_some() && (packet.status.is_some() || packet.error.is_some()) {
        warn!(session_id = %shared.id, id = ?packet.id, "Response for unknown request");
        return true;
    }

    if !shared.options.server_side {
        trace!(session_id = %shared.id, id = ?packet.id, "Unsolicited packet");
        shared.emit(SessionEvent::Unsolicited(packet));
        return true;
    }

    let handler = shared.handler.lock().clone();
    let Some(handler) = handler else {
        trace!(session_id = %shared.id, id = ?packet.id, "No request handler, packet dropped");
        return true;
    };

    let permit = tokio::select! {
        permit = Arc::clone(handlers).acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => return false,
        },
        () = stopped(shutdown) => return false,
    };

    let shared = Arc::clone(shared);
    tokio::spawn(async move {
        let _permit = permit;
        serve_request(&shared, handler, packet).await;
    });
    true
}

/// Runs the handler and sends back whatever it answers.
async fn serve_request(shared: &Shared, handler: Arc<dyn RequestHandler>, request: Packet) {
    let request_id = request.id.clone();
    let fallback = Packet::response_to(&request);

    let response = match handler.handle(request).await {
        Ok(Some(mut response)) => {
            if response.id.is_none() {
                response.id = request_id.clone();
            }
            response
        }
        Ok(None) => return,
        Err(e) => {
            debug!(session_id = %shared.id, id = ?request_id, error = %e, "Request handler failed");
            if request_id.is_none() {
                shared.emit(SessionEvent::Error {
                    message: e.to_string(),
                });
                return;
            }
            let status = e.status().unwrap_or(500);
            fallback
                .with_status(status, status_text(status))
                .with_error(e.to_string())
        }
    };

    if let Err(e) = shared.send(response).await {
        debug!(session_id = %shared.id, id = ?request_id, error = %e, "Failed to send response");
    }
}

fn status_text(status: u16) -> &'static str {
    match status {
        400 => "Bad Request",
        404 => "Not Found",
        408 => "Request Timeout",
        413 => "Payload Too Large",
        503 => "Service Unavailable",
        _ => "Internal Server Error",
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use tokio::io::{DuplexStream, duplex};

    use crate::codec::{FrameProfile, Framer};
    use crate::interceptor::{PacketDecoder, PacketEncoder};
    use crate::protocol::Body;

    fn chains() -> (Arc<EncodeChain>, Arc<DecodeChain>) {
        (
            Arc::new(EncodeChain::new(Arc::new(PacketEncoder))),
            Arc::new(DecodeChain::new(Arc::new(PacketDecoder))),
        )
    }

    fn session(socket: DuplexStream, options: SessionOptions) -> TransportSession<DuplexStream> {
        let (encode, decode) = chains();
        TransportSession::start(socket, Protocol::Tcp, options, encode, decode)
    }

    struct Echo;

    #[async_trait]
    impl RequestHandler for Echo {
        async fn handle(&self, request: Packet) -> Result<Option<Packet>> {
            Ok(Some(Packet::response_to(&request).with_body(request.body)))
        }
    }

    struct Failing;

    #[async_trait]
    impl RequestHandler for Failing {
        async fn handle(&self, _request: Packet) -> Result<Option<Packet>> {
            Err(Error::request(404, "Not Found", Some("no route".into())))
        }
    }

    #[tokio::test]
    async fn test_request_response_over_duplex() {
        let (a, b) = duplex(4096);
        let client = session(a, SessionOptions::new());
        let server = session(b, SessionOptions::server());
        server.set_request_handler(Arc::new(Echo));

        let response = client
            .request(Packet::request("/echo").with_body(json!({"n": 1})))
            .await
            .expect("response");
        assert_eq!(response.status, Some(200));
        assert_eq!(response.body, Body::Json(json!({"n": 1})));
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_handler_error_becomes_request_error() {
        let (a, b) = duplex(4096);
        let client = session(a, SessionOptions::new());
        let server = session(b, SessionOptions::server());
        server.set_request_handler(Arc::new(Failing));

        let err = client.request(Packet::request("/missing")).await.unwrap_err();
        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test]
    async fn test_timeout_frees_id() {
        let (a, _b) = duplex(4096);
        let client = session(a, SessionOptions::new());

        let err = client
            .request_with_timeout(Packet::request("/slow").with_id(7u16), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(client.pending_count(), 0);
        assert!(!client.shared.pending.lock().allocator.is_outstanding(7));
    }

    #[tokio::test]
    async fn test_timeout_covers_stalled_write() {
        let (a, _b) = duplex(64);
        let client = session(a, SessionOptions::new());

        let request = client.request_with_timeout(
            Packet::request("/stalled")
                .with_id(8u16)
                .with_body(vec![0u8; 10_000]),
            Duration::from_millis(50),
        );
        let err = timeout(Duration::from_secs(2), request)
            .await
            .expect("request returned")
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(client.pending_count(), 0);
        assert!(!client.shared.pending.lock().allocator.is_outstanding(8));
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let (a, _b) = duplex(4096);
        let client = Arc::new(session(a, SessionOptions::new()));

        let first = {
            let client = Arc::clone(&client);
            tokio::spawn(async move {
                client
                    .request_with_timeout(Packet::request("/a").with_id(3u16), Duration::from_secs(5))
                    .await
            })
        };
        while client.pending_count() == 0 {
            tokio::task::yield_now().await;
        }

        let err = client
            .request(Packet::request("/b").with_id(3u16))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateId { .. }));

        client.destroy().await;
        assert!(matches!(first.await.expect("join"), Err(Error::SessionClosed)));
    }

    #[tokio::test]
    async fn test_too_many_pending() {
        let (a, _b) = duplex(4096);
        let client = Arc::new(session(a, SessionOptions::new().with_max_pending_requests(1)));

        let first = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.request(Packet::request("/a")).await })
        };
        while client.pending_count() == 0 {
            tokio::task::yield_now().await;
        }

        let err = client.request(Packet::request("/b")).await.unwrap_err();
        assert!(matches!(err, Error::TooManyPending { pending: 1, max: 1 }));

        client.destroy().await;
        assert!(first.await.expect("join").is_err());
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent_and_returns_socket() {
        let (a, _b) = duplex(4096);
        let client = session(a, SessionOptions::new());
        let mut events = client.subscribe();

        client.destroy().await;
        client.destroy().await;

        assert_eq!(client.state(), SessionState::Closed);
        assert!(matches!(events.recv().await, Ok(SessionEvent::Closed { .. })));
        assert!(events.recv().await.is_err());
        assert!(client.take_socket().is_some());
        assert!(client.take_socket().is_none());
        assert!(matches!(
            client.send(Packet::new()).await,
            Err(Error::SessionClosed)
        ));
    }

    #[tokio::test]
    async fn test_unsolicited_packet_reaches_subscribers() {
        let (a, mut b) = duplex(4096);
        let client = session(a, SessionOptions::new());
        let mut events = client.subscribe();

        let wire = PacketEncoder::encode(Packet::publish("news").with_body("hello")).expect("encode");
        let framer = Framer::new(FrameConfig::new(FrameProfile::Binary));
        for frame in framer.encode(&wire).expect("frame") {
            b.write_all(&frame).await.expect("write");
        }

        match events.recv().await.expect("event") {
            SessionEvent::Unsolicited(packet) => {
                assert_eq!(packet.topic.as_deref(), Some("news"));
                assert_eq!(packet.body, Body::Text("hello".into()));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_peer_eof_fails_pending() {
        let (a, b) = duplex(4096);
        let client = Arc::new(session(a, SessionOptions::new()));

        let request = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.request(Packet::request("/a")).await })
        };
        while client.pending_count() == 0 {
            tokio::task::yield_now().await;
        }
        drop(b);

        let err = request.await.expect("join").unwrap_err();
        assert!(err.is_connection_error());
        assert!(!client.is_open());
    }
}
