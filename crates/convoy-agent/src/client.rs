// crates/convoy-agent/src/client.rs
// ============================================================================
// Module: Fleet Client
// Description: Framed RPC client for the agent control channel.
// Purpose: Provide request-response calls and the subscribe event stream.
// Dependencies: convoy-proto, tokio, thiserror
// ============================================================================

//! ## Overview
//! A thin client over the length-prefixed frame protocol: one connection per
//! concern (request-response or event stream), strictly increasing request
//! ids, and fail-closed handling of protocol violations. Server responses
//! are untrusted input; size limits are enforced by the frame codec.
//!
//! Security posture: the session token is held in memory only and never
//! logged; [`std::fmt::Debug`] output redacts it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use convoy_proto::ErrorReply;
use convoy_proto::EventEnvelope;
use convoy_proto::FrameError;
use convoy_proto::Reply;
use convoy_proto::Request;
use convoy_proto::RequestFrame;
use convoy_proto::ServerFrame;
use convoy_proto::SubscribeRequest;
use convoy_proto::read_frame;
use convoy_proto::write_frame;
use thiserror::Error;
use tokio::io::ReadHalf;
use tokio::io::WriteHalf;
use tokio::net::TcpStream;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Client transport and protocol errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - `Remote` carries the server's wire error reply verbatim.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection establishment or transport failure.
    #[error("client io error: {0}")]
    Io(String),
    /// Frame codec failure.
    #[error("client frame error: {0}")]
    Frame(String),
    /// Peer violated the request-response protocol.
    #[error("client protocol error: {0}")]
    Protocol(String),
    /// Server answered with a wire error.
    #[error("server error ({}): {}", .0.code.as_str(), .0.message)]
    Remote(ErrorReply),
}

impl From<FrameError> for ClientError {
    fn from(err: FrameError) -> Self {
        Self::Frame(err.to_string())
    }
}

// ============================================================================
// SECTION: Connection
// ============================================================================

/// One framed request-response connection.
///
/// # Invariants
/// - `next_id` is strictly increasing for each request sent.
pub struct Connection {
    /// Read half of the TCP stream.
    reader: ReadHalf<TcpStream>,
    /// Write half of the TCP stream.
    writer: WriteHalf<TcpStream>,
    /// Next request correlation id.
    next_id: u64,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").field("next_id", &self.next_id).finish()
    }
}

impl Connection {
    /// Connects to the coordinator.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Io`] when the TCP connection fails.
    pub async fn connect(addr: &str) -> Result<Self, ClientError> {
        let stream =
            TcpStream::connect(addr).await.map_err(|err| ClientError::Io(err.to_string()))?;
        let (reader, writer) = tokio::io::split(stream);
        Ok(Self {
            reader,
            writer,
            next_id: 1,
        })
    }

    /// Sends one request and awaits the matching response.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Remote`] for server-reported errors and
    /// [`ClientError::Protocol`] when the response does not correlate.
    pub async fn call(&mut self, request: Request) -> Result<Reply, ClientError> {
        let id = self.next_id;
        self.next_id += 1;
        let frame = RequestFrame {
            id,
            request,
        };
        write_frame(&mut self.writer, &frame).await?;
        loop {
            let Some(frame) = read_frame::<_, ServerFrame>(&mut self.reader).await? else {
                return Err(ClientError::Protocol("connection closed awaiting response".to_string()));
            };
            match frame {
                ServerFrame::Response {
                    id: response_id,
                    reply,
                } => {
                    if response_id != id {
                        return Err(ClientError::Protocol(format!(
                            "response id {response_id} does not match request id {id}"
                        )));
                    }
                    if let Reply::Error(error) = reply {
                        return Err(ClientError::Remote(error));
                    }
                    return Ok(reply);
                }
                // Events are not expected on a request-response connection.
                ServerFrame::Event {
                    ..
                } => {}
            }
        }
    }

    /// Upgrades the connection into an event stream.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Remote`] when the subscription is rejected.
    pub async fn subscribe(mut self, request: SubscribeRequest) -> Result<EventStream, ClientError> {
        let reply = self.call(Request::Subscribe(request)).await?;
        match reply {
            Reply::Subscribed => Ok(EventStream {
                reader: self.reader,
                _writer: self.writer,
            }),
            _ => Err(ClientError::Protocol("unexpected reply to subscribe".to_string())),
        }
    }
}

// ============================================================================
// SECTION: Event Stream
// ============================================================================

/// Server-push event stream over a subscribed connection.
pub struct EventStream {
    /// Read half carrying event frames.
    reader: ReadHalf<TcpStream>,
    /// Write half kept open so the server observes the connection.
    _writer: WriteHalf<TcpStream>,
}

impl EventStream {
    /// Receives the next event, or `None` on clean close.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Frame`] on transport or codec failure.
    pub async fn next_event(&mut self) -> Result<Option<EventEnvelope>, ClientError> {
        loop {
            let Some(frame) = read_frame::<_, ServerFrame>(&mut self.reader).await? else {
                return Ok(None);
            };
            match frame {
                ServerFrame::Event {
                    event,
                } => return Ok(Some(event)),
                // Responses are not expected once streaming.
                ServerFrame::Response {
                    ..
                } => {}
            }
        }
    }
}

// ============================================================================
// SECTION: Backoff
// ============================================================================

/// Exponential reconnect backoff (1s doubling to a 5-minute cap).
///
/// # Invariants
/// - Delays never exceed the cap.
#[derive(Debug, Clone)]
pub struct Backoff {
    /// Next delay to hand out.
    next: Duration,
    /// First delay after a reset.
    initial: Duration,
    /// Upper bound on the delay.
    max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(300))
    }
}

impl Backoff {
    /// Creates a backoff with the provided bounds.
    #[must_use]
    pub const fn new(initial: Duration, max: Duration) -> Self {
        Self {
            next: initial,
            initial,
            max,
        }
    }

    /// Returns the next delay and advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(self.max);
        delay
    }

    /// Resets the schedule after a successful connection.
    pub fn reset(&mut self) {
        self.next = self.initial;
    }
}
