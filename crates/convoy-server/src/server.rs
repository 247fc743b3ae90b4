// crates/convoy-server/src/server.rs
// ============================================================================
// Module: Fleet TCP Server
// Description: Length-prefixed frame server for the agent control channel.
// Purpose: Accept agent connections, dispatch requests, and drive event streams.
// Dependencies: convoy-proto, tokio, crate::service
// ============================================================================

//! ## Overview
//! The server accepts TCP connections and speaks the length-prefixed frame
//! protocol. Each connection runs request-response until the agent sends
//! `Subscribe`; from then on the connection is a server-push event stream
//! with a 30-second keep-alive PING. One task per stream; concurrent
//! connections are bounded by a semaphore. Inputs are untrusted: malformed
//! frames terminate the connection.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use convoy_proto::EventPayload;
use convoy_proto::Reply;
use convoy_proto::Request;
use convoy_proto::RequestFrame;
use convoy_proto::ServerFrame;
use convoy_proto::read_frame;
use convoy_proto::write_frame;
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::sync::watch;

use crate::service::FleetService;
use crate::service::ServiceError;
use crate::service::Subscription;
use crate::telemetry::FleetMethod;
use crate::telemetry::FleetMetricEvent;
use crate::telemetry::FleetMetrics;
use crate::telemetry::FleetOutcome;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Keep-alive cadence on subscribed connections.
const PING_INTERVAL: Duration = Duration::from_secs(30);

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Server lifecycle errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Listener or accept failure.
    #[error("server io error: {0}")]
    Io(String),
}

// ============================================================================
// SECTION: Serve Loop
// ============================================================================

/// Binds the listen address and serves agent connections until shutdown.
///
/// # Errors
///
/// Returns [`ServerError::Io`] when the listener cannot be bound.
pub async fn serve(
    service: Arc<FleetService>,
    metrics: Arc<dyn FleetMetrics>,
    listen_addr: &str,
    max_connections: usize,
    shutdown: watch::Receiver<bool>,
) -> Result<(), ServerError> {
    let listener =
        TcpListener::bind(listen_addr).await.map_err(|err| ServerError::Io(err.to_string()))?;
    serve_with_listener(service, metrics, listener, max_connections, shutdown).await
}

/// Serves agent connections on an already-bound listener until shutdown.
///
/// # Errors
///
/// Currently infallible; the signature matches [`serve`] for symmetry.
pub async fn serve_with_listener(
    service: Arc<FleetService>,
    metrics: Arc<dyn FleetMetrics>,
    listener: TcpListener,
    max_connections: usize,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), ServerError> {
    let permits = Arc::new(Semaphore::new(max_connections));
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let Ok((stream, _peer)) = accepted else {
                    continue;
                };
                let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                    continue;
                };
                let service = Arc::clone(&service);
                let metrics = Arc::clone(&metrics);
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    handle_connection(service, metrics, stream, shutdown).await;
                    drop(permit);
                });
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return Ok(());
                }
            }
        }
    }
}

// ============================================================================
// SECTION: Connection Handling
// ============================================================================

/// Drives one connection: request-response, then streaming after subscribe.
async fn handle_connection(
    service: Arc<FleetService>,
    metrics: Arc<dyn FleetMetrics>,
    stream: TcpStream,
    mut shutdown: watch::Receiver<bool>,
) {
    let (mut reader, mut writer) = tokio::io::split(stream);
    loop {
        let frame = tokio::select! {
            frame = read_frame::<_, RequestFrame>(&mut reader) => frame,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return;
                }
                continue;
            }
        };
        let frame = match frame {
            Ok(Some(frame)) => frame,
            Ok(None) => return,
            Err(_) => {
                metrics.record_request(FleetMetricEvent {
                    method: FleetMethod::Invalid,
                    outcome: FleetOutcome::Error,
                    error_code: Some("invalid_argument"),
                });
                return;
            }
        };

        if let Request::Subscribe(request) = &frame.request {
            let started = Instant::now();
            match service.subscribe(request) {
                Ok(subscription) => {
                    record(&*metrics, FleetMethod::Subscribe, None, started);
                    let reply = ServerFrame::Response {
                        id: frame.id,
                        reply: Reply::Subscribed,
                    };
                    if write_frame(&mut writer, &reply).await.is_err() {
                        service.end_subscription(&subscription);
                        return;
                    }
                    drive_stream(&service, subscription, &mut reader, &mut writer, &mut shutdown)
                        .await;
                    return;
                }
                Err(err) => {
                    record(&*metrics, FleetMethod::Subscribe, Some(&err), started);
                    let reply = ServerFrame::Response {
                        id: frame.id,
                        reply: Reply::Error(err.to_reply()),
                    };
                    if write_frame(&mut writer, &reply).await.is_err() {
                        return;
                    }
                    continue;
                }
            }
        }

        let started = Instant::now();
        let method = method_of(&frame.request);
        let reply = dispatch(&service, &frame.request);
        match &reply {
            Reply::Error(error) => {
                metrics.record_request(FleetMetricEvent {
                    method,
                    outcome: FleetOutcome::Error,
                    error_code: Some(error.code.as_str()),
                });
            }
            _ => record(&*metrics, method, None, started),
        }
        let response = ServerFrame::Response {
            id: frame.id,
            reply,
        };
        if write_frame(&mut writer, &response).await.is_err() {
            return;
        }
    }
}

/// Dispatches one request to the fleet service.
fn dispatch(service: &FleetService, request: &Request) -> Reply {
    match request {
        Request::Register(request) => service
            .register(request)
            .map_or_else(|err| Reply::Error(err.to_reply()), Reply::Register),
        Request::Heartbeat(request) => service
            .heartbeat(request)
            .map_or_else(|err| Reply::Error(err.to_reply()), Reply::Heartbeat),
        Request::GetConfig(request) => service
            .get_config(request)
            .map_or_else(|err| Reply::Error(err.to_reply()), Reply::GetConfig),
        Request::GetConfigVersion(request) => service
            .get_config_version(request)
            .map_or_else(|err| Reply::Error(err.to_reply()), Reply::GetConfigVersion),
        Request::AckDeployment(request) => service
            .ack_deployment(request)
            .map_or_else(|err| Reply::Error(err.to_reply()), Reply::AckDeployment),
        Request::ReportDeploymentStatus(request) => service
            .report_deployment_status(request)
            .map_or_else(|err| Reply::Error(err.to_reply()), Reply::ReportDeploymentStatus),
        Request::Deregister(request) => service
            .deregister(request)
            .map_or_else(|err| Reply::Error(err.to_reply()), Reply::Deregister),
        Request::Subscribe(_) => {
            // Subscribe is handled by the connection loop before dispatch.
            Reply::Error(
                ServiceError::Internal("subscribe must start a stream".to_string()).to_reply(),
            )
        }
    }
}

/// Drives a subscribed connection until it terminates.
///
/// Termination conditions: the client closes the connection, the hub closes
/// the channel (supersession or removal), or a send fails. On exit the hub
/// entry is removed only if this stream still owns it.
async fn drive_stream<R, W>(
    service: &FleetService,
    mut subscription: Subscription,
    reader: &mut R,
    writer: &mut W,
    shutdown: &mut watch::Receiver<bool>,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut ping = tokio::time::interval(PING_INTERVAL);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ping.reset();
    loop {
        tokio::select! {
            event = subscription.recv() => {
                let Some(event) = event else {
                    // Channel closed by the hub: superseded or removed.
                    break;
                };
                let frame = ServerFrame::Event { event };
                if write_frame(writer, &frame).await.is_err() {
                    break;
                }
            }
            _ = ping.tick() => {
                let frame = ServerFrame::Event { event: service.make_event(EventPayload::Ping) };
                if write_frame(writer, &frame).await.is_err() {
                    break;
                }
            }
            inbound = read_frame::<_, RequestFrame>(reader) => {
                match inbound {
                    // Requests are not accepted on a streaming connection.
                    Ok(Some(_)) => {}
                    Ok(None) | Err(_) => break,
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    service.end_subscription(&subscription);
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Classifies a request for telemetry labeling.
const fn method_of(request: &Request) -> FleetMethod {
    match request {
        Request::Register(_) => FleetMethod::Register,
        Request::Heartbeat(_) => FleetMethod::Heartbeat,
        Request::GetConfig(_) => FleetMethod::GetConfig,
        Request::GetConfigVersion(_) => FleetMethod::GetConfigVersion,
        Request::Subscribe(_) => FleetMethod::Subscribe,
        Request::AckDeployment(_) => FleetMethod::AckDeployment,
        Request::ReportDeploymentStatus(_) => FleetMethod::ReportDeploymentStatus,
        Request::Deregister(_) => FleetMethod::Deregister,
    }
}

/// Records a request outcome with latency.
fn record(
    metrics: &dyn FleetMetrics,
    method: FleetMethod,
    error: Option<&ServiceError>,
    started: Instant,
) {
    let event = FleetMetricEvent {
        method,
        outcome: error.map_or(FleetOutcome::Ok, |_| FleetOutcome::Error),
        error_code: error.map(|err| err.code().as_str()),
    };
    metrics.record_request(event.clone());
    metrics.record_latency(event, started.elapsed());
}
