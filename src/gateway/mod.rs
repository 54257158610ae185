//! Transport correlator: one WebSocket, many in-flight calls.
//!
//! The gateway owns a session's single connection. Outbound calls are
//! stamped with a strictly increasing client sequence and matched to inbound
//! reply frames by that sequence; unsolicited push frames are routed to
//! subscribers by event name. Teardown — local or remote — fails every
//! pending call and surfaces one terminal [`LinkEvent`].

mod correlate;

use crate::clock::ServerClock;
use crate::wire::gate::{self, Envelope, EventMessage, Meta};
use crate::wire::user::{HeartbeatReply, HeartbeatRequest};
use crate::{config::Config, wire::user};
use correlate::Correlator;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use prost::Message as ProstMessage;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Deadline for the fire-and-forget keep-alive call.
const BEAT_TIMEOUT: Duration = Duration::from_secs(8);

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("call timed out: {method}")]
    Timeout { method: String },

    #[error("{service}.{method} failed: code={code} {message}")]
    Remote {
        service: String,
        method: String,
        code: i32,
        message: String,
    },

    #[error("reply decode failed: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("transport error: {0}")]
    Transport(String),
}

/// A completed call: routing meta plus the opaque reply body.
#[derive(Debug, Clone)]
pub struct Reply {
    pub meta: Meta,
    pub body: Vec<u8>,
}

/// Terminal and health events surfaced to the owning session.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// A correlated call hit its deadline.
    CallTimeout { method: String },
    /// The server pushed a forced-disconnect event.
    Kicked { event: String },
    /// The connection is gone; every pending call has been failed.
    Closed { reason: String },
}

struct Inner {
    sink: tokio::sync::Mutex<WsSink>,
    calls: Correlator,
    pushes: Mutex<HashMap<String, mpsc::UnboundedSender<Vec<u8>>>>,
    client_seq: AtomicI64,
    server_seq: AtomicI64,
    events: mpsc::UnboundedSender<LinkEvent>,
    shutdown: CancellationToken,
    closed: AtomicBool,
}

/// Cloneable handle to one session's connection.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<Inner>,
}

impl Gateway {
    /// Open the connection and start the frame reader. Returns the gateway
    /// handle and the link-event stream for the owning session.
    pub async fn connect(
        config: &Config,
        credential: &str,
    ) -> Result<(Self, mpsc::UnboundedReceiver<LinkEvent>), GatewayError> {
        let url = format!(
            "{}?platform={}&os={}&ver={}&code={}&openID=",
            config.server_url, config.platform, config.os, config.client_version, credential
        );
        let mut request = url
            .into_client_request()
            .map_err(|err| GatewayError::Transport(err.to_string()))?;
        request.headers_mut().insert(
            "User-Agent",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64)"
                .parse()
                .expect("static header"),
        );

        let (socket, _response) = connect_async(request)
            .await
            .map_err(|err| GatewayError::Transport(err.to_string()))?;
        let (sink, stream) = socket.split();

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            sink: tokio::sync::Mutex::new(sink),
            calls: Correlator::default(),
            pushes: Mutex::new(HashMap::new()),
            client_seq: AtomicI64::new(1),
            server_seq: AtomicI64::new(0),
            events: events_tx,
            shutdown: CancellationToken::new(),
            closed: AtomicBool::new(false),
        });
        tokio::spawn(read_loop(inner.clone(), stream));

        Ok((Self { inner }, events_rx))
    }

    /// Issue one correlated call. Exactly one of reply or timeout resolves
    /// the caller; a nonzero remote error code surfaces as
    /// [`GatewayError::Remote`].
    pub async fn call(
        &self,
        service: &str,
        method: &str,
        body: Vec<u8>,
        timeout: Duration,
    ) -> Result<Reply, GatewayError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(GatewayError::ConnectionClosed);
        }

        let seq = self.inner.client_seq.fetch_add(1, Ordering::SeqCst);
        let qualified = format!("{service}.{method}");
        let rx = self.inner.calls.register(seq, qualified.clone());

        let frame = Envelope {
            meta: Some(Meta {
                service_name: service.to_string(),
                method_name: method.to_string(),
                message_type: gate::kind::REQUEST,
                client_seq: seq,
                server_seq: self.inner.server_seq.load(Ordering::SeqCst),
                error_code: 0,
                error_message: String::new(),
            }),
            body,
        };

        let send_result = {
            let mut sink = self.inner.sink.lock().await;
            sink.send(Message::Binary(frame.encode_to_vec().into())).await
        };
        if let Err(err) = send_result {
            self.inner.calls.forget(seq);
            return Err(GatewayError::Transport(err.to_string()));
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            // Completion handle dropped: teardown won the race.
            Ok(Err(_)) => Err(GatewayError::ConnectionClosed),
            Err(_) => {
                self.inner.calls.forget(seq);
                let _ = self.inner.events.send(LinkEvent::CallTimeout {
                    method: qualified.clone(),
                });
                Err(GatewayError::Timeout { method: qualified })
            }
        }
    }

    /// Typed call: encode the request, decode the reply body.
    pub async fn call_proto<Req, Rsp>(
        &self,
        service: &str,
        method: &str,
        request: &Req,
        timeout: Duration,
    ) -> Result<Rsp, GatewayError>
    where
        Req: prost::Message,
        Rsp: prost::Message + Default,
    {
        let reply = self
            .call(service, method, request.encode_to_vec(), timeout)
            .await?;
        Ok(Rsp::decode(reply.body.as_slice())?)
    }

    /// Subscribe to push frames carrying the given event name. Pushes with
    /// no subscriber are ignored.
    pub fn subscribe_push(&self, event: &str) -> mpsc::UnboundedReceiver<Vec<u8>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .pushes
            .lock()
            .expect("push lock poisoned")
            .insert(event.to_string(), tx);
        rx
    }

    /// Start the keep-alive beat. Runs until the connection goes away; a
    /// reply carrying a time sample refreshes the clock offset.
    pub fn start_beat(&self, gid: i64, client_version: String, clock: Arc<ServerClock>, period: Duration) {
        let gateway = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = gateway.inner.shutdown.cancelled() => break,
                    _ = interval.tick() => {}
                }
                let request = HeartbeatRequest {
                    gid,
                    client_version: client_version.clone(),
                };
                match gateway
                    .call_proto::<_, HeartbeatReply>(user::SERVICE, user::HEARTBEAT, &request, BEAT_TIMEOUT)
                    .await
                {
                    Ok(reply) => clock.sync(reply.server_time),
                    Err(err) => debug!(%err, "keep-alive beat failed"),
                }
            }
        });
    }

    /// Tear the connection down: fail every pending call, stop the beat and
    /// reader, close the socket. Idempotent.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.shutdown.cancel();
        self.inner.calls.fail_all();
        let mut sink = self.inner.sink.lock().await;
        let _ = sink.close().await;
    }

    /// Highest sequence number observed in any inbound frame.
    pub fn server_watermark(&self) -> i64 {
        self.inner.server_seq.load(Ordering::SeqCst)
    }
}

async fn read_loop(inner: Arc<Inner>, mut stream: WsStream) {
    let reason = loop {
        tokio::select! {
            _ = inner.shutdown.cancelled() => break "closed locally".to_string(),
            frame = stream.next() => match frame {
                Some(Ok(Message::Binary(data))) => handle_frame(&inner, data.as_ref()),
                Some(Ok(Message::Close(_))) => break "closed by server".to_string(),
                Some(Ok(_)) => {}
                Some(Err(err)) => break err.to_string(),
                None => break "stream ended".to_string(),
            }
        }
    };

    inner.closed.store(true, Ordering::SeqCst);
    inner.shutdown.cancel();
    inner.calls.fail_all();
    let _ = inner.events.send(LinkEvent::Closed { reason });
}

fn handle_frame(inner: &Inner, data: &[u8]) {
    let envelope = match Envelope::decode(data) {
        Ok(envelope) => envelope,
        Err(err) => {
            warn!(%err, "undecodable frame dropped");
            return;
        }
    };
    let Some(meta) = envelope.meta else {
        return;
    };

    // Watermark: highest inbound sequence, echoed on subsequent sends.
    if meta.server_seq > 0 {
        inner.server_seq.fetch_max(meta.server_seq, Ordering::SeqCst);
    }

    match meta.message_type {
        gate::kind::REPLY => {
            let seq = meta.client_seq;
            let result = if meta.error_code != 0 {
                Err(GatewayError::Remote {
                    service: meta.service_name.clone(),
                    method: meta.method_name.clone(),
                    code: meta.error_code,
                    message: meta.error_message.clone(),
                })
            } else {
                Ok(Reply {
                    body: envelope.body,
                    meta: meta.clone(),
                })
            };
            if inner.calls.complete(seq, result).is_none() {
                debug!(
                    seq,
                    method = %format!("{}.{}", meta.service_name, meta.method_name),
                    "unmatched reply dropped"
                );
            }
        }
        gate::kind::PUSH => handle_push(inner, &envelope.body),
        other => debug!(kind = other, "frame with unknown message kind dropped"),
    }
}

fn handle_push(inner: &Inner, body: &[u8]) {
    if body.is_empty() {
        return;
    }
    let event = match EventMessage::decode(body) {
        Ok(event) => event,
        Err(err) => {
            warn!(%err, "undecodable push dropped");
            return;
        }
    };

    if event.message_type == gate::KICKOUT_EVENT || event.message_type.contains("Kickout") {
        let _ = inner.events.send(LinkEvent::Kicked {
            event: event.message_type,
        });
        return;
    }

    let subscriber = {
        let pushes = inner.pushes.lock().expect("push lock poisoned");
        pushes.get(&event.message_type).cloned()
    };
    match subscriber {
        Some(tx) => {
            let _ = tx.send(event.payload);
        }
        None => debug!(event = %event.message_type, "push with no subscriber ignored"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_formats_cause() {
        let err = GatewayError::Remote {
            service: "gamepb.plantpb.PlantService".into(),
            method: "Harvest".into(),
            code: 1203,
            message: "not ready".into(),
        };
        let text = err.to_string();
        assert!(text.contains("Harvest"));
        assert!(text.contains("1203"));
    }

    #[test]
    fn test_envelope_round_trip() {
        let frame = Envelope {
            meta: Some(Meta {
                service_name: "svc".into(),
                method_name: "m".into(),
                message_type: gate::kind::REQUEST,
                client_seq: 42,
                server_seq: 7,
                error_code: 0,
                error_message: String::new(),
            }),
            body: vec![1, 2, 3],
        };
        let bytes = frame.encode_to_vec();
        let decoded = Envelope::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded.meta.unwrap().client_seq, 42);
        assert_eq!(decoded.body, vec![1, 2, 3]);
    }
}
