//! One authenticated account: connection, login, engines, event pump.

pub mod supervisor;

use crate::catalog::Catalog;
use crate::clock::ServerClock;
use crate::config::Config;
use crate::engine::farm::FarmEngine;
use crate::engine::friend::FriendEngine;
use crate::engine::task::TaskEngine;
use crate::engine::warehouse::WarehouseEngine;
use crate::gateway::{Gateway, GatewayError, LinkEvent};
use crate::notify::Notifier;
use crate::wire::user::{self, DeviceInfo, LoginReply, LoginRequest};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("login reply carried no player data")]
    LoginRejected,
}

/// Who this session is logged in as. Gold is tracked optimistically from
/// purchase replies between farm refreshes.
#[derive(Debug, Clone, Default)]
pub struct Identity {
    pub gid: i64,
    pub name: String,
    pub level: i32,
    pub gold: i64,
}

/// Lifecycle of one session. A session is `Idle` only notionally — before
/// construction; `start` connects immediately, and a closed session is never
/// restarted, a new one is built instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Connecting,
    Authenticating,
    Active,
    Closed,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Active => "active",
            Self::Closed => "closed",
        }
    }
}

/// Session-level events consumed by the supervisor. `session_id` pins each
/// event to the session instance that emitted it: two sessions may share a
/// credential across restarts, and a stale event from a dead instance must
/// never act on its successor.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Authenticated {
        session_id: u64,
        credential: String,
        name: String,
    },
    CallTimeout {
        session_id: u64,
        credential: String,
        method: String,
    },
    Kicked {
        session_id: u64,
        credential: String,
        event: String,
    },
    Closed {
        session_id: u64,
        credential: String,
        reason: String,
    },
}

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

pub struct Session {
    id: u64,
    credential: String,
    gateway: Gateway,
    identity: Arc<Mutex<Identity>>,
    status: Arc<Mutex<SessionStatus>>,
    stop: CancellationToken,
}

impl Session {
    /// Connect, log in, start the keep-alive beat and all four engines.
    /// Events flow to `events` until the session closes.
    pub async fn start(
        config: Arc<Config>,
        catalog: Arc<Catalog>,
        notifier: Arc<dyn Notifier>,
        credential: String,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<Arc<Self>, SessionError> {
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        let status = Arc::new(Mutex::new(SessionStatus::Connecting));
        let (gateway, link_events) = Gateway::connect(&config, &credential).await?;

        *status.lock().expect("status lock poisoned") = SessionStatus::Authenticating;
        let login: LoginReply = gateway
            .call_proto(
                user::SERVICE,
                user::LOGIN,
                &LoginRequest {
                    sharer_id: 0,
                    sharer_open_id: String::new(),
                    device_info: Some(DeviceInfo {
                        client_version: config.client_version.clone(),
                        sys_software: config.os.clone(),
                        network: "wifi".to_string(),
                        device_id: String::new(),
                    }),
                    scene_id: String::new(),
                },
                config.call_timeout(),
            )
            .await?;
        let Some(basic) = login.basic else {
            gateway.close().await;
            return Err(SessionError::LoginRejected);
        };

        let clock = Arc::new(ServerClock::default());
        clock.sync(login.time_now_millis);

        let identity = Arc::new(Mutex::new(Identity {
            gid: basic.gid,
            name: basic.name.clone(),
            level: basic.level,
            gold: basic.gold,
        }));
        info!(gid = basic.gid, name = %basic.name, level = basic.level, "logged in");
        *status.lock().expect("status lock poisoned") = SessionStatus::Active;
        let _ = events.send(SessionEvent::Authenticated {
            session_id: id,
            credential: credential.clone(),
            name: basic.name.clone(),
        });

        gateway.start_beat(
            basic.gid,
            config.client_version.clone(),
            clock.clone(),
            config.heartbeat_interval(),
        );

        let stop = CancellationToken::new();
        FarmEngine::new(
            gateway.clone(),
            clock.clone(),
            identity.clone(),
            config.clone(),
            catalog.clone(),
        )
        .spawn(stop.child_token());
        FriendEngine::new(
            gateway.clone(),
            clock.clone(),
            identity.clone(),
            config.clone(),
            notifier.clone(),
        )
        .spawn(stop.child_token());
        TaskEngine::new(
            gateway.clone(),
            config.clone(),
            catalog.clone(),
            notifier.clone(),
        )
        .spawn(stop.child_token());
        WarehouseEngine::new(gateway.clone(), config.clone(), catalog, notifier)
            .spawn(stop.child_token());

        let session = Arc::new(Self {
            id,
            credential,
            gateway,
            identity,
            status,
            stop,
        });
        tokio::spawn(pump_events(session.clone(), link_events, events));
        Ok(session)
    }

    /// Stop the engines and close the connection. Idempotent.
    pub async fn stop(&self) {
        self.stop.cancel();
        *self.status.lock().expect("status lock poisoned") = SessionStatus::Closed;
        self.gateway.close().await;
    }

    /// Process-unique id of this session instance. Distinguishes instances
    /// that share a credential across restarts.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn credential(&self) -> &str {
        &self.credential
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.lock().expect("status lock poisoned")
    }

    pub fn identity(&self) -> Identity {
        self.identity.lock().expect("identity lock poisoned").clone()
    }

    /// Highest server sequence seen on this connection; advances whenever
    /// any inbound frame arrives.
    pub fn watermark(&self) -> i64 {
        self.gateway.server_watermark()
    }
}

/// Translate link events into session events for the supervisor. Ends when
/// the gateway drops its event sender at teardown.
async fn pump_events(
    session: Arc<Session>,
    mut link_events: mpsc::UnboundedReceiver<LinkEvent>,
    events: mpsc::UnboundedSender<SessionEvent>,
) {
    while let Some(event) = link_events.recv().await {
        let session_id = session.id;
        let credential = session.credential.clone();
        let forwarded = match event {
            LinkEvent::CallTimeout { method } => SessionEvent::CallTimeout {
                session_id,
                credential,
                method,
            },
            LinkEvent::Kicked { event } => SessionEvent::Kicked {
                session_id,
                credential,
                event,
            },
            LinkEvent::Closed { reason } => {
                *session.status.lock().expect("status lock poisoned") = SessionStatus::Closed;
                session.stop.cancel();
                SessionEvent::Closed {
                    session_id,
                    credential,
                    reason,
                }
            }
        };
        if events.send(forwarded).is_err() {
            break;
        }
    }
    debug!(credential = %session.credential, "event pump ended");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_names() {
        assert_eq!(SessionStatus::Idle.as_str(), "idle");
        assert_eq!(SessionStatus::Active.as_str(), "active");
        assert_eq!(SessionStatus::Closed.as_str(), "closed");
    }

    #[test]
    fn test_identity_defaults_to_empty_player() {
        let identity = Identity::default();
        assert_eq!(identity.gid, 0);
        assert_eq!(identity.gold, 0);
    }

    #[test]
    fn test_session_ids_are_unique() {
        let a = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        let b = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        assert_ne!(a, b);
    }
}
