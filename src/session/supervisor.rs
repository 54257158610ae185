//! Session supervisor: owns every account session and reacts to their
//! events. Tears a session down after three consecutive call timeouts, or
//! immediately on a kick or a remote close.

use super::{Session, SessionError, SessionEvent, SessionStatus};
use crate::catalog::Catalog;
use crate::config::Config;
use crate::notify::Notifier;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Consecutive unanswered calls before the link is declared dead.
const TIMEOUT_TEARDOWN: u32 = 3;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("a session with this credential is already running")]
    DuplicateCredential,

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Consecutive-timeout bookkeeping for one session. Any inbound frame
/// between two timeouts moves the server watermark, which proves the link
/// is alive and resets the streak.
#[derive(Debug, Default)]
struct TimeoutStreak {
    count: u32,
    watermark: i64,
}

impl TimeoutStreak {
    fn on_timeout(&mut self, watermark: i64) -> u32 {
        if watermark > self.watermark {
            self.count = 1;
        } else {
            self.count += 1;
        }
        self.watermark = watermark;
        self.count
    }
}

/// What a timeout event means for the affected session.
#[derive(Debug, PartialEq, Eq)]
enum TimeoutVerdict {
    /// No live entry matches the event; it came from a dead instance.
    Stale,
    Tolerated { count: u32 },
    /// The entry has been evicted; the caller stops the session and sends
    /// the (single) notification.
    TearDown { name: String },
}

struct RosterEntry {
    session_id: u64,
    name: String,
    streak: TimeoutStreak,
}

/// Credential → live-session bookkeeping, separated from the session
/// handles so every eviction decision is plain synchronous code. Events are
/// matched on (credential, session id): a credential can be re-added after
/// a teardown, and queued events from the dead instance must not touch the
/// new one.
#[derive(Default)]
struct Roster {
    entries: HashMap<String, RosterEntry>,
}

impl Roster {
    fn contains(&self, credential: &str) -> bool {
        self.entries.contains_key(credential)
    }

    /// Admit a session. Refused when the credential already has a live
    /// entry; the caller discards its freshly built session.
    fn admit(&mut self, credential: &str, session_id: u64, name: String) -> bool {
        if self.entries.contains_key(credential) {
            return false;
        }
        self.entries.insert(
            credential.to_string(),
            RosterEntry {
                session_id,
                name,
                streak: TimeoutStreak::default(),
            },
        );
        true
    }

    fn on_timeout(&mut self, credential: &str, session_id: u64, watermark: i64) -> TimeoutVerdict {
        let Some(entry) = self.entries.get_mut(credential) else {
            return TimeoutVerdict::Stale;
        };
        if entry.session_id != session_id {
            return TimeoutVerdict::Stale;
        }
        let count = entry.streak.on_timeout(watermark);
        if count >= TIMEOUT_TEARDOWN {
            let name = entry.name.clone();
            self.entries.remove(credential);
            TimeoutVerdict::TearDown { name }
        } else {
            TimeoutVerdict::Tolerated { count }
        }
    }

    /// Evict on a terminal event (kick or close). Returns the display name
    /// when the event matched the live entry; a stale event from an earlier
    /// instance of the same credential leaves the entry alone.
    fn on_terminal(&mut self, credential: &str, session_id: u64) -> Option<String> {
        let is_live = self
            .entries
            .get(credential)
            .is_some_and(|entry| entry.session_id == session_id);
        if !is_live {
            return None;
        }
        self.entries.remove(credential).map(|entry| entry.name)
    }

    fn evict(&mut self, credential: &str) -> Option<RosterEntry> {
        self.entries.remove(credential)
    }

    fn rows(&self) -> Vec<(String, u64, String)> {
        self.entries
            .iter()
            .map(|(credential, entry)| (credential.clone(), entry.session_id, entry.name.clone()))
            .collect()
    }
}

/// One row of [`Supervisor::list`].
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub credential_prefix: String,
    pub name: String,
    pub status: SessionStatus,
}

pub struct Supervisor {
    config: Arc<Config>,
    catalog: Arc<Catalog>,
    notifier: Arc<dyn Notifier>,
    roster: Mutex<Roster>,
    sessions: Mutex<HashMap<u64, Arc<Session>>>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
}

impl Supervisor {
    /// Build the supervisor and start its event loop. The loop ends when
    /// `stop` is cancelled and every session sender is gone.
    pub fn start(
        config: Arc<Config>,
        catalog: Arc<Catalog>,
        notifier: Arc<dyn Notifier>,
        stop: CancellationToken,
    ) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let supervisor = Arc::new(Self {
            config,
            catalog,
            notifier,
            roster: Mutex::new(Roster::default()),
            sessions: Mutex::new(HashMap::new()),
            events_tx,
        });
        tokio::spawn(supervisor.clone().event_loop(events_rx, stop));
        supervisor
    }

    /// Start a session for one credential. A credential already running is
    /// rejected, never restarted.
    pub async fn add(&self, credential: &str) -> Result<(), SupervisorError> {
        if self.roster.lock().expect("roster lock poisoned").contains(credential) {
            return Err(SupervisorError::DuplicateCredential);
        }

        let session = Session::start(
            self.config.clone(),
            self.catalog.clone(),
            self.notifier.clone(),
            credential.to_string(),
            self.events_tx.clone(),
        )
        .await?;

        let name = session.identity().name;
        let admitted = self
            .roster
            .lock()
            .expect("roster lock poisoned")
            .admit(credential, session.id(), name);
        // A concurrent add may have won while this one was connecting.
        if !admitted {
            session.stop().await;
            return Err(SupervisorError::DuplicateCredential);
        }
        self.sessions
            .lock()
            .expect("sessions lock poisoned")
            .insert(session.id(), session);
        Ok(())
    }

    /// Stop and drop one session. A no-op for an unknown credential.
    pub async fn remove(&self, credential: &str) {
        let entry = self
            .roster
            .lock()
            .expect("roster lock poisoned")
            .evict(credential);
        if let Some(entry) = entry {
            if let Some(session) = self.take_session(entry.session_id) {
                session.stop().await;
            }
            info!(credential = %prefix(credential), name = %entry.name, "session removed");
        }
    }

    /// Snapshot of every running session. Credentials are shown truncated.
    pub fn list(&self) -> Vec<SessionSummary> {
        let rows = self.roster.lock().expect("roster lock poisoned").rows();
        let sessions = self.sessions.lock().expect("sessions lock poisoned");
        let mut out: Vec<SessionSummary> = rows
            .into_iter()
            .map(|(credential, session_id, name)| SessionSummary {
                credential_prefix: prefix(&credential),
                name,
                status: sessions
                    .get(&session_id)
                    .map_or(SessionStatus::Closed, |session| session.status()),
            })
            .collect();
        out.sort_by(|a, b| a.credential_prefix.cmp(&b.credential_prefix));
        out
    }

    /// Stop every session. Safe when none are running.
    pub async fn stop_all(&self) {
        self.roster
            .lock()
            .expect("roster lock poisoned")
            .entries
            .clear();
        let sessions: Vec<Arc<Session>> = {
            let mut sessions = self.sessions.lock().expect("sessions lock poisoned");
            sessions.drain().map(|(_, session)| session).collect()
        };
        for session in sessions {
            session.stop().await;
        }
    }

    async fn event_loop(
        self: Arc<Self>,
        mut events: mpsc::UnboundedReceiver<SessionEvent>,
        stop: CancellationToken,
    ) {
        loop {
            let event = tokio::select! {
                _ = stop.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            match event {
                SessionEvent::Authenticated {
                    credential, name, ..
                } => {
                    self.notifier
                        .notify(&format!("logged in as {name} ({})", prefix(&credential)))
                        .await;
                }
                SessionEvent::CallTimeout {
                    session_id,
                    credential,
                    method,
                } => {
                    self.on_timeout(session_id, &credential, &method).await;
                }
                SessionEvent::Kicked {
                    session_id,
                    credential,
                    event,
                } => {
                    warn!(credential = %prefix(&credential), %event, "kicked by server");
                    let evicted = self
                        .roster
                        .lock()
                        .expect("roster lock poisoned")
                        .on_terminal(&credential, session_id);
                    let session = self.take_session(session_id);
                    if let Some(name) = evicted {
                        self.notifier
                            .notify(&format!("{name} was disconnected by the server"))
                            .await;
                    }
                    if let Some(session) = session {
                        session.stop().await;
                    }
                }
                SessionEvent::Closed {
                    session_id,
                    credential,
                    reason,
                } => {
                    let evicted = self
                        .roster
                        .lock()
                        .expect("roster lock poisoned")
                        .on_terminal(&credential, session_id);
                    let session = self.take_session(session_id);
                    if let Some(name) = evicted {
                        self.notifier
                            .notify(&format!("{name} lost its connection: {reason}"))
                            .await;
                    }
                    if let Some(session) = session {
                        session.stop().await;
                    }
                }
            }
        }
    }

    async fn on_timeout(&self, session_id: u64, credential: &str, method: &str) {
        let watermark = self
            .sessions
            .lock()
            .expect("sessions lock poisoned")
            .get(&session_id)
            .map_or(0, |session| session.watermark());
        let verdict = self
            .roster
            .lock()
            .expect("roster lock poisoned")
            .on_timeout(credential, session_id, watermark);
        match verdict {
            TimeoutVerdict::Stale => {}
            TimeoutVerdict::Tolerated { count } => {
                warn!(credential = %prefix(credential), %method, count, "call timed out");
            }
            TimeoutVerdict::TearDown { name } => {
                warn!(
                    credential = %prefix(credential),
                    %method,
                    "timeout streak reached, closing session"
                );
                self.notifier
                    .notify(&format!(
                        "{name} is unresponsive ({TIMEOUT_TEARDOWN} timeouts in a row), closing the session"
                    ))
                    .await;
                if let Some(session) = self.take_session(session_id) {
                    session.stop().await;
                }
            }
        }
    }

    fn take_session(&self, session_id: u64) -> Option<Arc<Session>> {
        self.sessions
            .lock()
            .expect("sessions lock poisoned")
            .remove(&session_id)
    }

    #[cfg(test)]
    fn admit_for_tests(&self, credential: &str, session_id: u64, name: &str) -> bool {
        self.roster
            .lock()
            .unwrap()
            .admit(credential, session_id, name.to_string())
    }

    #[cfg(test)]
    fn send_event(&self, event: SessionEvent) {
        self.events_tx.send(event).unwrap();
    }
}

/// Truncate a credential for logs and listings.
fn prefix(credential: &str) -> String {
    let head: String = credential.chars().take(6).collect();
    if credential.chars().count() > 6 {
        format!("{head}…")
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::test_support::RecordingNotifier;
    use std::time::Duration;

    fn build(notifier: Arc<RecordingNotifier>) -> Arc<Supervisor> {
        Supervisor::start(
            Arc::new(Config::default()),
            Arc::new(Catalog::default()),
            notifier,
            CancellationToken::new(),
        )
    }

    async fn settle() {
        // The event loop runs on the same current-thread runtime; yielding a
        // few times lets it drain the unbounded queue.
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn test_streak_counts_silent_timeouts() {
        let mut streak = TimeoutStreak::default();
        assert_eq!(streak.on_timeout(0), 1);
        assert_eq!(streak.on_timeout(0), 2);
        assert_eq!(streak.on_timeout(0), 3);
    }

    #[test]
    fn test_streak_resets_when_watermark_moves() {
        let mut streak = TimeoutStreak::default();
        assert_eq!(streak.on_timeout(10), 1);
        assert_eq!(streak.on_timeout(10), 2);
        // A frame arrived between timeouts; the link is alive.
        assert_eq!(streak.on_timeout(25), 1);
        assert_eq!(streak.on_timeout(25), 2);
    }

    #[test]
    fn test_prefix_truncates_long_credentials() {
        assert_eq!(prefix("abcdef0123456789"), "abcdef…");
        assert_eq!(prefix("abc"), "abc");
        assert_eq!(prefix("abcdef"), "abcdef");
    }

    #[test]
    fn test_roster_rejects_duplicate_credential() {
        let mut roster = Roster::default();
        assert!(roster.admit("cred", 1, "ann".into()));
        // The loser of a concurrent add is refused even though it finished
        // connecting with its own session instance.
        assert!(!roster.admit("cred", 2, "ann".into()));
        assert!(roster.contains("cred"));
    }

    #[test]
    fn test_roster_ignores_terminal_event_from_dead_instance() {
        let mut roster = Roster::default();
        roster.admit("cred", 2, "ann".into());
        // A queued close from the previous instance of the same credential
        // must leave the live entry alone.
        assert_eq!(roster.on_terminal("cred", 1), None);
        assert!(roster.contains("cred"));
        // The live instance's own close evicts it.
        assert_eq!(roster.on_terminal("cred", 2), Some("ann".into()));
        assert!(!roster.contains("cred"));
    }

    #[test]
    fn test_roster_ignores_timeouts_from_dead_instance() {
        let mut roster = Roster::default();
        roster.admit("cred", 2, "ann".into());
        for _ in 0..5 {
            assert_eq!(roster.on_timeout("cred", 1, 0), TimeoutVerdict::Stale);
        }
        assert!(roster.contains("cred"));
    }

    #[test]
    fn test_roster_teardown_after_three_silent_timeouts() {
        let mut roster = Roster::default();
        roster.admit("cred", 7, "ann".into());
        assert_eq!(
            roster.on_timeout("cred", 7, 0),
            TimeoutVerdict::Tolerated { count: 1 }
        );
        assert_eq!(
            roster.on_timeout("cred", 7, 0),
            TimeoutVerdict::Tolerated { count: 2 }
        );
        assert_eq!(
            roster.on_timeout("cred", 7, 0),
            TimeoutVerdict::TearDown { name: "ann".into() }
        );
        // The entry is gone; further timeouts from the dead instance are
        // stale, so a second teardown (and notification) cannot happen.
        assert_eq!(roster.on_timeout("cred", 7, 0), TimeoutVerdict::Stale);
    }

    #[tokio::test]
    async fn test_three_timeouts_evict_and_notify_exactly_once() {
        let notifier = Arc::new(RecordingNotifier::default());
        let supervisor = build(notifier.clone());
        assert!(supervisor.admit_for_tests("cred-123456", 7, "ann"));

        for _ in 0..5 {
            supervisor.send_event(SessionEvent::CallTimeout {
                session_id: 7,
                credential: "cred-123456".into(),
                method: "Svc.M".into(),
            });
        }
        settle().await;

        assert!(supervisor.list().is_empty());
        let messages = notifier.messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("unresponsive"));
    }

    #[tokio::test]
    async fn test_stale_close_leaves_live_session_alone() {
        let notifier = Arc::new(RecordingNotifier::default());
        let supervisor = build(notifier.clone());
        assert!(supervisor.admit_for_tests("cred-123456", 2, "ann"));

        // Close from a dead earlier instance of the same credential.
        supervisor.send_event(SessionEvent::Closed {
            session_id: 1,
            credential: "cred-123456".into(),
            reason: "closed locally".into(),
        });
        settle().await;
        assert_eq!(supervisor.list().len(), 1);
        assert!(notifier.messages.lock().unwrap().is_empty());

        // The live instance's close evicts and notifies.
        supervisor.send_event(SessionEvent::Closed {
            session_id: 2,
            credential: "cred-123456".into(),
            reason: "closed by server".into(),
        });
        settle().await;
        assert!(supervisor.list().is_empty());
        let messages = notifier.messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("lost its connection"));
    }

    #[tokio::test]
    async fn test_stop_all_with_no_sessions_is_safe() {
        let notifier = Arc::new(RecordingNotifier::default());
        let supervisor = build(notifier);
        supervisor.stop_all().await;
        assert!(supervisor.list().is_empty());
    }
}
