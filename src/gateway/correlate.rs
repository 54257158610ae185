//! Pending-call table: sequence number → completion handle.
//!
//! Each outbound call registers a oneshot completion before its frame is
//! sent. A matching reply, a deadline, or connection teardown resolves it —
//! exactly once, whichever comes first.

use super::{GatewayError, Reply};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::oneshot;

pub(crate) struct PendingCall {
    tx: oneshot::Sender<Result<Reply, GatewayError>>,
    pub(crate) method: String,
}

#[derive(Default)]
pub(crate) struct Correlator {
    pending: Mutex<HashMap<i64, PendingCall>>,
}

impl Correlator {
    /// Register a call and hand back the receiver its completion fires on.
    pub(crate) fn register(
        &self,
        seq: i64,
        method: String,
    ) -> oneshot::Receiver<Result<Reply, GatewayError>> {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.pending.lock().expect("pending lock poisoned");
        pending.insert(seq, PendingCall { tx, method });
        rx
    }

    /// Resolve the call registered under `seq`. Returns the method name if a
    /// call was waiting, `None` for an unmatched sequence.
    pub(crate) fn complete(
        &self,
        seq: i64,
        result: Result<Reply, GatewayError>,
    ) -> Option<String> {
        let call = {
            let mut pending = self.pending.lock().expect("pending lock poisoned");
            pending.remove(&seq)?
        };
        let method = call.method.clone();
        let _ = call.tx.send(result);
        Some(method)
    }

    /// Drop the registration without resolving (the caller timed out and
    /// already consumed its receiver).
    pub(crate) fn forget(&self, seq: i64) -> bool {
        let mut pending = self.pending.lock().expect("pending lock poisoned");
        pending.remove(&seq).is_some()
    }

    /// Fail every still-pending call. Used on connection teardown.
    pub(crate) fn fail_all(&self) {
        let drained: Vec<PendingCall> = {
            let mut pending = self.pending.lock().expect("pending lock poisoned");
            pending.drain().map(|(_, call)| call).collect()
        };
        for call in drained {
            let _ = call.tx.send(Err(GatewayError::ConnectionClosed));
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::gate::Meta;

    fn ok_reply() -> Result<Reply, GatewayError> {
        Ok(Reply {
            meta: Meta::default(),
            body: Vec::new(),
        })
    }

    #[tokio::test]
    async fn test_reply_resolves_registered_call() {
        let correlator = Correlator::default();
        let rx = correlator.register(1, "Svc.Method".into());
        assert_eq!(correlator.complete(1, ok_reply()), Some("Svc.Method".into()));
        assert!(rx.await.unwrap().is_ok());
        assert_eq!(correlator.len(), 0);
    }

    #[tokio::test]
    async fn test_completion_fires_exactly_once() {
        let correlator = Correlator::default();
        let _rx = correlator.register(7, "Svc.M".into());
        assert!(correlator.complete(7, ok_reply()).is_some());
        // Second reply for the same sequence finds nothing.
        assert!(correlator.complete(7, ok_reply()).is_none());
    }

    #[tokio::test]
    async fn test_unmatched_sequence_is_dropped() {
        let correlator = Correlator::default();
        assert!(correlator.complete(99, ok_reply()).is_none());
    }

    #[tokio::test]
    async fn test_forget_prevents_late_completion() {
        let correlator = Correlator::default();
        let _rx = correlator.register(3, "Svc.M".into());
        assert!(correlator.forget(3));
        assert!(correlator.complete(3, ok_reply()).is_none());
        assert!(!correlator.forget(3));
    }

    #[tokio::test]
    async fn test_fail_all_resolves_every_pending_call() {
        let correlator = Correlator::default();
        let rx1 = correlator.register(1, "A.a".into());
        let rx2 = correlator.register(2, "B.b".into());
        correlator.fail_all();
        assert!(matches!(
            rx1.await.unwrap(),
            Err(GatewayError::ConnectionClosed)
        ));
        assert!(matches!(
            rx2.await.unwrap(),
            Err(GatewayError::ConnectionClosed)
        ));
        assert_eq!(correlator.len(), 0);
    }
}
