//! Correlation table: turns publish/subscribe into awaitable calls.
//!
//! Flow:
//! 1. The engine generates a message id and calls [`register`](CorrelationTable::register).
//! 2. It publishes the signed request.
//! 3. The dispatch task sees the matching acknowledgement and calls
//!    [`resolve`](CorrelationTable::resolve).
//! 4. The caller awaits the [`PendingCall`] or times out.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;

use fleetlink_domain::error::{CommandTimeoutError, FleetError, ProtocolError, ValidationError};
use fleetlink_domain::id::MessageId;

type Resolution = Result<Value, ProtocolError>;

/// A registered request waiting for its acknowledgement.
#[derive(Debug)]
pub struct PendingCall {
    message_id: MessageId,
    receiver: oneshot::Receiver<Resolution>,
}

impl PendingCall {
    #[must_use]
    pub fn message_id(&self) -> &MessageId {
        &self.message_id
    }
}

/// Outstanding requests keyed by message id. At most one entry per id.
#[derive(Debug, Default)]
pub struct CorrelationTable {
    pending: Mutex<HashMap<MessageId, oneshot::Sender<Resolution>>>,
}

impl CorrelationTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request before it is published.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::DuplicateMessageId`] when `message_id` is
    /// already pending.
    pub fn register(&self, message_id: MessageId) -> Result<PendingCall, ValidationError> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.contains_key(&message_id) {
            return Err(ValidationError::DuplicateMessageId(message_id));
        }
        let (sender, receiver) = oneshot::channel();
        pending.insert(message_id.clone(), sender);
        tracing::trace!(message_id = %message_id, "registered pending call");
        Ok(PendingCall { message_id, receiver })
    }

    /// Fulfil and remove the entry for `message_id`.
    ///
    /// Returns `false` when nothing is pending under that id (late or foreign
    /// acknowledgement) or the caller already gave up.
    pub fn resolve(&self, message_id: &MessageId, resolution: Result<Value, ProtocolError>) -> bool {
        let sender = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(message_id);
        let Some(sender) = sender else {
            tracing::warn!(message_id = %message_id, "acknowledgement for unknown or expired message");
            return false;
        };
        if sender.send(resolution).is_err() {
            tracing::debug!(message_id = %message_id, "caller dropped before acknowledgement");
            return false;
        }
        true
    }

    /// Forget a pending entry without resolving it.
    pub fn cancel(&self, message_id: &MessageId) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(message_id)
            .is_some()
    }

    /// Drop every pending entry. Waiting callers observe
    /// [`FleetError::TransportUnavailable`].
    pub fn clear(&self) {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// Suspend until `call` is resolved or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// - [`FleetError::CommandTimeout`] when no acknowledgement arrived in
    ///   time; the entry is removed.
    /// - [`FleetError::Protocol`] when the device answered with `ERROR`.
    /// - [`FleetError::TransportUnavailable`] when the table was cleared.
    pub async fn await_response(&self, call: PendingCall, timeout: Duration) -> Result<Value, FleetError> {
        let PendingCall { message_id, receiver } = call;
        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(Ok(payload))) => Ok(payload),
            Ok(Ok(Err(protocol))) => Err(protocol.into()),
            Ok(Err(_closed)) => Err(FleetError::TransportUnavailable),
            Err(_elapsed) => {
                self.cancel(&message_id);
                tracing::warn!(message_id = %message_id, ?timeout, "command timed out");
                Err(CommandTimeoutError { message_id, timeout }.into())
            }
        }
    }

    /// Number of calls still waiting.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use serde_json::json;

    fn id(value: &str) -> MessageId {
        MessageId::new(value)
    }

    #[tokio::test]
    async fn should_resolve_registered_call() {
        let table = CorrelationTable::new();
        let call = table.register(id("m1")).unwrap();
        assert!(table.resolve(&id("m1"), Ok(json!({"ok": true}))));

        let payload = table.await_response(call, Duration::from_secs(1)).await.unwrap();
        assert_eq!(payload, json!({"ok": true}));
        assert_eq!(table.pending_count(), 0);
    }

    #[test]
    fn should_reject_duplicate_registration() {
        let table = CorrelationTable::new();
        let _call = table.register(id("m1")).unwrap();
        let err = table.register(id("m1")).unwrap_err();
        assert_eq!(err, ValidationError::DuplicateMessageId(id("m1")));
        assert_eq!(table.pending_count(), 1);
    }

    #[test]
    fn should_ignore_unknown_resolution() {
        let table = CorrelationTable::new();
        assert!(!table.resolve(&id("nobody"), Ok(json!({}))));
    }

    #[tokio::test]
    async fn should_surface_protocol_error() {
        let table = CorrelationTable::new();
        let call = table.register(id("m1")).unwrap();
        table.resolve(&id("m1"), Err(ProtocolError { payload: json!({"error": {"code": 5000}}) }));

        let err = table.await_response(call, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, FleetError::Protocol(ProtocolError { payload }) if payload["error"]["code"] == 5000));
    }

    #[tokio::test(start_paused = true)]
    async fn should_time_out_and_forget_entry() {
        let table = CorrelationTable::new();
        let call = table.register(id("m1")).unwrap();

        let err = table.await_response(call, Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(
            err,
            FleetError::CommandTimeout(CommandTimeoutError { ref message_id, .. }) if *message_id == id("m1")
        ));
        assert_eq!(table.pending_count(), 0);
        assert!(!table.resolve(&id("m1"), Ok(json!({}))));
    }

    #[tokio::test]
    async fn should_fail_waiting_calls_when_cleared() {
        let table = CorrelationTable::new();
        let call = table.register(id("m1")).unwrap();
        table.clear();
        let err = table.await_response(call, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, FleetError::TransportUnavailable));
    }

    #[tokio::test]
    async fn should_never_cross_concurrent_resolutions() {
        let table = Arc::new(CorrelationTable::new());
        let mut waiters = Vec::new();
        for index in 0..16 {
            let call = table.register(id(&format!("m{index}"))).unwrap();
            let table = Arc::clone(&table);
            waiters.push(tokio::spawn(async move {
                table.await_response(call, Duration::from_secs(5)).await
            }));
        }
        for index in (0..16).rev() {
            assert!(table.resolve(&id(&format!("m{index}")), Ok(json!({"index": index}))));
        }
        for (index, waiter) in waiters.into_iter().enumerate() {
            let payload = waiter.await.unwrap().unwrap();
            assert_eq!(payload, json!({"index": index}));
        }
    }
}
