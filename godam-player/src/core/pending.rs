//! Pending Request Table
//!
//! Tracks commands awaiting a correlated response. Each record is removed
//! exactly once: by the response router, by teardown, by an expiry sweep
//! once its deadline has passed, or by the [`PendingGuard`] owned by the
//! waiting future (timeout, send failure or the future being dropped).

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use serde_json::Value;
use tokio::sync::oneshot;

use super::timer::Deadline;
use super::{ClientError, ClientResult, CommandName, CorrelationId};

/// Outcome delivered to a waiting command
pub type Settlement = ClientResult<Value>;

/// Shared handle to the table
pub type SharedPending = Rc<RefCell<PendingRequests>>;

/// A command awaiting its response
#[derive(Debug)]
pub struct PendingRecord {
    command: CommandName,
    sender: oneshot::Sender<Settlement>,
    deadline: Deadline,
    timeout_ms: u64,
}

impl PendingRecord {
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_expired()
    }

    /// Rejects the waiter with [`ClientError::CommandTimeout`]
    pub fn expire(self) {
        let err = ClientError::CommandTimeout {
            command: self.command.clone(),
            timeout_ms: self.timeout_ms,
        };
        self.settle(Err(err));
    }

    /// Delivers the outcome. The waiter may already be gone, which is fine.
    pub fn settle(self, outcome: Settlement) {
        let _ = self.sender.send(outcome);
    }
}

/// Correlation id -> pending record
#[derive(Debug, Default)]
pub struct PendingRequests {
    entries: HashMap<CorrelationId, PendingRecord>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedPending {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Registers a waiter for `id` that expires at `deadline`. Ids are never
    /// registered twice.
    pub fn register(
        &mut self,
        id: CorrelationId,
        command: &str,
        deadline: Deadline,
        timeout_ms: u64,
    ) -> ClientResult<oneshot::Receiver<Settlement>> {
        if self.entries.contains_key(&id) {
            return Err(ClientError::Validation(format!(
                "correlation id '{}' is already pending",
                id
            )));
        }
        let (sender, receiver) = oneshot::channel();
        self.entries.insert(
            id,
            PendingRecord {
                command: command.to_string(),
                sender,
                deadline,
                timeout_ms,
            },
        );
        Ok(receiver)
    }

    /// Removes and returns the record for `id`
    pub fn take(&mut self, id: &str) -> Option<PendingRecord> {
        self.entries.remove(id)
    }

    /// Removes every record whose deadline has passed
    pub fn take_expired(&mut self) -> Vec<(CorrelationId, PendingRecord)> {
        let expired: Vec<CorrelationId> = self
            .entries
            .iter()
            .filter(|(_, record)| record.is_expired())
            .map(|(id, _)| id.clone())
            .collect();
        expired
            .into_iter()
            .filter_map(|id| self.entries.remove(&id).map(|record| (id, record)))
            .collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Removes every record, leaving the table empty
    pub fn drain(&mut self) -> Vec<(CorrelationId, PendingRecord)> {
        self.entries.drain().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sorted ids of pending commands (for diagnostics)
    pub fn ids(&self) -> Vec<CorrelationId> {
        let mut ids: Vec<CorrelationId> = self.entries.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }
}

/// Releases a pending record when the waiting side goes away.
///
/// Dropping the guard after the record was already settled is a no-op.
#[derive(Debug)]
pub struct PendingGuard {
    table: Weak<RefCell<PendingRequests>>,
    id: CorrelationId,
}

impl PendingGuard {
    pub fn new(table: &SharedPending, id: CorrelationId) -> Self {
        Self {
            table: Rc::downgrade(table),
            id,
        }
    }

    pub fn id(&self) -> &CorrelationId {
        &self.id
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let Some(table) = self.table.upgrade() else {
            return;
        };
        let released = match table.try_borrow_mut() {
            Ok(mut table) => table.take(self.id.as_str()),
            Err(_) => {
                tracing::warn!(id = %self.id, "pending table busy; record not released");
                None
            }
        };
        if let Some(record) = released {
            tracing::trace!(id = %self.id, command = record.command(), "released pending record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn window() -> Deadline {
        Deadline::after(Duration::from_millis(5000))
    }

    #[test]
    fn test_register_and_take() {
        let mut table = PendingRequests::new();
        let id = CorrelationId::new(1, 100);

        let _rx = table.register(id.clone(), "play", window(), 5000).unwrap();
        assert!(table.contains("godam_1_100"));
        assert_eq!(table.len(), 1);

        let record = table.take(id.as_str()).unwrap();
        assert_eq!(record.command(), "play");
        assert!(table.is_empty());
        assert!(table.take(id.as_str()).is_none());
    }

    #[test]
    fn test_duplicate_id_is_rejected() {
        let mut table = PendingRequests::new();
        let id = CorrelationId::new(1, 100);

        let _rx = table.register(id.clone(), "play", window(), 5000).unwrap();
        assert!(table.register(id, "pause", window(), 5000).is_err());
        assert_eq!(table.len(), 1);
    }

    #[tokio::test]
    async fn test_settle_delivers_outcome() {
        let mut table = PendingRequests::new();
        let id = CorrelationId::new(2, 100);
        let rx = table.register(id.clone(), "getVolume", window(), 5000).unwrap();

        table
            .take(id.as_str())
            .unwrap()
            .settle(Ok(serde_json::json!({ "volume": 0.5 })));

        let value = rx.await.unwrap().unwrap();
        assert_eq!(value["volume"], 0.5);
    }

    #[test]
    fn test_guard_releases_record_on_drop() {
        let table = PendingRequests::shared();
        let id = CorrelationId::new(3, 100);
        let _rx = table.borrow_mut().register(id.clone(), "pause", window(), 5000).unwrap();

        let guard = PendingGuard::new(&table, id);
        assert_eq!(table.borrow().len(), 1);

        drop(guard);
        assert!(table.borrow().is_empty());
    }

    #[test]
    fn test_guard_after_settlement_is_noop() {
        let table = PendingRequests::shared();
        let first = CorrelationId::new(4, 100);
        let second = CorrelationId::new(5, 100);
        let _rx1 = table.borrow_mut().register(first.clone(), "play", window(), 5000).unwrap();
        let _rx2 = table.borrow_mut().register(second.clone(), "pause", window(), 5000).unwrap();

        let guard = PendingGuard::new(&table, first.clone());
        let record = table.borrow_mut().take(first.as_str()).unwrap();
        record.settle(Ok(Value::Null));
        drop(guard);

        assert_eq!(table.borrow().ids(), vec![second]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_take_expired_rejects_with_timeout() {
        let mut table = PendingRequests::new();
        let short = CorrelationId::new(1, 1);
        let long = CorrelationId::new(2, 1);
        let rx = table
            .register(short.clone(), "pause", Deadline::after(Duration::from_millis(100)), 100)
            .unwrap();
        let _keep = table.register(long.clone(), "play", window(), 5000).unwrap();

        assert!(table.take_expired().is_empty());
        tokio::time::advance(Duration::from_millis(150)).await;

        let expired = table.take_expired();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].0, short);
        for (_, record) in expired {
            record.expire();
        }

        assert_eq!(table.ids(), vec![long]);
        let err = rx.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            ClientError::CommandTimeout { ref command, timeout_ms: 100 } if command == "pause"
        ));
    }

    #[test]
    fn test_drain_empties_table() {
        let mut table = PendingRequests::new();
        let _a = table.register(CorrelationId::new(1, 1), "play", window(), 5000).unwrap();
        let _b = table.register(CorrelationId::new(2, 1), "pause", window(), 5000).unwrap();

        let drained = table.drain();
        assert_eq!(drained.len(), 2);
        assert!(table.is_empty());
    }
}
