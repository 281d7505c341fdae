//! Request id allocation and matching of command results to waiting callers.

use crate::error::{Result, YeelightError};
use crate::protocol::CommandResult;
use log::debug;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use tokio::sync::oneshot;
use tokio::time::{Duration, Instant};

struct Pending {
    generation: u64,
    tx: oneshot::Sender<Result<Value>>,
    deadline: Instant,
}

/// Handle returned by [`Correlator::register`], awaited with [`Correlator::wait`].
#[derive(Debug)]
pub struct Ticket {
    id: u32,
    generation: u64,
    timeout: Duration,
    rx: oneshot::Receiver<Result<Value>>,
}

impl Ticket {
    pub fn id(&self) -> u32 {
        self.id
    }
}

/// Pending-request table of one device.
///
/// The table has its own lock, independent of the connection's write lock, so
/// the read loop can resolve results while a writer is blocked on the socket.
pub struct Correlator {
    next_id: AtomicU32,
    generation: AtomicU64,
    pending: Mutex<HashMap<u32, Pending>>,
    unmatched: AtomicU64,
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

impl Correlator {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub(crate) fn starting_at(first_id: u32) -> Self {
        Self {
            next_id: AtomicU32::new(first_id),
            generation: AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
            unmatched: AtomicU64::new(0),
        }
    }

    /// Returns the next request id. Wraps around past `u32::MAX`, never yielding 0.
    pub fn next_id(&self) -> u32 {
        loop {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return id;
            }
        }
    }

    /// Creates the pending slot for `id`.
    ///
    /// A stale entry under the same id is removed and completed with
    /// [`YeelightError::Cancelled`] before the new one is inserted.
    pub fn register(&self, id: u32, timeout: Duration) -> Ticket {
        let (tx, rx) = oneshot::channel();
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let entry = Pending {
            generation,
            tx,
            deadline: Instant::now() + timeout,
        };

        let mut pending = self.pending.lock();
        if let Some(stale) = pending.remove(&id) {
            debug!("Cancelling stale request with reused id {}", id);
            let _ = stale.tx.send(Err(YeelightError::Cancelled));
        }
        pending.insert(id, entry);

        Ticket {
            id,
            generation,
            timeout,
            rx,
        }
    }

    /// Completes the caller waiting on `result.id`.
    ///
    /// Returns false when no request is waiting for that id; the result is dropped.
    pub fn resolve(&self, result: CommandResult) -> bool {
        let entry = self.pending.lock().remove(&result.id);
        match entry {
            Some(p) => {
                let _ = p.tx.send(result.into_outcome());
                true
            }
            None => {
                self.unmatched.fetch_add(1, Ordering::Relaxed);
                debug!("Dropping result for unknown request id {}", result.id);
                false
            }
        }
    }

    /// Removes the entry for `ticket` if it has not been superseded.
    pub fn cancel(&self, ticket: &Ticket) {
        self.remove_if_current(ticket.id, ticket.generation);
    }

    fn remove_if_current(&self, id: u32, generation: u64) {
        let mut pending = self.pending.lock();
        if pending.get(&id).is_some_and(|p| p.generation == generation) {
            pending.remove(&id);
        }
    }

    /// Waits for the result of a registered request.
    pub async fn wait(&self, mut ticket: Ticket) -> Result<Value> {
        match tokio::time::timeout(ticket.timeout, &mut ticket.rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(YeelightError::Cancelled),
            Err(_) => {
                self.cancel(&ticket);
                debug!("Request {} timed out after {:?}", ticket.id, ticket.timeout);
                Err(YeelightError::Timeout)
            }
        }
    }

    /// Fails every entry whose deadline is at or before `now` with `Timeout`.
    pub fn expire_overdue(&self, now: Instant) -> usize {
        let mut expired = Vec::new();
        {
            let mut pending = self.pending.lock();
            let ids: Vec<u32> = pending
                .iter()
                .filter(|(_, p)| p.deadline <= now)
                .map(|(id, _)| *id)
                .collect();
            for id in ids {
                if let Some(p) = pending.remove(&id) {
                    expired.push(p);
                }
            }
        }
        let count = expired.len();
        for p in expired {
            let _ = p.tx.send(Err(YeelightError::Timeout));
        }
        if count > 0 {
            debug!("Expired {} overdue request(s)", count);
        }
        count
    }

    /// Fails every pending request with `error`.
    pub fn fail_all(&self, error: YeelightError) -> usize {
        let drained: Vec<Pending> = self.pending.lock().drain().map(|(_, p)| p).collect();
        let count = drained.len();
        for p in drained {
            let _ = p.tx.send(Err(error.clone()));
        }
        count
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Results received for ids nobody was waiting on.
    pub fn unmatched_count(&self) -> u64 {
        self.unmatched.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn ids_skip_zero_on_wrap() {
        let c = Correlator::starting_at(u32::MAX - 1);
        assert_eq!(c.next_id(), u32::MAX - 1);
        assert_eq!(c.next_id(), u32::MAX);
        assert_eq!(c.next_id(), 1);
        assert_eq!(c.next_id(), 2);
    }

    #[tokio::test]
    async fn results_resolve_out_of_order() {
        let c = Correlator::new();
        let first = c.register(c.next_id(), WAIT);
        let second = c.register(c.next_id(), WAIT);
        assert_eq!(c.pending_count(), 2);

        assert!(c.resolve(CommandResult::ok(second.id(), json!(["two"]))));
        assert!(c.resolve(CommandResult::ok(first.id(), json!(["one"]))));

        assert_eq!(c.wait(first).await.unwrap(), json!(["one"]));
        assert_eq!(c.wait(second).await.unwrap(), json!(["two"]));
        assert_eq!(c.pending_count(), 0);
    }

    #[tokio::test]
    async fn reused_id_cancels_the_stale_entry() {
        let c = Correlator::new();
        let stale = c.register(7, WAIT);
        let fresh = c.register(7, WAIT);
        assert_eq!(c.pending_count(), 1);

        c.resolve(CommandResult::ok(7, json!(["ok"])));

        assert!(matches!(c.wait(stale).await, Err(YeelightError::Cancelled)));
        assert_eq!(c.wait(fresh).await.unwrap(), json!(["ok"]));
    }

    #[tokio::test]
    async fn missing_result_times_out() {
        let c = Correlator::new();
        let ticket = c.register(c.next_id(), Duration::from_millis(20));

        let err = c.wait(ticket).await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(c.pending_count(), 0);
    }

    #[tokio::test]
    async fn device_errors_are_delivered() {
        let c = Correlator::new();
        let ticket = c.register(3, WAIT);
        c.resolve(CommandResult::failed(3, -1, "method not supported"));

        let err = c.wait(ticket).await.unwrap_err();
        assert_eq!(err.protocol_error(), Some((-1, "method not supported")));
    }

    #[test]
    fn unknown_ids_are_counted() {
        let c = Correlator::new();
        assert!(!c.resolve(CommandResult::ok(99, json!(["ok"]))));
        assert_eq!(c.unmatched_count(), 1);
    }

    #[tokio::test]
    async fn fail_all_drains_the_table() {
        let c = Correlator::new();
        let a = c.register(1, WAIT);
        let b = c.register(2, WAIT);

        assert_eq!(c.fail_all(YeelightError::Disconnected), 2);
        assert!(matches!(c.wait(a).await, Err(YeelightError::Disconnected)));
        assert!(matches!(c.wait(b).await, Err(YeelightError::Disconnected)));
    }

    #[tokio::test]
    async fn sweep_reclaims_abandoned_entries() {
        let c = Correlator::new();
        let _abandoned = c.register(1, Duration::from_millis(10));
        let live = c.register(2, WAIT);

        assert_eq!(c.expire_overdue(Instant::now() + Duration::from_millis(50)), 1);
        assert_eq!(c.pending_count(), 1);
        c.cancel(&live);
        assert_eq!(c.pending_count(), 0);
    }
}
