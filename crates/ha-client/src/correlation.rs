//! Correlation of outgoing commands with their `result` frames

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::codec::ResultFrame;
use crate::error::{ClientError, ClientResult};

type Resolver = oneshot::Sender<ClientResult<Value>>;

/// Outstanding commands keyed by id
///
/// Ids start at 1 and only ever grow for the lifetime of one table, which is
/// owned by one connection. Each entry is removed exactly once: by the first
/// matching result frame, by [`forget`](Self::forget), or by
/// [`fail_all`](Self::fail_all).
pub struct PendingCommands {
    next_id: AtomicU64,
    pending: DashMap<u64, Resolver>,
}

impl PendingCommands {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: DashMap::new(),
        }
    }

    /// Allocate the next id and park a resolver under it
    pub fn register(&self) -> (u64, oneshot::Receiver<ClientResult<Value>>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        trace!(id, "Registered pending command");
        (id, rx)
    }

    /// Complete the command a result frame belongs to
    ///
    /// Returns false when no command with that id is pending; such frames are
    /// ignored since they can belong to a command that was already failed.
    pub fn resolve(&self, frame: ResultFrame) -> bool {
        let id = frame.id;
        self.complete(id, frame.into_outcome())
    }

    /// Complete a `ping` with its `pong`
    pub fn resolve_pong(&self, id: u64) -> bool {
        self.complete(id, Ok(Value::Null))
    }

    fn complete(&self, id: u64, outcome: ClientResult<Value>) -> bool {
        match self.pending.remove(&id) {
            Some((_, tx)) => {
                // The caller may have stopped waiting; that is not our problem
                let _ = tx.send(outcome);
                true
            }
            None => {
                debug!(id, "Ignoring result for unknown command id");
                false
            }
        }
    }

    /// Drop a command that never made it onto the wire
    pub fn forget(&self, id: u64) {
        self.pending.remove(&id);
    }

    /// Reject every outstanding command; returns how many were failed
    pub fn fail_all(&self, reason: &str) -> usize {
        let ids: Vec<u64> = self.pending.iter().map(|entry| *entry.key()).collect();
        let mut failed = 0;
        for id in ids {
            if self.complete(id, Err(ClientError::ConnectionLost(reason.to_string()))) {
                failed += 1;
            }
        }
        failed
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// The id the next registered command will get
    pub fn peek_next_id(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst)
    }
}

impl Default for PendingCommands {
    fn default() -> Self {
        Self::new()
    }
}
