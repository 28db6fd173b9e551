//! Transaction runtime (spec §4.B).
//!
//! A transaction is a thread-local critical section over a [`Pool`]: at
//! most one active per thread at a time. Mutating engine operations open
//! one via [`Transaction::run`], which hands the closure a [`Journal`] to
//! `snapshot` any persistent range before mutating it in place. On success
//! the journal's undo log is discarded and the touched pages are flushed;
//! on error (including a panic unwinding out of the closure) the log is
//! replayed in reverse to restore the pre-transaction bytes.
//!
//! This plays the role the teacher's `stm::Journal` plays for a
//! multi-pool, persistent-linked-list-of-pages journal pinned inside the
//! pool itself. Here there is one concrete pool type and the journal is a
//! plain in-memory `Vec`, since it only needs to survive for the lifetime of
//! one `Transaction::run` call, not across a crash, since `libpmemkv`'s
//! own transaction scope (built on `libpmemobj`) works the same way: the
//! durability guarantee comes from flushing the *target* bytes at commit,
//! not from the undo log itself being persistent.

use std::cell::Cell;

use crate::alloc::Pool;
use crate::error::{EngineError, Result};

thread_local! {
    static TX_STATE: Cell<TxState> = Cell::new(TxState::None);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxState {
    None,
    Active,
}

/// A single undo entry: the original bytes that lived at `offset` before
/// the active transaction's first write to that range.
struct UndoRecord {
    offset: u64,
    bytes: Vec<u8>,
}

/// The active transaction's undo log (spec §4.B).
///
/// Handed to the closure passed to [`Transaction::run`]; not constructible
/// outside this module.
pub struct Journal {
    undo: Vec<UndoRecord>,
}

impl Journal {
    fn new() -> Self {
        Journal { undo: Vec::new() }
    }

    /// Records the current bytes under `[offset, offset+len)` in the undo
    /// log. Must be called before any in-place mutation of that range
    /// (spec §4.B: "snapshot(range) before any in-place mutation").
    pub fn snapshot(&mut self, pool: &Pool, offset: u64, len: usize) {
        let bytes = pool.read_bytes(offset, len);
        self.undo.push(UndoRecord { offset, bytes });
    }

    /// Replays the undo log in reverse, restoring every snapshotted range
    /// to its pre-transaction contents.
    fn rollback(&mut self, pool: &Pool) {
        for record in self.undo.drain(..).rev() {
            pool.write_bytes(record.offset, &record.bytes);
        }
    }
}

/// Thread-local transaction scope over a [`Pool`] (spec §4.B).
pub struct Transaction;

impl Transaction {
    /// Runs `body` inside a new transaction against `pool`.
    ///
    /// Returns [`EngineError::TransactionScope`] without invoking `body` if
    /// a transaction is already active on this thread (spec §4.B: "no
    /// reentrancy from within a transaction started by the caller").
    ///
    /// On `Ok`, the touched pages are flushed and the undo log discarded
    /// (commit). On `Err` (or if `body` panics), the undo log is replayed
    /// in reverse (abort) before the error/panic propagates.
    pub fn run<T>(pool: &Pool, body: impl FnOnce(&mut Journal) -> Result<T>) -> Result<T> {
        let already_active = TX_STATE.with(|s| s.get() == TxState::Active);
        if already_active {
            return Err(EngineError::TransactionScope);
        }
        TX_STATE.with(|s| s.set(TxState::Active));

        let mut journal = Journal::new();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| body(&mut journal)));

        TX_STATE.with(|s| s.set(TxState::None));

        match outcome {
            Ok(Ok(value)) => {
                #[cfg(feature = "verbose")]
                println!("          COMMIT     undo entries: {}", journal.undo.len());
                journal.undo.clear();
                pool.flush()?;
                Ok(value)
            }
            Ok(Err(e)) => {
                #[cfg(feature = "verbose")]
                println!("          ABORT      undo entries: {}", journal.undo.len());
                journal.rollback(pool);
                Err(e)
            }
            Err(panic) => {
                #[cfg(feature = "verbose")]
                println!("          ABORT      (panic) undo entries: {}", journal.undo.len());
                journal.rollback(pool);
                std::panic::resume_unwind(panic);
            }
        }
    }

    /// True if a transaction is active on this thread. Engines can assert
    /// `!Transaction::is_active()` on entry to a mutating operation to
    /// surface `TransactionScopeError` instead of relying on `run`'s own
    /// check, when they need the check before doing unrelated prep work.
    pub fn is_active() -> bool {
        TX_STATE.with(|s| s.get() == TxState::Active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::Pool;
    use tempfile::tempdir;

    #[test]
    fn nested_transaction_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pool");
        let pool = Pool::create(&path, 1 << 16).unwrap();

        let result = Transaction::run(&pool, |_j| {
            let inner = Transaction::run(&pool, |_j2| Ok(()));
            assert!(matches!(inner, Err(EngineError::TransactionScope)));
            Ok(())
        });
        assert!(result.is_ok());
    }

    #[test]
    fn abort_restores_snapshotted_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pool");
        let pool = Pool::create(&path, 1 << 16).unwrap();

        let offset = Transaction::run(&pool, |j| pool.reserve(j, 64)).unwrap();
        pool.write_bytes(offset, &[0xAAu8; 64]);

        let result: Result<()> = Transaction::run(&pool, |j| {
            j.snapshot(&pool, offset, 64);
            pool.write_bytes(offset, &[0xBBu8; 64]);
            Err(EngineError::Internal("force abort".into()))
        });
        assert!(result.is_err());
        assert_eq!(pool.read_bytes(offset, 64), vec![0xAAu8; 64]);
    }
}
