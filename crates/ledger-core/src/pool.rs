//! Pending transactions awaiting the next block.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::constants::MAX_TRANSACTION_LEN;
use crate::error::{LedgerError, Result};
use crate::Transaction;

/// Insertion-ordered pool. Every operation takes the inner lock once, so
/// `add`, `drain` and `restore` are each atomic with respect to one another.
#[derive(Debug)]
pub struct TransactionPool {
    max_len: usize,
    pending: Mutex<VecDeque<Transaction>>,
}

impl Default for TransactionPool {
    fn default() -> Self {
        Self::new(MAX_TRANSACTION_LEN)
    }
}

impl TransactionPool {
    /// Create a pool accepting transactions of at most `max_len` characters.
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len,
            pending: Mutex::new(VecDeque::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Transaction>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Check `text` against the pool's admission rules.
    pub fn check(&self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Err(LedgerError::Validation(
                "transaction data cannot be empty".into(),
            ));
        }
        let len = text.chars().count();
        if len > self.max_len {
            return Err(LedgerError::Validation(format!(
                "transaction is {len} characters, limit is {}",
                self.max_len
            )));
        }
        Ok(())
    }

    /// Append a transaction and return the pool size after the add.
    pub fn add(&self, text: impl Into<String>) -> Result<usize> {
        let text = text.into();
        self.check(&text)?;
        let mut pending = self.lock();
        pending.push_back(Transaction::new(text));
        debug!("transaction accepted, {} pending", pending.len());
        Ok(pending.len())
    }

    /// Remove and return everything pending, in insertion order.
    pub fn drain(&self) -> Vec<Transaction> {
        self.lock().drain(..).collect()
    }

    /// Like [`drain`](Self::drain), but fails with `EmptyPool` instead of
    /// returning an empty batch. The emptiness check and the drain happen
    /// under the same lock.
    pub fn drain_nonempty(&self) -> Result<Vec<Transaction>> {
        let mut pending = self.lock();
        if pending.is_empty() {
            return Err(LedgerError::EmptyPool);
        }
        Ok(pending.drain(..).collect())
    }

    /// Put a previously drained batch back at the front of the pool, ahead of
    /// anything added since the drain.
    pub fn restore(&self, batch: Vec<Transaction>) {
        if batch.is_empty() {
            return;
        }
        let mut pending = self.lock();
        debug!("restoring {} transactions to the pool", batch.len());
        for tx in batch.into_iter().rev() {
            pending.push_front(tx);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of the pending transactions, oldest first.
    pub fn snapshot(&self) -> Vec<Transaction> {
        self.lock().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn add_reports_pool_size() {
        let pool = TransactionPool::default();
        assert_eq!(pool.add("first").unwrap(), 1);
        assert_eq!(pool.add("second").unwrap(), 2);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn rejects_empty_and_blank() {
        let pool = TransactionPool::default();
        assert!(matches!(pool.add(""), Err(LedgerError::Validation(_))));
        assert!(matches!(pool.add("   \n"), Err(LedgerError::Validation(_))));
        assert!(pool.is_empty());
    }

    #[test]
    fn length_limit_counts_characters() {
        let pool = TransactionPool::new(5);
        assert_eq!(pool.add("abcde").unwrap(), 1);
        assert!(matches!(pool.add("abcdef"), Err(LedgerError::Validation(_))));
        // five multi-byte characters are still five characters
        assert_eq!(pool.add("ééééé").unwrap(), 2);
    }

    #[test]
    fn drain_preserves_order_and_empties() {
        let pool = TransactionPool::default();
        for text in ["a", "b", "c"] {
            pool.add(text).unwrap();
        }
        let batch = pool.drain();
        let texts: Vec<&str> = batch.iter().map(Transaction::as_str).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
        assert!(pool.is_empty());
        assert!(pool.drain().is_empty());
    }

    #[test]
    fn drain_nonempty_fails_on_empty_pool() {
        let pool = TransactionPool::default();
        assert_eq!(pool.drain_nonempty().unwrap_err(), LedgerError::EmptyPool);
        pool.add("x").unwrap();
        assert_eq!(pool.drain_nonempty().unwrap().len(), 1);
    }

    #[test]
    fn restore_puts_batch_ahead_of_newer_entries() {
        let pool = TransactionPool::default();
        pool.add("a").unwrap();
        pool.add("b").unwrap();
        let batch = pool.drain();
        pool.add("c").unwrap();
        pool.restore(batch);
        let texts: Vec<String> = pool.snapshot().into_iter().map(|t| t.data).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[test]
    fn concurrent_adds_and_drains_conserve_transactions() {
        let pool = Arc::new(TransactionPool::default());
        let writers: Vec<_> = (0..4)
            .map(|w| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    for i in 0..250 {
                        pool.add(format!("w{w}-{i}")).unwrap();
                    }
                })
            })
            .collect();
        let drainer = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                let mut seen = 0usize;
                for _ in 0..100 {
                    seen += pool.drain().len();
                    thread::yield_now();
                }
                seen
            })
        };
        for w in writers {
            w.join().unwrap();
        }
        let drained = drainer.join().unwrap();
        assert_eq!(drained + pool.len(), 1000);
    }
}
