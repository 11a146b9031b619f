use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

use crate::common::types::BlockId;

#[derive(Error, Debug)]
pub enum LockError {
    #[error("lock abort: timed out waiting for shared lock on {0}")]
    SharedTimeout(BlockId),

    #[error("lock abort: timed out waiting for exclusive lock on {0}")]
    ExclusiveTimeout(BlockId),
}

/// The global lock table. Each entry counts the holders of a block-level
/// lock: a positive value is the number of shared holders, -1 marks an
/// exclusive holder, and an absent entry is unlocked.
///
/// There is one wait list for all blocks: releasing the last lock on any
/// block wakes every waiter, and each re-checks its own block. Conflicting
/// requests wait up to `max_wait` and then fail with a lock abort, which
/// doubles as the deadlock response — there is no wait-for graph.
///
/// `xlock` assumes the caller already holds a shared lock on the block and
/// only upgrades it; calling it cold grants an exclusive lock on an
/// unlocked block without that protection. The per-transaction
/// `ConcurrencyManager` maintains the assumption.
pub struct LockTable {
    locks: Mutex<HashMap<BlockId, i32>>,
    waiters: Condvar,
    max_wait: Duration,
}

impl LockTable {
    pub fn new(max_wait: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            waiters: Condvar::new(),
            max_wait,
        }
    }

    /// Acquire a shared lock on `block`.
    pub fn slock(&self, block: &BlockId) -> Result<(), LockError> {
        let deadline = Instant::now() + self.max_wait;
        let mut locks = self.locks.lock();
        loop {
            let holders = locks.get(block).copied().unwrap_or(0);
            if holders >= 0 {
                locks.insert(block.clone(), holders + 1);
                return Ok(());
            }
            if self.waiters.wait_until(&mut locks, deadline).timed_out() {
                return Err(LockError::SharedTimeout(block.clone()));
            }
        }
    }

    /// Upgrade the caller's shared lock on `block` to exclusive, waiting
    /// for other shared holders to drain.
    pub fn xlock(&self, block: &BlockId) -> Result<(), LockError> {
        let deadline = Instant::now() + self.max_wait;
        let mut locks = self.locks.lock();
        loop {
            let holders = locks.get(block).copied().unwrap_or(0);
            if holders <= 1 {
                locks.insert(block.clone(), -1);
                return Ok(());
            }
            if self.waiters.wait_until(&mut locks, deadline).timed_out() {
                return Err(LockError::ExclusiveTimeout(block.clone()));
            }
        }
    }

    /// Release one lock on `block` and wake every waiter to re-race.
    /// Upgraders wait for the holder count to drop to one, which leaves
    /// the entry in place, so waking only when an entry is removed would
    /// strand them.
    pub fn unlock(&self, block: &BlockId) {
        let mut locks = self.locks.lock();
        let holders = locks.get(block).copied().unwrap_or(0);
        if holders > 1 {
            locks.insert(block.clone(), holders - 1);
        } else {
            locks.remove(block);
        }
        self.waiters.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn table(max_wait: Duration) -> Arc<LockTable> {
        Arc::new(LockTable::new(max_wait))
    }

    #[test]
    fn multiple_shared_holders() {
        let lt = table(Duration::from_millis(200));
        let blk = BlockId::new("testfile", 1);
        lt.slock(&blk).unwrap();
        lt.slock(&blk).unwrap();
        lt.unlock(&blk);
        lt.unlock(&blk);
    }

    #[test]
    fn sole_sharer_can_upgrade() {
        let lt = table(Duration::from_millis(200));
        let blk = BlockId::new("testfile", 1);
        lt.slock(&blk).unwrap();
        lt.xlock(&blk).unwrap();
        lt.unlock(&blk);

        // fully released: a fresh shared lock is granted
        lt.slock(&blk).unwrap();
        lt.unlock(&blk);
    }

    #[test]
    fn slock_times_out_against_exclusive_holder() {
        let lt = table(Duration::from_millis(200));
        let blk = BlockId::new("testfile", 1);
        lt.slock(&blk).unwrap();
        lt.xlock(&blk).unwrap();

        let lt2 = lt.clone();
        let blk2 = blk.clone();
        let handle = thread::spawn(move || lt2.slock(&blk2));
        let result = handle.join().unwrap();
        assert!(matches!(result, Err(LockError::SharedTimeout(_))));
        lt.unlock(&blk);
    }

    #[test]
    fn upgrade_times_out_while_other_sharers_remain() {
        let lt = table(Duration::from_millis(200));
        let blk = BlockId::new("testfile", 1);
        lt.slock(&blk).unwrap();

        let lt2 = lt.clone();
        let blk2 = blk.clone();
        let handle = thread::spawn(move || {
            lt2.slock(&blk2).unwrap();
            lt2.xlock(&blk2)
        });
        let result = handle.join().unwrap();
        assert!(matches!(result, Err(LockError::ExclusiveTimeout(_))));
    }

    #[test]
    fn waiter_wakes_when_exclusive_is_released() {
        let lt = table(Duration::from_secs(5));
        let blk = BlockId::new("testfile", 1);
        lt.slock(&blk).unwrap();
        lt.xlock(&blk).unwrap();

        let lt2 = lt.clone();
        let blk2 = blk.clone();
        let handle = thread::spawn(move || lt2.slock(&blk2));

        thread::sleep(Duration::from_millis(100));
        lt.unlock(&blk);
        let started = Instant::now();
        handle.join().unwrap().unwrap();
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
