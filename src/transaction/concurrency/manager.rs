use std::collections::HashMap;
use std::sync::Arc;

use crate::common::types::BlockId;
use crate::transaction::concurrency::lock_table::{LockError, LockTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockMode {
    Shared,
    Exclusive,
}

/// Per-transaction view of the lock table. Remembers which locks the
/// transaction holds so repeated requests are free, performs the
/// shared-then-upgrade ordering the lock table's `xlock` requires, and
/// releases everything at once when the transaction ends (strict 2PL).
pub struct ConcurrencyManager {
    lock_table: Arc<LockTable>,
    locks: HashMap<BlockId, LockMode>,
}

impl ConcurrencyManager {
    pub fn new(lock_table: Arc<LockTable>) -> Self {
        Self {
            lock_table,
            locks: HashMap::new(),
        }
    }

    /// Obtain a shared lock on `block`, if this transaction holds no lock
    /// on it yet.
    pub fn slock(&mut self, block: &BlockId) -> Result<(), LockError> {
        if !self.locks.contains_key(block) {
            self.lock_table.slock(block)?;
            self.locks.insert(block.clone(), LockMode::Shared);
        }
        Ok(())
    }

    /// Obtain an exclusive lock on `block`, first taking a shared lock if
    /// needed and then upgrading it.
    pub fn xlock(&mut self, block: &BlockId) -> Result<(), LockError> {
        if self.locks.get(block) != Some(&LockMode::Exclusive) {
            self.slock(block)?;
            self.lock_table.xlock(block)?;
            self.locks.insert(block.clone(), LockMode::Exclusive);
        }
        Ok(())
    }

    /// Release every lock this transaction holds.
    pub fn release(&mut self) {
        for block in self.locks.keys() {
            self.lock_table.unlock(block);
        }
        self.locks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn repeated_slock_takes_one_table_lock() {
        let lt = Arc::new(LockTable::new(Duration::from_millis(200)));
        let blk = BlockId::new("testfile", 1);

        let mut cm = ConcurrencyManager::new(lt.clone());
        cm.slock(&blk).unwrap();
        cm.slock(&blk).unwrap();
        cm.release();

        // if release balanced the acquisitions, another tx can upgrade
        let mut other = ConcurrencyManager::new(lt);
        other.slock(&blk).unwrap();
        other.xlock(&blk).unwrap();
        other.release();
    }

    #[test]
    fn xlock_upgrades_and_is_idempotent() {
        let lt = Arc::new(LockTable::new(Duration::from_millis(200)));
        let blk = BlockId::new("testfile", 1);

        let mut cm = ConcurrencyManager::new(lt.clone());
        cm.xlock(&blk).unwrap();
        cm.xlock(&blk).unwrap();
        cm.release();

        let mut other = ConcurrencyManager::new(lt);
        other.slock(&blk).unwrap();
        other.release();
    }

    #[test]
    fn xlock_after_slock_holds_single_entry() {
        let lt = Arc::new(LockTable::new(Duration::from_millis(200)));
        let blk = BlockId::new("testfile", 1);

        let mut cm = ConcurrencyManager::new(lt.clone());
        cm.slock(&blk).unwrap();
        cm.xlock(&blk).unwrap();
        cm.release();

        let mut other = ConcurrencyManager::new(lt);
        other.slock(&blk).unwrap();
        other.release();
    }
}
