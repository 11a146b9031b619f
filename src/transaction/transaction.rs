use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::common::types::{BlockId, BlockNum, TxnId};
use crate::storage::buffer::error::BufferError;
use crate::storage::buffer::frame::FramePtr;
use crate::storage::buffer::manager::BufferManager;
use crate::storage::disk::{FileManager, FileManagerError};
use crate::storage::page::PageError;
use crate::transaction::concurrency::lock_table::{LockError, LockTable};
use crate::transaction::concurrency::manager::ConcurrencyManager;
use crate::transaction::recovery::RecoveryManager;
use crate::transaction::wal::log_manager::{LogError, LogManager};
use crate::transaction::wal::log_record::LogRecordError;

#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("transaction {0} is no longer active")]
    InvalidState(TxnId),

    #[error("block {0} is not pinned by this transaction")]
    BlockNotPinned(BlockId),

    #[error("buffer is not assigned to a block")]
    UnassignedBuffer,

    #[error("file manager error: {0}")]
    File(#[from] FileManagerError),

    #[error("log error: {0}")]
    Log(#[from] LogError),

    #[error("buffer error: {0}")]
    Buffer(#[from] BufferError),

    #[error("lock error: {0}")]
    Lock(#[from] LockError),

    #[error("page error: {0}")]
    Page(#[from] PageError),

    #[error("log record error: {0}")]
    Record(#[from] LogRecordError),
}

/// Transaction lifecycle. `Committed` and `Aborted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
}

/// Hands out monotonically increasing transaction numbers. One generator
/// per database instance, so tests and embedded engines stay independent.
pub struct TxnIdGenerator {
    next: AtomicI32,
}

impl TxnIdGenerator {
    pub fn new() -> Self {
        Self {
            next: AtomicI32::new(1),
        }
    }

    pub fn next_id(&self) -> TxnId {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for TxnIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

struct PinnedBuffer {
    frame: FramePtr,
    pins: u32,
}

/// The blocks a transaction currently has pinned, with a local reference
/// count per block: nested pins of one block by the same transaction take
/// a single pool pin.
struct BufferList {
    buffers: HashMap<BlockId, PinnedBuffer>,
    buffer_manager: Arc<BufferManager>,
}

impl BufferList {
    fn new(buffer_manager: Arc<BufferManager>) -> Self {
        Self {
            buffers: HashMap::new(),
            buffer_manager,
        }
    }

    fn get(&self, block: &BlockId) -> Option<&FramePtr> {
        self.buffers.get(block).map(|pinned| &pinned.frame)
    }

    fn pin(&mut self, block: &BlockId) -> Result<(), BufferError> {
        if let Some(pinned) = self.buffers.get_mut(block) {
            pinned.pins += 1;
            return Ok(());
        }
        let frame = self.buffer_manager.pin(block)?;
        self.buffers.insert(block.clone(), PinnedBuffer { frame, pins: 1 });
        Ok(())
    }

    fn unpin(&mut self, block: &BlockId) {
        if let Some(pinned) = self.buffers.get_mut(block) {
            pinned.pins -= 1;
            if pinned.pins == 0 {
                self.buffer_manager.unpin(&pinned.frame);
                self.buffers.remove(block);
            }
        }
    }

    fn unpin_all(&mut self) {
        for pinned in self.buffers.values() {
            for _ in 0..pinned.pins {
                self.buffer_manager.unpin(&pinned.frame);
            }
        }
        self.buffers.clear();
    }
}

/// A database transaction. Every read takes a shared lock on the block it
/// touches and every write an exclusive one; locks are held until commit
/// or rollback (strict two-phase locking), so transactions see a
/// serializable history. Updates log their pre-image before the page
/// changes, which is what makes rollback and restart recovery possible.
///
/// A transaction is driven by a single thread.
pub struct Transaction {
    file_manager: Arc<FileManager>,
    buffer_manager: Arc<BufferManager>,
    recovery_manager: RecoveryManager,
    concurrency_manager: ConcurrencyManager,
    buffers: BufferList,
    txn_id: TxnId,
    state: TransactionState,
}

impl Transaction {
    pub fn new(
        file_manager: Arc<FileManager>,
        log_manager: Arc<LogManager>,
        buffer_manager: Arc<BufferManager>,
        lock_table: Arc<LockTable>,
        txn_ids: &TxnIdGenerator,
    ) -> Result<Self, TransactionError> {
        let txn_id = txn_ids.next_id();
        let recovery_manager =
            RecoveryManager::new(txn_id, log_manager, buffer_manager.clone())?;
        Ok(Self {
            file_manager,
            buffer_manager: buffer_manager.clone(),
            recovery_manager,
            concurrency_manager: ConcurrencyManager::new(lock_table),
            buffers: BufferList::new(buffer_manager),
            txn_id,
            state: TransactionState::Active,
        })
    }

    pub fn txn_id(&self) -> TxnId {
        self.txn_id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Commit: flush this transaction's buffers and its commit record,
    /// then release all locks and pins.
    pub fn commit(&mut self) -> Result<(), TransactionError> {
        if self.state != TransactionState::Active {
            return Err(TransactionError::InvalidState(self.txn_id));
        }
        self.recovery_manager.commit()?;
        self.concurrency_manager.release();
        self.buffers.unpin_all();
        self.state = TransactionState::Committed;
        log::info!("transaction {} committed", self.txn_id);
        Ok(())
    }

    /// Roll back: undo every change this transaction made, write a
    /// rollback record, then release all locks and pins.
    pub fn rollback(&mut self) -> Result<(), TransactionError> {
        if self.state != TransactionState::Active {
            return Err(TransactionError::InvalidState(self.txn_id));
        }
        let recovery_manager = self.recovery_manager.clone();
        recovery_manager.rollback(self)?;
        self.concurrency_manager.release();
        self.buffers.unpin_all();
        self.state = TransactionState::Aborted;
        log::info!("transaction {} rolled back", self.txn_id);
        Ok(())
    }

    /// Restart recovery. Run once, on a fresh transaction, at system
    /// start, before any application transaction begins. Undoes the
    /// updates of every unfinished transaction and writes a quiescent
    /// checkpoint; the locks and pins taken while undoing are released
    /// afterwards so recovered blocks are immediately usable.
    pub fn recover(&mut self) -> Result<(), TransactionError> {
        let recovery_manager = self.recovery_manager.clone();
        recovery_manager.recover(self)?;
        self.concurrency_manager.release();
        self.buffers.unpin_all();
        Ok(())
    }

    /// Pin `block` for the duration of the transaction (or until the
    /// matching `unpin`).
    pub fn pin(&mut self, block: &BlockId) -> Result<(), TransactionError> {
        Ok(self.buffers.pin(block)?)
    }

    pub fn unpin(&mut self, block: &BlockId) {
        self.buffers.unpin(block);
    }

    pub fn get_int(&mut self, block: &BlockId, offset: usize) -> Result<i32, TransactionError> {
        self.concurrency_manager.slock(block)?;
        let frame = self.pinned_frame(block)?;
        let value = frame.read().contents().get_int(offset);
        Ok(value)
    }

    pub fn set_int(
        &mut self,
        block: &BlockId,
        offset: usize,
        value: i32,
        log_it: bool,
    ) -> Result<(), TransactionError> {
        self.concurrency_manager.xlock(block)?;
        let frame = self.pinned_frame(block)?;
        let lsn = if log_it {
            Some(self.recovery_manager.set_int(&frame, offset)?)
        } else {
            None
        };
        let mut guard = frame.write();
        guard.contents_mut().set_int(offset, value);
        guard.set_modified(self.txn_id, lsn);
        Ok(())
    }

    pub fn get_long(&mut self, block: &BlockId, offset: usize) -> Result<i64, TransactionError> {
        self.concurrency_manager.slock(block)?;
        let frame = self.pinned_frame(block)?;
        let value = frame.read().contents().get_long(offset);
        Ok(value)
    }

    pub fn set_long(
        &mut self,
        block: &BlockId,
        offset: usize,
        value: i64,
        log_it: bool,
    ) -> Result<(), TransactionError> {
        self.concurrency_manager.xlock(block)?;
        let frame = self.pinned_frame(block)?;
        let lsn = if log_it {
            Some(self.recovery_manager.set_long(&frame, offset)?)
        } else {
            None
        };
        let mut guard = frame.write();
        guard.contents_mut().set_long(offset, value);
        guard.set_modified(self.txn_id, lsn);
        Ok(())
    }

    pub fn get_short(&mut self, block: &BlockId, offset: usize) -> Result<i16, TransactionError> {
        self.concurrency_manager.slock(block)?;
        let frame = self.pinned_frame(block)?;
        let value = frame.read().contents().get_short(offset);
        Ok(value)
    }

    pub fn set_short(
        &mut self,
        block: &BlockId,
        offset: usize,
        value: i16,
        log_it: bool,
    ) -> Result<(), TransactionError> {
        self.concurrency_manager.xlock(block)?;
        let frame = self.pinned_frame(block)?;
        let lsn = if log_it {
            Some(self.recovery_manager.set_short(&frame, offset)?)
        } else {
            None
        };
        let mut guard = frame.write();
        guard.contents_mut().set_short(offset, value);
        guard.set_modified(self.txn_id, lsn);
        Ok(())
    }

    pub fn get_bool(&mut self, block: &BlockId, offset: usize) -> Result<bool, TransactionError> {
        self.concurrency_manager.slock(block)?;
        let frame = self.pinned_frame(block)?;
        let value = frame.read().contents().get_bool(offset);
        Ok(value)
    }

    pub fn set_bool(
        &mut self,
        block: &BlockId,
        offset: usize,
        value: bool,
        log_it: bool,
    ) -> Result<(), TransactionError> {
        self.concurrency_manager.xlock(block)?;
        let frame = self.pinned_frame(block)?;
        let lsn = if log_it {
            Some(self.recovery_manager.set_bool(&frame, offset)?)
        } else {
            None
        };
        let mut guard = frame.write();
        guard.contents_mut().set_bool(offset, value);
        guard.set_modified(self.txn_id, lsn);
        Ok(())
    }

    pub fn get_string(&mut self, block: &BlockId, offset: usize) -> Result<String, TransactionError> {
        self.concurrency_manager.slock(block)?;
        let frame = self.pinned_frame(block)?;
        let value = frame.read().contents().get_string(offset)?;
        Ok(value)
    }

    pub fn set_string(
        &mut self,
        block: &BlockId,
        offset: usize,
        value: &str,
        log_it: bool,
    ) -> Result<(), TransactionError> {
        self.concurrency_manager.xlock(block)?;
        let frame = self.pinned_frame(block)?;
        let lsn = if log_it {
            Some(self.recovery_manager.set_string(&frame, offset)?)
        } else {
            None
        };
        let mut guard = frame.write();
        guard.contents_mut().set_string(offset, value);
        guard.set_modified(self.txn_id, lsn);
        Ok(())
    }

    pub fn get_date(
        &mut self,
        block: &BlockId,
        offset: usize,
    ) -> Result<DateTime<Utc>, TransactionError> {
        self.concurrency_manager.slock(block)?;
        let frame = self.pinned_frame(block)?;
        let value = frame.read().contents().get_date(offset)?;
        Ok(value)
    }

    pub fn set_date(
        &mut self,
        block: &BlockId,
        offset: usize,
        value: DateTime<Utc>,
        log_it: bool,
    ) -> Result<(), TransactionError> {
        self.concurrency_manager.xlock(block)?;
        let frame = self.pinned_frame(block)?;
        let lsn = if log_it {
            Some(self.recovery_manager.set_date(&frame, offset)?)
        } else {
            None
        };
        let mut guard = frame.write();
        guard.contents_mut().set_date(offset, value);
        guard.set_modified(self.txn_id, lsn);
        Ok(())
    }

    /// Number of blocks in `filename`. Takes a shared lock on the file's
    /// end-of-file marker so no concurrent append can change the answer
    /// out from under the transaction.
    pub fn size(&mut self, filename: &str) -> Result<BlockNum, TransactionError> {
        let eof_marker = BlockId::end_of_file(filename);
        self.concurrency_manager.slock(&eof_marker)?;
        Ok(self.file_manager.length(filename)?)
    }

    /// Append a fresh block to `filename`. Takes an exclusive lock on the
    /// file's end-of-file marker to keep concurrent size readers out.
    pub fn append(&mut self, filename: &str) -> Result<BlockId, TransactionError> {
        let eof_marker = BlockId::end_of_file(filename);
        self.concurrency_manager.xlock(&eof_marker)?;
        Ok(self.file_manager.append(filename)?)
    }

    pub fn block_size(&self) -> usize {
        self.file_manager.block_size()
    }

    pub fn available_buffers(&self) -> usize {
        self.buffer_manager.available()
    }

    fn pinned_frame(&self, block: &BlockId) -> Result<FramePtr, TransactionError> {
        self.buffers
            .get(block)
            .cloned()
            .ok_or_else(|| TransactionError::BlockNotPinned(block.clone()))
    }
}
