use std::collections::HashSet;
use std::sync::Arc;

use crate::common::types::{Lsn, TxnId};
use crate::storage::buffer::manager::BufferManager;
use crate::storage::buffer::frame::FramePtr;
use crate::transaction::transaction::{Transaction, TransactionError};
use crate::transaction::wal::log_manager::LogManager;
use crate::transaction::wal::log_record::LogRecord;

/// Per-transaction recovery component. Writes the transaction's log
/// records (Start on creation, a pre-image record for every update, and
/// the terminal Commit/Rollback/Checkpoint markers) and drives the
/// undo-only rollback and restart-recovery protocols.
///
/// Undo needs to write through a live transaction, so `rollback` and
/// `recover` take the transaction as an argument instead of holding a
/// reference back to it.
#[derive(Clone)]
pub struct RecoveryManager {
    log_manager: Arc<LogManager>,
    buffer_manager: Arc<BufferManager>,
    txn_id: TxnId,
}

impl RecoveryManager {
    /// Create the recovery manager for `txn_id`, logging its Start record.
    pub fn new(
        txn_id: TxnId,
        log_manager: Arc<LogManager>,
        buffer_manager: Arc<BufferManager>,
    ) -> Result<Self, TransactionError> {
        LogRecord::Start { txn_id }.write_to_log(&log_manager)?;
        Ok(Self {
            log_manager,
            buffer_manager,
            txn_id,
        })
    }

    /// Make the transaction durable: flush its modified buffers, then
    /// write and flush a Commit record. The buffers go first — with an
    /// undo-only log there is no redo pass, so committed data must be on
    /// disk before the commit record is.
    pub fn commit(&self) -> Result<(), TransactionError> {
        self.buffer_manager.flush_all(self.txn_id)?;
        let lsn = LogRecord::Commit { txn_id: self.txn_id }.write_to_log(&self.log_manager)?;
        self.log_manager.flush(lsn)?;
        Ok(())
    }

    /// Undo every change the transaction made, newest first, then flush
    /// its buffers and write and flush a Rollback record.
    pub fn rollback(&self, tx: &mut Transaction) -> Result<(), TransactionError> {
        self.do_rollback(tx)?;
        self.buffer_manager.flush_all(self.txn_id)?;
        let lsn = LogRecord::Rollback { txn_id: self.txn_id }.write_to_log(&self.log_manager)?;
        self.log_manager.flush(lsn)?;
        Ok(())
    }

    /// Restart recovery: undo every update belonging to a transaction
    /// with no Commit or Rollback record, stopping at the most recent
    /// checkpoint. Finishes by flushing all restored pages and writing a
    /// fresh quiescent Checkpoint so the next recovery stops immediately.
    pub fn recover(&self, tx: &mut Transaction) -> Result<(), TransactionError> {
        self.do_recover(tx)?;
        self.buffer_manager.flush_all(self.txn_id)?;
        let lsn = LogRecord::Checkpoint.write_to_log(&self.log_manager)?;
        self.log_manager.flush(lsn)?;
        log::info!("recovery complete, checkpoint written");
        Ok(())
    }

    /// Log the pre-image of the int at `offset` before it is overwritten.
    /// Returns the LSN the caller stamps onto the buffer.
    pub fn set_int(&self, frame: &FramePtr, offset: usize) -> Result<Lsn, TransactionError> {
        let (block, value) = {
            let guard = frame.read();
            let block = guard.block().cloned().ok_or(TransactionError::UnassignedBuffer)?;
            (block, guard.contents().get_int(offset))
        };
        let record = LogRecord::SetInt {
            txn_id: self.txn_id,
            block,
            offset,
            value,
        };
        Ok(record.write_to_log(&self.log_manager)?)
    }

    pub fn set_long(&self, frame: &FramePtr, offset: usize) -> Result<Lsn, TransactionError> {
        let (block, value) = {
            let guard = frame.read();
            let block = guard.block().cloned().ok_or(TransactionError::UnassignedBuffer)?;
            (block, guard.contents().get_long(offset))
        };
        let record = LogRecord::SetLong {
            txn_id: self.txn_id,
            block,
            offset,
            value,
        };
        Ok(record.write_to_log(&self.log_manager)?)
    }

    pub fn set_short(&self, frame: &FramePtr, offset: usize) -> Result<Lsn, TransactionError> {
        let (block, value) = {
            let guard = frame.read();
            let block = guard.block().cloned().ok_or(TransactionError::UnassignedBuffer)?;
            (block, guard.contents().get_short(offset))
        };
        let record = LogRecord::SetShort {
            txn_id: self.txn_id,
            block,
            offset,
            value,
        };
        Ok(record.write_to_log(&self.log_manager)?)
    }

    pub fn set_bool(&self, frame: &FramePtr, offset: usize) -> Result<Lsn, TransactionError> {
        let (block, value) = {
            let guard = frame.read();
            let block = guard.block().cloned().ok_or(TransactionError::UnassignedBuffer)?;
            (block, guard.contents().get_bool(offset))
        };
        let record = LogRecord::SetBool {
            txn_id: self.txn_id,
            block,
            offset,
            value,
        };
        Ok(record.write_to_log(&self.log_manager)?)
    }

    pub fn set_string(&self, frame: &FramePtr, offset: usize) -> Result<Lsn, TransactionError> {
        let (block, value) = {
            let guard = frame.read();
            let block = guard.block().cloned().ok_or(TransactionError::UnassignedBuffer)?;
            (block, guard.contents().get_string(offset)?)
        };
        let record = LogRecord::SetString {
            txn_id: self.txn_id,
            block,
            offset,
            value,
        };
        Ok(record.write_to_log(&self.log_manager)?)
    }

    pub fn set_date(&self, frame: &FramePtr, offset: usize) -> Result<Lsn, TransactionError> {
        let (block, value) = {
            let guard = frame.read();
            let block = guard.block().cloned().ok_or(TransactionError::UnassignedBuffer)?;
            (block, guard.contents().get_date(offset)?)
        };
        let record = LogRecord::SetDate {
            txn_id: self.txn_id,
            block,
            offset,
            value,
        };
        Ok(record.write_to_log(&self.log_manager)?)
    }

    /// Walk the log newest-to-oldest, undoing this transaction's updates
    /// until its Start record is reached.
    fn do_rollback(&self, tx: &mut Transaction) -> Result<(), TransactionError> {
        for bytes in self.log_manager.iterator()? {
            let record = LogRecord::from_bytes(&bytes?)?;
            if record.txn_id() == Some(self.txn_id) {
                if let LogRecord::Start { .. } = record {
                    break;
                }
                log::debug!("undoing {}", record);
                record.undo(tx)?;
            }
        }
        Ok(())
    }

    /// Walk the log newest-to-oldest, undoing updates of transactions that
    /// never finished. A Commit or Rollback record marks its transaction
    /// finished for everything older; a Checkpoint bounds the scan.
    fn do_recover(&self, tx: &mut Transaction) -> Result<(), TransactionError> {
        let mut finished: HashSet<TxnId> = HashSet::new();
        for bytes in self.log_manager.iterator()? {
            let record = LogRecord::from_bytes(&bytes?)?;
            match &record {
                LogRecord::Checkpoint => break,
                LogRecord::Commit { txn_id } | LogRecord::Rollback { txn_id } => {
                    finished.insert(*txn_id);
                }
                _ => {
                    if let Some(txn_id) = record.txn_id() {
                        if !finished.contains(&txn_id) {
                            log::debug!("undoing {}", record);
                            record.undo(tx)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
