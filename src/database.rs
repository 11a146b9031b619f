use std::sync::Arc;

use crate::common::config::DbConfig;
use crate::storage::buffer::manager::BufferManager;
use crate::storage::buffer::replacer;
use crate::storage::disk::FileManager;
use crate::transaction::concurrency::lock_table::LockTable;
use crate::transaction::transaction::{Transaction, TransactionError, TxnIdGenerator};
use crate::transaction::wal::log_manager::LogManager;

/// An embedded database instance: the file, log, and buffer managers, the
/// global lock table, and the transaction number source.
///
/// Construction runs the full boot protocol — open the directory (removing
/// stale `temp*` files), open the log, build the buffer pool, and run
/// restart recovery on a dedicated transaction — so by the time `new`
/// returns, the effects of every unfinished transaction from the previous
/// run have been rolled back.
pub struct Database {
    file_manager: Arc<FileManager>,
    log_manager: Arc<LogManager>,
    buffer_manager: Arc<BufferManager>,
    lock_table: Arc<LockTable>,
    txn_ids: Arc<TxnIdGenerator>,
}

impl Database {
    pub fn new(config: DbConfig) -> Result<Self, TransactionError> {
        let file_manager = Arc::new(FileManager::new(&config.db_directory, config.block_size)?);
        let log_manager = Arc::new(LogManager::new(file_manager.clone(), &config.log_filename)?);
        let buffer_manager = Arc::new(BufferManager::with_strategy(
            file_manager.clone(),
            log_manager.clone(),
            config.num_buffers,
            config.max_buffer_wait,
            replacer::build(config.replacement_policy),
        ));
        let lock_table = Arc::new(LockTable::new(config.max_lock_wait));
        let txn_ids = Arc::new(TxnIdGenerator::new());

        let db = Self {
            file_manager,
            log_manager,
            buffer_manager,
            lock_table,
            txn_ids,
        };

        let mut recovery_tx = db.new_transaction()?;
        recovery_tx.recover()?;
        Ok(db)
    }

    /// Start a new transaction against this database.
    pub fn new_transaction(&self) -> Result<Transaction, TransactionError> {
        Transaction::new(
            self.file_manager.clone(),
            self.log_manager.clone(),
            self.buffer_manager.clone(),
            self.lock_table.clone(),
            &self.txn_ids,
        )
    }

    pub fn file_manager(&self) -> &Arc<FileManager> {
        &self.file_manager
    }

    pub fn log_manager(&self) -> &Arc<LogManager> {
        &self.log_manager
    }

    pub fn buffer_manager(&self) -> &Arc<BufferManager> {
        &self.buffer_manager
    }

    pub fn lock_table(&self) -> &Arc<LockTable> {
        &self.lock_table
    }
}
