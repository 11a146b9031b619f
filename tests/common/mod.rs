use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tempfile::TempDir;

use tarndb::storage::buffer::BufferManager;
use tarndb::storage::disk::FileManager;
use tarndb::transaction::transaction::TxnIdGenerator;
use tarndb::transaction::{LockTable, LogManager, Transaction};
use tarndb::DbConfig;

// Wire the engine's managers together against a scratch directory, the way
// the database boot does, but without running recovery, so tests control
// the transaction numbering and the log contents from a clean slate.
#[allow(dead_code)]
pub struct TestEngine {
    pub file_manager: Arc<FileManager>,
    pub log_manager: Arc<LogManager>,
    pub buffer_manager: Arc<BufferManager>,
    pub lock_table: Arc<LockTable>,
    pub txn_ids: Arc<TxnIdGenerator>,
    _dir: TempDir,
}

impl TestEngine {
    #[allow(dead_code)]
    pub fn new_transaction(&self) -> Result<Transaction> {
        Ok(Transaction::new(
            self.file_manager.clone(),
            self.log_manager.clone(),
            self.buffer_manager.clone(),
            self.lock_table.clone(),
            &self.txn_ids,
        )?)
    }
}

#[allow(dead_code)]
pub fn create_engine(
    block_size: usize,
    num_buffers: usize,
    max_lock_wait: Duration,
    max_buffer_wait: Duration,
) -> Result<TestEngine> {
    init_logging();
    let dir = TempDir::new()?;
    let file_manager = Arc::new(FileManager::new(dir.path().join("db"), block_size)?);
    let log_manager = Arc::new(LogManager::new(file_manager.clone(), "logfile")?);
    let buffer_manager = Arc::new(BufferManager::new(
        file_manager.clone(),
        log_manager.clone(),
        num_buffers,
        max_buffer_wait,
    ));
    let lock_table = Arc::new(LockTable::new(max_lock_wait));
    Ok(TestEngine {
        file_manager,
        log_manager,
        buffer_manager,
        lock_table,
        txn_ids: Arc::new(TxnIdGenerator::new()),
        _dir: dir,
    })
}

// A configuration with short waits pointed at a subdirectory of `dir`, for
// tests that go through the Database boot path (possibly several times
// over the same directory).
#[allow(dead_code)]
pub fn test_config(dir: &TempDir) -> DbConfig {
    init_logging();
    DbConfig {
        db_directory: dir.path().join("db"),
        block_size: 400,
        num_buffers: 8,
        max_lock_wait: Duration::from_secs(2),
        max_buffer_wait: Duration::from_secs(2),
        ..DbConfig::default()
    }
}

#[allow(dead_code)]
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
