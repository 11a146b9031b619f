use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::common::types::{BlockId, Lsn};
use crate::storage::disk::{FileManager, FileManagerError};
use crate::storage::page::{Page, INT_SIZE};

#[derive(Error, Debug)]
pub enum LogError {
    #[error("file manager error: {0}")]
    File(#[from] FileManagerError),
}

#[derive(Debug)]
struct LogState {
    log_page: Page,
    current_block: BlockId,
    latest_lsn: Lsn,
    last_saved_lsn: Lsn,
}

/// Manages the append-only log file.
///
/// The log file is a sequence of blocks, each used as an arena that fills
/// from the top of the block downward. The first `INT_SIZE` bytes of a
/// block hold the boundary: the offset of the most recently written record.
/// Because records grow backwards within a block while blocks are appended
/// forwards, walking blocks last-to-first and records boundary-to-end
/// visits records in reverse chronological order.
///
/// Records appended here live in the in-memory working page until `flush`
/// (or a block rollover) writes them out; callers that need durability
/// must flush up to the LSN they care about.
#[derive(Debug)]
pub struct LogManager {
    file_manager: Arc<FileManager>,
    log_file: String,
    state: Mutex<LogState>,
}

impl LogManager {
    /// Open the log, positioning the working page at the last block of the
    /// log file, or at a fresh block if the log is empty.
    pub fn new(file_manager: Arc<FileManager>, log_file: &str) -> Result<Self, LogError> {
        let mut log_page = Page::new(file_manager.block_size());
        let log_size = file_manager.length(log_file)?;

        let current_block = if log_size == 0 {
            Self::append_new_block(&file_manager, log_file, &mut log_page)?
        } else {
            let block = BlockId::new(log_file, log_size - 1);
            file_manager.read(&block, &mut log_page)?;
            block
        };

        Ok(Self {
            file_manager,
            log_file: log_file.to_string(),
            state: Mutex::new(LogState {
                log_page,
                current_block,
                latest_lsn: 0,
                last_saved_lsn: 0,
            }),
        })
    }

    /// Append a record and return its LSN. The record is placed just below
    /// the current boundary; if it does not fit, the working block is
    /// flushed and a fresh block is started. The record is not durable
    /// until the log is flushed past its LSN.
    pub fn append(&self, record: &[u8]) -> Result<Lsn, LogError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let mut boundary = state.log_page.get_int(0) as usize;
        let bytes_needed = record.len() + INT_SIZE;
        if boundary < bytes_needed + INT_SIZE {
            // no room above the boundary field; roll to a fresh block
            self.flush_locked(state)?;
            state.current_block =
                Self::append_new_block(&self.file_manager, &self.log_file, &mut state.log_page)?;
            boundary = state.log_page.get_int(0) as usize;
        }

        let record_pos = boundary - bytes_needed;
        state.log_page.set_bytes(record_pos, record);
        state.log_page.set_int(0, record_pos as i32);

        state.latest_lsn += 1;
        Ok(state.latest_lsn)
    }

    /// Ensure the record with the given LSN is on disk. Flushing writes
    /// the whole working block, so everything up to `latest_lsn` becomes
    /// durable at once.
    pub fn flush(&self, lsn: Lsn) -> Result<(), LogError> {
        let mut state = self.state.lock();
        if lsn >= state.last_saved_lsn {
            self.flush_locked(&mut state)?;
        }
        Ok(())
    }

    /// An iterator over the log records in reverse chronological order.
    /// The log is flushed first so the iterator sees every appended record.
    pub fn iterator(&self) -> Result<LogIterator, LogError> {
        let mut state = self.state.lock();
        self.flush_locked(&mut state)?;
        LogIterator::new(self.file_manager.clone(), state.current_block.clone())
    }

    fn flush_locked(&self, state: &mut LogState) -> Result<(), LogError> {
        self.file_manager.write(&state.current_block, &state.log_page)?;
        state.last_saved_lsn = state.latest_lsn;
        Ok(())
    }

    /// Extend the log file with an empty block whose boundary starts at
    /// the block size, and make it the working page.
    fn append_new_block(
        file_manager: &FileManager,
        log_file: &str,
        log_page: &mut Page,
    ) -> Result<BlockId, LogError> {
        let block = file_manager.append(log_file)?;
        let mut fresh = Page::new(file_manager.block_size());
        fresh.set_int(0, file_manager.block_size() as i32);
        *log_page = fresh;
        file_manager.write(&block, log_page)?;
        Ok(block)
    }
}

/// Walks the log newest-record-first, yielding raw record bytes.
pub struct LogIterator {
    file_manager: Arc<FileManager>,
    block: BlockId,
    page: Page,
    current_pos: usize,
}

impl LogIterator {
    fn new(file_manager: Arc<FileManager>, block: BlockId) -> Result<Self, LogError> {
        let page = Page::new(file_manager.block_size());
        let mut iter = Self {
            file_manager,
            block,
            page,
            current_pos: 0,
        };
        iter.move_to_current_block()?;
        Ok(iter)
    }

    /// Load the iterator's block and position the cursor at its boundary,
    /// i.e. at the newest record in the block.
    fn move_to_current_block(&mut self) -> Result<(), LogError> {
        self.file_manager.read(&self.block, &mut self.page)?;
        self.current_pos = self.page.get_int(0) as usize;
        Ok(())
    }
}

impl Iterator for LogIterator {
    type Item = Result<Vec<u8>, LogError>;

    fn next(&mut self) -> Option<Self::Item> {
        let block_size = self.file_manager.block_size();
        if self.current_pos == block_size {
            if self.block.number() == 0 {
                return None;
            }
            self.block = BlockId::new(self.block.filename(), self.block.number() - 1);
            if let Err(e) = self.move_to_current_block() {
                return Some(Err(e));
            }
        }
        let record = self.page.get_bytes(self.current_pos);
        self.current_pos += INT_SIZE + record.len();
        Some(Ok(record))
    }
}
