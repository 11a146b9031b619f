use std::sync::Arc;

use parking_lot::RwLock;

use crate::common::types::{BlockId, Lsn, TxnId};
use crate::storage::buffer::error::BufferError;
use crate::storage::disk::FileManager;
use crate::storage::page::Page;
use crate::transaction::wal::log_manager::LogManager;

/// Shared handle to a buffer frame.
pub type FramePtr = Arc<RwLock<Buffer>>;

/// A single buffer frame: a page plus its status — the block currently
/// held (if any), the pin count, and, when the page has been modified,
/// the modifying transaction and the LSN of the log record covering the
/// modification.
#[derive(Debug)]
pub struct Buffer {
    id: usize,
    file_manager: Arc<FileManager>,
    log_manager: Arc<LogManager>,
    contents: Page,
    block: Option<BlockId>,
    pins: u32,
    txn_id: Option<TxnId>,
    lsn: Option<Lsn>,
}

impl Buffer {
    pub(crate) fn new(id: usize, file_manager: Arc<FileManager>, log_manager: Arc<LogManager>) -> Self {
        let contents = Page::new(file_manager.block_size());
        Self {
            id,
            file_manager,
            log_manager,
            contents,
            block: None,
            pins: 0,
            txn_id: None,
            lsn: None,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn contents(&self) -> &Page {
        &self.contents
    }

    pub fn contents_mut(&mut self) -> &mut Page {
        &mut self.contents
    }

    pub fn block(&self) -> Option<&BlockId> {
        self.block.as_ref()
    }

    pub fn is_pinned(&self) -> bool {
        self.pins > 0
    }

    /// Record that `txn_id` modified this page. `lsn` is the covering log
    /// record, or `None` when the update was not logged (an undo write);
    /// an unlogged update keeps the previously recorded LSN.
    pub fn set_modified(&mut self, txn_id: TxnId, lsn: Option<Lsn>) {
        self.txn_id = Some(txn_id);
        if lsn.is_some() {
            self.lsn = lsn;
        }
    }

    pub(crate) fn modifying_txn(&self) -> Option<TxnId> {
        self.txn_id
    }

    /// Read `block` into this frame, first writing out the previous page
    /// if it was dirty. The pin count starts over at zero.
    pub(crate) fn assign_to_block(&mut self, block: BlockId) -> Result<(), BufferError> {
        self.flush()?;
        self.block = None;
        self.file_manager.read(&block, &mut self.contents)?;
        self.block = Some(block);
        self.pins = 0;
        Ok(())
    }

    /// Write the page to its block if it is dirty. The log is flushed up
    /// to the page's LSN first, so the log record justifying the change is
    /// durable before the data overwrites the block.
    pub(crate) fn flush(&mut self) -> Result<(), BufferError> {
        if self.txn_id.is_some() {
            if let Some(lsn) = self.lsn {
                self.log_manager.flush(lsn)?;
            }
            if let Some(block) = &self.block {
                self.file_manager.write(block, &self.contents)?;
            }
            self.txn_id = None;
        }
        Ok(())
    }

    pub(crate) fn pin(&mut self) {
        self.pins += 1;
    }

    pub(crate) fn unpin(&mut self) {
        self.pins -= 1;
    }
}
