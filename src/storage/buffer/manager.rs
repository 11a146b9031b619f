use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};

use crate::common::types::{BlockId, TxnId};
use crate::storage::buffer::error::BufferError;
use crate::storage::buffer::frame::{Buffer, FramePtr};
use crate::storage::buffer::replacer::{NaiveStrategy, ReplacementStrategy};
use crate::storage::disk::FileManager;
use crate::transaction::wal::log_manager::LogManager;

struct PoolState {
    num_available: usize,
    strategy: Box<dyn ReplacementStrategy>,
}

/// A fixed pool of buffer frames mapping disk blocks into memory.
///
/// Pinning a block either finds the frame already holding it or evicts an
/// unpinned frame chosen by the replacement strategy, flushing the evicted
/// page first (log before data, preserving the write-ahead rule). When
/// every frame is pinned, `pin` waits on a condition variable until a
/// frame frees up or the configured wait expires with a buffer abort.
pub struct BufferManager {
    frames: Vec<FramePtr>,
    state: Mutex<PoolState>,
    available_cond: Condvar,
    max_wait: Duration,
}

impl BufferManager {
    /// A pool with the default naive replacement strategy.
    pub fn new(
        file_manager: Arc<FileManager>,
        log_manager: Arc<LogManager>,
        num_buffers: usize,
        max_wait: Duration,
    ) -> Self {
        Self::with_strategy(
            file_manager,
            log_manager,
            num_buffers,
            max_wait,
            Box::new(NaiveStrategy::new()),
        )
    }

    pub fn with_strategy(
        file_manager: Arc<FileManager>,
        log_manager: Arc<LogManager>,
        num_buffers: usize,
        max_wait: Duration,
        mut strategy: Box<dyn ReplacementStrategy>,
    ) -> Self {
        let frames: Vec<FramePtr> = (0..num_buffers)
            .map(|id| {
                Arc::new(RwLock::new(Buffer::new(
                    id,
                    file_manager.clone(),
                    log_manager.clone(),
                )))
            })
            .collect();
        strategy.initialize(&frames);

        Self {
            frames,
            state: Mutex::new(PoolState {
                num_available: num_buffers,
                strategy,
            }),
            available_cond: Condvar::new(),
            max_wait,
        }
    }

    /// Number of frames with a zero pin count.
    pub fn available(&self) -> usize {
        self.state.lock().num_available
    }

    /// Pin `block` into a frame, waiting up to the configured limit for a
    /// frame to free up. Expiry fails with `BufferError::BufferAbort`; the
    /// caller is expected to abort its transaction and retry.
    pub fn pin(&self, block: &BlockId) -> Result<FramePtr, BufferError> {
        let deadline = Instant::now() + self.max_wait;
        let mut state = self.state.lock();
        loop {
            if let Some(frame) = self.try_to_pin(&mut state, block)? {
                return Ok(frame);
            }
            if self
                .available_cond
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                // one last attempt in case a frame freed up at the wire
                return match self.try_to_pin(&mut state, block)? {
                    Some(frame) => Ok(frame),
                    None => Err(BufferError::BufferAbort(block.clone())),
                };
            }
        }
    }

    /// Release one pin on `frame`. When the pin count reaches zero the
    /// frame becomes eligible for replacement and waiters are woken.
    pub fn unpin(&self, frame: &FramePtr) {
        let mut state = self.state.lock();
        let mut guard = frame.write();
        guard.unpin();
        state.strategy.on_unpin(guard.id());
        if !guard.is_pinned() {
            state.num_available += 1;
            self.available_cond.notify_all();
        }
    }

    /// Flush every frame modified by `txn_id`.
    pub fn flush_all(&self, txn_id: TxnId) -> Result<(), BufferError> {
        let _state = self.state.lock();
        for frame in &self.frames {
            let mut guard = frame.write();
            if guard.modifying_txn() == Some(txn_id) {
                guard.flush()?;
            }
        }
        Ok(())
    }

    fn try_to_pin(
        &self,
        state: &mut PoolState,
        block: &BlockId,
    ) -> Result<Option<FramePtr>, BufferError> {
        let frame = match self.find_existing(block) {
            Some(frame) => frame,
            None => match state.strategy.choose_unpinned(&self.frames) {
                Some(id) => {
                    let frame = self.frames[id].clone();
                    frame.write().assign_to_block(block.clone())?;
                    frame
                }
                None => return Ok(None),
            },
        };

        let mut guard = frame.write();
        if !guard.is_pinned() {
            state.num_available -= 1;
        }
        guard.pin();
        state.strategy.on_pin(guard.id());
        drop(guard);
        Ok(Some(frame))
    }

    fn find_existing(&self, block: &BlockId) -> Option<FramePtr> {
        self.frames
            .iter()
            .find(|frame| frame.read().block() == Some(block))
            .cloned()
    }
}
