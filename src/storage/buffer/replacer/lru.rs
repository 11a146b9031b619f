use std::collections::VecDeque;

use crate::storage::buffer::frame::FramePtr;
use crate::storage::buffer::replacer::ReplacementStrategy;

/// Evicts the least-recently-unpinned frame. Recency is tracked as a queue
/// ordered oldest-first; pinning removes a frame from consideration and
/// unpinning reinserts it at the back.
#[derive(Default)]
pub struct LruStrategy {
    queue: VecDeque<usize>,
}

impl LruStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    fn remove(&mut self, frame_id: usize) {
        if let Some(pos) = self.queue.iter().position(|&id| id == frame_id) {
            self.queue.remove(pos);
        }
    }
}

impl ReplacementStrategy for LruStrategy {
    fn initialize(&mut self, frames: &[FramePtr]) {
        self.queue = (0..frames.len()).collect();
    }

    fn on_pin(&mut self, frame_id: usize) {
        self.remove(frame_id);
    }

    fn on_unpin(&mut self, frame_id: usize) {
        self.remove(frame_id);
        self.queue.push_back(frame_id);
    }

    fn choose_unpinned(&mut self, frames: &[FramePtr]) -> Option<usize> {
        let pos = self
            .queue
            .iter()
            .position(|&id| !frames[id].read().is_pinned())?;
        self.queue.remove(pos)
    }
}
