use crate::storage::buffer::frame::FramePtr;
use crate::storage::buffer::replacer::ReplacementStrategy;

/// Picks the first unpinned frame found by a linear scan.
#[derive(Default)]
pub struct NaiveStrategy;

impl NaiveStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl ReplacementStrategy for NaiveStrategy {
    fn initialize(&mut self, _frames: &[FramePtr]) {}

    fn on_pin(&mut self, _frame_id: usize) {}

    fn on_unpin(&mut self, _frame_id: usize) {}

    fn choose_unpinned(&mut self, frames: &[FramePtr]) -> Option<usize> {
        frames.iter().position(|frame| !frame.read().is_pinned())
    }
}
