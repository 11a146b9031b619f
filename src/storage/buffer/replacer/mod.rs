pub mod clock;
pub mod lru;
pub mod naive;

pub use clock::ClockStrategy;
pub use lru::LruStrategy;
pub use naive::NaiveStrategy;

use crate::common::config::ReplacementPolicy;
use crate::storage::buffer::frame::FramePtr;

/// Victim-selection policy for the buffer pool. The pool calls back into
/// the strategy on every pin and unpin; `choose_unpinned` picks the frame
/// to evict, or `None` when every frame is pinned. All callbacks run under
/// the pool's mutex.
pub trait ReplacementStrategy: Send {
    /// Called once with the frame pool before any other callback.
    fn initialize(&mut self, frames: &[FramePtr]);

    /// A frame was pinned.
    fn on_pin(&mut self, frame_id: usize);

    /// A frame's pin count was decremented (it may still be pinned).
    fn on_unpin(&mut self, frame_id: usize);

    /// Pick an unpinned frame to reuse.
    fn choose_unpinned(&mut self, frames: &[FramePtr]) -> Option<usize>;
}

/// Build the strategy selected by the configuration.
pub fn build(policy: ReplacementPolicy) -> Box<dyn ReplacementStrategy> {
    match policy {
        ReplacementPolicy::Naive => Box::new(NaiveStrategy::new()),
        ReplacementPolicy::Lru => Box::new(LruStrategy::new()),
        ReplacementPolicy::Clock => Box::new(ClockStrategy::new()),
    }
}
