pub mod error;
pub mod frame;
pub mod manager;
pub mod replacer;

pub use error::BufferError;
pub use frame::{Buffer, FramePtr};
pub use manager::BufferManager;
pub use replacer::ReplacementStrategy;
