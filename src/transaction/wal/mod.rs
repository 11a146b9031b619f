pub mod log_manager;
pub mod log_record;

pub use log_manager::{LogError, LogIterator, LogManager};
pub use log_record::{LogRecord, LogRecordError, LogRecordType};
