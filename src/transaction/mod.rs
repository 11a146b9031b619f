pub mod concurrency;
pub mod recovery;
#[allow(clippy::module_inception)]
pub mod transaction;
pub mod wal;

pub use concurrency::{ConcurrencyManager, LockError, LockTable};
pub use recovery::RecoveryManager;
pub use transaction::{Transaction, TransactionError, TransactionState, TxnIdGenerator};
pub use wal::{LogIterator, LogManager, LogRecord};
