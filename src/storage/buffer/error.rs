use thiserror::Error;

use crate::common::types::BlockId;
use crate::storage::disk::FileManagerError;
use crate::transaction::wal::log_manager::LogError;

#[derive(Error, Debug)]
pub enum BufferError {
    #[error("buffer abort: timed out waiting to pin block {0}")]
    BufferAbort(BlockId),

    #[error("file manager error: {0}")]
    File(#[from] FileManagerError),

    #[error("log error: {0}")]
    Log(#[from] LogError),
}
