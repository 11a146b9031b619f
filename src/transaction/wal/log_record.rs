use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::common::types::{BlockId, Lsn, TxnId};
use crate::storage::page::{max_length, Page, PageError, INT_SIZE};
use crate::transaction::transaction::{Transaction, TransactionError};
use crate::transaction::wal::log_manager::{LogError, LogManager};

#[derive(Error, Debug)]
pub enum LogRecordError {
    #[error("unknown log record tag {0}")]
    UnknownRecordType(i32),

    #[error("malformed log record: {0}")]
    Page(#[from] PageError),
}

/// Discriminator tags as stored in the first `INT_SIZE` bytes of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum LogRecordType {
    Checkpoint = 0,
    Start = 1,
    Commit = 2,
    Rollback = 3,
    SetInt = 4,
    SetString = 5,
    SetBool = 6,
    SetLong = 7,
    SetShort = 8,
    SetDate = 9,
}

impl LogRecordType {
    fn from_code(code: i32) -> Result<Self, LogRecordError> {
        match code {
            0 => Ok(Self::Checkpoint),
            1 => Ok(Self::Start),
            2 => Ok(Self::Commit),
            3 => Ok(Self::Rollback),
            4 => Ok(Self::SetInt),
            5 => Ok(Self::SetString),
            6 => Ok(Self::SetBool),
            7 => Ok(Self::SetLong),
            8 => Ok(Self::SetShort),
            9 => Ok(Self::SetDate),
            other => Err(LogRecordError::UnknownRecordType(other)),
        }
    }
}

/// A decoded log record. Update records carry the **pre-image** of the
/// value they overwrote; undo writes that pre-image back.
#[derive(Debug, Clone, PartialEq)]
pub enum LogRecord {
    Checkpoint,
    Start {
        txn_id: TxnId,
    },
    Commit {
        txn_id: TxnId,
    },
    Rollback {
        txn_id: TxnId,
    },
    SetInt {
        txn_id: TxnId,
        block: BlockId,
        offset: usize,
        value: i32,
    },
    SetString {
        txn_id: TxnId,
        block: BlockId,
        offset: usize,
        value: String,
    },
    SetBool {
        txn_id: TxnId,
        block: BlockId,
        offset: usize,
        value: bool,
    },
    SetLong {
        txn_id: TxnId,
        block: BlockId,
        offset: usize,
        value: i64,
    },
    SetShort {
        txn_id: TxnId,
        block: BlockId,
        offset: usize,
        value: i16,
    },
    SetDate {
        txn_id: TxnId,
        block: BlockId,
        offset: usize,
        value: DateTime<Utc>,
    },
}

impl LogRecord {
    pub fn op(&self) -> LogRecordType {
        match self {
            Self::Checkpoint => LogRecordType::Checkpoint,
            Self::Start { .. } => LogRecordType::Start,
            Self::Commit { .. } => LogRecordType::Commit,
            Self::Rollback { .. } => LogRecordType::Rollback,
            Self::SetInt { .. } => LogRecordType::SetInt,
            Self::SetString { .. } => LogRecordType::SetString,
            Self::SetBool { .. } => LogRecordType::SetBool,
            Self::SetLong { .. } => LogRecordType::SetLong,
            Self::SetShort { .. } => LogRecordType::SetShort,
            Self::SetDate { .. } => LogRecordType::SetDate,
        }
    }

    /// The transaction the record belongs to; `None` for checkpoints.
    pub fn txn_id(&self) -> Option<TxnId> {
        match self {
            Self::Checkpoint => None,
            Self::Start { txn_id }
            | Self::Commit { txn_id }
            | Self::Rollback { txn_id } => Some(*txn_id),
            Self::SetInt { txn_id, .. }
            | Self::SetString { txn_id, .. }
            | Self::SetBool { txn_id, .. }
            | Self::SetLong { txn_id, .. }
            | Self::SetShort { txn_id, .. }
            | Self::SetDate { txn_id, .. } => Some(*txn_id),
        }
    }

    /// Decode a record from the bytes returned by the log iterator.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LogRecordError> {
        let page = Page::from_bytes(bytes.to_vec());
        let record_type = LogRecordType::from_code(page.get_int(0))?;
        match record_type {
            LogRecordType::Checkpoint => Ok(Self::Checkpoint),
            LogRecordType::Start => Ok(Self::Start {
                txn_id: page.get_int(INT_SIZE),
            }),
            LogRecordType::Commit => Ok(Self::Commit {
                txn_id: page.get_int(INT_SIZE),
            }),
            LogRecordType::Rollback => Ok(Self::Rollback {
                txn_id: page.get_int(INT_SIZE),
            }),
            LogRecordType::SetInt => {
                let (txn_id, block, offset, value_pos) = decode_update(&page)?;
                Ok(Self::SetInt {
                    txn_id,
                    block,
                    offset,
                    value: page.get_int(value_pos),
                })
            }
            LogRecordType::SetString => {
                let (txn_id, block, offset, value_pos) = decode_update(&page)?;
                Ok(Self::SetString {
                    txn_id,
                    block,
                    offset,
                    value: page.get_string(value_pos)?,
                })
            }
            LogRecordType::SetBool => {
                let (txn_id, block, offset, value_pos) = decode_update(&page)?;
                Ok(Self::SetBool {
                    txn_id,
                    block,
                    offset,
                    value: page.get_bool(value_pos),
                })
            }
            LogRecordType::SetLong => {
                let (txn_id, block, offset, value_pos) = decode_update(&page)?;
                Ok(Self::SetLong {
                    txn_id,
                    block,
                    offset,
                    value: page.get_long(value_pos),
                })
            }
            LogRecordType::SetShort => {
                let (txn_id, block, offset, value_pos) = decode_update(&page)?;
                Ok(Self::SetShort {
                    txn_id,
                    block,
                    offset,
                    value: page.get_short(value_pos),
                })
            }
            LogRecordType::SetDate => {
                let (txn_id, block, offset, value_pos) = decode_update(&page)?;
                Ok(Self::SetDate {
                    txn_id,
                    block,
                    offset,
                    value: page.get_date(value_pos)?,
                })
            }
        }
    }

    /// Encode the record into its wire form.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Checkpoint => {
                let mut page = Page::from_bytes(vec![0; INT_SIZE]);
                page.set_int(0, LogRecordType::Checkpoint as i32);
                page.contents().to_vec()
            }
            Self::Start { txn_id } => encode_txn_only(LogRecordType::Start, *txn_id),
            Self::Commit { txn_id } => encode_txn_only(LogRecordType::Commit, *txn_id),
            Self::Rollback { txn_id } => encode_txn_only(LogRecordType::Rollback, *txn_id),
            Self::SetInt {
                txn_id,
                block,
                offset,
                value,
            } => {
                let (mut page, value_pos) =
                    encode_update(LogRecordType::SetInt, *txn_id, block, *offset, INT_SIZE);
                page.set_int(value_pos, *value);
                page.contents().to_vec()
            }
            Self::SetString {
                txn_id,
                block,
                offset,
                value,
            } => {
                let (mut page, value_pos) = encode_update(
                    LogRecordType::SetString,
                    *txn_id,
                    block,
                    *offset,
                    INT_SIZE + value.len(),
                );
                page.set_string(value_pos, value);
                page.contents().to_vec()
            }
            Self::SetBool {
                txn_id,
                block,
                offset,
                value,
            } => {
                let (mut page, value_pos) =
                    encode_update(LogRecordType::SetBool, *txn_id, block, *offset, 1);
                page.set_bool(value_pos, *value);
                page.contents().to_vec()
            }
            Self::SetLong {
                txn_id,
                block,
                offset,
                value,
            } => {
                let (mut page, value_pos) =
                    encode_update(LogRecordType::SetLong, *txn_id, block, *offset, 8);
                page.set_long(value_pos, *value);
                page.contents().to_vec()
            }
            Self::SetShort {
                txn_id,
                block,
                offset,
                value,
            } => {
                let (mut page, value_pos) =
                    encode_update(LogRecordType::SetShort, *txn_id, block, *offset, 2);
                page.set_short(value_pos, *value);
                page.contents().to_vec()
            }
            Self::SetDate {
                txn_id,
                block,
                offset,
                value,
            } => {
                let (mut page, value_pos) =
                    encode_update(LogRecordType::SetDate, *txn_id, block, *offset, 8);
                page.set_date(value_pos, *value);
                page.contents().to_vec()
            }
        }
    }

    /// Append this record to the log and return its LSN.
    pub fn write_to_log(&self, log_manager: &LogManager) -> Result<Lsn, LogError> {
        log_manager.append(&self.to_bytes())
    }

    /// Undo the operation this record describes by writing its pre-image
    /// back through `tx`. Only update records do anything; the undo write
    /// itself is not logged.
    pub fn undo(&self, tx: &mut Transaction) -> Result<(), TransactionError> {
        match self {
            Self::SetInt {
                block,
                offset,
                value,
                ..
            } => {
                tx.pin(block)?;
                let result = tx.set_int(block, *offset, *value, false);
                tx.unpin(block);
                result
            }
            Self::SetString {
                block,
                offset,
                value,
                ..
            } => {
                tx.pin(block)?;
                let result = tx.set_string(block, *offset, value, false);
                tx.unpin(block);
                result
            }
            Self::SetBool {
                block,
                offset,
                value,
                ..
            } => {
                tx.pin(block)?;
                let result = tx.set_bool(block, *offset, *value, false);
                tx.unpin(block);
                result
            }
            Self::SetLong {
                block,
                offset,
                value,
                ..
            } => {
                tx.pin(block)?;
                let result = tx.set_long(block, *offset, *value, false);
                tx.unpin(block);
                result
            }
            Self::SetShort {
                block,
                offset,
                value,
                ..
            } => {
                tx.pin(block)?;
                let result = tx.set_short(block, *offset, *value, false);
                tx.unpin(block);
                result
            }
            Self::SetDate {
                block,
                offset,
                value,
                ..
            } => {
                tx.pin(block)?;
                let result = tx.set_date(block, *offset, *value, false);
                tx.unpin(block);
                result
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Checkpoint => write!(f, "<CHECKPOINT>"),
            Self::Start { txn_id } => write!(f, "<START {}>", txn_id),
            Self::Commit { txn_id } => write!(f, "<COMMIT {}>", txn_id),
            Self::Rollback { txn_id } => write!(f, "<ROLLBACK {}>", txn_id),
            Self::SetInt {
                txn_id,
                block,
                offset,
                value,
            } => write!(f, "<SETINT {} {} {} {}>", txn_id, block, offset, value),
            Self::SetString {
                txn_id,
                block,
                offset,
                value,
            } => write!(f, "<SETSTRING {} {} {} {}>", txn_id, block, offset, value),
            Self::SetBool {
                txn_id,
                block,
                offset,
                value,
            } => write!(f, "<SETBOOL {} {} {} {}>", txn_id, block, offset, value),
            Self::SetLong {
                txn_id,
                block,
                offset,
                value,
            } => write!(f, "<SETLONG {} {} {} {}>", txn_id, block, offset, value),
            Self::SetShort {
                txn_id,
                block,
                offset,
                value,
            } => write!(f, "<SETSHORT {} {} {} {}>", txn_id, block, offset, value),
            Self::SetDate {
                txn_id,
                block,
                offset,
                value,
            } => write!(f, "<SETDATE {} {} {} {}>", txn_id, block, offset, value),
        }
    }
}

/// Tag plus transaction number, for Start/Commit/Rollback.
fn encode_txn_only(op: LogRecordType, txn_id: TxnId) -> Vec<u8> {
    let mut page = Page::from_bytes(vec![0; 2 * INT_SIZE]);
    page.set_int(0, op as i32);
    page.set_int(INT_SIZE, txn_id);
    page.contents().to_vec()
}

/// Lay out the shared prefix of an update record: tag, transaction number,
/// file name (occupying `max_length` of it), block number, and offset.
/// Returns the page and the position where the value goes.
fn encode_update(
    op: LogRecordType,
    txn_id: TxnId,
    block: &BlockId,
    offset: usize,
    value_size: usize,
) -> (Page, usize) {
    let txn_pos = INT_SIZE;
    let fname_pos = txn_pos + INT_SIZE;
    let block_pos = fname_pos + max_length(block.filename().len());
    let offset_pos = block_pos + INT_SIZE;
    let value_pos = offset_pos + INT_SIZE;

    let mut page = Page::from_bytes(vec![0; value_pos + value_size]);
    page.set_int(0, op as i32);
    page.set_int(txn_pos, txn_id);
    page.set_string(fname_pos, block.filename());
    page.set_int(block_pos, block.number());
    page.set_int(offset_pos, offset as i32);
    (page, value_pos)
}

fn decode_update(page: &Page) -> Result<(TxnId, BlockId, usize, usize), LogRecordError> {
    let txn_pos = INT_SIZE;
    let txn_id = page.get_int(txn_pos);
    let fname_pos = txn_pos + INT_SIZE;
    let filename = page.get_string(fname_pos)?;
    let block_pos = fname_pos + max_length(filename.len());
    let number = page.get_int(block_pos);
    let offset_pos = block_pos + INT_SIZE;
    let offset = page.get_int(offset_pos) as usize;
    let value_pos = offset_pos + INT_SIZE;
    Ok((txn_id, BlockId::new(filename, number), offset, value_pos))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn round_trip(record: LogRecord) {
        let bytes = record.to_bytes();
        assert_eq!(LogRecord::from_bytes(&bytes).unwrap(), record);
    }

    #[test]
    fn checkpoint_round_trip() {
        round_trip(LogRecord::Checkpoint);
        assert_eq!(LogRecord::Checkpoint.txn_id(), None);
    }

    #[test]
    fn txn_marker_round_trips() {
        round_trip(LogRecord::Start { txn_id: 1 });
        round_trip(LogRecord::Commit { txn_id: 17 });
        round_trip(LogRecord::Rollback { txn_id: 230 });
    }

    #[test]
    fn set_int_round_trip() {
        round_trip(LogRecord::SetInt {
            txn_id: 3,
            block: BlockId::new("accounts", 5),
            offset: 80,
            value: -42,
        });
    }

    #[test]
    fn set_string_round_trip() {
        round_trip(LogRecord::SetString {
            txn_id: 3,
            block: BlockId::new("accounts", 0),
            offset: 40,
            value: "ünïcode välue".to_string(),
        });
    }

    #[test]
    fn set_bool_round_trip() {
        round_trip(LogRecord::SetBool {
            txn_id: 9,
            block: BlockId::new("flags", 2),
            offset: 1,
            value: true,
        });
    }

    #[test]
    fn set_long_round_trip() {
        round_trip(LogRecord::SetLong {
            txn_id: 4,
            block: BlockId::new("counters", 7),
            offset: 16,
            value: i64::MIN + 1,
        });
    }

    #[test]
    fn set_short_round_trip() {
        round_trip(LogRecord::SetShort {
            txn_id: 4,
            block: BlockId::new("counters", 7),
            offset: 2,
            value: -1000,
        });
    }

    #[test]
    fn set_date_round_trip() {
        round_trip(LogRecord::SetDate {
            txn_id: 12,
            block: BlockId::new("events", 1),
            offset: 64,
            value: Utc.with_ymd_and_hms(1999, 12, 31, 23, 59, 59).unwrap(),
        });
    }

    #[test]
    fn tag_values_are_stable() {
        let tags: Vec<i32> = [
            LogRecord::Checkpoint,
            LogRecord::Start { txn_id: 1 },
            LogRecord::Commit { txn_id: 1 },
            LogRecord::Rollback { txn_id: 1 },
        ]
        .iter()
        .map(|r| Page::from_bytes(r.to_bytes()).get_int(0))
        .collect();
        assert_eq!(tags, vec![0, 1, 2, 3]);
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let mut page = Page::from_bytes(vec![0; 2 * INT_SIZE]);
        page.set_int(0, 99);
        assert!(matches!(
            LogRecord::from_bytes(page.contents()),
            Err(LogRecordError::UnknownRecordType(99))
        ));
    }
}
