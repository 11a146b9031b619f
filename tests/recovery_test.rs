use anyhow::Result;
use tempfile::TempDir;

use tarndb::transaction::wal::{LogRecord, LogRecordType};
use tarndb::{BlockId, Database, TransactionState};

mod common;
use common::test_config;

fn collect_log(db: &Database) -> Result<Vec<LogRecord>> {
    let mut records = Vec::new();
    for bytes in db.log_manager().iterator()? {
        records.push(LogRecord::from_bytes(&bytes?)?);
    }
    Ok(records)
}

// Write twice to the same slot, roll back, and the original value is
// restored. The log ends up holding, oldest first: the transaction's
// Start, one update record per write carrying the pre-image, and the
// Rollback marker (the undo writes themselves are not logged).
#[test]
fn rollback_restores_pre_images() -> Result<()> {
    let dir = TempDir::new()?;
    let db = Database::new(test_config(&dir))?;

    let mut tx = db.new_transaction()?;
    for _ in 0..6 {
        tx.append("data")?;
    }
    let blk = BlockId::new("data", 5);
    tx.pin(&blk)?;
    tx.set_int(&blk, 0, 42, true)?;
    tx.set_int(&blk, 0, 99, true)?;
    assert_eq!(tx.get_int(&blk, 0)?, 99);
    let txn_id = tx.txn_id();

    tx.rollback()?;
    assert_eq!(tx.state(), TransactionState::Aborted);

    let mut check = db.new_transaction()?;
    check.pin(&blk)?;
    assert_eq!(check.get_int(&blk, 0)?, 0);
    check.commit()?;

    // newest-first records of the rolled-back transaction
    let mine: Vec<LogRecord> = collect_log(&db)?
        .into_iter()
        .filter(|r| r.txn_id() == Some(txn_id))
        .collect();
    assert_eq!(
        mine,
        vec![
            LogRecord::Rollback { txn_id },
            LogRecord::SetInt {
                txn_id,
                block: blk.clone(),
                offset: 0,
                value: 42,
            },
            LogRecord::SetInt {
                txn_id,
                block: blk,
                offset: 0,
                value: 0,
            },
            LogRecord::Start { txn_id },
        ]
    );
    Ok(())
}

// A transaction dies mid-flight with its dirty page already on disk.
// Restart recovery walks the log tail, restores the pre-images, and
// checkpoints; a second restart stops at that checkpoint untouched.
#[test]
fn restart_recovery_undoes_unfinished_transactions() -> Result<()> {
    let dir = TempDir::new()?;
    let blk = BlockId::new("data", 1);

    {
        let db = Database::new(test_config(&dir))?;
        let mut tx = db.new_transaction()?;
        for _ in 0..3 {
            tx.append("data")?;
        }
        tx.pin(&blk)?;
        tx.set_int(&blk, 0, 7, true)?;
        tx.set_int(&blk, 0, 8, true)?;

        // push the modified page to disk, then "crash" without finishing
        db.buffer_manager().flush_all(tx.txn_id())?;
        std::mem::forget(tx);
    }

    {
        let db = Database::new(test_config(&dir))?;
        let mut tx = db.new_transaction()?;
        tx.pin(&blk)?;
        assert_eq!(tx.get_int(&blk, 0)?, 0);
        tx.commit()?;

        // recovery sealed the log with a quiescent checkpoint
        let records = collect_log(&db)?;
        assert!(records
            .iter()
            .any(|r| r.op() == LogRecordType::Checkpoint));
    }

    // a third boot finds the checkpoint immediately and changes nothing
    let db = Database::new(test_config(&dir))?;
    let mut tx = db.new_transaction()?;
    tx.pin(&blk)?;
    assert_eq!(tx.get_int(&blk, 0)?, 0);
    tx.commit()?;
    Ok(())
}

#[test]
fn committed_changes_survive_restart() -> Result<()> {
    let dir = TempDir::new()?;
    let blk = BlockId::new("data", 0);

    {
        let db = Database::new(test_config(&dir))?;
        let mut tx = db.new_transaction()?;
        tx.append("data")?;
        tx.pin(&blk)?;
        tx.set_string(&blk, 0, "durable", true)?;
        tx.set_long(&blk, 100, 1_234_567_890_123, true)?;
        tx.commit()?;
    }

    let db = Database::new(test_config(&dir))?;
    let mut tx = db.new_transaction()?;
    tx.pin(&blk)?;
    assert_eq!(tx.get_string(&blk, 0)?, "durable");
    assert_eq!(tx.get_long(&blk, 100)?, 1_234_567_890_123);
    tx.commit()?;
    Ok(())
}

// Every value width logs a usable pre-image: write each type once, roll
// back, and the block reads back as freshly appended.
#[test]
fn rollback_covers_every_value_width() -> Result<()> {
    use chrono::{TimeZone, Utc};

    let dir = TempDir::new()?;
    let db = Database::new(test_config(&dir))?;
    let blk = BlockId::new("data", 0);

    let mut tx = db.new_transaction()?;
    tx.append("data")?;
    tx.pin(&blk)?;
    tx.set_int(&blk, 0, -5, true)?;
    tx.set_long(&blk, 8, 1 << 40, true)?;
    tx.set_short(&blk, 16, 77, true)?;
    tx.set_bool(&blk, 20, true, true)?;
    tx.set_string(&blk, 24, "scratch", true)?;
    tx.set_date(&blk, 60, Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(), true)?;
    tx.rollback()?;

    let mut check = db.new_transaction()?;
    check.pin(&blk)?;
    assert_eq!(check.get_int(&blk, 0)?, 0);
    assert_eq!(check.get_long(&blk, 8)?, 0);
    assert_eq!(check.get_short(&blk, 16)?, 0);
    assert!(!check.get_bool(&blk, 20)?);
    assert_eq!(check.get_string(&blk, 24)?, "");
    assert_eq!(check.get_date(&blk, 60)?.timestamp(), 0);
    check.commit()?;
    Ok(())
}

// Terminal states are final: commit and rollback refuse to run twice.
#[test]
fn finished_transactions_reject_further_work() -> Result<()> {
    let dir = TempDir::new()?;
    let db = Database::new(test_config(&dir))?;

    let mut tx = db.new_transaction()?;
    tx.commit()?;
    assert_eq!(tx.state(), TransactionState::Committed);
    assert!(tx.commit().is_err());
    assert!(tx.rollback().is_err());
    Ok(())
}
