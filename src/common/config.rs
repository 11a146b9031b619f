use std::path::PathBuf;
use std::time::Duration;

/// Buffer replacement policy selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplacementPolicy {
    /// First unpinned frame found by a linear scan.
    #[default]
    Naive,
    /// Least-recently-unpinned frame.
    Lru,
    /// Second-chance (clock) sweep.
    Clock,
}

/// Configuration for a database instance.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Directory holding all data files and the log file.
    pub db_directory: PathBuf,

    /// Size of every block in every file. Fixed for the lifetime of the
    /// directory; reopening with a different size corrupts the database.
    pub block_size: usize,

    /// Number of frames in the buffer pool.
    pub num_buffers: usize,

    /// Name of the write-ahead log file inside `db_directory`.
    pub log_filename: String,

    /// How the buffer pool picks eviction victims.
    pub replacement_policy: ReplacementPolicy,

    /// How long a transaction waits for a conflicting lock before the
    /// request fails with a lock abort.
    pub max_lock_wait: Duration,

    /// How long a pin request waits for a free frame before it fails with
    /// a buffer abort.
    pub max_buffer_wait: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            db_directory: PathBuf::from("tarndb"),
            block_size: 4096,
            num_buffers: 8,
            log_filename: "logfile".to_string(),
            replacement_policy: ReplacementPolicy::default(),
            max_lock_wait: Duration::from_secs(10),
            max_buffer_wait: Duration::from_secs(10),
        }
    }
}
