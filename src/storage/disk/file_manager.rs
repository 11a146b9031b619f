use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use thiserror::Error;

use crate::common::types::{BlockId, BlockNum};
use crate::storage::page::Page;

#[derive(Error, Debug)]
pub enum FileManagerError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("partial read of block {block}: expected {expected} bytes, got {got}")]
    PartialRead {
        block: BlockId,
        expected: usize,
        got: usize,
    },
}

#[derive(Debug)]
struct FmState {
    open_files: HashMap<String, File>,
    blocks_read: u64,
    blocks_written: u64,
}

impl FmState {
    /// Open handles are cached for the lifetime of the manager.
    fn file(&mut self, directory: &Path, filename: &str) -> io::Result<&mut File> {
        match self.open_files.entry(filename.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .open(directory.join(filename))?;
                Ok(entry.insert(file))
            }
        }
    }

    fn length(&mut self, directory: &Path, filename: &str, block_size: usize) -> Result<BlockNum, FileManagerError> {
        let file = self.file(directory, filename)?;
        let size = file.metadata()?.len();
        Ok((size / block_size as u64) as BlockNum)
    }
}

/// FileManager handles block-aligned reads, writes, and appends for every
/// file in the database directory. All operations are serialized by one
/// mutex; writes reach disk before returning.
#[derive(Debug)]
pub struct FileManager {
    db_directory: PathBuf,
    block_size: usize,
    is_new: bool,
    state: Mutex<FmState>,
}

impl FileManager {
    /// Open the database directory, creating it if necessary. Leftover
    /// `temp*` files from earlier runs are removed.
    pub fn new(db_directory: impl AsRef<Path>, block_size: usize) -> Result<Self, FileManagerError> {
        let db_directory = db_directory.as_ref().to_path_buf();
        let is_new = !db_directory.exists();
        if is_new {
            fs::create_dir_all(&db_directory)?;
        }

        for entry in fs::read_dir(&db_directory)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    if name.starts_with("temp") {
                        fs::remove_file(entry.path())?;
                    }
                }
            }
        }

        Ok(Self {
            db_directory,
            block_size,
            is_new,
            state: Mutex::new(FmState {
                open_files: HashMap::new(),
                blocks_read: 0,
                blocks_written: 0,
            }),
        })
    }

    /// Read the given block into `page`. Reading a block past the current
    /// end of the file succeeds and leaves the page untouched; a partial
    /// read mid-file is an error.
    pub fn read(&self, block: &BlockId, page: &mut Page) -> Result<(), FileManagerError> {
        let mut state = self.state.lock();
        let file = state.file(&self.db_directory, block.filename())?;
        file.seek(SeekFrom::Start(self.offset_of(block)))?;

        let buf = page.contents_mut();
        let mut total = 0;
        while total < buf.len() {
            match file.read(&mut buf[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        if total != 0 && total != buf.len() {
            return Err(FileManagerError::PartialRead {
                block: block.clone(),
                expected: buf.len(),
                got: total,
            });
        }
        state.blocks_read += 1;
        Ok(())
    }

    /// Write `page` to the given block and sync it to disk.
    pub fn write(&self, block: &BlockId, page: &Page) -> Result<(), FileManagerError> {
        let mut state = self.state.lock();
        let file = state.file(&self.db_directory, block.filename())?;
        file.seek(SeekFrom::Start(self.offset_of(block)))?;
        file.write_all(page.contents())?;
        file.sync_all()?;
        state.blocks_written += 1;
        Ok(())
    }

    /// Extend the file by one zeroed block and return its id.
    pub fn append(&self, filename: &str) -> Result<BlockId, FileManagerError> {
        let mut state = self.state.lock();
        let new_block_num = state.length(&self.db_directory, filename, self.block_size)?;
        let block = BlockId::new(filename, new_block_num);

        let zeros = vec![0u8; self.block_size];
        let file = state.file(&self.db_directory, filename)?;
        file.seek(SeekFrom::Start(self.offset_of(&block)))?;
        file.write_all(&zeros)?;
        file.sync_all()?;
        state.blocks_written += 1;
        Ok(block)
    }

    /// Number of blocks currently in the file.
    pub fn length(&self, filename: &str) -> Result<BlockNum, FileManagerError> {
        let mut state = self.state.lock();
        state.length(&self.db_directory, filename, self.block_size)
    }

    /// True if the database directory was created by this manager.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn blocks_read(&self) -> u64 {
        self.state.lock().blocks_read
    }

    pub fn blocks_written(&self) -> u64 {
        self.state.lock().blocks_written
    }

    fn offset_of(&self, block: &BlockId) -> u64 {
        block.number() as u64 * self.block_size as u64
    }
}
