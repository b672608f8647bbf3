//! The items file: one JSON record per line

use crate::storage::{StorageError, StorageResult};
use crate::target::Record;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Appends records to an items file
///
/// Records are flushed one by one so that a crashed worker loses at most
/// the record being written.
pub struct ItemWriter {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl ItemWriter {
    /// Opens `path` for appending, creating it if needed
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    pub fn append(&mut self, record: &Record) -> StorageResult<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Reads every record of an items file
///
/// A missing file has no records. Blank lines are skipped; a line that is
/// not a JSON object is an error.
pub fn read_records(path: &Path) -> StorageResult<Vec<Record>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut records = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let record: Record =
            serde_json::from_str(&line).map_err(|e| StorageError::Corrupt {
                path: path.display().to_string(),
                line: index + 1,
                message: e.to_string(),
            })?;
        records.push(record);
    }

    Ok(records)
}
