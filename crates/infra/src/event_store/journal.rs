use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;

use super::r#trait::StoredEvent;

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal io error: {0}")]
    Io(#[from] io::Error),

    #[error("journal line {line} is not a stored event: {reason}")]
    Decode { line: usize, reason: String },

    #[error("journal writer poisoned")]
    Poisoned,
}

/// Append-only JSON-lines file of stored events, one event per line.
///
/// The in-memory store is restored from it at startup; committed events are appended as
/// they are published. Per-stream order in the file is not guaranteed to match sequence
/// order; `InMemoryEventStore::from_history` sorts each stream back.
#[derive(Debug)]
pub struct EventJournal {
    path: PathBuf,
    writer: Mutex<File>,
}

impl EventJournal {
    /// Open (or create) the journal for appending.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, JournalError> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every event in file order. Blank lines are skipped.
    pub fn read_all(&self) -> Result<Vec<StoredEvent>, JournalError> {
        let reader = BufReader::new(File::open(&self.path)?);
        let mut events = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let event = serde_json::from_str(&line).map_err(|e| JournalError::Decode {
                line: idx + 1,
                reason: e.to_string(),
            })?;
            events.push(event);
        }
        Ok(events)
    }

    pub fn append(&self, event: &StoredEvent) -> Result<(), JournalError> {
        let mut line = serde_json::to_string(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        line.push('\n');

        let mut file = self.writer.lock().map_err(|_| JournalError::Poisoned)?;
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}
