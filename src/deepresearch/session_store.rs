//! Persistent per-conversation transcripts.
//!
//! [`SessionStore`] keeps one append-only `.jsonl` file per conversation — one
//! serialized [`TranscriptEntry`] per line. The transcript is the only state
//! that outlives a query: every user input and every response (including
//! smalltalk and degraded answers) is appended as it happens, and `exit` in the
//! chat loop clears the conversation's file.
//!
//! # Disk Format
//!
//! ```text
//! {"timestamp":"2025-08-28T12:00:00Z","speaker":"User","content":"Are electric cars better?"}
//! {"timestamp":"2025-08-28T12:00:19Z","speaker":"Assistant","content":"Environmental: ..."}
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use deepresearch::session_store::{SessionStore, Speaker};
//! use std::path::PathBuf;
//!
//! # fn main() -> std::io::Result<()> {
//! let store = SessionStore::new(PathBuf::from("sessions"));
//! store.append("conv-1", Speaker::User, "Are electric cars better than gas cars?")?;
//! let transcript = store.entries("conv-1")?;
//! assert_eq!(transcript.len(), 1);
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

/// Who produced a transcript line.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Speaker {
    User,
    Assistant,
}

/// One line of a conversation transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// UTC wall-clock time when the line was recorded.
    pub timestamp: DateTime<Utc>,
    /// Which side of the conversation produced it.
    pub speaker: Speaker,
    /// The text as shown to the user.
    pub content: String,
}

impl TranscriptEntry {
    pub fn new(speaker: Speaker, content: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            speaker,
            content: content.into(),
        }
    }
}

/// Append-only `.jsonl` transcript store, one file per conversation id.
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    /// Create a store rooted at `dir`. The directory is created lazily on
    /// first append.
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Append one line to a conversation's transcript.
    pub fn append(
        &self,
        conversation_id: &str,
        speaker: Speaker,
        content: &str,
    ) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let entry = TranscriptEntry::new(speaker, content);
        let line = serde_json::to_string(&entry)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.transcript_path(conversation_id))?;
        writeln!(file, "{}", line)?;
        Ok(())
    }

    /// Load a conversation's transcript, oldest line first.
    ///
    /// A missing file reads as an empty transcript. Unparseable lines are
    /// skipped with a warning rather than failing the load.
    pub fn entries(&self, conversation_id: &str) -> std::io::Result<Vec<TranscriptEntry>> {
        let path = self.transcript_path(conversation_id);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(fs::File::open(&path)?);
        let mut entries = Vec::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<TranscriptEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(err) => {
                    log::warn!(
                        "skipping corrupt transcript line {} in {}: {}",
                        line_no + 1,
                        path.display(),
                        err
                    );
                }
            }
        }
        Ok(entries)
    }

    /// Delete a conversation's transcript. A missing file is not an error.
    pub fn clear(&self, conversation_id: &str) -> std::io::Result<()> {
        let path = self.transcript_path(conversation_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }

    fn transcript_path(&self, conversation_id: &str) -> PathBuf {
        // Conversation ids come from our own UUID generation; sanitize anyway
        // so a caller-supplied id cannot escape the store directory.
        let safe: String = conversation_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.jsonl", safe))
    }
}
