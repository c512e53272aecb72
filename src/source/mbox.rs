//! Source over an MBOX archive file.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{MailQueryError, Result};
use crate::model::message::Message;
use crate::parser::header::parse_envelope;
use crate::parser::mbox::{read_message_at, MboxReader};
use crate::query::compile::ServerQuery;
use crate::source::{CandidateStream, Source};

/// Streams the messages of an MBOX file.
///
/// The uid of a message is the byte offset of its `From ` line. Headers are
/// parsed during the scan; bodies are read back by offset when needed.
/// Archives are read-only: deletion is always refused.
#[derive(Debug)]
pub struct MboxSource {
    path: PathBuf,
    fetch_limit: Option<usize>,
    allow_delete: bool,
}

impl MboxSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            fetch_limit: None,
            allow_delete: false,
        }
    }

    /// Yield at most `limit` candidates per listing.
    pub fn with_fetch_limit(mut self, limit: Option<usize>) -> Self {
        self.fetch_limit = limit;
        self
    }

    pub fn allow_delete(mut self, allow: bool) -> Self {
        self.allow_delete = allow;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Source for MboxSource {
    fn connect(&mut self) -> Result<()> {
        if !self.path.is_file() {
            return Err(MailQueryError::Connection(format!(
                "cannot open archive {}",
                self.path.display()
            )));
        }
        Ok(())
    }

    fn list_candidates(&mut self, hints: &ServerQuery) -> Result<CandidateStream> {
        // Archive scans have no index to push hints into.
        debug!(path = %self.path.display(), hints = %hints, "Scanning archive");
        let reader = MboxReader::open(&self.path)?;
        let path = self.path.clone();

        let stream = reader.map(move |entry| -> Result<Message> {
            // A read failure ends the scan, so the listing is incomplete.
            let entry = entry
                .map_err(|e| MailQueryError::Connection(format!("archive scan interrupted: {e}")))?;
            let uid = entry.offset.to_string();
            let envelope = parse_envelope(&entry.headers);
            let path = path.clone();
            let (offset, length) = (entry.offset, entry.length);
            let fetch_uid = uid.clone();
            Ok(Message::new(uid, envelope, move || {
                read_message_at(&path, offset, length)
                    .map_err(|e| MailQueryError::fetch(&fetch_uid, e))
            }))
        });

        Ok(match self.fetch_limit {
            Some(limit) => Box::new(stream.take(limit)),
            None => Box::new(stream),
        })
    }

    fn delete_by_id(&mut self, uid: &str) -> Result<bool> {
        if self.allow_delete {
            warn!(uid, "Deleting from MBOX archives is not supported");
        } else {
            debug!(uid, "Deletion disabled for archive source");
        }
        Ok(false)
    }

    fn describe(&self) -> String {
        format!("mbox archive {}", self.path.display())
    }
}
