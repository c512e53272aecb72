//! Append matches to an MBOX file.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{MailQueryError, Result};
use crate::model::message::Message;
use crate::storage::{reconstruct_message, AttachmentStore, StorageBackend};

/// Appends reconstructed messages to an MBOX file (mboxrd quoting).
pub struct MboxStorage {
    path: PathBuf,
    attachments: AttachmentStore,
    writer: Option<BufWriter<File>>,
}

impl MboxStorage {
    pub fn new(path: impl AsRef<Path>, attachments: AttachmentStore) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            attachments,
            writer: None,
        }
    }

    fn writer(&mut self) -> Result<&mut BufWriter<File>> {
        if self.writer.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .map_err(|e| MailQueryError::io(&self.path, e))?;
            self.writer = Some(BufWriter::new(file));
        }
        self.writer
            .as_mut()
            .ok_or_else(|| MailQueryError::Storage("mbox writer unavailable".into()))
    }
}

/// `From ` separator line for a message.
fn separator_line(message: &Message) -> String {
    let sender = match message.sender_email() {
        "" => "MAILER-DAEMON",
        address => address,
    };
    let date = message
        .date()
        .map(|d| d.format("%a %b %e %H:%M:%S %Y").to_string())
        .unwrap_or_else(|| "Thu Jan  1 00:00:00 1970".to_string());
    format!("From {sender} {date}\n")
}

/// Quote body lines that would read as separators (`From `, `>From `, ...).
fn escape_from_lines(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len() + 16);
    let mut in_body = false;
    for line in raw.split_inclusive(|&b| b == b'\n') {
        if in_body {
            let unquoted = line.iter().position(|&b| b != b'>').unwrap_or(line.len());
            if line[unquoted..].starts_with(b"From ") {
                out.push(b'>');
            }
        } else if line == b"\n" || line == b"\r\n" {
            in_body = true;
        }
        out.extend_from_slice(line);
    }
    out
}

impl StorageBackend for MboxStorage {
    fn setup(&mut self, _attribute_keys: &[String]) -> Result<()> {
        self.writer().map(|_| ())
    }

    fn store_message(&mut self, message: &Message) -> Result<bool> {
        let attachments = self.attachments.store(message)?;
        let raw = escape_from_lines(&reconstruct_message(message, &attachments)?);
        let separator = separator_line(message);
        let path = self.path.clone();
        let writer = self.writer()?;
        writer
            .write_all(separator.as_bytes())
            .and_then(|_| writer.write_all(&raw))
            .and_then(|_| writer.write_all(b"\n"))
            .map_err(|e| MailQueryError::io(&path, e))?;
        Ok(true)
    }

    fn describe(&self) -> String {
        format!("mbox file {}", self.path.display())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().map_err(|e| MailQueryError::io(&self.path, e))?;
        }
        Ok(())
    }
}
