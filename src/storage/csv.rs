//! CSV record store: one row per message.
//!
//! Output is UTF-8 with BOM for Excel compatibility.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::error::{MailQueryError, Result};
use crate::model::message::Message;
use crate::storage::{folder_for, AttachmentStore, StorageBackend};

const BASE_COLUMNS: [&str; 12] = [
    "uid",
    "folder",
    "sender",
    "sender_name",
    "sender_email",
    "subject",
    "date",
    "message_id",
    "reply_to",
    "recipient",
    "body",
    "attachments",
];

/// Writes messages as CSV rows, with one extra column per attribute key
/// learned in `setup`. A uid already written is skipped.
pub struct CsvStorage {
    path: PathBuf,
    separator: char,
    attachments: AttachmentStore,
    extra_columns: Vec<String>,
    seen: HashSet<String>,
    writer: Option<BufWriter<File>>,
}

impl CsvStorage {
    pub fn new(path: impl AsRef<Path>, attachments: AttachmentStore) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            separator: ',',
            attachments,
            extra_columns: Vec::new(),
            seen: HashSet::new(),
            writer: None,
        }
    }

    pub fn with_separator(mut self, separator: char) -> Self {
        self.separator = separator;
        self
    }

    fn write_row(&mut self, fields: &[String]) -> Result<()> {
        let sep = self.separator.to_string();
        let line = fields
            .iter()
            .map(|f| csv_escape(f, self.separator))
            .collect::<Vec<_>>()
            .join(&sep);
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| MailQueryError::Storage("CSV store used before setup".into()))?;
        writeln!(writer, "{line}").map_err(|e| MailQueryError::io(&self.path, e))
    }
}

fn attribute_text(value: Option<Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
    }
}

impl StorageBackend for CsvStorage {
    fn setup(&mut self, attribute_keys: &[String]) -> Result<()> {
        self.extra_columns = attribute_keys.to_vec();
        let mut file = File::create(&self.path).map_err(|e| MailQueryError::io(&self.path, e))?;
        file.write_all(&[0xEF, 0xBB, 0xBF])
            .map_err(|e| MailQueryError::io(&self.path, e))?;
        self.writer = Some(BufWriter::new(file));

        let header: Vec<String> = BASE_COLUMNS
            .iter()
            .map(|c| c.to_string())
            .chain(self.extra_columns.iter().cloned())
            .collect();
        self.write_row(&header)
    }

    fn store_message(&mut self, message: &Message) -> Result<bool> {
        if self.seen.contains(message.uid()) {
            debug!(uid = message.uid(), "Already stored, skipping");
            return Ok(false);
        }

        let attachments = self.attachments.store(message)?;
        let attachments = if attachments.is_empty() {
            String::new()
        } else {
            serde_json::to_string(&attachments).map_err(|e| MailQueryError::Storage(e.to_string()))?
        };
        let env = message.envelope();

        let mut row = vec![
            message.uid().to_string(),
            folder_for(message),
            env.from.clone(),
            message.sender_name().to_string(),
            message.sender_email().to_string(),
            env.subject.clone(),
            env.date.clone(),
            env.message_id.clone(),
            env.reply_to.clone(),
            env.to.clone(),
            message.plain_text()?.to_string(),
            attachments,
        ];
        row.extend(
            self.extra_columns
                .iter()
                .map(|key| attribute_text(message.attribute(key))),
        );

        self.write_row(&row)?;
        self.seen.insert(message.uid().to_string());
        Ok(true)
    }

    fn describe(&self) -> String {
        format!("CSV file {}", self.path.display())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().map_err(|e| MailQueryError::io(&self.path, e))?;
        }
        Ok(())
    }
}

/// Escape a value for CSV (RFC 4180).
///
/// Wraps in double quotes if the value contains the separator, quotes or
/// line breaks.
fn csv_escape(value: &str, separator: char) -> String {
    if value.contains(separator) || value.contains('"') || value.contains('\n') || value.contains('\r')
    {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(uid: &str) -> Message {
        Message::from_raw(
            uid,
            b"From: Alice Smith <alice@example.com>\nTo: bob@x.com\nSubject: Hi, there\nDate: Sun, 25 Jun 2023 10:00:00 +0000\n\nline one\nline two\n".to_vec(),
        )
    }

    #[test]
    fn test_csv_escape() {
        assert_eq!(csv_escape("hello", ','), "hello");
        assert_eq!(csv_escape("hello, world", ','), "\"hello, world\"");
        assert_eq!(csv_escape("hello, world", ';'), "hello, world");
        assert_eq!(csv_escape("say \"hi\"", ','), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_escape("line1\nline2", ','), "\"line1\nline2\"");
    }

    #[test]
    fn test_rows_with_extra_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut storage = CsvStorage::new(&path, AttachmentStore::metadata_only());
        storage.setup(&["word_count".to_string()]).unwrap();

        let first = msg("1");
        first.set_attribute("word_count", Value::from(4));
        assert!(storage.store_message(&first).unwrap());
        assert!(!storage.store_message(&msg("1")).unwrap());
        storage.close().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(&[0xEF, 0xBB, 0xBF]));
        let text = String::from_utf8(bytes[3..].to_vec()).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "uid,folder,sender,sender_name,sender_email,subject,date,message_id,reply_to,recipient,body,attachments,word_count"
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with(
            "1,example.com,Alice Smith <alice@example.com>,Alice Smith,alice@example.com,\"Hi, there\","
        ));
        assert!(text.contains("\"line one\nline two\",,4\n"));
    }

    #[test]
    fn test_store_before_setup_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = CsvStorage::new(dir.path().join("x.csv"), AttachmentStore::metadata_only());
        assert!(storage.store_message(&msg("1")).is_err());
    }
}
