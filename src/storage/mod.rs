//! Persisting query results locally.
//!
//! [`Query::store_local`](crate::query::Query::store_local) drives a
//! [`StorageBackend`]: `setup` with the attribute keys of the query, one
//! `store_message` per match, then `close`.

pub mod attachment;
pub mod csv;
pub mod maildir;
pub mod mbox;
pub mod sqlite;

use crate::error::Result;
use crate::model::message::Message;

pub use attachment::{AttachmentStore, StoredAttachment};
pub use csv::CsvStorage;
pub use maildir::MaildirStorage;
pub use mbox::MboxStorage;
pub use sqlite::SqliteStorage;

pub trait StorageBackend {
    /// Learn the extra-attribute keys before anything is written.
    fn setup(&mut self, _attribute_keys: &[String]) -> Result<()> {
        Ok(())
    }

    /// Store one message. `Ok(false)` means it was skipped (e.g. duplicate).
    fn store_message(&mut self, message: &Message) -> Result<bool>;

    fn describe(&self) -> String;

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Folder name for a message: its sender domain, or `unknown`.
///
/// The domain comes from an untrusted header, so it is reduced to a single
/// safe path component: characters outside `[A-Za-z0-9._-]` become `_`, and
/// names that are empty, start with a dot or contain `..` are rejected.
pub fn folder_for(message: &Message) -> String {
    message
        .sender_domain()
        .map(|d| {
            d.chars()
                .map(|c| {
                    if c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_') {
                        c
                    } else {
                        '_'
                    }
                })
                .collect::<String>()
        })
        .filter(|d| !d.is_empty() && !d.starts_with('.') && !d.contains(".."))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Rebuild a minimal RFC 5322 message from the envelope and the plain text
/// body, recording attachments in an `X-Attachment-Metadata` JSON header.
pub fn reconstruct_message(message: &Message, attachments: &[StoredAttachment]) -> Result<Vec<u8>> {
    let env = message.envelope();
    let mut out = String::new();
    for (name, value) in [
        ("From", &env.from),
        ("Subject", &env.subject),
        ("Date", &env.date),
        ("Message-ID", &env.message_id),
        ("Reply-To", &env.reply_to),
        ("To", &env.to),
    ] {
        if !value.is_empty() {
            out.push_str(&format!("{name}: {}\n", single_line(value)));
        }
    }
    if !attachments.is_empty() {
        let json = serde_json::to_string(attachments)
            .map_err(|e| crate::error::MailQueryError::Storage(e.to_string()))?;
        out.push_str(&format!("X-Attachment-Metadata: {json}\n"));
    }
    out.push_str("Content-Type: text/plain; charset=utf-8\n\n");
    out.push_str(message.plain_text()?);
    if !out.ends_with('\n') {
        out.push('\n');
    }
    Ok(out.into_bytes())
}

/// Header values must not carry raw line breaks.
fn single_line(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_for() {
        let msg = Message::from_raw("1", b"From: A <a@Example.COM>\n\nx\n".to_vec());
        assert_eq!(folder_for(&msg), "example.com");
        let anonymous = Message::from_raw("2", b"Subject: none\n\nx\n".to_vec());
        assert_eq!(folder_for(&anonymous), "unknown");
    }

    #[test]
    fn test_folder_for_rejects_path_components() {
        for from in [
            "x@../../escaped",
            "x@..",
            "x@.hidden",
            "x@a..b",
            "x@a/../../b",
        ] {
            let msg = Message::from_raw("1", format!("From: {from}\n\nx\n").into_bytes());
            assert_eq!(folder_for(&msg), "unknown", "from {from}");
        }
        let slashed = Message::from_raw("2", b"From: x@evil/sub\\dir.com\n\nx\n".to_vec());
        assert_eq!(folder_for(&slashed), "evil_sub_dir.com");
    }

    #[test]
    fn test_reconstruct_message() {
        let msg = Message::from_raw(
            "1",
            b"From: a@x.com\nTo: b@x.com\nSubject: Hi\nX-Other: dropped\n\nhello\n".to_vec(),
        );
        let raw = String::from_utf8(reconstruct_message(&msg, &[]).unwrap()).unwrap();
        assert!(raw.starts_with("From: a@x.com\nSubject: Hi\nTo: b@x.com\n"));
        assert!(!raw.contains("X-Other"));
        assert!(!raw.contains("X-Attachment-Metadata"));
        assert!(raw.ends_with("\n\nhello\n"));
    }
}
