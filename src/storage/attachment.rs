//! Content-addressed attachment files.

use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{MailQueryError, Result};
use crate::model::message::Message;

/// Where and how one attachment was stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredAttachment {
    pub filename: String,
    pub content_type: String,
    pub size: usize,
    pub sha256: String,
    /// File written in the attachment directory, if one is configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Writes attachment bytes under `<sha256><ext>`; identical content is
/// written once. Without a directory only metadata is produced.
#[derive(Debug, Clone, Default)]
pub struct AttachmentStore {
    dir: Option<PathBuf>,
}

impl AttachmentStore {
    pub fn new(dir: Option<PathBuf>) -> Result<Self> {
        if let Some(dir) = &dir {
            std::fs::create_dir_all(dir).map_err(|e| MailQueryError::io(dir, e))?;
        }
        Ok(Self { dir })
    }

    /// Metadata-only store.
    pub fn metadata_only() -> Self {
        Self { dir: None }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub fn store(&self, message: &Message) -> Result<Vec<StoredAttachment>> {
        let mut stored = Vec::new();
        for (i, att) in message.attachments()?.iter().enumerate() {
            if att.content.is_empty() {
                continue;
            }
            let digest = format!("{:x}", Sha256::digest(&att.content));
            let path = match &self.dir {
                Some(dir) => {
                    let path = dir.join(format!("{digest}{}", extension_for(&att.content_type)));
                    if path.exists() {
                        debug!(path = %path.display(), "Attachment already stored");
                    } else {
                        std::fs::write(&path, &att.content)
                            .map_err(|e| MailQueryError::io(&path, e))?;
                    }
                    Some(path)
                }
                None => None,
            };
            stored.push(StoredAttachment {
                filename: att.display_name(i + 1),
                content_type: att.content_type.clone(),
                size: att.size,
                sha256: digest,
                path,
            });
        }
        Ok(stored)
    }
}

/// File extension for a MIME type, `.bin` when unknown.
pub fn extension_for(content_type: &str) -> &'static str {
    let base = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    match base.as_str() {
        "image/jpeg" | "image/jpg" => ".jpg",
        "image/png" => ".png",
        "image/gif" => ".gif",
        "image/webp" => ".webp",
        "application/pdf" => ".pdf",
        "application/msword" => ".doc",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => ".docx",
        "application/vnd.ms-excel" => ".xls",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => ".xlsx",
        "application/vnd.ms-powerpoint" => ".ppt",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation" => ".pptx",
        "text/plain" => ".txt",
        "text/html" => ".html",
        "text/csv" => ".csv",
        "application/zip" | "application/x-zip-compressed" => ".zip",
        "application/rar" | "application/x-rar-compressed" => ".rar",
        "audio/mpeg" => ".mp3",
        "audio/wav" => ".wav",
        "video/mp4" => ".mp4",
        "video/quicktime" => ".mov",
        _ => ".bin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW: &[u8] = b"From: a@b.com\nSubject: Report\nMIME-Version: 1.0\nContent-Type: multipart/mixed; boundary=\"XYZ\"\n\n--XYZ\nContent-Type: text/plain\n\nSee attached.\n--XYZ\nContent-Type: application/pdf\nContent-Disposition: attachment; filename=\"report.pdf\"\nContent-Transfer-Encoding: base64\n\nJVBERi0xLjQ=\n--XYZ--\n";

    #[test]
    fn test_extension_for() {
        assert_eq!(extension_for("application/pdf"), ".pdf");
        assert_eq!(extension_for("IMAGE/JPEG; name=x"), ".jpg");
        assert_eq!(extension_for("application/x-unknown"), ".bin");
    }

    #[test]
    fn test_metadata_only() {
        let msg = Message::from_raw("1", RAW.to_vec());
        let stored = AttachmentStore::metadata_only().store(&msg).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].filename, "report.pdf");
        assert_eq!(stored[0].size, 8);
        assert_eq!(stored[0].sha256.len(), 64);
        assert!(stored[0].path.is_none());
    }

    #[test]
    fn test_files_are_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let store = AttachmentStore::new(Some(dir.path().join("att"))).unwrap();
        let first = store.store(&Message::from_raw("1", RAW.to_vec())).unwrap();
        let second = store.store(&Message::from_raw("2", RAW.to_vec())).unwrap();
        assert_eq!(first[0].path, second[0].path);
        let path = first[0].path.as_ref().unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"%PDF-1.4");
        assert!(path.to_string_lossy().ends_with(".pdf"));
        assert_eq!(std::fs::read_dir(dir.path().join("att")).unwrap().count(), 1);
    }
}
