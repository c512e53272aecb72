//! Maildir directory store.

use std::path::{Path, PathBuf};

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::error::{MailQueryError, Result};
use crate::model::message::Message;
use crate::storage::{folder_for, reconstruct_message, AttachmentStore, StorageBackend};

/// Writes each message into `new/`, going through `tmp/` first.
///
/// With `by_domain`, every sender domain gets its own Maildir below the root.
pub struct MaildirStorage {
    root: PathBuf,
    by_domain: bool,
    attachments: AttachmentStore,
    delivered: u64,
}

impl MaildirStorage {
    pub fn new(root: impl AsRef<Path>, attachments: AttachmentStore) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        ensure_maildir(&root)?;
        Ok(Self {
            root,
            by_domain: false,
            attachments,
            delivered: 0,
        })
    }

    pub fn by_domain(mut self, enabled: bool) -> Self {
        self.by_domain = enabled;
        self
    }

    fn unique_name(&mut self, message: &Message) -> String {
        self.delivered += 1;
        let now = Utc::now();
        let mut hasher = Sha256::new();
        hasher.update(message.uid().as_bytes());
        hasher.update(now.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
        hasher.update(self.delivered.to_le_bytes());
        let digest = format!("{:x}", hasher.finalize());
        format!(
            "{}.{}_{}.mailquery",
            now.timestamp(),
            &digest[..16],
            self.delivered
        )
    }
}

fn ensure_maildir(dir: &Path) -> Result<()> {
    for sub in ["cur", "new", "tmp"] {
        let path = dir.join(sub);
        std::fs::create_dir_all(&path).map_err(|e| MailQueryError::io(&path, e))?;
    }
    Ok(())
}

impl StorageBackend for MaildirStorage {
    fn store_message(&mut self, message: &Message) -> Result<bool> {
        let dir = if self.by_domain {
            let dir = self.root.join(folder_for(message));
            ensure_maildir(&dir)?;
            dir
        } else {
            self.root.clone()
        };

        let attachments = self.attachments.store(message)?;
        let raw = reconstruct_message(message, &attachments)?;
        let name = self.unique_name(message);
        let tmp = dir.join("tmp").join(&name);
        let new = dir.join("new").join(&name);
        std::fs::write(&tmp, raw).map_err(|e| MailQueryError::io(&tmp, e))?;
        std::fs::rename(&tmp, &new).map_err(|e| MailQueryError::io(&new, e))?;
        Ok(true)
    }

    fn describe(&self) -> String {
        format!("maildir {}", self.root.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(uid: &str, from: &str) -> Message {
        Message::from_raw(uid, format!("From: {from}\nSubject: S\n\nbody\n").into_bytes())
    }

    #[test]
    fn test_creates_structure_and_delivers_to_new() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = MaildirStorage::new(dir.path(), AttachmentStore::metadata_only()).unwrap();
        assert!(storage.store_message(&msg("1", "a@x.com")).unwrap());
        assert!(storage.store_message(&msg("1", "a@x.com")).unwrap());
        for sub in ["cur", "new", "tmp"] {
            assert!(dir.path().join(sub).is_dir());
        }
        assert_eq!(std::fs::read_dir(dir.path().join("new")).unwrap().count(), 2);
        assert_eq!(std::fs::read_dir(dir.path().join("tmp")).unwrap().count(), 0);
    }

    #[test]
    fn test_by_domain_folders() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = MaildirStorage::new(dir.path(), AttachmentStore::metadata_only())
            .unwrap()
            .by_domain(true);
        storage.store_message(&msg("1", "a@one.org")).unwrap();
        storage.store_message(&msg("2", "b@two.org")).unwrap();
        assert_eq!(std::fs::read_dir(dir.path().join("one.org/new")).unwrap().count(), 1);
        assert_eq!(std::fs::read_dir(dir.path().join("two.org/new")).unwrap().count(), 1);
    }

    #[test]
    fn test_by_domain_stays_inside_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("out");
        let mut storage = MaildirStorage::new(&root, AttachmentStore::metadata_only())
            .unwrap()
            .by_domain(true);
        assert!(storage.store_message(&msg("1", "x@../../escaped")).unwrap());

        assert!(!dir.path().join("escaped").exists());
        assert!(!dir.path().parent().unwrap().join("escaped").exists());
        assert_eq!(std::fs::read_dir(root.join("unknown/new")).unwrap().count(), 1);
    }
}
