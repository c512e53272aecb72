//! SQLite record store: one row per message in an `emails` table.

use std::path::{Path, PathBuf};

use rusqlite::{params_from_iter, Connection};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{MailQueryError, Result};
use crate::model::message::Message;
use crate::storage::{folder_for, AttachmentStore, StorageBackend};

const BASE_COLUMNS: [&str; 13] = [
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
    "html",
    "attachments",
];

const SCHEMA: &str = r"
    CREATE TABLE IF NOT EXISTS emails (
        uid TEXT PRIMARY KEY,
        folder TEXT NOT NULL DEFAULT '',
        sender TEXT NOT NULL DEFAULT '',
        sender_name TEXT NOT NULL DEFAULT '',
        sender_email TEXT NOT NULL DEFAULT '',
        subject TEXT NOT NULL DEFAULT '',
        date TEXT NOT NULL DEFAULT '',
        message_id TEXT NOT NULL DEFAULT '',
        reply_to TEXT NOT NULL DEFAULT '',
        recipient TEXT NOT NULL DEFAULT '',
        body TEXT NOT NULL DEFAULT '',
        html TEXT,
        attachments TEXT,
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    );
    CREATE INDEX IF NOT EXISTS idx_emails_folder ON emails(folder);
    CREATE INDEX IF NOT EXISTS idx_emails_sender ON emails(sender);
    CREATE INDEX IF NOT EXISTS idx_emails_date ON emails(date);
";

/// Writes messages into a SQLite database, keyed by uid.
///
/// Each attribute key learned in `setup` becomes a TEXT column, added to an
/// existing table when missing. A uid already in the table is skipped.
pub struct SqliteStorage {
    path: PathBuf,
    attachments: AttachmentStore,
    extra_columns: Vec<String>,
    conn: Option<Connection>,
}

impl SqliteStorage {
    pub fn new(path: impl AsRef<Path>, attachments: AttachmentStore) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            attachments,
            extra_columns: Vec::new(),
            conn: None,
        }
    }

    fn conn(&self) -> Result<&Connection> {
        self.conn
            .as_ref()
            .ok_or_else(|| MailQueryError::Storage("SQLite store used before setup".into()))
    }

    fn existing_columns(conn: &Connection) -> Result<Vec<String>> {
        let mut stmt = conn
            .prepare("PRAGMA table_info(emails)")
            .map_err(db_error)?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .map_err(db_error)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_error)?;
        Ok(names)
    }
}

fn db_error(e: rusqlite::Error) -> MailQueryError {
    MailQueryError::Storage(format!("SQLite: {e}"))
}

/// Quote an identifier; attribute keys are caller-chosen.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn attribute_text(value: Option<Value>) -> Option<String> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    }
}

impl StorageBackend for SqliteStorage {
    fn setup(&mut self, attribute_keys: &[String]) -> Result<()> {
        let conn = Connection::open(&self.path).map_err(db_error)?;
        conn.execute_batch(SCHEMA).map_err(db_error)?;

        let existing = Self::existing_columns(&conn)?;
        let mut extra_columns = Vec::new();
        for key in attribute_keys {
            if BASE_COLUMNS.iter().chain(&["created_at"]).any(|c| c.eq_ignore_ascii_case(key)) {
                warn!(attribute = %key, "Attribute name clashes with a built-in column, not stored");
                continue;
            }
            extra_columns.push(key.clone());
            if existing.iter().any(|c| c.eq_ignore_ascii_case(key)) {
                continue;
            }
            debug!(column = %key, "Adding attribute column");
            conn.execute(
                &format!("ALTER TABLE emails ADD COLUMN {} TEXT", quote_ident(key)),
                [],
            )
            .map_err(db_error)?;
        }

        self.extra_columns = extra_columns;
        self.conn = Some(conn);
        Ok(())
    }

    fn store_message(&mut self, message: &Message) -> Result<bool> {
        let conn = self.conn()?;
        let known: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM emails WHERE uid = ?1)",
                [message.uid()],
                |row| row.get(0),
            )
            .map_err(db_error)?;
        if known {
            debug!(uid = message.uid(), "Already stored, skipping");
            return Ok(false);
        }

        let attachments = self.attachments.store(message)?;
        let attachments = if attachments.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&attachments).map_err(|e| MailQueryError::Storage(e.to_string()))?)
        };
        let env = message.envelope();

        let mut values: Vec<Option<String>> = vec![
            Some(message.uid().to_string()),
            Some(folder_for(message)),
            Some(env.from.clone()),
            Some(message.sender_name().to_string()),
            Some(message.sender_email().to_string()),
            Some(env.subject.clone()),
            Some(env.date.clone()),
            Some(env.message_id.clone()),
            Some(env.reply_to.clone()),
            Some(env.to.clone()),
            Some(message.plain_text()?.to_string()),
            message.html()?.map(str::to_string),
            attachments,
        ];
        values.extend(
            self.extra_columns
                .iter()
                .map(|key| attribute_text(message.attribute(key))),
        );

        let columns: Vec<String> = BASE_COLUMNS
            .iter()
            .map(|c| c.to_string())
            .chain(self.extra_columns.iter().map(|k| quote_ident(k)))
            .collect();
        let placeholders = (1..=columns.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT OR IGNORE INTO emails ({}) VALUES ({placeholders})",
            columns.join(", ")
        );
        let inserted = conn
            .execute(&sql, params_from_iter(values.iter()))
            .map_err(db_error)?;
        Ok(inserted == 1)
    }

    fn describe(&self) -> String {
        format!("SQLite database {}", self.path.display())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, e)| db_error(e))?;
        }
        Ok(())
    }
}
