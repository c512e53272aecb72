//! Integration tests for persisting query results.

mod common;

use std::cell::Cell;
use std::rc::Rc;

use common::{fixture, team_source};
use mailquery::error::{MailQueryError, Result};
use mailquery::model::Message;
use mailquery::query::Query;
use mailquery::source::MboxSource;
use mailquery::storage::{
    AttachmentStore, CsvStorage, MaildirStorage, MboxStorage, SqliteStorage, StorageBackend,
};

fn sample() -> Query {
    Query::new(MboxSource::new(fixture("sample.mbox")))
}

fn files_in(dir: &std::path::Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

/// Fails on one uid and remembers whether it was set up and closed.
struct Flaky {
    fail_on: &'static str,
    set_up: Rc<Cell<bool>>,
    closed: Rc<Cell<bool>>,
}

impl Flaky {
    fn new(fail_on: &'static str) -> Self {
        Self {
            fail_on,
            set_up: Rc::new(Cell::new(false)),
            closed: Rc::new(Cell::new(false)),
        }
    }
}

impl StorageBackend for Flaky {
    fn setup(&mut self, _attribute_keys: &[String]) -> Result<()> {
        self.set_up.set(true);
        Ok(())
    }

    fn store_message(&mut self, message: &Message) -> Result<bool> {
        if message.uid() == self.fail_on {
            return Err(MailQueryError::Storage("disk full".into()));
        }
        Ok(true)
    }

    fn describe(&self) -> String {
        "flaky backend".into()
    }

    fn close(&mut self) -> Result<()> {
        self.closed.set(true);
        Ok(())
    }
}

// ─── Test 1: Store failures are counted, not fatal ──────────────────

#[test]
fn test_store_failures_are_counted() {
    let mut backend = Flaky::new("2");
    let report = Query::new(team_source()).store_local(&mut backend).unwrap();
    assert_eq!(report.attempted, 4);
    assert_eq!(report.succeeded, 3);
    assert_eq!(report.failed(), 1);
    assert!(backend.set_up.get());
    assert!(backend.closed.get());
}

#[test]
fn test_refused_connection_leaves_backend_untouched() {
    let mut backend = Flaky::new("none");
    let query = Query::new(team_source().refuse_connection());
    let err = query.store_local(&mut backend).unwrap_err();
    assert!(matches!(err, MailQueryError::Connection(_)));
    assert!(!backend.set_up.get());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mail.csv");
    std::fs::write(&path, "previous export\n").unwrap();
    let mut csv = CsvStorage::new(&path, AttachmentStore::metadata_only());
    assert!(Query::new(team_source().refuse_connection())
        .store_local(&mut csv)
        .is_err());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "previous export\n");
}

// ─── Test 2: CSV record store ───────────────────────────────────────

#[test]
fn test_csv_export_with_attributes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mail.csv");
    let mut backend = CsvStorage::new(&path, AttachmentStore::metadata_only()).with_separator(';');

    let query = sample().try_add_attribute("word_count", |m: &Message| -> Result<usize> {
        Ok(m.plain_text()?.split_whitespace().count())
    });
    let report = query.store_local(&mut backend).unwrap();
    assert_eq!(report.attempted, 5);
    assert_eq!(report.succeeded, 5);

    let bytes = std::fs::read(&path).unwrap();
    let text = String::from_utf8(bytes[3..].to_vec()).unwrap();
    let header = text.lines().next().unwrap();
    assert!(header.starts_with("uid;folder;sender;"));
    assert!(header.ends_with(";attachments;word_count"));
    assert!(text.contains("0;example.com;Alice Smith <alice@example.com>;Alice Smith;alice@example.com;Quarterly report;"));
    assert!(text.contains("slides.pdf"));
    assert!(text.contains("lists.example.com"));
}

// ─── Test 3: MBOX store reads back ──────────────────────────────────

#[test]
fn test_mbox_export_reads_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("alice.mbox");
    let mut backend = MboxStorage::new(&path, AttachmentStore::metadata_only());

    let report = sample().from("alice").store_local(&mut backend).unwrap();
    assert_eq!(report.succeeded, 2);

    let copy = Query::new(MboxSource::new(&path));
    let subjects: Vec<String> = copy
        .fetch()
        .unwrap()
        .map(|m| m.subject().to_string())
        .collect();
    assert_eq!(subjects, vec!["Quarterly report", "Re: Slides attached"]);
    let first = copy.fetch().unwrap().next().unwrap();
    assert!(first.plain_text().unwrap().contains("quarterly report is ready"));
}

// ─── Test 4: Maildir store with attachment files ────────────────────

#[test]
fn test_maildir_export_with_attachments() {
    let dir = tempfile::tempdir().unwrap();
    let maildir = dir.path().join("Maildir");
    let attachments = AttachmentStore::new(Some(dir.path().join("attachments"))).unwrap();
    let mut backend = MaildirStorage::new(&maildir, attachments).unwrap();

    let report = sample().store_local(&mut backend).unwrap();
    assert_eq!(report.succeeded, 5);
    assert_eq!(files_in(&maildir.join("new")), 5);
    assert_eq!(files_in(&maildir.join("tmp")), 0);
    assert_eq!(files_in(&dir.path().join("attachments")), 1);

    let with_metadata = std::fs::read_dir(maildir.join("new"))
        .unwrap()
        .filter_map(|e| std::fs::read_to_string(e.unwrap().path()).ok())
        .filter(|content| content.contains("X-Attachment-Metadata"))
        .count();
    assert_eq!(with_metadata, 1);
}

#[test]
fn test_maildir_by_domain() {
    let dir = tempfile::tempdir().unwrap();
    let mut backend = MaildirStorage::new(dir.path(), AttachmentStore::metadata_only())
        .unwrap()
        .by_domain(true);

    sample().store_local(&mut backend).unwrap();
    assert_eq!(files_in(&dir.path().join("example.com/new")), 2);
    assert_eq!(files_in(&dir.path().join("example.org/new")), 1);
    assert_eq!(files_in(&dir.path().join("example.net/new")), 1);
    assert_eq!(files_in(&dir.path().join("lists.example.com/new")), 1);
}

// ─── Test 5: SQLite record store ────────────────────────────────────

#[test]
fn test_sqlite_export_is_resumable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mail.db");

    let mut backend = SqliteStorage::new(&path, AttachmentStore::metadata_only());
    let report = sample().from("alice").store_local(&mut backend).unwrap();
    assert_eq!(report.succeeded, 2);

    let query = sample().add_attribute("subject_length", |m: &Message| m.subject().len());
    let mut backend = SqliteStorage::new(&path, AttachmentStore::metadata_only());
    let report = query.store_local(&mut backend).unwrap();
    assert_eq!(report.attempted, 5);
    assert_eq!(report.succeeded, 3);

    let conn = rusqlite::Connection::open(&path).unwrap();
    let rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM emails", [], |r| r.get(0))
        .unwrap();
    assert_eq!(rows, 5);
    let in_domain: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM emails WHERE folder = 'example.com'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(in_domain, 2);
    let attachments: String = conn
        .query_row(
            "SELECT attachments FROM emails WHERE attachments IS NOT NULL",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert!(attachments.contains("slides.pdf"));
}
