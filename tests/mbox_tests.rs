//! Integration tests for the MBOX reader and the archive source.

mod common;

use common::fixture;
use mailquery::error::{MailQueryError, Result};
use mailquery::parser::header::{decode_encoded_words, parse_date};
use mailquery::parser::mbox::{MboxEntry, MboxReader};
use mailquery::query::Query;
use mailquery::reduce::{AttachmentAnalyzer, EmailStatistics};
use mailquery::source::MboxSource;

fn sample() -> Query {
    Query::new(MboxSource::new(fixture("sample.mbox")))
}

// ─── Test 1: Parse sample.mbox → exactly 5 messages ─────────────────

#[test]
fn test_reader_counts_messages() {
    let entries: Vec<MboxEntry> = MboxReader::open(fixture("sample.mbox"))
        .unwrap()
        .collect::<Result<_>>()
        .unwrap();
    assert_eq!(entries.len(), 5, "sample.mbox should contain exactly 5 messages");
    assert_eq!(entries[0].offset, 0);
    assert!(entries.windows(2).all(|w| w[0].offset + w[0].length == w[1].offset));
}

// ─── Test 2: Envelope fields ────────────────────────────────────────

#[test]
fn test_first_message_envelope() {
    let query = sample();
    let first = query.fetch().unwrap().next().unwrap();
    assert_eq!(first.uid(), "0");
    assert_eq!(first.sender_name(), "Alice Smith");
    assert_eq!(first.sender_email(), "alice@example.com");
    assert_eq!(first.subject(), "Quarterly report");
    assert_eq!(first.envelope().message_id, "<q1@example.com>");
    assert_eq!(
        first.date(),
        parse_date("Mon, 15 Jan 2024 10:30:00 +0000")
    );
    assert!(!first.is_loaded());
}

#[test]
fn test_encoded_subject_is_decoded() {
    assert_eq!(decode_encoded_words("=?UTF-8?B?Q2Fmw6kgbWVldGluZw==?="), "Café meeting");
    let query = sample().subject_contains("café");
    let found: Vec<_> = query.fetch().unwrap().collect();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].sender_email(), "bob@example.org");
}

// ─── Test 3: Lazy bodies ────────────────────────────────────────────

#[test]
fn test_bodies_load_on_demand() {
    let query = sample().from("news@");
    let news = query.fetch().unwrap().next().unwrap();
    assert!(!news.is_loaded());
    assert!(news.html().unwrap().is_some());
    assert!(news.plain_text().unwrap().contains("Spring news"));
    assert!(news.is_loaded());
}

#[test]
fn test_attachment_is_extracted() {
    let query = sample().subject_contains("slides");
    let messages: Vec<_> = query.fetch().unwrap().collect();
    assert_eq!(messages.len(), 2);

    let original = &messages[0];
    let attachments = original.attachments().unwrap();
    assert_eq!(attachments.len(), 1);
    assert_eq!(attachments[0].filename.as_deref(), Some("slides.pdf"));
    assert_eq!(attachments[0].size, 8);
    assert!(!messages[1].has_attachments().unwrap());
}

// ─── Test 4: Filters and reducers over the archive ──────────────────

#[test]
fn test_filters_over_archive() {
    assert_eq!(sample().from("alice").fetch().unwrap().count(), 2);
    assert_eq!(sample().to("carol").fetch().unwrap().count(), 2);
    assert_eq!(sample().involves("carol").fetch().unwrap().count(), 3);
    assert_eq!(sample().body_contains("workshop").fetch().unwrap().count(), 1);
}

#[test]
fn test_statistics_over_archive() {
    let stats = sample().reduce_all(EmailStatistics::default()).unwrap();
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.output.total_emails, 5);
    assert_eq!(stats.output.with_html, 1);
    assert_eq!(stats.output.senders.len(), 4);
    assert_eq!(
        stats.output.sender_counts.get("Alice Smith <alice@example.com>"),
        Some(&2)
    );

    let report = sample().reduce_all(AttachmentAnalyzer::default()).unwrap();
    assert_eq!(report.output.emails_with_attachments, 1);
    assert_eq!(report.output.total_attachments, 1);
    assert_eq!(report.output.largest_attachment.unwrap().filename, "slides.pdf");
}

// ─── Test 5: Source settings ────────────────────────────────────────

#[test]
fn test_fetch_limit_caps_candidates() {
    let query = Query::new(MboxSource::new(fixture("sample.mbox")).with_fetch_limit(Some(3)));
    assert_eq!(query.fetch().unwrap().count(), 3);
}

#[test]
fn test_archive_refuses_deletion() {
    let query = Query::new(MboxSource::new(fixture("sample.mbox")).allow_delete(true)).from("bob");
    let report = query.delete().unwrap();
    assert_eq!(report.attempted, 1);
    assert_eq!(report.succeeded, 0);
}

#[test]
fn test_missing_archive() {
    let query = Query::new(MboxSource::new(fixture("missing.mbox")));
    let err = query.fetch().err().unwrap();
    assert!(matches!(err, MailQueryError::Connection(_)));
}
