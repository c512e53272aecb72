//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::path::PathBuf;

use chrono::NaiveDate;
use mailquery::query::clock::FixedClock;
use mailquery::source::MemorySource;

pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

pub fn raw(from: &str, to: &str, subject: &str, date: &str, body: &str) -> String {
    format!("From: {from}\nTo: {to}\nSubject: {subject}\nDate: {date}\n\n{body}\n")
}

/// Four messages from alice, bob and charlie.
pub fn team_source() -> MemorySource {
    MemorySource::from_messages([
        (
            "1",
            raw(
                "Alice <alice@example.com>",
                "bob@example.com",
                "Hello team",
                "Mon, 02 Dec 2024 09:00:00 +0000",
                "hello everyone, foobar is ready",
            ),
        ),
        (
            "2",
            raw(
                "Bob <bob@example.com>",
                "alice@example.com",
                "Lunch?",
                "Tue, 03 Dec 2024 12:00:00 +0000",
                "pizza or sushi",
            ),
        ),
        (
            "3",
            raw(
                "Alice <alice@example.com>",
                "charlie@example.com",
                "Meeting notes",
                "Wed, 04 Dec 2024 15:00:00 +0000",
                "notes mention foobar twice: foobar",
            ),
        ),
        (
            "4",
            raw(
                "Charlie <charlie@example.com>",
                "alice@example.com",
                "Hello again",
                "Thu, 05 Dec 2024 08:30:00 +0000",
                "nothing to see",
            ),
        ),
    ])
}

/// "Now" for the dated fixture.
pub fn clock() -> FixedClock {
    FixedClock(
        NaiveDate::from_ymd_opt(2024, 12, 20)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap(),
    )
}

/// Ten messages spread over the months before [`clock`].
pub fn dated_source() -> MemorySource {
    let dates = [
        "Thu, 19 Dec 2024 10:00:00 +0000",
        "Wed, 18 Dec 2024 10:00:00 +0000",
        "Mon, 16 Dec 2024 10:00:00 +0000",
        "Sat, 14 Dec 2024 10:00:00 +0000",
        "Tue, 10 Dec 2024 10:00:00 +0000",
        "Thu, 05 Dec 2024 10:00:00 +0000",
        "Sun, 01 Dec 2024 10:00:00 +0000",
        "Wed, 20 Nov 2024 10:00:00 +0000",
        "Fri, 01 Nov 2024 10:00:00 +0000",
        "Tue, 01 Oct 2024 10:00:00 +0000",
    ];
    MemorySource::from_messages(dates.iter().enumerate().map(|(i, date)| {
        (
            (i + 1).to_string(),
            raw(
                "sender@example.com",
                "me@example.com",
                &format!("Message {}", i + 1),
                date,
                "body",
            ),
        )
    }))
}

/// `count` numbered messages from the same sender.
pub fn numbered_source(count: usize) -> MemorySource {
    MemorySource::from_messages((1..=count).map(|i| {
        (
            i.to_string(),
            raw(
                "bulk@example.com",
                "me@example.com",
                &format!("Item {i}"),
                "Mon, 02 Dec 2024 09:00:00 +0000",
                &format!("item number {i} of the batch"),
            ),
        )
    }))
}

/// Five bare ISO dates from 2023 and five zoneless dates around [`clock`].
pub fn mixed_date_source() -> MemorySource {
    let messages = [
        ("john@example.com", "Hello", "2023-06-25"),
        ("john@example.com", "Update", "2023-06-26"),
        ("jane@example.com", "Spam", "2023-06-27"),
        ("alice@example.com", "Newsletter", "2023-06-28"),
        ("bob@example.com", "Meeting", "2023-06-29"),
        ("recent@example.com", "Recent Email", "Sun, 15 Dec 2024 12:00:00"),
        ("today@example.com", "Today's Email", "Fri, 20 Dec 2024 12:00:00"),
        ("yesterday@example.com", "Yesterday's Email", "Thu, 19 Dec 2024 12:00:00"),
        ("week_ago@example.com", "Week Ago Email", "Fri, 13 Dec 2024 12:00:00"),
        ("month_ago@example.com", "Month Ago Email", "Wed, 20 Nov 2024 12:00:00"),
    ];
    MemorySource::from_messages(messages.iter().enumerate().map(|(i, (from, subject, date))| {
        (
            (i + 1).to_string(),
            raw(from, "me@example.com", subject, date, "body"),
        )
    }))
}
