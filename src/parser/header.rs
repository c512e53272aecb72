//! RFC 5322 header handling: envelope extraction, encoded-word decoding and
//! lenient date parsing.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use mail_parser::MessageParser;
use tracing::debug;

use crate::model::envelope::Envelope;

/// Build an [`Envelope`] from the header section of a raw message.
///
/// Anything after the first blank line is ignored, as is a leading mbox
/// `From ` separator line.
pub fn parse_envelope(raw: &[u8]) -> Envelope {
    let raw = skip_separator_line(raw);
    let header_end = find_header_end(raw).unwrap_or(raw.len());
    let text = decode_header_bytes(&raw[..header_end]);
    let headers = unfold_headers(&text);

    let field = |name: &str| {
        get_header(&headers, name)
            .map(|v| decode_encoded_words(&v))
            .unwrap_or_default()
    };

    Envelope {
        from: field("from"),
        sender_header: field("sender"),
        subject: field("subject"),
        date: field("date"),
        message_id: field("message-id"),
        reply_to: field("reply-to"),
        to: field("to"),
        cc: field("cc"),
        bcc: field("bcc"),
    }
}

/// Find the byte offset where headers end (position of the first blank line).
pub fn find_header_end(data: &[u8]) -> Option<usize> {
    if data.starts_with(b"\n") {
        return Some(0);
    }
    if data.starts_with(b"\r\n") {
        return Some(0);
    }
    data.windows(2)
        .position(|w| w == b"\n\n")
        .map(|i| i + 1)
        .into_iter()
        .chain(
            data.windows(4)
                .position(|w| w == b"\r\n\r\n")
                .map(|i| i + 2),
        )
        .min()
}

/// Skip a leading mbox `From ` separator line.
pub fn skip_separator_line(data: &[u8]) -> &[u8] {
    let data = data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data);
    if data.starts_with(b"From ") {
        if let Some(pos) = data.iter().position(|&b| b == b'\n') {
            return &data[pos + 1..];
        }
    }
    data
}

/// Decode raw header bytes: UTF-8 first, Windows-1252 otherwise.
fn decode_header_bytes(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// Join continuation lines and split into `(lowercase_name, value)` pairs.
fn unfold_headers(text: &str) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = Vec::new();

    for line in text.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(last) = headers.last_mut() {
                last.1.push(' ');
                last.1.push_str(line.trim());
            }
        } else if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_lowercase(), value.trim().to_string()));
        }
    }

    headers
}

fn get_header(headers: &[(String, String)], name: &str) -> Option<String> {
    headers
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.clone())
}

/// Decode RFC 2047 encoded words (`=?charset?B|Q?...?=`) in a header value.
///
/// Values without encoded words are returned unchanged. Decoding is done by
/// mail-parser; if it cannot make sense of the value the input is kept.
pub fn decode_encoded_words(input: &str) -> String {
    if !input.contains("=?") {
        return input.to_string();
    }
    let wrapped = format!("Subject: {input}\n\n");
    MessageParser::default()
        .parse(wrapped.as_bytes())
        .and_then(|msg| msg.subject().map(str::to_string))
        .unwrap_or_else(|| input.to_string())
}

/// Parse an email date into wall-clock time.
///
/// The timezone offset, when present, is dropped rather than converted:
/// `"Fri, 20 Dec 2024 12:00:00 +0100"` becomes `2024-12-20 12:00:00`.
/// Accepts RFC 2822 (with or without day of week and zone), RFC 3339,
/// IMAP-style dates, bare `YYYY-MM-DD`, and several broken variants.
pub fn parse_date(date_str: &str) -> Option<NaiveDateTime> {
    let trimmed = strip_comment(date_str.trim());
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt.naive_local());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.naive_local());
    }

    let no_dow = strip_day_of_week(trimmed);
    let normalized = normalize_imap_date(&no_dow);

    const FORMATS: [&str; 9] = [
        "%d %b %Y %H:%M:%S %z",
        "%d %b %Y %H:%M:%S",
        "%d %b %Y %H:%M %z",
        "%d %b %Y %H:%M",
        "%b %d %H:%M:%S %Y",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S %z",
        "%Y-%m-%d %H:%M:%S",
        "%d/%m/%Y %H:%M:%S",
    ];

    for candidate in [no_dow.clone(), normalized.clone(), replace_named_tz(&normalized)] {
        for fmt in FORMATS {
            if let Ok(dt) = DateTime::parse_from_str(&candidate, fmt) {
                return Some(dt.naive_local());
            }
            if let Ok(ndt) = NaiveDateTime::parse_from_str(&candidate, fmt) {
                return Some(ndt);
            }
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }

    if let Some(dt) = mail_parser_date(trimmed) {
        return Some(dt);
    }

    debug!(date = trimmed, "Could not parse date");
    None
}

/// Last resort: let mail-parser interpret the value.
fn mail_parser_date(input: &str) -> Option<NaiveDateTime> {
    let wrapped = format!("Date: {input}\n\n");
    let parsed = MessageParser::default().parse(wrapped.as_bytes())?;
    let rfc3339 = parsed.date()?.to_rfc3339();
    DateTime::parse_from_rfc3339(&rfc3339)
        .ok()
        .map(|d| d.naive_local())
}

/// Drop a trailing comment such as `" (UTC)"` or `" (Pacific Standard Time)"`.
fn strip_comment(s: &str) -> &str {
    match s.find(" (") {
        Some(pos) => s[..pos].trim_end(),
        None => s,
    }
}

fn strip_day_of_week(s: &str) -> String {
    const DAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
    for day in DAYS {
        if let Some(rest) = s.strip_prefix(day) {
            if rest.starts_with(',') || rest.starts_with(' ') {
                return rest.trim_start_matches(',').trim().to_string();
            }
        }
    }
    s.to_string()
}

/// `"16-JUL-2025 03:01:03"` → `"16 Jul 2025 03:01:03"`.
fn normalize_imap_date(s: &str) -> String {
    const MONTHS: [&str; 12] = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];
    let mut parts = s.splitn(3, '-');
    let (Some(day), Some(month), Some(rest)) = (parts.next(), parts.next(), parts.next()) else {
        return s.to_string();
    };
    if !day.chars().all(|c| c.is_ascii_digit()) {
        return s.to_string();
    }
    match MONTHS.iter().find(|m| m.eq_ignore_ascii_case(month)) {
        Some(title) => format!("{day} {title} {rest}"),
        None => s.to_string(),
    }
}

fn replace_named_tz(s: &str) -> String {
    const ZONES: [(&str, &str); 13] = [
        ("EST", "-0500"),
        ("EDT", "-0400"),
        ("CST", "-0600"),
        ("CDT", "-0500"),
        ("MST", "-0700"),
        ("MDT", "-0600"),
        ("PST", "-0800"),
        ("PDT", "-0700"),
        ("GMT", "+0000"),
        ("UTC", "+0000"),
        ("CEST", "+0200"),
        ("CET", "+0100"),
        ("JST", "+0900"),
    ];
    for (name, offset) in ZONES {
        if let Some(head) = s.strip_suffix(name) {
            return format!("{head}{offset}");
        }
    }
    s.to_string()
}
