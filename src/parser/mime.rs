//! MIME body decoding: text, HTML and attachments, plus HTML-to-text conversion.

use mail_parser::{MessageParser, MimeHeaders};

use crate::model::attachment::Attachment;
use crate::model::message::MessageBody;
use crate::parser::header::{find_header_end, skip_separator_line};

/// Decode a complete raw message (headers + body).
///
/// Uses `mail-parser`; if the message cannot be parsed at all, everything
/// after the header block is returned as plain text.
pub fn parse_message_body(raw_message: &[u8]) -> MessageBody {
    let message_bytes = skip_separator_line(raw_message);

    let Some(msg) = MessageParser::default().parse(message_bytes) else {
        return MessageBody {
            text: extract_body_fallback(message_bytes),
            html: None,
            attachments: Vec::new(),
        };
    };

    let text_parts: Vec<String> = (0..msg.text_body.len())
        .filter_map(|i| msg.body_text(i))
        .map(|s| s.trim_end().to_string())
        .filter(|s| !s.trim().is_empty())
        .collect();

    let html = msg.body_html(0).map(|s| s.into_owned());

    let has_text_part = msg
        .text_body
        .iter()
        .filter_map(|&id| msg.part(id))
        .any(|part| part.is_text() && !part.is_text_html());

    let text = if has_text_part && !text_parts.is_empty() {
        text_parts.join("\n\n")
    } else if let Some(html) = &html {
        html_to_text(html)
    } else {
        text_parts.join("\n\n")
    };

    MessageBody {
        text,
        html,
        attachments: collect_attachments(&msg),
    }
}

fn collect_attachments(msg: &mail_parser::Message<'_>) -> Vec<Attachment> {
    msg.attachments()
        .filter(|part| !part.contents().is_empty())
        .map(|part| {
            let content_type = part
                .content_type()
                .map(|ct| match ct.subtype() {
                    Some(sub) => format!("{}/{}", ct.ctype(), sub),
                    None => ct.ctype().to_string(),
                })
                .unwrap_or_else(|| "application/octet-stream".to_string())
                .to_lowercase();
            let content = part.contents().to_vec();
            Attachment {
                filename: part.attachment_name().map(String::from),
                content_type,
                size: content.len(),
                content,
            }
        })
        .collect()
}

/// Everything after the first blank line, lossily decoded.
fn extract_body_fallback(data: &[u8]) -> String {
    match find_header_end(data) {
        Some(end) => {
            let body = &data[end..];
            let body = body
                .strip_prefix(b"\r\n")
                .or_else(|| body.strip_prefix(b"\n"))
                .unwrap_or(body);
            String::from_utf8_lossy(body).trim_end().to_string()
        }
        None => String::new(),
    }
}

/// Convert HTML to readable plain text.
///
/// Drops scripts and styles, turns block elements into line breaks, strips
/// the remaining tags, decodes common entities and collapses blank lines.
pub fn html_to_text(html: &str) -> String {
    let mut text = remove_tag_block(html, "script");
    text = remove_tag_block(&text, "style");

    let mut spaced = String::with_capacity(text.len());
    let mut rest = text.as_str();
    while let Some(start) = rest.find('<') {
        spaced.push_str(&rest[..start]);
        let Some(len) = rest[start..].find('>') else {
            rest = "";
            break;
        };
        let tag = rest[start + 1..start + len].trim().to_lowercase();
        let name = tag
            .trim_start_matches('/')
            .split(|c: char| c.is_whitespace() || c == '/')
            .next()
            .unwrap_or("");
        if matches!(
            name,
            "br" | "p" | "div" | "tr" | "li" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6"
        ) {
            spaced.push('\n');
        }
        rest = &rest[start + len + 1..];
    }
    spaced.push_str(rest);

    let decoded = spaced
        .replace("&nbsp;", " ")
        .replace("&#160;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&");

    let mut cleaned = String::with_capacity(decoded.len());
    let mut prev_blank = false;
    for line in decoded.lines() {
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.is_empty() {
            if !prev_blank && !cleaned.is_empty() {
                cleaned.push('\n');
            }
            prev_blank = true;
        } else {
            cleaned.push_str(&line);
            cleaned.push('\n');
            prev_blank = false;
        }
    }
    cleaned.trim().to_string()
}

/// Remove an entire element including its content (e.g. `<script>…</script>`).
fn remove_tag_block(html: &str, tag: &str) -> String {
    let lower = html.to_ascii_lowercase();
    let open = format!("<{tag}");
    let close = format!("</{tag}>");
    let mut result = String::with_capacity(html.len());
    let mut pos = 0;

    while let Some(start) = lower[pos..].find(&open).map(|i| i + pos) {
        result.push_str(&html[pos..start]);
        match lower[start..].find(&close) {
            Some(end) => pos = start + end + close.len(),
            None => return result,
        }
    }
    result.push_str(&html[pos..]);
    result
}
