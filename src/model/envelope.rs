//! Header-only message metadata.

use serde::Serialize;

/// Header fields known at listing time, without fetching the body.
///
/// Missing headers are stored as empty strings. Values have RFC 2047 encoded
/// words already decoded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Envelope {
    /// `From` header (also exposed as the sender).
    pub from: String,
    /// Separate `Sender` header.
    pub sender_header: String,
    pub subject: String,
    /// `Date` header, as found in the message.
    pub date: String,
    pub message_id: String,
    pub reply_to: String,
    pub to: String,
    pub cc: String,
    pub bcc: String,
}

impl Envelope {
    /// Look up a field by name.
    ///
    /// Accepts field names (`"reply_to"`) as well as header names
    /// (`"Reply-To"`), case-insensitively. `"sender"` is an alias of `"from"`.
    /// Returns `None` for unknown names and for empty values.
    pub fn get(&self, name: &str) -> Option<&str> {
        let key = name.trim().to_lowercase().replace('-', "_");
        let value = match key.as_str() {
            "from" | "sender" => &self.from,
            "sender_header" => &self.sender_header,
            "subject" => &self.subject,
            "date" => &self.date,
            "message_id" => &self.message_id,
            "reply_to" => &self.reply_to,
            "to" => &self.to,
            "cc" => &self.cc,
            "bcc" => &self.bcc,
            _ => return None,
        };
        if value.is_empty() {
            None
        } else {
            Some(value.as_str())
        }
    }

    /// Non-empty `(header name, value)` pairs in canonical order.
    pub fn headers(&self) -> Vec<(&'static str, &str)> {
        [
            ("From", &self.from),
            ("Sender", &self.sender_header),
            ("Subject", &self.subject),
            ("Date", &self.date),
            ("Message-ID", &self.message_id),
            ("Reply-To", &self.reply_to),
            ("To", &self.to),
            ("Cc", &self.cc),
            ("Bcc", &self.bcc),
        ]
        .into_iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| (k, v.as_str()))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_by_field_and_header_name() {
        let env = Envelope {
            from: "alice@example.com".into(),
            reply_to: "list@example.com".into(),
            ..Default::default()
        };
        assert_eq!(env.get("sender"), Some("alice@example.com"));
        assert_eq!(env.get("From"), Some("alice@example.com"));
        assert_eq!(env.get("Reply-To"), Some("list@example.com"));
        assert_eq!(env.get("reply_to"), Some("list@example.com"));
        assert_eq!(env.get("subject"), None);
        assert_eq!(env.get("x-mailer"), None);
    }

    #[test]
    fn test_headers_skip_empty() {
        let env = Envelope {
            from: "a@b.com".into(),
            subject: "Hi".into(),
            ..Default::default()
        };
        assert_eq!(env.headers(), vec![("From", "a@b.com"), ("Subject", "Hi")]);
    }
}
