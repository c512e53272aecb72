//! Sender address parsing.

/// A parsed `Name <user@domain>` mailbox.
///
/// # Examples
/// - `"Alice Smith <alice@example.com>"` → name `"Alice Smith"`, address `"alice@example.com"`
/// - `"alice@example.com"` → name `""`, address `"alice@example.com"`
/// - `"Alice"` → name `"Alice"`, address `""`
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct EmailAddress {
    /// Human-readable display name (may be empty).
    pub display_name: String,
    /// The bare email address (may be empty when the header only carried a name).
    pub address: String,
}

impl EmailAddress {
    /// Parse a single mailbox from a header value.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();

        if let (Some(open), Some(close)) = (trimmed.rfind('<'), trimmed.rfind('>')) {
            if close > open {
                return Self {
                    display_name: strip_quotes(trimmed[..open].trim()),
                    address: trimmed[open + 1..close].trim().to_string(),
                };
            }
        }

        if trimmed.contains('@') {
            Self {
                display_name: String::new(),
                address: trimmed.to_string(),
            }
        } else {
            Self {
                display_name: trimmed.to_string(),
                address: String::new(),
            }
        }
    }

    /// Domain part of the address, lowercased.
    pub fn domain(&self) -> Option<String> {
        let (_, domain) = self.address.rsplit_once('@')?;
        if domain.is_empty() {
            None
        } else {
            Some(domain.to_lowercase())
        }
    }

    /// Best human-readable form: the display name, falling back to the address.
    pub fn cleaned(&self) -> &str {
        if self.display_name.is_empty() {
            &self.address
        } else {
            &self.display_name
        }
    }

    pub fn is_empty(&self) -> bool {
        self.display_name.is_empty() && self.address.is_empty()
    }
}

fn strip_quotes(s: &str) -> String {
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(s)
        .trim()
        .to_string()
}
