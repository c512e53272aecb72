//! Decoded attachments.

/// One attachment extracted from a message body.
///
/// Content is held decoded; it is only produced once the message body has
/// been loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Filename from the MIME headers, if any.
    pub filename: Option<String>,

    /// MIME content type (e.g. `"image/jpeg"`, `"application/pdf"`).
    pub content_type: String,

    /// Decoded size in bytes.
    pub size: usize,

    /// Decoded content.
    pub content: Vec<u8>,
}

impl Attachment {
    /// Filename to show to users, generated from the position when missing.
    pub fn display_name(&self, index: usize) -> String {
        match &self.filename {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("attachment_{index}"),
        }
    }
}
