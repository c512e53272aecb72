//! The message entity flowing through a query.

use std::cell::{Cell, OnceCell, Ref, RefCell};
use std::fmt;

use chrono::NaiveDateTime;
use serde_json::Value;

use crate::error::Result;
use crate::model::address::EmailAddress;
use crate::model::attachment::Attachment;
use crate::model::envelope::Envelope;
use crate::parser::{header, mime};

/// Deferred fetch of the complete raw message bytes.
pub type RawLoader = Box<dyn Fn() -> Result<Vec<u8>>>;

/// Decoded body content of a message.
#[derive(Debug, Clone, Default)]
pub struct MessageBody {
    /// Plain text, converted from HTML when the message has no text part.
    pub text: String,
    /// First HTML part, if any.
    pub html: Option<String>,
    pub attachments: Vec<Attachment>,
}

/// A message produced by a [`crate::source::Source`].
///
/// The envelope is parsed eagerly at listing time. The raw bytes are fetched
/// through the loader the first time body content is requested; the first
/// successful load is kept for the lifetime of the message and a failed load
/// is retried on the next access.
pub struct Message {
    uid: String,
    envelope: Envelope,
    sender: EmailAddress,
    loader: RawLoader,
    raw: OnceCell<Vec<u8>>,
    body: OnceCell<MessageBody>,
    extra: RefCell<Vec<(String, Value)>>,
    deleted_on_server: Cell<bool>,
}

impl Message {
    /// Create a message from an envelope and a deferred raw loader.
    pub fn new(
        uid: impl Into<String>,
        envelope: Envelope,
        loader: impl Fn() -> Result<Vec<u8>> + 'static,
    ) -> Self {
        let sender = EmailAddress::parse(&envelope.from);
        Self {
            uid: uid.into(),
            envelope,
            sender,
            loader: Box::new(loader),
            raw: OnceCell::new(),
            body: OnceCell::new(),
            extra: RefCell::new(Vec::new()),
            deleted_on_server: Cell::new(false),
        }
    }

    /// Create a message whose raw bytes are already in memory.
    pub fn from_raw(uid: impl Into<String>, raw: Vec<u8>) -> Self {
        let envelope = header::parse_envelope(&raw);
        let msg = Self::new(uid, envelope, || Ok(Vec::new()));
        let _ = msg.raw.set(raw);
        msg
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    /// Envelope field by field or header name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.envelope.get(name)
    }

    pub fn subject(&self) -> &str {
        &self.envelope.subject
    }

    pub fn sender(&self) -> &EmailAddress {
        &self.sender
    }

    pub fn sender_name(&self) -> &str {
        &self.sender.display_name
    }

    pub fn sender_email(&self) -> &str {
        &self.sender.address
    }

    /// Lowercased domain of the sender address.
    pub fn sender_domain(&self) -> Option<String> {
        self.sender.domain()
    }

    /// Sender display name, else address, else the raw `From` value.
    pub fn cleaned_sender(&self) -> &str {
        let cleaned = self.sender.cleaned();
        if cleaned.is_empty() {
            self.envelope.from.trim()
        } else {
            cleaned
        }
    }

    /// Parsed `Date` header as wall-clock time, offset dropped.
    pub fn date(&self) -> Option<NaiveDateTime> {
        header::parse_date(&self.envelope.date)
    }

    /// Whether the raw bytes have already been fetched.
    pub fn is_loaded(&self) -> bool {
        self.raw.get().is_some()
    }

    /// Complete raw message bytes, fetched on first use.
    pub fn raw(&self) -> Result<&[u8]> {
        if let Some(raw) = self.raw.get() {
            return Ok(raw);
        }
        let loaded = (self.loader)()?;
        Ok(self.raw.get_or_init(|| loaded))
    }

    /// Decoded body, parsed on first use.
    pub fn body(&self) -> Result<&MessageBody> {
        if let Some(body) = self.body.get() {
            return Ok(body);
        }
        let parsed = mime::parse_message_body(self.raw()?);
        Ok(self.body.get_or_init(|| parsed))
    }

    pub fn plain_text(&self) -> Result<&str> {
        Ok(&self.body()?.text)
    }

    pub fn html(&self) -> Result<Option<&str>> {
        Ok(self.body()?.html.as_deref())
    }

    /// HTML when available, otherwise the plain text.
    pub fn formatted_body(&self) -> Result<&str> {
        let body = self.body()?;
        Ok(match &body.html {
            Some(html) if !html.is_empty() => html,
            _ => &body.text,
        })
    }

    pub fn attachments(&self) -> Result<&[Attachment]> {
        Ok(&self.body()?.attachments)
    }

    pub fn has_attachments(&self) -> Result<bool> {
        Ok(!self.attachments()?.is_empty())
    }

    /// Attach a derived value. Re-setting a key replaces its value in place.
    pub fn set_attribute(&self, key: &str, value: Value) {
        let mut extra = self.extra.borrow_mut();
        match extra.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => extra.push((key.to_string(), value)),
        }
    }

    pub fn attribute(&self, key: &str) -> Option<Value> {
        self.extra
            .borrow()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    /// All derived values in insertion order.
    pub fn attributes(&self) -> Ref<'_, Vec<(String, Value)>> {
        self.extra.borrow()
    }

    pub fn is_deleted_on_server(&self) -> bool {
        self.deleted_on_server.get()
    }

    pub(crate) fn mark_deleted_on_server(&self) {
        self.deleted_on_server.set(true);
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("uid", &self.uid)
            .field("from", &self.envelope.from)
            .field("subject", &self.envelope.subject)
            .field("loaded", &self.is_loaded())
            .field("deleted_on_server", &self.deleted_on_server.get())
            .finish()
    }
}
