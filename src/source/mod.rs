//! Where candidate messages come from.
//!
//! A [`Source`] lists candidates lazily, optionally narrowed by a compiled
//! [`ServerQuery`], and can delete a message by uid. Remote protocol clients
//! implement this trait outside the crate; [`MemorySource`] and
//! [`MboxSource`] are provided.

pub mod mbox;
pub mod memory;

use crate::error::Result;
use crate::model::message::Message;
use crate::query::compile::ServerQuery;

pub use mbox::MboxSource;
pub use memory::MemorySource;

/// Owned lazy listing of candidates. An `Err` item is a per-candidate fault
/// unless [`is_fatal`](crate::error::MailQueryError::is_fatal) says otherwise.
pub type CandidateStream = Box<dyn Iterator<Item = Result<Message>>>;

pub trait Source {
    /// Establish the connection. Failing here aborts the operation.
    fn connect(&mut self) -> Result<()>;

    /// List candidates, using `hints` to narrow the listing where supported.
    ///
    /// The listing may be a superset of what `hints` describes.
    fn list_candidates(&mut self, hints: &ServerQuery) -> Result<CandidateStream>;

    /// Delete one message; `Ok(false)` when the source refuses.
    fn delete_by_id(&mut self, uid: &str) -> Result<bool>;

    fn describe(&self) -> String;
}
