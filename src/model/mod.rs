//! Core data model types for messages, envelopes, addresses and attachments.

pub mod address;
pub mod attachment;
pub mod envelope;
pub mod message;

pub use envelope::Envelope;
pub use message::{Message, MessageBody};
