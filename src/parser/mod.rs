//! Email parsing: streaming MBOX reader, header decoding and MIME handling.

pub mod header;
pub mod mbox;
pub mod mime;
