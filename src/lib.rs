//! `mailquery`: lazy, filterable and cacheable email queries.
//!
//! A [`query::Query`] combines a [`source::Source`] of candidate messages
//! with an ordered chain of [`filter::Filter`]s. Iteration is lazy: messages
//! are pulled from the source only as the caller consumes them, cached by
//! uid, and evaluated against the chain. The compatible prefix of the chain
//! is compiled into hints the source can apply server-side.
//!
//! Results can be folded with a [`reduce::Reducer`], deleted at the source,
//! or persisted through a [`storage::StorageBackend`].

pub mod config;
pub mod error;
pub mod filter;
pub mod model;
pub mod parser;
pub mod query;
pub mod reduce;
pub mod source;
pub mod storage;
