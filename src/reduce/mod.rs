//! Folding query results into a single value.
//!
//! A [`Reducer`] sees every matching message once. A message whose fold
//! fails is reported, handed to [`Reducer::recover`] and skipped; the
//! reduction always continues with the next message.

pub mod collect;
pub mod document;
pub mod stats;

use crate::error::{MailQueryError, Result};
use crate::model::message::Message;

pub use collect::{LongestSubjectFinder, SenderCollector, SubjectConcatenator, WordCountReducer};
pub use document::{HtmlPageBuilder, SummaryCollector, TextDocumentBuilder};
pub use stats::{AttachmentAnalyzer, EmailStatistics};

pub trait Reducer {
    type Output;

    /// Name used in diagnostics.
    fn name(&self) -> &str {
        let full = std::any::type_name::<Self>();
        let base = full.split('<').next().unwrap_or(full);
        base.rsplit("::").next().unwrap_or(base)
    }

    /// Called once before the first message.
    fn init(&mut self) {}

    fn fold(&mut self, message: &Message) -> Result<()>;

    /// Called after `fold` failed on `message`. The default skips it.
    fn recover(&mut self, _message: &Message, _error: &MailQueryError) {}

    /// Produce the result. Called exactly once, after the last message.
    fn finish(self) -> Self::Output;
}

/// Result of [`Query::reduce_all`](crate::query::Query::reduce_all).
#[derive(Debug, Clone, PartialEq)]
pub struct Reduction<T> {
    pub output: T,
    /// Messages folded successfully.
    pub folded: usize,
    /// Messages whose fold failed.
    pub failed: usize,
}

impl<T> Reduction<T> {
    pub fn attempted(&self) -> usize {
        self.folded + self.failed
    }
}

/// Counts messages.
#[derive(Debug, Default)]
pub struct CountReducer {
    count: usize,
}

impl Reducer for CountReducer {
    type Output = usize;

    fn init(&mut self) {
        self.count = 0;
    }

    fn fold(&mut self, _message: &Message) -> Result<()> {
        self.count += 1;
        Ok(())
    }

    fn finish(self) -> usize {
        self.count
    }
}

/// Reducer from an initial state and a fold closure.
///
/// ```no_run
/// # use mailquery::reduce::FnReducer;
/// let total_subject_len = FnReducer::new(0usize, |acc, m| {
///     *acc += m.subject().len();
///     Ok(())
/// });
/// ```
pub struct FnReducer<S, F> {
    state: S,
    fold: F,
}

impl<S, F> FnReducer<S, F>
where
    F: FnMut(&mut S, &Message) -> Result<()>,
{
    pub fn new(state: S, fold: F) -> Self {
        Self { state, fold }
    }
}

impl<S, F> Reducer for FnReducer<S, F>
where
    F: FnMut(&mut S, &Message) -> Result<()>,
{
    type Output = S;

    fn fold(&mut self, message: &Message) -> Result<()> {
        (self.fold)(&mut self.state, message)
    }

    fn finish(self) -> S {
        self.state
    }
}
