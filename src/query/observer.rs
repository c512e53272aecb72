//! Diagnostics hooks for everything a query does.
//!
//! A query never writes to stdout. Progress, skipped candidates, failing
//! predicates and batch outcomes go through an [`Observer`]; the default
//! [`TracingObserver`] turns them into `tracing` events.

use std::cell::Cell;

use tracing::{debug, info, warn};

use crate::error::{MailQueryError, Result};
use crate::model::message::Message;
use crate::query::compile::ServerQuery;
use crate::query::BatchReport;

/// Receives diagnostics from a running query. All hooks default to no-ops.
pub trait Observer {
    /// Toggle progress output.
    fn set_verbose(&self, _verbose: bool) {}

    /// A fresh candidate listing was opened.
    fn fetch_started(&self, _source: &str, _query: &ServerQuery) {}

    /// A candidate arrived from the source.
    fn candidate(&self, _message: &Message) {}

    /// The source could not produce one candidate; it was skipped.
    fn source_error(&self, _error: &MailQueryError) {}

    /// A predicate failed and was treated as no-match.
    fn predicate_failed(&self, _filter: &str, _message: &Message, _error: &MailQueryError) {}

    /// A filter ended the iteration early.
    fn stopped(&self, _reason: &str) {}

    /// The source listing was exhausted after `pulled` candidates.
    fn exhausted(&self, _pulled: usize) {}

    fn deleted(&self, _message: &Message, _outcome: &Result<bool>) {}

    fn reduction_failed(&self, _reducer: &str, _message: &Message, _error: &MailQueryError) {}

    fn stored(&self, _message: &Message, _outcome: &Result<bool>) {}

    /// A batch operation (delete, store) completed.
    fn batch_finished(&self, _operation: &str, _report: &BatchReport) {}
}

/// Observer that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentObserver;

impl Observer for SilentObserver {}

/// Routes diagnostics to `tracing`.
///
/// Progress events are `debug` normally and `info` in verbose mode.
/// Failures are always `warn`.
#[derive(Debug, Default)]
pub struct TracingObserver {
    verbose: Cell<bool>,
}

impl TracingObserver {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose: Cell::new(verbose),
        }
    }
}

macro_rules! progress {
    ($self:ident, $($arg:tt)+) => {
        if $self.verbose.get() {
            info!($($arg)+)
        } else {
            debug!($($arg)+)
        }
    };
}

impl Observer for TracingObserver {
    fn set_verbose(&self, verbose: bool) {
        self.verbose.set(verbose);
    }

    fn fetch_started(&self, source: &str, query: &ServerQuery) {
        progress!(self, source, plan = %query, "Listing candidates");
    }

    fn candidate(&self, message: &Message) {
        debug!(uid = message.uid(), subject = message.subject(), "Candidate");
    }

    fn source_error(&self, error: &MailQueryError) {
        warn!("Skipping candidate: {error}");
    }

    fn predicate_failed(&self, filter: &str, message: &Message, error: &MailQueryError) {
        warn!(uid = message.uid(), filter, "Treating as no match: {error}");
    }

    fn stopped(&self, reason: &str) {
        progress!(self, reason, "Iteration stopped");
    }

    fn exhausted(&self, pulled: usize) {
        progress!(self, pulled, "Source exhausted");
    }

    fn deleted(&self, message: &Message, outcome: &Result<bool>) {
        match outcome {
            Ok(true) => progress!(self, uid = message.uid(), "Deleted"),
            Ok(false) => warn!(uid = message.uid(), "Source refused deletion"),
            Err(e) => warn!(uid = message.uid(), "Delete failed: {e}"),
        }
    }

    fn reduction_failed(&self, reducer: &str, message: &Message, error: &MailQueryError) {
        warn!(uid = message.uid(), reducer, "Skipped by reducer: {error}");
    }

    fn stored(&self, message: &Message, outcome: &Result<bool>) {
        match outcome {
            Ok(true) => debug!(uid = message.uid(), "Stored"),
            Ok(false) => debug!(uid = message.uid(), "Not stored (duplicate)"),
            Err(e) => warn!(uid = message.uid(), "Store failed: {e}"),
        }
    }

    fn batch_finished(&self, operation: &str, report: &BatchReport) {
        progress!(
            self,
            operation,
            attempted = report.attempted,
            succeeded = report.succeeded,
            "Batch finished"
        );
    }
}
