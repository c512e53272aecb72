//! The query pipeline.
//!
//! A [`Query`] owns a [`Source`], an ordered [`FilterChain`] and a message
//! cache. Builder methods append filters; [`Query::fetch`] iterates lazily.
//! [`Query::subquery`] forks a new query with its own chain that shares the
//! parent's source, cache and fetch state.
//!
//! ```text
//! UNFETCHED ──fetch()──▶ FETCHING ──source exhausted──▶ FETCHED
//!     ▲                     │ early stop: stays FETCHING,
//!     └──── clear_cache() ──┘ remaining listing kept for the next fetch
//! ```

pub mod cache;
pub mod clock;
pub mod compile;
pub mod fetch;
pub mod observer;

use std::cell::{Cell, RefCell};
use std::io::Write;
use std::rc::Rc;

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use serde_json::Value;

use crate::error::{MailQueryError, Result};
use crate::filter::attribute::AddAttribute;
use crate::filter::closure::{FnPredicate, Negated, TryFnPredicate};
use crate::filter::limit::Limit;
use crate::filter::text::{TextField, TextMatch};
use crate::filter::triage::{Triage, TriageDecider};
use crate::filter::{Filter, FilterChain, FilterContext, Flow, Or, Verdict};
use crate::model::message::Message;
use crate::reduce::{Reducer, Reduction};
use crate::source::{CandidateStream, Source};
use crate::storage::StorageBackend;

use cache::MessageCache;
use clock::{Clock, SystemClock};
use compile::ServerQuery;
use observer::{Observer, TracingObserver};

pub use fetch::Fetch;

/// How much of the source listing a query has consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    Unfetched,
    /// Candidates were pulled but the listing has not been exhausted.
    Fetching,
    /// The listing was exhausted; iterations replay the cache only.
    Fetched,
}

/// Outcome of a batch operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub attempted: usize,
    pub succeeded: usize,
}

impl BatchReport {
    pub fn failed(&self) -> usize {
        self.attempted - self.succeeded
    }
}

/// State shared by a query and every subquery forked from it.
pub(crate) struct Origin {
    source: RefCell<Box<dyn Source>>,
    connected: Cell<bool>,
    cache: RefCell<MessageCache>,
    state: Cell<FetchState>,
    /// Remainder of a listing abandoned by an early stop.
    pending: RefCell<Option<CandidateStream>>,
    /// Bumped by `clear_cache` so that in-flight iterations notice.
    generation: Cell<u64>,
    root_chain: Rc<RefCell<FilterChain>>,
    observer: Rc<dyn Observer>,
    clock: RefCell<Rc<dyn Clock>>,
}

impl Origin {
    fn open_listing(&self) -> Result<CandidateStream> {
        let mut source = self.source.borrow_mut();
        if !self.connected.get() {
            source.connect()?;
            self.connected.set(true);
        }
        let hints = compile::compile(self.root_chain.borrow().filters());
        self.observer.fetch_started(&source.describe(), &hints);
        source.list_candidates(&hints)
    }

    /// Keep an unfinished listing for the next iteration.
    fn park(&self, stream: CandidateStream, generation: u64) {
        if self.generation.get() != generation || self.state.get() != FetchState::Fetching {
            return;
        }
        let mut pending = self.pending.borrow_mut();
        if pending.is_none() {
            *pending = Some(stream);
        }
    }
}

/// A lazily evaluated, cacheable query over one source.
pub struct Query {
    origin: Rc<Origin>,
    /// Chains of the queries this one was forked from, root first.
    ancestors: Vec<Rc<RefCell<FilterChain>>>,
    chain: Rc<RefCell<FilterChain>>,
}

impl Query {
    /// Query over `source`, logging through `tracing`.
    pub fn new(source: impl Source + 'static) -> Self {
        Self::with_observer(source, Rc::new(TracingObserver::default()))
    }

    pub fn with_observer(source: impl Source + 'static, observer: Rc<dyn Observer>) -> Self {
        let chain = Rc::new(RefCell::new(FilterChain::new()));
        let origin = Origin {
            source: RefCell::new(Box::new(source)),
            connected: Cell::new(false),
            cache: RefCell::new(MessageCache::new()),
            state: Cell::new(FetchState::Unfetched),
            pending: RefCell::new(None),
            generation: Cell::new(0),
            root_chain: Rc::clone(&chain),
            observer,
            clock: RefCell::new(Rc::new(SystemClock)),
        };
        Self {
            origin: Rc::new(origin),
            ancestors: Vec::new(),
            chain,
        }
    }

    /// Replace the clock used by `older_than` / `younger_than`.
    pub fn with_clock(self, clock: impl Clock + 'static) -> Self {
        *self.origin.clock.borrow_mut() = Rc::new(clock);
        self
    }

    pub fn set_verbose(&self, verbose: bool) {
        self.origin.observer.set_verbose(verbose);
    }

    /// Fork a query that adds its own filters on top of this one's.
    ///
    /// The subquery shares this query's source, cache and fetch state, and
    /// holds this query's filter chain by reference: filters added here
    /// later also narrow the subquery. Filters added to the subquery are
    /// never seen by this query or by sibling subqueries.
    pub fn subquery(&self) -> Query {
        let mut ancestors = self.ancestors.clone();
        ancestors.push(Rc::clone(&self.chain));
        Query {
            origin: Rc::clone(&self.origin),
            ancestors,
            chain: Rc::new(RefCell::new(FilterChain::new())),
        }
    }

    pub fn is_subquery(&self) -> bool {
        !self.ancestors.is_empty()
    }

    // ── Filter builders ────────────────────────────────────────────

    /// Append an arbitrary filter.
    pub fn filter(self, filter: Filter) -> Self {
        self.chain.borrow_mut().push(filter);
        self
    }

    pub fn from(self, sender: impl Into<Or>) -> Self {
        self.filter(Filter::SenderMatch(sender.into().into_vec()))
    }

    pub fn to(self, recipient: impl Into<Or>) -> Self {
        self.filter(Filter::RecipientMatch(recipient.into().into_vec()))
    }

    pub fn involves(self, person: impl Into<Or>) -> Self {
        self.filter(Filter::Involves(person.into().into_vec()))
    }

    pub fn before(self, date: NaiveDate) -> Self {
        self.filter(Filter::DateBefore(date))
    }

    pub fn after(self, date: NaiveDate) -> Self {
        self.filter(Filter::DateAfter(date))
    }

    /// Messages dated before midnight of `now - days`.
    pub fn older_than(self, days: u32) -> Self {
        let cutoff = self.cutoff(days);
        self.before(cutoff)
    }

    /// Messages dated after midnight of `now - days`.
    pub fn younger_than(self, days: u32) -> Self {
        let cutoff = self.cutoff(days);
        self.after(cutoff)
    }

    fn cutoff(&self, days: u32) -> NaiveDate {
        let now = self.origin.clock.borrow().now();
        (now - Duration::days(i64::from(days))).date()
    }

    pub fn subject_contains(self, text: impl Into<Or>) -> Self {
        self.text_filter(TextField::Subject, text.into())
    }

    pub fn body_contains(self, text: impl Into<Or>) -> Self {
        self.text_filter(TextField::Body, text.into())
    }

    pub fn reply_to(self, address: impl Into<Or>) -> Self {
        self.text_filter(TextField::ReplyTo, address.into())
    }

    fn text_filter(self, field: TextField, needles: Or) -> Self {
        self.filter(Filter::generic(TextMatch::new(field, needles.into_vec())))
    }

    /// Keep messages for which `f` returns true.
    pub fn include_when<F>(self, f: F) -> Self
    where
        F: FnMut(&Message) -> bool + 'static,
    {
        self.filter(Filter::generic(FnPredicate::new("include_when", f)))
    }

    /// Like [`include_when`](Self::include_when); an `Err` counts as no match.
    pub fn try_include_when<F>(self, f: F) -> Self
    where
        F: FnMut(&Message) -> Result<bool> + 'static,
    {
        self.filter(Filter::generic(TryFnPredicate::new("try_include_when", f)))
    }

    /// Drop messages for which `f` returns true.
    pub fn exclude_when<F>(self, f: F) -> Self
    where
        F: FnMut(&Message) -> bool + 'static,
    {
        self.exclude(Filter::generic(FnPredicate::new("exclude_when", f)))
    }

    /// Drop messages matching `filter`.
    pub fn exclude(self, filter: Filter) -> Self {
        self.filter(Filter::generic(Negated::new(filter)))
    }

    /// Yield at most `max` messages per iteration.
    pub fn limit(self, max: usize) -> Self {
        self.filter(Filter::generic(Limit::new(max)))
    }

    /// Compute `f` for every message reaching this point and store it under `key`.
    pub fn add_attribute<F, V>(self, key: &str, f: F) -> Self
    where
        F: FnMut(&Message) -> V + 'static,
        V: Into<Value>,
    {
        self.filter(Filter::generic(AddAttribute::new(key, f)))
    }

    pub fn try_add_attribute<F, V>(self, key: &str, f: F) -> Self
    where
        F: FnMut(&Message) -> Result<V> + 'static,
        V: Into<Value>,
    {
        self.filter(Filter::generic(AddAttribute::fallible(key, f)))
    }

    /// Let `decider` review up to `limit` messages; only those marked for
    /// deletion pass.
    pub fn human(self, limit: usize, decider: impl TriageDecider + 'static) -> Self {
        self.filter(Filter::generic(Triage::new(limit, decider)))
    }

    // ── Introspection ──────────────────────────────────────────────

    pub fn fetch_state(&self) -> FetchState {
        self.origin.state.get()
    }

    /// Uids in the shared cache, in pull order.
    pub fn cached_uids(&self) -> Vec<String> {
        self.origin.cache.borrow().uids()
    }

    pub fn cached(&self, uid: &str) -> Option<Rc<Message>> {
        self.origin.cache.borrow().get(uid)
    }

    /// Descriptions of every filter applied by this query, ancestors first.
    pub fn describe_filters(&self) -> Vec<String> {
        self.chains()
            .flat_map(|c| {
                c.borrow()
                    .filters()
                    .iter()
                    .map(Filter::describe)
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Source-side search compiled from the root query's filters.
    pub fn server_query(&self) -> ServerQuery {
        compile::compile(self.origin.root_chain.borrow().filters())
    }

    /// Attribute keys added by this query and its ancestors, deduplicated.
    pub fn attribute_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = Vec::new();
        for chain in self.chains() {
            for key in chain.borrow().attribute_keys() {
                if !keys.contains(key) {
                    keys.push(key.clone());
                }
            }
        }
        keys
    }

    /// Forget every cached message; the next fetch lists the source again.
    ///
    /// Affects the parent and every sibling, since the cache is shared.
    pub fn clear_cache(&self) {
        let origin = &self.origin;
        origin.cache.borrow_mut().clear();
        origin.pending.borrow_mut().take();
        origin.state.set(FetchState::Unfetched);
        origin.generation.set(origin.generation.get() + 1);
    }

    fn chains(&self) -> impl Iterator<Item = &Rc<RefCell<FilterChain>>> {
        self.ancestors.iter().chain(std::iter::once(&self.chain))
    }

    // ── Iteration ──────────────────────────────────────────────────

    /// Lazily iterate the messages passing every filter.
    ///
    /// Fails only when the source cannot be reached or cannot list.
    pub fn fetch(&self) -> Result<Fetch<'_>> {
        for chain in self.chains() {
            chain.borrow_mut().reset();
        }
        let origin = &self.origin;
        let cached = origin.cache.borrow().len();
        match origin.state.get() {
            FetchState::Fetched => Ok(Fetch::new(self, cached, None)),
            FetchState::Fetching => {
                let parked = origin.pending.borrow_mut().take();
                match parked {
                    Some(stream) => Ok(Fetch::new(self, cached, Some(stream))),
                    // Another iteration holds the listing: start over.
                    None => Ok(Fetch::new(self, 0, Some(origin.open_listing()?))),
                }
            }
            FetchState::Unfetched => {
                let stream = origin.open_listing()?;
                origin.state.set(FetchState::Fetching);
                Ok(Fetch::new(self, 0, Some(stream)))
            }
        }
    }

    /// Evaluate ancestor chains, then this query's own chain.
    fn evaluate(&self, message: &Message) -> Verdict {
        let ctx = FilterContext {
            observer: &*self.origin.observer,
        };
        let mut stop = None;
        for chain in self.chains() {
            let verdict = chain.borrow_mut().apply(message, &ctx);
            if let Flow::Stop(reason) = verdict.flow {
                stop.get_or_insert(reason);
            }
            if !verdict.matched {
                return Verdict {
                    matched: false,
                    flow: stop.map_or(Flow::Continue, Flow::Stop),
                };
            }
        }
        Verdict {
            matched: true,
            flow: stop.map_or(Flow::Continue, Flow::Stop),
        }
    }

    // ── Batch operations ───────────────────────────────────────────

    /// Delete every matching message from the source.
    ///
    /// Deleted messages stay cached and are flagged instead.
    pub fn delete(&self) -> Result<BatchReport> {
        let observer = &self.origin.observer;
        let mut report = BatchReport::default();
        let mut fetch = self.fetch()?;
        for message in fetch.by_ref() {
            report.attempted += 1;
            let outcome = self.origin.source.borrow_mut().delete_by_id(message.uid());
            if matches!(outcome, Ok(true)) {
                message.mark_deleted_on_server();
                report.succeeded += 1;
            }
            observer.deleted(&message, &outcome);
        }
        fetch.finish()?;
        observer.batch_finished("delete", &report);
        Ok(report)
    }

    /// Write a numbered summary of up to `limit` matching messages.
    pub fn list_all(&self, limit: Option<usize>, out: &mut dyn Write) -> Result<usize> {
        let mut listed = 0;
        let mut fetch = self.fetch()?;
        for message in fetch.by_ref().take(limit.unwrap_or(usize::MAX)) {
            listed += 1;
            write!(
                out,
                "{listed:3}. {}\n     Subject: {}\n     Date: {}\n\n",
                message.cleaned_sender(),
                message.subject(),
                message.envelope().date
            )?;
        }
        fetch.finish()?;
        Ok(listed)
    }

    /// Persist every matching message through `backend`.
    ///
    /// Individual store failures are counted, not fatal. The backend is
    /// only set up once the source has accepted the listing.
    pub fn store_local(&self, backend: &mut dyn StorageBackend) -> Result<BatchReport> {
        let observer = &self.origin.observer;
        let mut fetch = self.fetch()?;
        backend.setup(&self.attribute_keys())?;

        let mut report = BatchReport::default();
        for message in fetch.by_ref() {
            report.attempted += 1;
            let outcome = backend.store_message(&message);
            if matches!(outcome, Ok(true)) {
                report.succeeded += 1;
            }
            observer.stored(&message, &outcome);
        }
        let fetched = fetch.finish();

        tracing::info!(
            "Stored {}/{} messages using {}",
            report.succeeded,
            report.attempted,
            backend.describe()
        );
        backend.close()?;
        fetched?;
        observer.batch_finished("store", &report);
        Ok(report)
    }

    /// Fold every matching message into `reducer`.
    ///
    /// A failing message is reported, handed to [`Reducer::recover`] and
    /// skipped; the reduction always runs to the end of the iteration.
    pub fn reduce_all<R: Reducer>(&self, mut reducer: R) -> Result<Reduction<R::Output>> {
        let observer = &self.origin.observer;
        reducer.init();
        let (mut folded, mut failed) = (0, 0);
        let mut fetch = self.fetch()?;
        for message in fetch.by_ref() {
            match reducer.fold(&message) {
                Ok(()) => folded += 1,
                Err(e) => {
                    failed += 1;
                    let err = MailQueryError::Reduction {
                        uid: message.uid().to_string(),
                        reason: e.to_string(),
                    };
                    observer.reduction_failed(reducer.name(), &message, &err);
                    reducer.recover(&message, &e);
                }
            }
        }
        fetch.finish()?;
        Ok(Reduction {
            output: reducer.finish(),
            folded,
            failed,
        })
    }
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("source", &self.origin.source.borrow().describe())
            .field("filters", &self.describe_filters())
            .field("state", &self.fetch_state())
            .field("cached", &self.origin.cache.borrow().len())
            .finish()
    }
}
