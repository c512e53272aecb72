//! The lazy iterator behind [`Query::fetch`](crate::query::Query::fetch).

use std::rc::Rc;

use crate::error::{MailQueryError, Result};
use crate::filter::Flow;
use crate::model::message::Message;
use crate::query::{FetchState, Query};
use crate::source::CandidateStream;

/// Lazily yields the messages of a query that pass all of its filters.
///
/// Cached messages are replayed first; after that, fresh candidates are
/// pulled from the source one at a time and cached before they are
/// filtered. Dropping the iterator early keeps the untouched remainder of
/// the listing so that a later iteration resumes where this one left off.
pub struct Fetch<'q> {
    query: &'q Query,
    generation: u64,
    replay_next: usize,
    replay_end: usize,
    live: Option<CandidateStream>,
    pulled: usize,
    done: bool,
    failure: Option<MailQueryError>,
}

impl<'q> Fetch<'q> {
    pub(crate) fn new(query: &'q Query, replay_end: usize, live: Option<CandidateStream>) -> Self {
        Self {
            query,
            generation: query.origin.generation.get(),
            replay_next: 0,
            replay_end,
            live,
            pulled: 0,
            done: false,
            failure: None,
        }
    }

    /// Candidates pulled from the source by this iteration.
    pub fn pulled(&self) -> usize {
        self.pulled
    }

    /// Consume the iterator, surfacing a fatal source fault if one ended it.
    pub fn finish(mut self) -> Result<()> {
        match self.failure.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn halt(&mut self) {
        self.done = true;
        if let Some(stream) = self.live.take() {
            self.query.origin.park(stream, self.generation);
        }
    }

    /// Next candidate, from the cache replay or from the live listing.
    fn next_candidate(&mut self) -> Option<Rc<Message>> {
        let query = self.query;
        let origin = &query.origin;
        while self.replay_next < self.replay_end {
            let index = self.replay_next;
            self.replay_next += 1;
            if let Some(message) = origin.cache.borrow().get_index(index) {
                return Some(message);
            }
        }

        loop {
            if origin.generation.get() != self.generation {
                // The cache was cleared under us; this listing is stale.
                self.live = None;
                return None;
            }
            let stream = self.live.as_mut()?;
            match stream.next() {
                Some(Ok(message)) => {
                    self.pulled += 1;
                    origin.observer.candidate(&message);
                    return Some(origin.cache.borrow_mut().insert(message));
                }
                Some(Err(e)) if e.is_fatal() => {
                    self.live = None;
                    origin.connected.set(false);
                    self.failure = Some(e);
                    return None;
                }
                Some(Err(e)) => origin.observer.source_error(&e),
                None => {
                    self.live = None;
                    origin.state.set(FetchState::Fetched);
                    origin.observer.exhausted(self.pulled);
                    return None;
                }
            }
        }
    }
}

impl Iterator for Fetch<'_> {
    type Item = Rc<Message>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let Some(message) = self.next_candidate() else {
                self.done = true;
                return None;
            };
            let verdict = self.query.evaluate(&message);
            if let Flow::Stop(reason) = &verdict.flow {
                self.query.origin.observer.stopped(reason);
                self.halt();
            }
            if verdict.matched {
                return Some(message);
            }
        }
        None
    }
}

impl Drop for Fetch<'_> {
    fn drop(&mut self) {
        if let Some(stream) = self.live.take() {
            self.query.origin.park(stream, self.generation);
        }
    }
}
