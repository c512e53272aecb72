//! In-memory source over raw RFC 5322 messages.
//!
//! Messages are stored with caller-assigned uids. The envelope is parsed
//! when a candidate is listed; the raw bytes are handed out lazily through
//! the loader, which fails once the message has been deleted.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::{debug, info};

use crate::error::{MailQueryError, Result};
use crate::model::message::Message;
use crate::parser::header::parse_envelope;
use crate::query::compile::ServerQuery;
use crate::source::{CandidateStream, Source};

#[derive(Debug, Clone)]
enum Entry {
    Message { uid: String, raw: Rc<[u8]> },
    /// Listing this candidate fails with a source error.
    Broken { uid: String },
    /// The connection drops here, once.
    Disconnect,
}

impl Entry {
    fn uid(&self) -> &str {
        match self {
            Self::Message { uid, .. } | Self::Broken { uid } => uid,
            Self::Disconnect => "",
        }
    }
}

/// Call counters of a [`MemorySource`], shared so they stay readable after
/// the source has been moved into a query.
#[derive(Debug, Default)]
pub struct MemoryStats {
    list_calls: Cell<usize>,
    pulled: Cell<usize>,
    loads: Cell<usize>,
    deleted: RefCell<Vec<String>>,
    last_hints: RefCell<Option<ServerQuery>>,
}

impl MemoryStats {
    /// Number of `list_candidates` calls.
    pub fn list_calls(&self) -> usize {
        self.list_calls.get()
    }

    /// Candidates handed out across all listings.
    pub fn pulled(&self) -> usize {
        self.pulled.get()
    }

    /// Raw-body loads.
    pub fn loads(&self) -> usize {
        self.loads.get()
    }

    /// Uids deleted, in order.
    pub fn deleted(&self) -> Vec<String> {
        self.deleted.borrow().clone()
    }

    /// Hints passed to the most recent listing.
    pub fn last_hints(&self) -> Option<ServerQuery> {
        self.last_hints.borrow().clone()
    }
}

pub struct MemorySource {
    entries: Rc<RefCell<Vec<Entry>>>,
    stats: Rc<MemoryStats>,
    allow_delete: bool,
    server_filtering: bool,
    refuse_connection: bool,
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySource {
    pub fn new() -> Self {
        Self {
            entries: Rc::new(RefCell::new(Vec::new())),
            stats: Rc::new(MemoryStats::default()),
            allow_delete: false,
            server_filtering: false,
            refuse_connection: false,
        }
    }

    /// Build a source from `(uid, raw)` pairs.
    pub fn from_messages<I, U, R>(messages: I) -> Self
    where
        I: IntoIterator<Item = (U, R)>,
        U: Into<String>,
        R: Into<Vec<u8>>,
    {
        let source = Self::new();
        for (uid, raw) in messages {
            source.push(uid, raw);
        }
        source
    }

    pub fn push(&self, uid: impl Into<String>, raw: impl Into<Vec<u8>>) {
        let raw: Vec<u8> = raw.into();
        self.entries.borrow_mut().push(Entry::Message {
            uid: uid.into(),
            raw: Rc::from(raw),
        });
    }

    /// Add a candidate whose listing fails.
    pub fn push_broken(&self, uid: impl Into<String>) {
        self.entries
            .borrow_mut()
            .push(Entry::Broken { uid: uid.into() });
    }

    /// Drop the connection at this point of the next listing. Later
    /// listings run through.
    pub fn push_disconnect(&self) {
        self.entries.borrow_mut().push(Entry::Disconnect);
    }

    pub fn allow_delete(mut self, allow: bool) -> Self {
        self.allow_delete = allow;
        self
    }

    /// Pre-filter listings with the compiled hints, like a server would.
    pub fn with_server_filtering(mut self, enabled: bool) -> Self {
        self.server_filtering = enabled;
        self
    }

    /// Make `connect` fail.
    pub fn refuse_connection(mut self) -> Self {
        self.refuse_connection = true;
        self
    }

    pub fn stats(&self) -> Rc<MemoryStats> {
        Rc::clone(&self.stats)
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

fn loader(
    entries: &Rc<RefCell<Vec<Entry>>>,
    stats: &Rc<MemoryStats>,
    uid: &str,
) -> impl Fn() -> Result<Vec<u8>> + 'static {
    let entries = Rc::clone(entries);
    let stats = Rc::clone(stats);
    let uid = uid.to_string();
    move || {
        stats.loads.set(stats.loads.get() + 1);
        entries
            .borrow()
            .iter()
            .find_map(|e| match e {
                Entry::Message { uid: u, raw } if *u == uid => Some(raw.to_vec()),
                _ => None,
            })
            .ok_or_else(|| MailQueryError::fetch(&uid, "message no longer exists"))
    }
}

impl Source for MemorySource {
    fn connect(&mut self) -> Result<()> {
        if self.refuse_connection {
            return Err(MailQueryError::Connection(
                "in-memory source refused the connection".into(),
            ));
        }
        Ok(())
    }

    fn list_candidates(&mut self, hints: &ServerQuery) -> Result<CandidateStream> {
        self.stats.list_calls.set(self.stats.list_calls.get() + 1);
        *self.stats.last_hints.borrow_mut() = Some(hints.clone());
        debug!(hints = %hints, "Listing in-memory candidates");

        let snapshot = self.entries.borrow().clone();
        let entries = Rc::clone(&self.entries);
        let stats = Rc::clone(&self.stats);
        let hints = self.server_filtering.then(|| hints.clone());

        let stream = snapshot.into_iter().filter_map(move |entry| {
            let message = match entry {
                Entry::Disconnect => {
                    entries
                        .borrow_mut()
                        .retain(|e| !matches!(e, Entry::Disconnect));
                    return Some(Err(MailQueryError::Connection(
                        "in-memory source dropped the connection".into(),
                    )));
                }
                Entry::Broken { uid } => {
                    stats.pulled.set(stats.pulled.get() + 1);
                    return Some(Err(MailQueryError::Source(format!(
                        "candidate {uid} could not be listed"
                    ))));
                }
                Entry::Message { uid, raw } => {
                    let envelope = parse_envelope(&raw);
                    if hints.as_ref().is_some_and(|h| !h.matches(&envelope)) {
                        return None;
                    }
                    Message::new(uid.as_str(), envelope, loader(&entries, &stats, &uid))
                }
            };
            stats.pulled.set(stats.pulled.get() + 1);
            Some(Ok(message))
        });
        Ok(Box::new(stream))
    }

    fn delete_by_id(&mut self, uid: &str) -> Result<bool> {
        if !self.allow_delete {
            info!(uid, "Deletion not allowed on this source");
            return Ok(false);
        }
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|e| e.uid() != uid);
        let removed = entries.len() != before;
        if removed {
            self.stats.deleted.borrow_mut().push(uid.to_string());
        }
        Ok(removed)
    }

    fn describe(&self) -> String {
        format!("in-memory source ({} messages)", self.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Filter;
    use crate::query::compile::compile;

    fn source() -> MemorySource {
        MemorySource::from_messages([
            ("1", "From: alice@x.com\nSubject: A\n\nbody a\n"),
            ("2", "From: bob@x.com\nSubject: B\n\nbody b\n"),
        ])
    }

    #[test]
    fn test_lists_everything_without_filtering() {
        let mut src = source();
        let stats = src.stats();
        let all: Vec<_> = src
            .list_candidates(&ServerQuery::default())
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(stats.list_calls(), 1);
        assert_eq!(stats.pulled(), 2);
        assert_eq!(stats.loads(), 0);
    }

    #[test]
    fn test_server_filtering_uses_hints() {
        let mut src = source().with_server_filtering(true);
        let hints = compile(&[Filter::SenderMatch(vec!["bob".into()])]);
        let listed: Vec<Message> = src
            .list_candidates(&hints)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].uid(), "2");
    }

    #[test]
    fn test_loader_fails_after_delete() {
        let mut src = source().allow_delete(true);
        let first = src
            .list_candidates(&ServerQuery::default())
            .unwrap()
            .next()
            .unwrap()
            .unwrap();
        assert!(src.delete_by_id("1").unwrap());
        assert!(!src.delete_by_id("1").unwrap());
        assert!(matches!(first.body(), Err(MailQueryError::Fetch { .. })));
        assert_eq!(first.subject(), "A");
        assert_eq!(src.stats().deleted(), ["1"]);
    }

    #[test]
    fn test_delete_refused_by_default() {
        let mut src = source();
        assert!(!src.delete_by_id("1").unwrap());
        assert_eq!(src.len(), 2);
    }

    #[test]
    fn test_refused_connection() {
        let mut src = source().refuse_connection();
        assert!(src.connect().unwrap_err().is_fatal());
    }

    #[test]
    fn test_broken_candidate_is_source_error() {
        let mut src = source();
        src.push_broken("3");
        let items: Vec<Result<Message>> = src
            .list_candidates(&ServerQuery::default())
            .unwrap()
            .collect();
        assert!(matches!(items[2], Err(MailQueryError::Source(_))));
    }

    #[test]
    fn test_disconnect_fires_once() {
        let mut src = source();
        src.push_disconnect();
        let first: Vec<Result<Message>> = src
            .list_candidates(&ServerQuery::default())
            .unwrap()
            .collect();
        assert!(matches!(first[2], Err(MailQueryError::Connection(_))));
        let second = src
            .list_candidates(&ServerQuery::default())
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(second.len(), 2);
    }
}
