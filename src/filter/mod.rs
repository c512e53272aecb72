//! Predicates over messages and their evaluation.
//!
//! A query holds an ordered [`FilterChain`]. Each [`Filter`] returns a
//! [`Verdict`]: whether the message matches, and whether the iteration may
//! go on ([`Flow`]). Structured variants (sender, recipient, involvement,
//! dates) can also be compiled into a source-side search by
//! [`crate::query::compile`]; everything else is a [`Filter::Generic`]
//! predicate evaluated on the client only.

pub mod attribute;
pub mod closure;
pub mod limit;
pub mod text;
pub mod triage;

use chrono::{NaiveDate, NaiveTime};

use crate::error::{MailQueryError, Result};
use crate::model::message::Message;
use crate::query::observer::Observer;

/// Whether an iteration may keep pulling candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Stop pulling further candidates. Not an error.
    Stop(String),
}

/// Outcome of evaluating a predicate against one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub matched: bool,
    pub flow: Flow,
}

impl Verdict {
    pub fn matched() -> Self {
        Self {
            matched: true,
            flow: Flow::Continue,
        }
    }

    pub fn rejected() -> Self {
        Self {
            matched: false,
            flow: Flow::Continue,
        }
    }

    pub fn from_bool(matched: bool) -> Self {
        Self {
            matched,
            flow: Flow::Continue,
        }
    }

    /// Stop the iteration; `matched` decides whether this message is still yielded.
    pub fn stop(matched: bool, reason: impl Into<String>) -> Self {
        Self {
            matched,
            flow: Flow::Stop(reason.into()),
        }
    }

    pub fn should_stop(&self) -> bool {
        matches!(self.flow, Flow::Stop(_))
    }
}

/// Alternative arguments for one predicate: any of them may match.
///
/// Builders accept either a single pattern or an `Or`:
/// `query.from("alice@example.com")` or `query.from(Or::new(["a@x.com", "b@x.com"]))`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Or(Vec<String>);

impl Or {
    pub fn new<I, S>(alternatives: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(alternatives.into_iter().map(Into::into).collect())
    }

    pub fn alternatives(&self) -> &[String] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl From<&str> for Or {
    fn from(value: &str) -> Self {
        Self(vec![value.to_string()])
    }
}

impl From<String> for Or {
    fn from(value: String) -> Self {
        Self(vec![value])
    }
}

impl From<Vec<String>> for Or {
    fn from(values: Vec<String>) -> Self {
        Self(values)
    }
}

/// Shared state handed to predicates during evaluation.
pub struct FilterContext<'a> {
    pub observer: &'a dyn Observer,
}

impl FilterContext<'_> {
    /// Report a failing predicate and turn it into a no-match.
    pub fn fail(&self, filter: &str, message: &Message, reason: impl std::fmt::Display) -> Verdict {
        let err = MailQueryError::Predicate {
            filter: filter.to_string(),
            reason: reason.to_string(),
        };
        self.observer.predicate_failed(filter, message, &err);
        Verdict::rejected()
    }
}

/// A client-side predicate that has no source-side translation.
pub trait Predicate {
    fn evaluate(&mut self, message: &Message, ctx: &FilterContext<'_>) -> Verdict;

    /// Short human-readable description, used in diagnostics.
    fn describe(&self) -> String;

    /// Called at the start of every iteration.
    fn reset(&mut self) {}

    /// Whether this predicate can end an iteration early.
    fn may_stop(&self) -> bool {
        false
    }

    /// Extra-attribute key this predicate attaches to messages, if any.
    fn attribute_key(&self) -> Option<&str> {
        None
    }
}

/// One entry of a filter chain.
pub enum Filter {
    /// `From` or `Sender` contains any of the patterns.
    SenderMatch(Vec<String>),
    /// `To`, `Cc` or `Bcc` contains any of the patterns.
    RecipientMatch(Vec<String>),
    /// The person appears as sender, recipient or reply address.
    Involves(Vec<String>),
    /// Message date strictly before midnight of the given day.
    DateBefore(NaiveDate),
    /// Message date strictly after midnight of the given day.
    DateAfter(NaiveDate),
    Generic(Box<dyn Predicate>),
}

impl Filter {
    pub fn generic(predicate: impl Predicate + 'static) -> Self {
        Self::Generic(Box::new(predicate))
    }

    pub fn evaluate(&mut self, message: &Message, ctx: &FilterContext<'_>) -> Verdict {
        let env = message.envelope();
        match self {
            Self::SenderMatch(patterns) => {
                Verdict::from_bool(any_contains(&[&env.from, &env.sender_header], patterns))
            }
            Self::RecipientMatch(patterns) => {
                Verdict::from_bool(any_contains(&[&env.to, &env.cc, &env.bcc], patterns))
            }
            Self::Involves(patterns) => Verdict::from_bool(any_contains(
                &[
                    &env.from,
                    &env.sender_header,
                    &env.to,
                    &env.cc,
                    &env.bcc,
                    &env.reply_to,
                ],
                patterns,
            )),
            Self::DateBefore(cutoff) => match message.date() {
                Some(date) => Verdict::from_bool(date < cutoff.and_time(NaiveTime::MIN)),
                None => ctx.fail(&self.describe(), message, unparsed_date(message)),
            },
            Self::DateAfter(cutoff) => match message.date() {
                Some(date) => Verdict::from_bool(date > cutoff.and_time(NaiveTime::MIN)),
                None => ctx.fail(&self.describe(), message, unparsed_date(message)),
            },
            Self::Generic(predicate) => predicate.evaluate(message, ctx),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::SenderMatch(p) => format!("from {}", p.join(" | ")),
            Self::RecipientMatch(p) => format!("to {}", p.join(" | ")),
            Self::Involves(p) => format!("involves {}", p.join(" | ")),
            Self::DateBefore(d) => format!("before {d}"),
            Self::DateAfter(d) => format!("after {d}"),
            Self::Generic(predicate) => predicate.describe(),
        }
    }

    pub fn reset(&mut self) {
        if let Self::Generic(predicate) = self {
            predicate.reset();
        }
    }

    pub fn may_stop(&self) -> bool {
        match self {
            Self::Generic(predicate) => predicate.may_stop(),
            _ => false,
        }
    }

    pub fn attribute_key(&self) -> Option<&str> {
        match self {
            Self::Generic(predicate) => predicate.attribute_key(),
            _ => None,
        }
    }
}

impl std::fmt::Debug for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Filter({})", self.describe())
    }
}

fn unparsed_date(message: &Message) -> String {
    let date = &message.envelope().date;
    if date.is_empty() {
        "message has no Date header".to_string()
    } else {
        format!("unparseable date '{date}'")
    }
}

/// Case-insensitive substring test of any pattern against any field.
pub(crate) fn any_contains(fields: &[&String], patterns: &[String]) -> bool {
    let fields: Vec<String> = fields
        .iter()
        .filter(|f| !f.is_empty())
        .map(|f| f.to_lowercase())
        .collect();
    patterns.iter().any(|p| {
        let p = p.to_lowercase();
        fields.iter().any(|f| f.contains(&p))
    })
}

/// Parse a `YYYY-MM-DD` cutoff date.
pub fn parse_cutoff(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| MailQueryError::InvalidDate(value.to_string()))
}

/// Ordered filters owned by one query, plus the attribute keys they attach.
#[derive(Debug, Default)]
pub struct FilterChain {
    filters: Vec<Filter>,
    attribute_keys: Vec<String>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, filter: Filter) {
        if let Some(key) = filter.attribute_key() {
            if !self.attribute_keys.iter().any(|k| k == key) {
                self.attribute_keys.push(key.to_string());
            }
        }
        self.filters.push(filter);
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn attribute_keys(&self) -> &[String] {
        &self.attribute_keys
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn reset(&mut self) {
        self.filters.iter_mut().for_each(Filter::reset);
    }

    /// Evaluate every filter in order, short-circuiting on the first miss.
    ///
    /// A stop request is remembered and reported with the final verdict; the
    /// remaining filters still run for the current message so that a message
    /// yielded together with a stop has passed the whole chain.
    pub fn apply(&mut self, message: &Message, ctx: &FilterContext<'_>) -> Verdict {
        let mut stop: Option<String> = None;
        for filter in &mut self.filters {
            let verdict = filter.evaluate(message, ctx);
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
}
