//! Compiles the structured part of a filter chain into a source-side search.
//!
//! The compiled [`ServerQuery`] is a hint: it may return a superset of the
//! matching messages but never drops one, because every filter is still
//! evaluated on the client afterwards.

use std::fmt;

use chrono::{NaiveDate, NaiveTime};

use crate::filter::{any_contains, Filter};
use crate::model::envelope::Envelope;
use crate::parser::header::parse_date;

/// One search criterion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    From(String),
    To(String),
    /// Sender or any recipient field. Rendered as `from OR to`, but the
    /// envelope check also covers Reply-To so that it stays a superset.
    Involves(String),
    Before(NaiveDate),
    After(NaiveDate),
}

/// A conjunct of the search: a single term or a disjunction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clause {
    Term(Term),
    AnyOf(Vec<Term>),
}

/// Conjunction of clauses. Empty means "everything".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerQuery {
    pub clauses: Vec<Clause>,
}

/// Compile the pushable prefix of `filters`.
///
/// Compilation stops at the first filter that can end an iteration early,
/// so a limit counts the same messages with or without the hint. Generic
/// and negated filters are skipped.
pub fn compile(filters: &[Filter]) -> ServerQuery {
    let mut senders = Vec::new();
    let mut recipients = Vec::new();
    let mut involved = Vec::new();
    let mut dates = Vec::new();

    for filter in filters {
        if filter.may_stop() {
            break;
        }
        match filter {
            Filter::SenderMatch(p) => senders.extend(p.iter().cloned()),
            Filter::RecipientMatch(p) => recipients.extend(p.iter().cloned()),
            Filter::Involves(p) => involved.extend(p.iter().cloned()),
            Filter::DateBefore(d) => dates.push(Term::Before(*d)),
            Filter::DateAfter(d) => dates.push(Term::After(*d)),
            Filter::Generic(_) => {}
        }
    }

    let mut clauses = Vec::new();
    if let Some(clause) = any_of(senders.into_iter().map(Term::From).collect()) {
        clauses.push(clause);
    }
    if let Some(clause) = any_of(recipients.into_iter().map(Term::To).collect()) {
        clauses.push(clause);
    }
    if let Some(clause) = any_of(involved.into_iter().map(Term::Involves).collect()) {
        clauses.push(clause);
    }
    clauses.extend(dates.into_iter().map(Clause::Term));
    ServerQuery { clauses }
}

fn any_of(mut terms: Vec<Term>) -> Option<Clause> {
    match terms.len() {
        0 => None,
        1 => terms.pop().map(Clause::Term),
        _ => Some(Clause::AnyOf(terms)),
    }
}

impl ServerQuery {
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Gmail search syntax, e.g. `(from:a OR from:b) before:2024/01/01`.
    /// `None` when there is nothing to search for.
    pub fn to_gmail_query(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        let parts: Vec<String> = self
            .clauses
            .iter()
            .map(|clause| match clause {
                Clause::Term(t) => gmail_term(t),
                Clause::AnyOf(terms) => format!(
                    "({})",
                    terms.iter().map(gmail_term).collect::<Vec<_>>().join(" OR ")
                ),
            })
            .collect();
        Some(parts.join(" "))
    }

    /// IMAP `SEARCH` criteria (RFC 3501), `ALL` when empty.
    pub fn to_imap_search(&self) -> String {
        if self.is_empty() {
            return "ALL".to_string();
        }
        self.clauses
            .iter()
            .map(|clause| match clause {
                Clause::Term(t) => imap_term(t),
                Clause::AnyOf(terms) => imap_or(terms),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Approximate server-side evaluation against an envelope.
    ///
    /// Unparseable dates pass, so the result stays a superset.
    pub fn matches(&self, envelope: &Envelope) -> bool {
        self.clauses.iter().all(|clause| match clause {
            Clause::Term(t) => term_matches(t, envelope),
            Clause::AnyOf(terms) => terms.iter().any(|t| term_matches(t, envelope)),
        })
    }
}

impl fmt::Display for ServerQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_gmail_query() {
            Some(q) => f.write_str(&q),
            None => f.write_str("(all messages)"),
        }
    }
}

fn term_matches(term: &Term, env: &Envelope) -> bool {
    let date = || parse_date(&env.date);
    match term {
        Term::From(p) => any_contains(&[&env.from, &env.sender_header], std::slice::from_ref(p)),
        Term::To(p) => any_contains(&[&env.to, &env.cc, &env.bcc], std::slice::from_ref(p)),
        Term::Involves(p) => any_contains(
            &[&env.from, &env.sender_header, &env.to, &env.cc, &env.bcc, &env.reply_to],
            std::slice::from_ref(p),
        ),
        Term::Before(d) => date().is_none_or(|dt| dt < d.and_time(NaiveTime::MIN)),
        Term::After(d) => date().is_none_or(|dt| dt >= d.and_time(NaiveTime::MIN)),
    }
}

fn gmail_value(value: &str) -> String {
    if value.chars().any(char::is_whitespace) {
        format!("\"{}\"", value.replace('"', ""))
    } else {
        value.to_string()
    }
}

fn gmail_term(term: &Term) -> String {
    match term {
        Term::From(p) => format!("from:{}", gmail_value(p)),
        Term::To(p) => format!("to:{}", gmail_value(p)),
        Term::Involves(p) => format!("(from:{0} OR to:{0})", gmail_value(p)),
        Term::Before(d) => format!("before:{}", d.format("%Y/%m/%d")),
        Term::After(d) => format!("after:{}", d.format("%Y/%m/%d")),
    }
}

fn imap_quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn imap_term(term: &Term) -> String {
    match term {
        Term::From(p) => format!("FROM {}", imap_quote(p)),
        Term::To(p) => format!("TO {}", imap_quote(p)),
        Term::Involves(p) => format!("OR FROM {0} TO {0}", imap_quote(p)),
        Term::Before(d) => format!("BEFORE {}", d.format("%-d-%b-%Y")),
        // SINCE includes the whole day, a superset of "after midnight".
        Term::After(d) => format!("SINCE {}", d.format("%-d-%b-%Y")),
    }
}

/// IMAP `OR` is binary and prefix: `OR a OR b c`.
fn imap_or(terms: &[Term]) -> String {
    match terms {
        [] => "ALL".to_string(),
        [only] => imap_term(only),
        [first, rest @ ..] => format!("OR {} {}", imap_term(first), imap_or(rest)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::closure::FnPredicate;
    use crate::filter::limit::Limit;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_empty_chain() {
        let q = compile(&[]);
        assert!(q.is_empty());
        assert_eq!(q.to_gmail_query(), None);
        assert_eq!(q.to_imap_search(), "ALL");
    }

    #[test]
    fn test_single_sender() {
        let q = compile(&[Filter::SenderMatch(vec!["alice@example.com".into()])]);
        assert_eq!(q.to_gmail_query().as_deref(), Some("from:alice@example.com"));
        assert_eq!(q.to_imap_search(), "FROM \"alice@example.com\"");
    }

    #[test]
    fn test_sender_alternatives_and_dates() {
        let q = compile(&[
            Filter::DateBefore(day(2024, 1, 1)),
            Filter::SenderMatch(vec!["a@x.com".into(), "b@x.com".into()]),
            Filter::DateAfter(day(2023, 6, 1)),
        ]);
        assert_eq!(
            q.to_gmail_query().as_deref(),
            Some("(from:a@x.com OR from:b@x.com) before:2024/01/01 after:2023/06/01")
        );
        assert_eq!(
            q.to_imap_search(),
            "OR FROM \"a@x.com\" FROM \"b@x.com\" BEFORE 1-Jan-2024 SINCE 1-Jun-2023"
        );
    }

    #[test]
    fn test_involves_expands_to_from_or_to() {
        let q = compile(&[Filter::Involves(vec!["bob@x.com".into()])]);
        assert_eq!(
            q.to_gmail_query().as_deref(),
            Some("(from:bob@x.com OR to:bob@x.com)")
        );
        assert_eq!(q.to_imap_search(), "OR FROM \"bob@x.com\" TO \"bob@x.com\"");

        let two = compile(&[Filter::Involves(vec!["a".into(), "b".into()])]);
        assert_eq!(
            two.to_gmail_query().as_deref(),
            Some("((from:a OR to:a) OR (from:b OR to:b))")
        );
        assert_eq!(two.to_imap_search(), "OR OR FROM \"a\" TO \"a\" OR FROM \"b\" TO \"b\"");
    }

    #[test]
    fn test_involves_matches_reply_to() {
        let env = Envelope {
            from: "alice@x.com".into(),
            to: "bob@x.com".into(),
            reply_to: "r@x.com".into(),
            ..Default::default()
        };
        assert!(compile(&[Filter::Involves(vec!["r@x.com".into()])]).matches(&env));
        assert!(!compile(&[Filter::Involves(vec!["z@x.com".into()])]).matches(&env));
    }

    #[test]
    fn test_separate_sender_filters_merge() {
        let q = compile(&[
            Filter::SenderMatch(vec!["a@x.com".into()]),
            Filter::DateAfter(day(2023, 1, 1)),
            Filter::SenderMatch(vec!["b@x.com".into()]),
        ]);
        assert_eq!(
            q.clauses,
            vec![
                Clause::AnyOf(vec![Term::From("a@x.com".into()), Term::From("b@x.com".into())]),
                Clause::Term(Term::After(day(2023, 1, 1))),
            ]
        );
        assert_eq!(
            q.to_gmail_query().as_deref(),
            Some("(from:a@x.com OR from:b@x.com) after:2023/01/01")
        );
    }

    #[test]
    fn test_three_way_imap_or_nests() {
        let q = compile(&[Filter::RecipientMatch(vec!["a".into(), "b".into(), "c".into()])]);
        assert_eq!(q.to_imap_search(), "OR TO \"a\" OR TO \"b\" TO \"c\"");
    }

    #[test]
    fn test_stops_at_stateful_filter() {
        let q = compile(&[
            Filter::SenderMatch(vec!["a@x.com".into()]),
            Filter::generic(Limit::new(3)),
            Filter::DateBefore(day(2024, 1, 1)),
        ]);
        assert_eq!(q.clauses, vec![Clause::Term(Term::From("a@x.com".into()))]);
    }

    #[test]
    fn test_generic_filters_are_skipped() {
        let q = compile(&[
            Filter::generic(FnPredicate::new("any", |_| true)),
            Filter::SenderMatch(vec!["a@x.com".into()]),
        ]);
        assert_eq!(q.clauses.len(), 1);
    }

    #[test]
    fn test_quoting() {
        let q = compile(&[Filter::SenderMatch(vec!["John \"JJ\" Smith".into()])]);
        assert_eq!(
            q.to_gmail_query().as_deref(),
            Some("from:\"John JJ Smith\"")
        );
        assert_eq!(q.to_imap_search(), "FROM \"John \\\"JJ\\\" Smith\"");
    }

    #[test]
    fn test_matches_envelope() {
        let env = Envelope {
            from: "Alice <alice@x.com>".into(),
            to: "bob@x.com".into(),
            date: "Sun, 25 Jun 2023 10:00:00 +0000".into(),
            ..Default::default()
        };
        let hit = compile(&[
            Filter::SenderMatch(vec!["ALICE".into()]),
            Filter::DateBefore(day(2023, 7, 1)),
        ]);
        assert!(hit.matches(&env));
        let miss = compile(&[Filter::RecipientMatch(vec!["carol".into()])]);
        assert!(!miss.matches(&env));
    }
}
