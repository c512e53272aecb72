//! Caller-supplied predicates and negation.

use crate::error::Result;
use crate::filter::{Filter, FilterContext, Predicate, Verdict};
use crate::model::message::Message;

/// Infallible caller predicate.
pub struct FnPredicate<F> {
    name: String,
    test: F,
}

impl<F> FnPredicate<F>
where
    F: FnMut(&Message) -> bool,
{
    pub fn new(name: impl Into<String>, test: F) -> Self {
        Self {
            name: name.into(),
            test,
        }
    }
}

impl<F> Predicate for FnPredicate<F>
where
    F: FnMut(&Message) -> bool,
{
    fn evaluate(&mut self, message: &Message, _ctx: &FilterContext<'_>) -> Verdict {
        Verdict::from_bool((self.test)(message))
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

/// Caller predicate that may fail; a failure counts as no-match and is reported.
pub struct TryFnPredicate<F> {
    name: String,
    test: F,
}

impl<F> TryFnPredicate<F>
where
    F: FnMut(&Message) -> Result<bool>,
{
    pub fn new(name: impl Into<String>, test: F) -> Self {
        Self {
            name: name.into(),
            test,
        }
    }
}

impl<F> Predicate for TryFnPredicate<F>
where
    F: FnMut(&Message) -> Result<bool>,
{
    fn evaluate(&mut self, message: &Message, ctx: &FilterContext<'_>) -> Verdict {
        match (self.test)(message) {
            Ok(matched) => Verdict::from_bool(matched),
            Err(e) => ctx.fail(&self.name, message, e),
        }
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

/// Inverts the match of the wrapped filter. Stop requests pass through.
///
/// A negated structured filter is never compiled into a source-side search.
pub struct Negated(Box<Filter>);

impl Negated {
    pub fn new(filter: Filter) -> Self {
        Self(Box::new(filter))
    }
}

impl Predicate for Negated {
    fn evaluate(&mut self, message: &Message, ctx: &FilterContext<'_>) -> Verdict {
        let inner = self.0.evaluate(message, ctx);
        Verdict {
            matched: !inner.matched,
            flow: inner.flow,
        }
    }

    fn describe(&self) -> String {
        format!("not ({})", self.0.describe())
    }

    fn reset(&mut self) {
        self.0.reset();
    }

    fn may_stop(&self) -> bool {
        self.0.may_stop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MailQueryError;
    use crate::filter::tests::{eval, message};

    #[test]
    fn test_fn_predicate() {
        let msg = message("From: a@x.com\nSubject: Invoice 42");
        let mut filter = Filter::generic(FnPredicate::new("invoice", |m: &Message| {
            m.subject().contains("Invoice")
        }));
        assert!(eval(&mut filter, &msg).matched);
    }

    #[test]
    fn test_try_fn_predicate_failure_is_no_match() {
        let msg = message("From: a@x.com");
        let mut filter = Filter::generic(TryFnPredicate::new("broken", |_: &Message| {
            Err(MailQueryError::Predicate {
                filter: "broken".into(),
                reason: "boom".into(),
            })
        }));
        let verdict = eval(&mut filter, &msg);
        assert!(!verdict.matched);
        assert!(!verdict.should_stop());
    }

    #[test]
    fn test_negated_sender() {
        let msg = message("From: spam@x.com");
        let mut filter = Filter::generic(Negated::new(Filter::SenderMatch(vec!["spam".into()])));
        assert!(!eval(&mut filter, &msg).matched);
        assert_eq!(filter.describe(), "not (from spam)");
    }
}
