//! Result-count limiter.

use crate::filter::{FilterContext, Predicate, Verdict};
use crate::model::message::Message;

/// Lets at most `max` messages reach this point of the chain per iteration.
///
/// The `max`-th message is still yielded and the iteration stops right after
/// it, so no further candidate is pulled from the source.
#[derive(Debug, Clone)]
pub struct Limit {
    max: usize,
    seen: usize,
}

impl Limit {
    pub fn new(max: usize) -> Self {
        Self { max, seen: 0 }
    }
}

impl Predicate for Limit {
    fn evaluate(&mut self, _message: &Message, _ctx: &FilterContext<'_>) -> Verdict {
        self.seen += 1;
        if self.seen > self.max {
            Verdict::stop(false, format!("limit of {} reached", self.max))
        } else if self.seen == self.max {
            Verdict::stop(true, format!("limit of {} reached", self.max))
        } else {
            Verdict::matched()
        }
    }

    fn describe(&self) -> String {
        format!("limit {}", self.max)
    }

    fn reset(&mut self) {
        self.seen = 0;
    }

    fn may_stop(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::tests::{eval, message};
    use crate::filter::Filter;

    #[test]
    fn test_limit_yields_last_with_stop() {
        let msg = message("From: a@x.com");
        let mut filter = Filter::generic(Limit::new(2));
        assert_eq!(eval(&mut filter, &msg), Verdict::matched());
        let second = eval(&mut filter, &msg);
        assert!(second.matched && second.should_stop());
        let third = eval(&mut filter, &msg);
        assert!(!third.matched && third.should_stop());
    }

    #[test]
    fn test_limit_zero_stops_immediately() {
        let msg = message("From: a@x.com");
        let verdict = eval(&mut Filter::generic(Limit::new(0)), &msg);
        assert!(!verdict.matched);
        assert!(verdict.should_stop());
    }

    #[test]
    fn test_reset_restarts_count() {
        let msg = message("From: a@x.com");
        let mut filter = Filter::generic(Limit::new(1));
        assert!(eval(&mut filter, &msg).should_stop());
        filter.reset();
        assert!(eval(&mut filter, &msg).matched);
    }
}
