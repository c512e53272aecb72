//! Attaches derived values to messages as they pass the chain.

use serde_json::Value;

use crate::error::Result;
use crate::filter::{FilterContext, Predicate, Verdict};
use crate::model::message::Message;

type Compute = Box<dyn FnMut(&Message) -> Result<Value>>;

/// Computes `key` for every message reaching it and stores the value in the
/// message's extra attributes. Always matches unless the computation fails.
pub struct AddAttribute {
    key: String,
    compute: Compute,
}

impl AddAttribute {
    pub fn new<F, V>(key: impl Into<String>, mut compute: F) -> Self
    where
        F: FnMut(&Message) -> V + 'static,
        V: Into<Value>,
    {
        Self {
            key: key.into(),
            compute: Box::new(move |m| Ok(compute(m).into())),
        }
    }

    pub fn fallible<F, V>(key: impl Into<String>, mut compute: F) -> Self
    where
        F: FnMut(&Message) -> Result<V> + 'static,
        V: Into<Value>,
    {
        Self {
            key: key.into(),
            compute: Box::new(move |m| compute(m).map(Into::into)),
        }
    }
}

impl Predicate for AddAttribute {
    fn evaluate(&mut self, message: &Message, ctx: &FilterContext<'_>) -> Verdict {
        match (self.compute)(message) {
            Ok(value) => {
                message.set_attribute(&self.key, value);
                Verdict::matched()
            }
            Err(e) => ctx.fail(&self.describe(), message, e),
        }
    }

    fn describe(&self) -> String {
        format!("attribute {}", self.key)
    }

    fn attribute_key(&self) -> Option<&str> {
        Some(&self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MailQueryError;
    use crate::filter::tests::{eval, message};
    use crate::filter::{Filter, FilterChain};

    #[test]
    fn test_attribute_is_set() {
        let msg = message("From: a@x.com\nSubject: one two three");
        let mut filter = Filter::generic(AddAttribute::new("subject_words", |m: &Message| {
            m.subject().split_whitespace().count()
        }));
        assert!(eval(&mut filter, &msg).matched);
        assert_eq!(msg.attribute("subject_words"), Some(Value::from(3)));
    }

    #[test]
    fn test_failed_attribute_is_no_match() {
        let msg = message("From: a@x.com");
        let mut filter = Filter::generic(AddAttribute::fallible("lang", |_: &Message| {
            Err::<String, _>(MailQueryError::Predicate {
                filter: "lang".into(),
                reason: "detector unavailable".into(),
            })
        }));
        assert!(!eval(&mut filter, &msg).matched);
        assert!(msg.attribute("lang").is_none());
    }

    #[test]
    fn test_chain_records_keys_once() {
        let mut chain = FilterChain::new();
        chain.push(Filter::generic(AddAttribute::new("a", |_: &Message| 1)));
        chain.push(Filter::generic(AddAttribute::new("b", |_: &Message| 2)));
        chain.push(Filter::generic(AddAttribute::new("a", |_: &Message| 3)));
        assert_eq!(chain.attribute_keys(), ["a".to_string(), "b".to_string()]);
    }
}
