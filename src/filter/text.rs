//! Substring predicates over subject, body and reply address.

use crate::filter::{any_contains, FilterContext, Predicate, Verdict};
use crate::model::message::Message;

/// Message field inspected by a [`TextMatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextField {
    Subject,
    /// Decoded plain text body. Triggers a body fetch.
    Body,
    ReplyTo,
}

impl TextField {
    fn label(self) -> &'static str {
        match self {
            Self::Subject => "subject",
            Self::Body => "body",
            Self::ReplyTo => "reply-to",
        }
    }
}

/// Case-insensitive "contains any of" test on one field.
pub struct TextMatch {
    field: TextField,
    needles: Vec<String>,
}

impl TextMatch {
    pub fn new(field: TextField, needles: Vec<String>) -> Self {
        Self { field, needles }
    }
}

impl Predicate for TextMatch {
    fn evaluate(&mut self, message: &Message, ctx: &FilterContext<'_>) -> Verdict {
        let env = message.envelope();
        match self.field {
            TextField::Subject => Verdict::from_bool(any_contains(&[&env.subject], &self.needles)),
            TextField::ReplyTo => {
                Verdict::from_bool(any_contains(&[&env.reply_to], &self.needles))
            }
            TextField::Body => match message.plain_text() {
                Ok(text) => {
                    let text = text.to_lowercase();
                    Verdict::from_bool(
                        self.needles
                            .iter()
                            .any(|n| text.contains(&n.to_lowercase())),
                    )
                }
                Err(e) => ctx.fail(&self.describe(), message, e),
            },
        }
    }

    fn describe(&self) -> String {
        format!("{} contains {}", self.field.label(), self.needles.join(" | "))
    }
}
