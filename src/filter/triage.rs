//! Interactive review: a person decides message by message.

use std::io::{BufRead, Write};

use tracing::info;

use crate::error::{MailQueryError, Result};
use crate::filter::{FilterContext, Predicate, Verdict};
use crate::model::message::Message;

/// Decision taken for one reviewed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriageDecision {
    /// Keep the message in the result set (for deletion or export).
    Delete,
    /// Leave it out.
    Keep,
    /// Leave it out and note that it needs an answer.
    Reply,
    /// End the review.
    Quit,
}

/// Something that can be asked about a message.
pub trait TriageDecider {
    fn decide(&mut self, message: &Message, position: usize, limit: usize)
        -> Result<TriageDecision>;
}

/// Asks up to `limit` questions per iteration; messages marked
/// [`TriageDecision::Delete`] match.
pub struct Triage {
    decider: Box<dyn TriageDecider>,
    limit: usize,
    reviewed: usize,
}

impl Triage {
    pub fn new(limit: usize, decider: impl TriageDecider + 'static) -> Self {
        Self {
            decider: Box::new(decider),
            limit,
            reviewed: 0,
        }
    }
}

impl Predicate for Triage {
    fn evaluate(&mut self, message: &Message, ctx: &FilterContext<'_>) -> Verdict {
        if self.reviewed >= self.limit {
            return Verdict::stop(false, format!("reviewed {} messages", self.limit));
        }
        self.reviewed += 1;
        let last = self.reviewed == self.limit;

        let matched = match self.decider.decide(message, self.reviewed, self.limit) {
            Ok(TriageDecision::Delete) => true,
            Ok(TriageDecision::Keep) => false,
            Ok(TriageDecision::Reply) => {
                info!(uid = message.uid(), subject = message.subject(), "Marked for reply");
                false
            }
            Ok(TriageDecision::Quit) => return Verdict::stop(false, "review ended"),
            Err(e) => return ctx.fail(&self.describe(), message, e),
        };

        if last {
            Verdict::stop(matched, format!("reviewed {} messages", self.limit))
        } else {
            Verdict::from_bool(matched)
        }
    }

    fn describe(&self) -> String {
        format!("review up to {}", self.limit)
    }

    fn reset(&mut self) {
        self.reviewed = 0;
    }

    fn may_stop(&self) -> bool {
        true
    }
}

/// Prompts on a writer and reads one-letter answers from a reader.
///
/// `d` delete, `k` keep, `r` reply, `q` quit. End of input quits.
pub struct LineDecider<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> LineDecider<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> TriageDecider for LineDecider<R, W> {
    fn decide(
        &mut self,
        message: &Message,
        position: usize,
        limit: usize,
    ) -> Result<TriageDecision> {
        writeln!(
            self.output,
            "[{position}/{limit}] {}\n        Subject: {}\n        Date: {}",
            message.cleaned_sender(),
            message.subject(),
            message.envelope().date
        )?;
        loop {
            write!(self.output, "(d)elete, (k)eep, (r)eply, (q)uit? ")?;
            self.output.flush()?;
            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                return Ok(TriageDecision::Quit);
            }
            let answer = line.trim().to_lowercase();
            match answer.parse::<TriageDecision>() {
                Ok(decision) => return Ok(decision),
                Err(_) => writeln!(self.output, "Unknown answer '{answer}'")?,
            }
        }
    }
}

/// Replays a fixed list of decisions. Runs out as `Quit`.
pub struct ScriptedDecider {
    answers: std::vec::IntoIter<TriageDecision>,
}

impl ScriptedDecider {
    pub fn new(answers: Vec<TriageDecision>) -> Self {
        Self {
            answers: answers.into_iter(),
        }
    }
}

impl TriageDecider for ScriptedDecider {
    fn decide(&mut self, _: &Message, _: usize, _: usize) -> Result<TriageDecision> {
        Ok(self.answers.next().unwrap_or(TriageDecision::Quit))
    }
}

impl std::str::FromStr for TriageDecision {
    type Err = MailQueryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "d" | "delete" => Ok(Self::Delete),
            "k" | "keep" => Ok(Self::Keep),
            "r" | "reply" => Ok(Self::Reply),
            "q" | "quit" => Ok(Self::Quit),
            other => Err(MailQueryError::Predicate {
                filter: "review".into(),
                reason: format!("unknown decision '{other}'"),
            }),
        }
    }
}
