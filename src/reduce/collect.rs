//! Simple collecting reducers.

use serde::Serialize;

use crate::error::Result;
use crate::model::message::Message;
use crate::reduce::Reducer;

/// Joins all subjects with `" | "`.
#[derive(Debug, Default)]
pub struct SubjectConcatenator {
    subjects: Vec<String>,
}

impl Reducer for SubjectConcatenator {
    type Output = String;

    fn fold(&mut self, message: &Message) -> Result<()> {
        self.subjects.push(message.subject().to_string());
        Ok(())
    }

    fn finish(self) -> String {
        self.subjects.join(" | ")
    }
}

/// Distinct `From` values in first-seen order.
#[derive(Debug, Default)]
pub struct SenderCollector {
    senders: Vec<String>,
}

impl Reducer for SenderCollector {
    type Output = Vec<String>;

    fn fold(&mut self, message: &Message) -> Result<()> {
        let from = &message.envelope().from;
        if !self.senders.contains(from) {
            self.senders.push(from.clone());
        }
        Ok(())
    }

    fn finish(self) -> Vec<String> {
        self.senders
    }
}

/// Total whitespace-separated words across plain text bodies.
#[derive(Debug, Default)]
pub struct WordCountReducer {
    words: usize,
}

impl Reducer for WordCountReducer {
    type Output = usize;

    fn fold(&mut self, message: &Message) -> Result<()> {
        self.words += message.plain_text()?.split_whitespace().count();
        Ok(())
    }

    fn finish(self) -> usize {
        self.words
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LongestSubject {
    pub uid: String,
    pub subject: String,
}

/// Message with the longest subject; the first one wins ties.
#[derive(Debug, Default)]
pub struct LongestSubjectFinder {
    best: Option<(usize, LongestSubject)>,
}

impl Reducer for LongestSubjectFinder {
    type Output = Option<LongestSubject>;

    fn fold(&mut self, message: &Message) -> Result<()> {
        let len = message.subject().chars().count();
        if len > 0 && self.best.as_ref().is_none_or(|(best, _)| len > *best) {
            self.best = Some((
                len,
                LongestSubject {
                    uid: message.uid().to_string(),
                    subject: message.subject().to_string(),
                },
            ));
        }
        Ok(())
    }

    fn finish(self) -> Option<LongestSubject> {
        self.best.map(|(_, longest)| longest)
    }
}
