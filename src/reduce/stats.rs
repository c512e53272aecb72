//! Aggregate statistics over a result set.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::Result;
use crate::model::message::Message;
use crate::reduce::Reducer;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MailboxStatistics {
    pub total_emails: usize,
    /// Distinct `From` values, first-seen order.
    pub senders: Vec<String>,
    pub subjects: Vec<String>,
    /// Messages carrying an HTML part.
    pub with_html: usize,
    pub total_subject_length: usize,
    pub longest_subject: String,
    pub sender_counts: BTreeMap<String, usize>,
}

impl MailboxStatistics {
    pub fn average_subject_length(&self) -> f64 {
        if self.total_emails == 0 {
            0.0
        } else {
            self.total_subject_length as f64 / self.total_emails as f64
        }
    }
}

/// Builds [`MailboxStatistics`]. Loads every body to detect HTML.
#[derive(Debug, Default)]
pub struct EmailStatistics {
    stats: MailboxStatistics,
}

impl Reducer for EmailStatistics {
    type Output = MailboxStatistics;

    fn fold(&mut self, message: &Message) -> Result<()> {
        let has_html = message.html()?.is_some();
        let stats = &mut self.stats;
        let subject = message.subject();
        let from = &message.envelope().from;

        stats.total_emails += 1;
        if !stats.senders.contains(from) {
            stats.senders.push(from.clone());
        }
        stats.subjects.push(subject.to_string());
        let len = subject.chars().count();
        stats.total_subject_length += len;
        if len > stats.longest_subject.chars().count() {
            stats.longest_subject = subject.to_string();
        }
        if has_html {
            stats.with_html += 1;
        }
        *stats.sender_counts.entry(from.clone()).or_insert(0) += 1;
        Ok(())
    }

    fn finish(self) -> MailboxStatistics {
        self.stats
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LargestAttachment {
    pub filename: String,
    pub content_type: String,
    pub size: usize,
    pub uid: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AttachmentReport {
    pub emails_with_attachments: usize,
    pub total_attachments: usize,
    /// Attachment count per content type.
    pub attachment_types: BTreeMap<String, usize>,
    pub largest_attachment: Option<LargestAttachment>,
    pub total_size: usize,
    pub average_size: f64,
}

/// Summarizes attachments across messages.
#[derive(Debug, Default)]
pub struct AttachmentAnalyzer {
    report: AttachmentReport,
}

impl Reducer for AttachmentAnalyzer {
    type Output = AttachmentReport;

    fn fold(&mut self, message: &Message) -> Result<()> {
        let attachments = message.attachments()?;
        if attachments.is_empty() {
            return Ok(());
        }
        let report = &mut self.report;
        report.emails_with_attachments += 1;
        for (i, att) in attachments.iter().enumerate() {
            report.total_attachments += 1;
            report.total_size += att.size;
            *report
                .attachment_types
                .entry(att.content_type.clone())
                .or_insert(0) += 1;
            if report
                .largest_attachment
                .as_ref()
                .is_none_or(|l| att.size > l.size)
            {
                report.largest_attachment = Some(LargestAttachment {
                    filename: att.display_name(i + 1),
                    content_type: att.content_type.clone(),
                    size: att.size,
                    uid: message.uid().to_string(),
                });
            }
        }
        Ok(())
    }

    fn finish(mut self) -> AttachmentReport {
        if self.report.total_attachments > 0 {
            self.report.average_size =
                self.report.total_size as f64 / self.report.total_attachments as f64;
        }
        self.report
    }
}
