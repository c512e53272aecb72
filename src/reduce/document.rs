//! Reducers that render a result set as a document or as records.

use humansize::{format_size, BINARY};
use serde::Serialize;

use crate::error::{MailQueryError, Result};
use crate::model::attachment::Attachment;
use crate::model::message::Message;
use crate::reduce::Reducer;

fn or_placeholder<'a>(value: &'a str, placeholder: &'a str) -> &'a str {
    if value.trim().is_empty() {
        placeholder
    } else {
        value
    }
}

/// Plain text document with one section per message.
///
/// A message whose body cannot be read gets a placeholder section.
#[derive(Debug)]
pub struct TextDocumentBuilder {
    text: String,
}

impl Default for TextDocumentBuilder {
    fn default() -> Self {
        Self {
            text: format!("EMAIL COLLECTION\n{}\n\n", "=".repeat(50)),
        }
    }
}

impl TextDocumentBuilder {
    fn push_section(&mut self, sender: &str, subject: &str, date: &str, body: &str) {
        self.text.push_str(&format!(
            "\nFrom: {sender}\nSubject: {subject}\nDate: {date}\n{}\n{body}\n\n",
            "-".repeat(40)
        ));
    }
}

impl Reducer for TextDocumentBuilder {
    type Output = String;

    fn fold(&mut self, message: &Message) -> Result<()> {
        let body = message.plain_text()?;
        let body = or_placeholder(body, "No Body").to_string();
        self.push_section(
            message.cleaned_sender(),
            or_placeholder(message.subject(), "No Subject"),
            or_placeholder(&message.envelope().date, "No Date"),
            &body,
        );
        Ok(())
    }

    fn recover(&mut self, message: &Message, error: &MailQueryError) {
        let body = format!("Error processing email {}: {error}", message.uid());
        self.push_section(
            "[Error processing email]",
            "[Error processing email]",
            "[Unknown]",
            &body,
        );
    }

    fn finish(self) -> String {
        self.text
    }
}

/// Minimal HTML escaping for text placed inside elements.
pub(crate) fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn attachment_lines(attachments: &[Attachment]) -> String {
    let mut lines = vec!["No body, but attachments were found:".to_string()];
    for (i, att) in attachments.iter().enumerate() {
        lines.push(format!(
            "{}. {} ({}, {})",
            i + 1,
            att.display_name(i + 1),
            att.content_type,
            format_size(att.size, BINARY)
        ));
    }
    lines.join("\n")
}

const HTML_HEAD: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Email Collection</title>
<style>
body { font-family: Arial, sans-serif; margin: 20px; }
.email { border: 1px solid #ddd; margin: 10px 0; padding: 15px; border-radius: 5px; }
.header { background-color: #f5f5f5; padding: 10px; margin-bottom: 10px; }
.subject { font-weight: bold; color: #333; }
.sender { color: #666; }
.date { color: #999; font-size: 0.9em; }
.body { margin-top: 10px; line-height: 1.5; }
.text-content { white-space: pre-wrap; }
.error { color: #a00; }
</style>
</head>
<body>
<h1>Email Collection</h1>
"#;

/// One HTML page with a card per message.
///
/// HTML bodies are embedded as they are; plain text is escaped.
#[derive(Debug)]
pub struct HtmlPageBuilder {
    html: String,
}

impl Default for HtmlPageBuilder {
    fn default() -> Self {
        Self {
            html: HTML_HEAD.to_string(),
        }
    }
}

impl HtmlPageBuilder {
    fn push_card(&mut self, subject: &str, sender: &str, date: &str, class: &str, body: &str) {
        self.html.push_str(&format!(
            "<div class=\"email\">\n<div class=\"header\">\n<div class=\"subject\">{}</div>\n<div class=\"sender\">From: {}</div>\n<div class=\"date\">Date: {}</div>\n</div>\n<div class=\"body {class}\">{body}</div>\n</div>\n",
            escape_html(subject),
            escape_html(sender),
            escape_html(date),
        ));
    }
}

impl Reducer for HtmlPageBuilder {
    type Output = String;

    fn fold(&mut self, message: &Message) -> Result<()> {
        let body = message.body()?;
        let (class, content) = match &body.html {
            Some(html) if !html.trim().is_empty() => ("html-content", html.clone()),
            _ if !body.text.trim().is_empty() => ("text-content", escape_html(&body.text)),
            _ if !body.attachments.is_empty() => (
                "text-content",
                escape_html(&attachment_lines(&body.attachments)),
            ),
            _ => ("text-content", "[No body]".to_string()),
        };
        self.push_card(
            or_placeholder(message.subject(), "No Subject"),
            message.cleaned_sender(),
            or_placeholder(&message.envelope().date, "No Date"),
            class,
            &content,
        );
        Ok(())
    }

    fn recover(&mut self, message: &Message, error: &MailQueryError) {
        let content = escape_html(&format!("[Body unavailable: {error}]"));
        self.push_card(
            or_placeholder(message.subject(), "No Subject"),
            message.cleaned_sender(),
            or_placeholder(&message.envelope().date, "No Date"),
            "error",
            &content,
        );
    }

    fn finish(mut self) -> String {
        self.html.push_str("</body>\n</html>\n");
        self.html
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachmentInfo {
    pub filename: String,
    pub content_type: String,
    pub size: usize,
}

/// Structured record of one message, ready for downstream summarization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageSummary {
    pub uid: String,
    pub sender: String,
    pub subject: String,
    pub date: String,
    pub body: String,
    pub attachments: Vec<AttachmentInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Collects a [`MessageSummary`] per message; failures become error records.
#[derive(Debug, Default)]
pub struct SummaryCollector {
    records: Vec<MessageSummary>,
}

impl Reducer for SummaryCollector {
    type Output = Vec<MessageSummary>;

    fn fold(&mut self, message: &Message) -> Result<()> {
        let body = message.body()?;
        let env = message.envelope();
        self.records.push(MessageSummary {
            uid: message.uid().to_string(),
            sender: or_placeholder(&env.from, "Unknown").to_string(),
            subject: or_placeholder(&env.subject, "No Subject").to_string(),
            date: or_placeholder(&env.date, "No Date").to_string(),
            body: or_placeholder(&body.text, "No Body").to_string(),
            attachments: body
                .attachments
                .iter()
                .enumerate()
                .map(|(i, a)| AttachmentInfo {
                    filename: a.display_name(i + 1),
                    content_type: a.content_type.clone(),
                    size: a.size,
                })
                .collect(),
            error: None,
        });
        Ok(())
    }

    fn recover(&mut self, message: &Message, error: &MailQueryError) {
        self.records.push(MessageSummary {
            uid: message.uid().to_string(),
            sender: "Error processing email".into(),
            subject: "Error processing email".into(),
            date: "Unknown".into(),
            body: format!("Error processing email {}: {error}", message.uid()),
            attachments: Vec::new(),
            error: Some(error.to_string()),
        });
    }

    fn finish(self) -> Vec<MessageSummary> {
        self.records
    }
}
