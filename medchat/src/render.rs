//! Decides how a chat message is displayed.
//!
//! Assistant replies may carry one fenced JSON block next to free text. The
//! block is recognized as either a list of doctors or a lab report summary;
//! anything else leaves the reply as plain text.

use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::LazyLock;
use tracing::debug;

use crate::models::{Doctor, Message, MessageKind, ReportSummary};

const JSON_FENCE: &str = "```json";

static ARRAY_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```json\s*(\[.*?\])\s*```").expect("valid array fence regex"));

static OBJECT_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```json\s*(\{.*?\})\s*```").expect("valid object fence regex"));

/// Render mode of a single message.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageView {
    User(String),
    Loading,
    Assistant(Reply),
}

/// An assistant reply, with at most one structured payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    PlainText(String),
    DoctorList { intro: String, doctors: Vec<Doctor> },
    ReportSummary { intro: String, summary: ReportSummary },
}

impl Reply {
    /// Free text shown before the structured block. May be empty.
    pub fn intro(&self) -> &str {
        match self {
            Reply::PlainText(intro)
            | Reply::DoctorList { intro, .. }
            | Reply::ReportSummary { intro, .. } => intro,
        }
    }

    pub fn is_structured(&self) -> bool {
        !matches!(self, Reply::PlainText(_))
    }
}

pub fn classify(kind: MessageKind, content: &str) -> MessageView {
    match kind {
        MessageKind::Human | MessageKind::User => MessageView::User(content.to_string()),
        MessageKind::Loading => MessageView::Loading,
        _ => MessageView::Assistant(classify_reply(content)),
    }
}

pub fn classify_message(message: &Message) -> MessageView {
    classify(message.kind, &message.content)
}

/// Classify the text of an assistant reply.
///
/// The first array-shaped block is tried as a doctor list before the first
/// object-shaped block is tried as a report summary.
pub fn classify_reply(text: &str) -> Reply {
    let intro = intro_text(text);

    if let Some(doctors) = first_block::<Vec<Doctor>>(&ARRAY_BLOCK, text) {
        if !doctors.is_empty() {
            return Reply::DoctorList { intro, doctors };
        }
    }

    if let Some(summary) = first_block::<ReportSummary>(&OBJECT_BLOCK, text) {
        return Reply::ReportSummary { intro, summary };
    }

    Reply::PlainText(intro)
}

/// Text before the first JSON fence, trimmed.
pub fn intro_text(text: &str) -> String {
    text.split(JSON_FENCE).next().unwrap_or_default().trim().to_string()
}

fn first_block<T: DeserializeOwned>(pattern: &Regex, text: &str) -> Option<T> {
    let body = pattern.captures(text)?.get(1)?.as_str();
    match serde_json::from_str(body) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!("Ignoring unparseable JSON block: {}", e);
            None
        }
    }
}

/// Messages to display, with a loading placeholder while a request is outstanding.
pub fn display_messages(messages: &[Message], is_loading: bool) -> Vec<Message> {
    let mut shown = messages.to_vec();
    if is_loading {
        shown.push(Message::loading());
    }
    shown
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCTORS_REPLY: &str = r#"Here are some cardiologists near you:
```json
[
  {"name": "Dr. Asha Rao", "address": "12 Lake Rd", "rating": 4.8},
  {"name": "Dr. Ben Ortiz", "address": "90 Hill St"}
]
```"#;

    const SUMMARY_REPLY: &str = r#"I analyzed your report.
```json
{
  "key_observations": ["Hemoglobin slightly low"],
  "lab_analysis": [
    {"metric": "Hemoglobin", "value": 11.2, "assessment": "Low"},
    {"metric": "Glucose", "value": "92 mg/dL", "assessment": "Normal"}
  ],
  "areas_for_improvement": ["Iron-rich diet"],
  "disclaimer": "Not medical advice."
}
```"#;

    #[test]
    fn test_user_and_loading_messages_skip_parsing() {
        assert_eq!(
            classify(MessageKind::Human, DOCTORS_REPLY),
            MessageView::User(DOCTORS_REPLY.to_string())
        );
        assert_eq!(
            classify(MessageKind::User, "hi"),
            MessageView::User("hi".to_string())
        );
        assert_eq!(classify(MessageKind::Loading, "..."), MessageView::Loading);
    }

    #[test]
    fn test_doctor_list_one_card_per_entry_in_order() {
        let reply = classify_reply(DOCTORS_REPLY);
        match reply {
            Reply::DoctorList { intro, doctors } => {
                assert_eq!(intro, "Here are some cardiologists near you:");
                let names: Vec<_> = doctors.iter().map(|d| d.name.as_str()).collect();
                assert_eq!(names, vec!["Dr. Asha Rao", "Dr. Ben Ortiz"]);
                assert!(doctors[1].rating.is_none());
            }
            other => panic!("expected doctor list, got {:?}", other),
        }
    }

    #[test]
    fn test_report_summary_with_optional_fields() {
        match classify_reply(SUMMARY_REPLY) {
            Reply::ReportSummary { intro, summary } => {
                assert_eq!(intro, "I analyzed your report.");
                assert_eq!(summary.key_observations, vec!["Hemoglobin slightly low"]);
                assert_eq!(summary.lab_analysis.len(), 2);
                assert_eq!(summary.lab_analysis[0].value.to_string(), "11.2");
                assert_eq!(summary.disclaimer, "Not medical advice.");
            }
            other => panic!("expected report summary, got {:?}", other),
        }
    }

    #[test]
    fn test_report_summary_requires_lab_analysis() {
        let text = "Summary below\n```json\n{\"key_observations\": [\"ok\"], \"disclaimer\": \"x\"}\n```";
        assert_eq!(
            classify_reply(text),
            Reply::PlainText("Summary below".to_string())
        );
    }

    #[test]
    fn test_malformed_json_falls_back_to_intro() {
        let text = "Results:\n```json\n[{\"name\": \"Dr. X\", \"address\": }]\n```";
        assert_eq!(classify_reply(text), Reply::PlainText("Results:".to_string()));

        let text = "Results:\n```json\n{\"key_observations\": [\n```";
        assert_eq!(classify_reply(text), Reply::PlainText("Results:".to_string()));
    }

    #[test]
    fn test_plain_reply_without_fence() {
        let reply = classify(MessageKind::Ai, "  Drink more water.  ");
        assert_eq!(
            reply,
            MessageView::Assistant(Reply::PlainText("Drink more water.".to_string()))
        );
    }

    #[test]
    fn test_array_of_non_doctors_is_plain_text() {
        let text = "Keywords\n```json\n[\"anemia\", \"iron\"]\n```";
        assert_eq!(classify_reply(text), Reply::PlainText("Keywords".to_string()));
    }

    #[test]
    fn test_empty_doctor_array_is_plain_text() {
        let text = "No matches found.\n```json\n[]\n```";
        assert!(!classify_reply(text).is_structured());
    }

    #[test]
    fn test_doctor_list_wins_over_summary() {
        let text = format!("{}\n{}", DOCTORS_REPLY, SUMMARY_REPLY);
        assert!(matches!(classify_reply(&text), Reply::DoctorList { .. }));
    }

    #[test]
    fn test_block_without_intro() {
        let text = "```json\n[{\"name\": \"Dr. Z\", \"address\": \"5 Elm\"}]\n```";
        let reply = classify_reply(text);
        assert_eq!(reply.intro(), "");
        assert!(reply.is_structured());
    }

    #[test]
    fn test_display_messages_appends_placeholder() {
        let messages = vec![Message::human("hi")];
        assert_eq!(display_messages(&messages, false).len(), 1);

        let shown = display_messages(&messages, true);
        assert_eq!(shown.len(), 2);
        assert_eq!(shown[1].kind, MessageKind::Loading);
    }
}
