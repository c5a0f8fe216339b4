//! Plain-text rendering of the sidebar and the message pane.

use medchat::{
    Chat, Doctor, Message, MessageView, Reply, ReportSummary, SessionState, classify_message,
};
use std::fmt::Write;

pub fn sidebar(chats: &[Chat], active_chat_id: Option<&str>) -> String {
    if chats.is_empty() {
        return "  No chat history found\n".to_string();
    }

    let mut out = String::new();
    for (index, chat) in chats.iter().enumerate() {
        let marker = if Some(chat.id.as_str()) == active_chat_id {
            '>'
        } else {
            ' '
        };
        let _ = writeln!(out, "{} {:>2}. {}", marker, index + 1, chat.title);
    }
    out
}

pub fn message(message: &Message) -> String {
    match classify_message(message) {
        MessageView::User(text) => format!("you > {}\n", text),
        MessageView::Loading => "... \n".to_string(),
        MessageView::Assistant(reply) => assistant(&reply),
    }
}

pub fn transcript(messages: &[Message]) -> String {
    messages.iter().map(message).collect::<Vec<_>>().join("\n")
}

fn assistant(reply: &Reply) -> String {
    let mut out = String::new();
    if !reply.intro().is_empty() {
        let _ = writeln!(out, "assistant > {}", reply.intro());
    }
    match reply {
        Reply::PlainText(_) => {}
        Reply::DoctorList { doctors, .. } => {
            for doctor in doctors {
                out.push_str(&doctor_card(doctor));
            }
        }
        Reply::ReportSummary { summary, .. } => out.push_str(&report_card(summary)),
    }
    out
}

fn doctor_card(doctor: &Doctor) -> String {
    let mut out = format!("  ┌ {}\n  │ {}\n", doctor.name, doctor.address);
    if let Some(rating) = &doctor.rating {
        let _ = writeln!(out, "  │ ⭐ {}", rating);
    }
    out.push_str("  └\n");
    out
}

fn report_card(summary: &ReportSummary) -> String {
    let mut out = String::from("  Key Observations\n");
    for item in &summary.key_observations {
        let _ = writeln!(out, "    - {}", item);
    }

    out.push_str("  Lab Analysis\n");
    for item in &summary.lab_analysis {
        let _ = writeln!(
            out,
            "    - {}: {} ({})",
            item.metric, item.value, item.assessment
        );
    }

    out.push_str("  Areas for Improvement\n");
    for item in &summary.areas_for_improvement {
        let _ = writeln!(out, "    - {}", item);
    }

    if !summary.disclaimer.is_empty() {
        let _ = writeln!(out, "  {}", summary.disclaimer);
    }
    out
}

pub fn error_banner(error: &str) -> String {
    format!("[!] {}  (type /dismiss to hide)\n", error)
}

/// Tracks what part of the active chat is already on screen.
#[derive(Debug, Default)]
pub struct Pane {
    chat_id: Option<String>,
    shown: usize,
}

impl Pane {
    /// Output that brings the screen up to date with `state`: the whole
    /// transcript after a chat switch, otherwise only the new messages.
    pub fn update(&mut self, state: &SessionState) -> String {
        let switched = self.chat_id != state.active_chat_id || state.messages.len() < self.shown;
        let start = if switched { 0 } else { self.shown };

        let mut out = String::new();
        if switched {
            if let Some(chat) = state.active_chat() {
                let _ = writeln!(out, "── {} ──", chat.title);
            }
        }
        out.push_str(&transcript(&state.messages[start..]));

        self.chat_id = state.active_chat_id.clone();
        self.shown = state.messages.len();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sidebar_marks_active_chat() {
        let chats = vec![Chat::new("a", "Headache"), Chat::new("b", "Lab results")];
        assert_eq!(sidebar(&chats, Some("b")), "   1. Headache\n>  2. Lab results\n");
    }

    #[test]
    fn test_empty_sidebar() {
        assert_eq!(sidebar(&[], None), "  No chat history found\n");
    }

    #[test]
    fn test_user_message_is_not_parsed() {
        let rendered = message(&Message::human("```json\n[]\n```"));
        assert_eq!(rendered, "you > ```json\n[]\n```\n");
    }

    #[test]
    fn test_doctor_cards_in_order() {
        let reply = Message::ai(
            "Nearby:\n```json\n[{\"name\": \"Dr. One\", \"address\": \"1 A St\", \"rating\": 4.9}, \
             {\"name\": \"Dr. Two\", \"address\": \"2 B St\"}]\n```",
        );
        let rendered = message(&reply);

        assert!(rendered.starts_with("assistant > Nearby:\n"));
        let first = rendered.find("Dr. One").unwrap();
        let second = rendered.find("Dr. Two").unwrap();
        assert!(first < second);
        assert!(rendered.contains("⭐ 4.9"));
        assert_eq!(rendered.matches('┌').count(), 2);
    }

    #[test]
    fn test_report_summary_sections() {
        let reply = Message::ai(
            "```json\n{\"key_observations\": [\"Low iron\"], \
             \"lab_analysis\": [{\"metric\": \"Ferritin\", \"value\": 8, \"assessment\": \"Low\"}], \
             \"areas_for_improvement\": [\"Eat more greens\"], \
             \"disclaimer\": \"Consult your doctor.\"}\n```",
        );
        let rendered = message(&reply);

        assert!(!rendered.contains("assistant >"));
        assert!(rendered.contains("    - Ferritin: 8 (Low)\n"));
        assert!(rendered.contains("  Areas for Improvement\n    - Eat more greens\n"));
        assert!(rendered.ends_with("  Consult your doctor.\n"));
    }

    #[test]
    fn test_malformed_block_shows_intro_only() {
        let rendered = message(&Message::ai("Here you go\n```json\n{oops}\n```"));
        assert_eq!(rendered, "assistant > Here you go\n");
    }

    #[test]
    fn test_pane_prints_only_new_messages() {
        let mut state = SessionState::new();
        state.chats = vec![Chat::new("c1", "Back pain")];
        state.active_chat_id = Some("c1".to_string());
        state.messages = vec![Message::ai("Hello!")];

        let mut pane = Pane::default();
        assert_eq!(pane.update(&state), "── Back pain ──\nassistant > Hello!\n");
        assert_eq!(pane.update(&state), "");

        state.messages.push(Message::human("It hurts"));
        assert_eq!(pane.update(&state), "you > It hurts\n");
    }

    #[test]
    fn test_pane_redraws_after_switch() {
        let mut state = SessionState::new();
        state.chats = vec![Chat::new("c1", "One"), Chat::new("c2", "Two")];
        state.active_chat_id = Some("c1".to_string());
        state.messages = vec![Message::human("a"), Message::ai("b")];

        let mut pane = Pane::default();
        pane.update(&state);

        state.active_chat_id = Some("c2".to_string());
        state.messages = vec![Message::ai("fresh")];
        assert_eq!(pane.update(&state), "── Two ──\nassistant > fresh\n");
    }

    #[test]
    fn test_loading_placeholder() {
        assert_eq!(message(&Message::loading()), "... \n");
    }
}
