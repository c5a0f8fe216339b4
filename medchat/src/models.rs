use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::Result;

/// Prefix carried by chats created locally after `/new_chat` failed.
pub const TEMP_CHAT_PREFIX: &str = "temp_";

/// A server-tracked conversation thread as listed in the sidebar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub title: String,
}

impl Chat {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }

    /// True for a chat that only exists on this client.
    pub fn is_temporary(&self) -> bool {
        self.id.starts_with(TEMP_CHAT_PREFIX)
    }
}

/// Sender tag of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Human,
    User,
    Ai,
    Loading,
    System,
    #[serde(other)]
    Other,
}

impl MessageKind {
    pub fn is_from_user(self) -> bool {
        matches!(self, Self::Human | Self::User)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default)]
    pub content: String,
}

impl Message {
    pub fn human(content: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Human,
            content: content.into(),
        }
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Ai,
            content: content.into(),
        }
    }

    pub fn loading() -> Self {
        Self {
            kind: MessageKind::Loading,
            content: "...".to_string(),
        }
    }
}

/// A JSON scalar that the backend sends either as a number or as text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Number(serde_json::Number),
    Text(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Number(n) => write!(f, "{}", n),
            Scalar::Text(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Doctor {
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub rating: Option<Scalar>,
}

/// One row of the lab analysis table in a report summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabMetric {
    pub metric: String,
    pub value: Scalar,
    #[serde(default)]
    pub assessment: String,
}

/// Summary the backend produces for an uploaded lab report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub key_observations: Vec<String>,
    pub lab_analysis: Vec<LabMetric>,
    #[serde(default)]
    pub areas_for_improvement: Vec<String>,
    #[serde(default)]
    pub disclaimer: String,
}

/// What `/new_chat` handed back; both fields are optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewChat {
    pub id: Option<String>,
    pub title: Option<String>,
}

/// A file selected for `/upload_report`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl ReportUpload {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let content_type = mime_guess::from_path(&file_name)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Self {
            file_name,
            content_type,
            bytes,
        }
    }

    /// Read a report from disk, guessing its MIME type from the extension.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "report".to_string());
        Ok(Self::new(file_name, bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_kind_wire_names() {
        let messages: Vec<Message> = serde_json::from_str(
            r#"[{"type":"human","content":"hi"},{"type":"ai","content":"hello"},{"type":"tool","content":"x"}]"#,
        )
        .unwrap();

        assert_eq!(messages[0].kind, MessageKind::Human);
        assert_eq!(messages[1].kind, MessageKind::Ai);
        assert_eq!(messages[2].kind, MessageKind::Other);

        let json = serde_json::to_value(Message::human("hi")).unwrap();
        assert_eq!(json["type"], "human");
    }

    #[test]
    fn test_scalar_accepts_numbers_and_text() {
        let doctor: Doctor =
            serde_json::from_str(r#"{"name":"Dr. A","address":"1 Main St","rating":4.5}"#).unwrap();
        assert_eq!(doctor.rating.unwrap().to_string(), "4.5");

        let doctor: Doctor =
            serde_json::from_str(r#"{"name":"Dr. B","address":"2 Main St","rating":"4/5"}"#).unwrap();
        assert_eq!(doctor.rating.unwrap().to_string(), "4/5");
    }

    #[test]
    fn test_temporary_chat() {
        assert!(Chat::new("temp_1700000000000", "New Chat").is_temporary());
        assert!(!Chat::new("abc", "New Chat").is_temporary());
    }

    #[test]
    fn test_upload_guesses_content_type() {
        let upload = ReportUpload::new("labs.png", vec![1, 2, 3]);
        assert_eq!(upload.content_type, "image/png");

        let upload = ReportUpload::new("labs", vec![]);
        assert_eq!(upload.content_type, "application/octet-stream");
    }
}
