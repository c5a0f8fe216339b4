use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};
use uuid::Uuid;

use crate::{
    api::ChatApi,
    error::{ApiError, Result},
    models::{Chat, Message, MessageKind, NewChat, ReportUpload},
};

const DEFAULT_TITLE: &str = "New Conversation";
const UPLOAD_TITLE: &str = "Medical Report Analysis";
const UPLOAD_PREFIX: &str = "Uploaded file:";
const TITLE_LIMIT: usize = 35;

/// Produces the assistant's reply for a user message.
pub type Responder = Arc<dyn Fn(&str) -> String + Send + Sync>;

#[derive(Debug, Clone)]
struct StoredChat {
    messages: Vec<Message>,
    /// Sequence number of the last write; higher is more recent.
    touched: u64,
}

impl StoredChat {
    /// Title derived from the first human message.
    fn title(&self) -> String {
        self.messages
            .iter()
            .find(|m| m.kind == MessageKind::Human)
            .map(|m| title_from(&m.content))
            .unwrap_or_else(|| DEFAULT_TITLE.to_string())
    }
}

fn title_from(first_message: &str) -> String {
    if first_message.is_empty() {
        return DEFAULT_TITLE.to_string();
    }
    if first_message.starts_with(UPLOAD_PREFIX) {
        return UPLOAD_TITLE.to_string();
    }
    if first_message.chars().count() > TITLE_LIMIT {
        let head: String = first_message.chars().take(TITLE_LIMIT).collect();
        format!("{}...", head)
    } else {
        first_message.to_string()
    }
}

/// In-process [`ChatApi`] that behaves like the real backend.
#[derive(Clone)]
pub struct InMemoryChatApi {
    chats: Arc<DashMap<String, StoredChat>>,
    responder: Responder,
    offline: Arc<AtomicBool>,
    clock: Arc<AtomicU64>,
}

impl InMemoryChatApi {
    pub fn new() -> Self {
        Self::with_responder(|message| format!("You said: {}", message))
    }

    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self {
            chats: Arc::new(DashMap::new()),
            responder: Arc::new(responder),
            offline: Arc::new(AtomicBool::new(false)),
            clock: Arc::new(AtomicU64::new(0)),
        }
    }

    /// While offline every call fails with a network error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Seed a chat with existing history; returns its id.
    pub fn insert_chat(&self, messages: Vec<Message>) -> String {
        let id = Uuid::new_v4().to_string();
        let chat = StoredChat {
            messages,
            touched: self.tick(),
        };
        self.chats.insert(id.clone(), chat);
        id
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn contains(&self, chat_id: &str) -> bool {
        self.chats.contains_key(chat_id)
    }

    pub fn len(&self) -> usize {
        self.chats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chats.is_empty()
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ApiError::Network("connection refused".to_string()));
        }
        Ok(())
    }

    fn exchange(&self, session_id: &str, user_text: String, reply: String) -> Result<Option<String>> {
        let touched = self.tick();
        let mut chat = self
            .chats
            .get_mut(session_id)
            .ok_or_else(|| ApiError::status(404, format!("Chat {} not found", session_id)))?;
        chat.messages.push(Message::human(user_text));
        chat.messages.push(Message::ai(reply.clone()));
        chat.touched = touched;
        Ok(Some(reply))
    }
}

impl Default for InMemoryChatApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatApi for InMemoryChatApi {
    async fn list_chats(&self) -> Result<Vec<Chat>> {
        self.check_online()?;
        let mut entries: Vec<(u64, Chat)> = self
            .chats
            .iter()
            .map(|entry| {
                let chat = Chat::new(entry.key().clone(), entry.value().title());
                (entry.value().touched, chat)
            })
            .collect();
        entries.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(entries.into_iter().map(|(_, chat)| chat).collect())
    }

    async fn new_chat(&self) -> Result<NewChat> {
        self.check_online()?;
        Ok(NewChat {
            id: Some(self.insert_chat(Vec::new())),
            title: Some(DEFAULT_TITLE.to_string()),
        })
    }

    async fn chat_history(&self, chat_id: &str) -> Result<Vec<Message>> {
        self.check_online()?;
        Ok(self
            .chats
            .get(chat_id)
            .map(|entry| entry.messages.clone())
            .unwrap_or_default())
    }

    async fn delete_chat(&self, chat_id: &str) -> Result<()> {
        self.check_online()?;
        match self.chats.remove(chat_id) {
            Some(_) => Ok(()),
            None => Err(ApiError::status(404, "Chat not found")),
        }
    }

    async fn send_message(&self, session_id: &str, message: &str) -> Result<Option<String>> {
        self.check_online()?;
        let reply = (self.responder)(message);
        self.exchange(session_id, message.to_string(), reply)
    }

    async fn upload_report(
        &self,
        session_id: &str,
        upload: ReportUpload,
    ) -> Result<Option<String>> {
        self.check_online()?;
        let user_text = format!("{} {}", UPLOAD_PREFIX, upload.file_name);
        let reply = (self.responder)(&user_text);
        self.exchange(session_id, user_text, reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_chat_is_listed_with_default_title() {
        let api = InMemoryChatApi::new();
        let created = api.new_chat().await.unwrap();

        let chats = api.list_chats().await.unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(Some(chats[0].id.clone()), created.id);
        assert_eq!(chats[0].title, "New Conversation");
    }

    #[tokio::test]
    async fn test_title_follows_first_human_message() {
        let api = InMemoryChatApi::new();
        let id = api.new_chat().await.unwrap().id.unwrap();
        api.send_message(&id, "Persistent headache and blurred vision since Monday")
            .await
            .unwrap();

        let chats = api.list_chats().await.unwrap();
        assert_eq!(chats[0].title, "Persistent headache and blurred vis...");
    }

    #[tokio::test]
    async fn test_empty_first_message_keeps_default_title() {
        let api = InMemoryChatApi::new();
        api.insert_chat(vec![Message::human(""), Message::ai("Could you say more?")]);

        let chats = api.list_chats().await.unwrap();
        assert_eq!(chats[0].title, "New Conversation");
    }

    #[tokio::test]
    async fn test_upload_titles_chat_as_report_analysis() {
        let api = InMemoryChatApi::new();
        let id = api.new_chat().await.unwrap().id.unwrap();
        api.upload_report(&id, ReportUpload::new("cbc.png", vec![0u8; 4]))
            .await
            .unwrap();

        let history = api.chat_history(&id).await.unwrap();
        assert_eq!(history[0].content, "Uploaded file: cbc.png");
        assert_eq!(api.list_chats().await.unwrap()[0].title, "Medical Report Analysis");
    }

    #[tokio::test]
    async fn test_delete_unknown_chat_is_not_found() {
        let api = InMemoryChatApi::new();
        let err = api.delete_chat("missing").await.unwrap_err();
        assert_eq!(err.status_code(), Some(404));
    }

    #[tokio::test]
    async fn test_offline_fails_every_call() {
        let api = InMemoryChatApi::new();
        api.set_offline(true);
        assert!(matches!(api.list_chats().await, Err(ApiError::Network(_))));
        assert!(matches!(api.new_chat().await, Err(ApiError::Network(_))));

        api.set_offline(false);
        assert!(api.list_chats().await.is_ok());
    }

    #[tokio::test]
    async fn test_history_of_unknown_chat_is_empty() {
        let api = InMemoryChatApi::new();
        assert!(api.chat_history("nope").await.unwrap().is_empty());
    }
}
