//! SessionController – keeps the local [`SessionState`] in step with the chat backend.
//!
//! Each operation is one request against a [`ChatApi`]: the state is moved to
//! *pending*, the request runs, and the matching success or failure transition
//! is applied. Failures never escape; they are logged, turned into the error
//! banner and replaced by the operation's local fallback (a temporary chat, a
//! greeting, a local-only deletion).
//!
//! Every new snapshot is also published on a [`watch`] channel so a front end
//! can redraw, for example to animate the loading indicator while a request
//! is outstanding:
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use medchat::{InMemoryChatApi, SessionController};
//! # async fn demo() {
//! let mut controller = SessionController::new(Arc::new(InMemoryChatApi::new()));
//! let mut updates = controller.subscribe();
//! tokio::spawn(async move {
//!     while updates.changed().await.is_ok() {
//!         let loading = updates.borrow().is_loading;
//!         // redraw
//!         # let _ = loading;
//!     }
//! });
//! controller.initialize().await;
//! # }
//! ```

use chrono::Local;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::{
    api::ChatApi,
    config::ClientConfig,
    models::{Message, ReportUpload},
    render,
    state::{FollowUp, SessionState},
};

pub struct SessionController {
    api: Arc<dyn ChatApi>,
    state: SessionState,
    updates: watch::Sender<SessionState>,
    title_refresh_delay: Duration,
    title_refresh_due: bool,
}

impl SessionController {
    pub fn new(api: Arc<dyn ChatApi>) -> Self {
        Self::with_config(api, &ClientConfig::default())
    }

    pub fn with_config(api: Arc<dyn ChatApi>, config: &ClientConfig) -> Self {
        let state = SessionState::new();
        let (updates, _) = watch::channel(state.clone());
        Self {
            api,
            state,
            updates,
            title_refresh_delay: config.title_refresh_delay(),
            title_refresh_due: false,
        }
    }

    pub fn with_title_refresh_delay(mut self, delay: Duration) -> Self {
        self.title_refresh_delay = delay;
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Receiver that sees every state snapshot from now on.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.updates.subscribe()
    }

    /// Messages of the active chat plus a loading placeholder while busy.
    pub fn display_messages(&self) -> Vec<Message> {
        render::display_messages(&self.state.messages, self.state.is_loading)
    }

    fn apply(&mut self, transition: impl FnOnce(SessionState) -> SessionState) {
        self.apply_with(|state| (transition(state), ()));
    }

    fn apply_with<T>(&mut self, transition: impl FnOnce(SessionState) -> (SessionState, T)) -> T {
        let (next, output) = transition(std::mem::take(&mut self.state));
        self.state = next;
        self.updates.send_replace(self.state.clone());
        output
    }

    /// Load the chat list, then open the most recent chat or start a new one.
    pub async fn initialize(&mut self) {
        info!("Initializing chat session");
        self.refresh_chats().await;

        match self.state.chats.first().map(|chat| chat.id.clone()) {
            Some(chat_id) => {
                info!(
                    "Found {} existing chats, opening the most recent",
                    self.state.chats.len()
                );
                self.select_chat(&chat_id).await;
            }
            None => {
                info!("No existing chats, creating a new one");
                self.new_chat().await;
            }
        }

        self.apply(SessionState::initialized);
    }

    /// Replace the cached chat list with the server's.
    pub async fn refresh_chats(&mut self) {
        self.title_refresh_due = false;
        self.apply(SessionState::loading_started);

        match self.api.list_chats().await {
            Ok(chats) => {
                info!("Fetched {} chats", chats.len());
                self.apply(|state| state.chats_loaded(chats));
            }
            Err(e) => {
                error!("Failed to fetch chats: {}", e);
                self.apply(SessionState::chats_failed);
            }
        }
    }

    pub async fn new_chat(&mut self) {
        self.apply(SessionState::loading_started);

        match self.api.new_chat().await {
            Ok(created) => {
                info!("Created chat {:?}", created.id);
                self.apply(|state| state.chat_created(created, Local::now()));
            }
            Err(e) => {
                error!("Failed to create chat: {}", e);
                warn!("Falling back to a temporary chat");
                self.apply(|state| state.chat_creation_failed(Local::now()));
            }
        }
    }

    pub async fn select_chat(&mut self, chat_id: &str) {
        let Some(ticket) = self.apply_with(|state| state.begin_select(chat_id)) else {
            debug!("Chat {} already active", chat_id);
            return;
        };

        match self.api.chat_history(chat_id).await {
            Ok(history) => {
                info!("Loaded {} messages for chat {}", history.len(), chat_id);
                self.apply(|state| state.history_loaded(&ticket, history));
            }
            Err(e) => {
                error!("Failed to load history for chat {}: {}", chat_id, e);
                self.apply(|state| state.history_failed(&ticket));
            }
        }
    }

    /// Delete a chat on the server and locally; the local removal happens either way.
    pub async fn delete_chat(&mut self, chat_id: &str) {
        self.apply(SessionState::loading_started);

        let server_ok = match self.api.delete_chat(chat_id).await {
            Ok(()) => {
                info!("Deleted chat {}", chat_id);
                true
            }
            Err(e) => {
                error!("Failed to delete chat {}: {}", chat_id, e);
                warn!("Removing chat {} from the local list only", chat_id);
                false
            }
        };

        match self.apply_with(|state| state.chat_removed(chat_id, server_ok)) {
            FollowUp::None => {}
            FollowUp::Select(next) => self.select_chat(&next).await,
            FollowUp::CreateNew => self.new_chat().await,
        }
    }

    /// Send a message in the active chat. Blank input is ignored.
    pub async fn send_message(&mut self, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        let Some(ticket) = self.apply_with(|state| state.send_started(text)) else {
            warn!("Message dropped: no active chat");
            return;
        };
        let session_id = ticket.chat_id().unwrap_or_default().to_string();

        match self.api.send_message(&session_id, text).await {
            Ok(reply) => {
                info!("Received reply in chat {}", session_id);
                self.apply(|state| state.reply_received(&ticket, reply));
                self.title_refresh_due = true;
            }
            Err(e) => {
                error!("Failed to send message in chat {}: {}", session_id, e);
                self.apply(|state| state.send_failed(&ticket));
            }
        }
    }

    pub async fn upload_report(&mut self, upload: ReportUpload) {
        let Some(ticket) = self.apply_with(|state| state.upload_started(&upload.file_name)) else {
            warn!("Upload of {} dropped: no active chat", upload.file_name);
            return;
        };
        let session_id = ticket.chat_id().unwrap_or_default().to_string();
        let file_name = upload.file_name.clone();
        info!(
            "Uploading {} ({} bytes, {}) to chat {}",
            file_name,
            upload.bytes.len(),
            upload.content_type,
            session_id
        );

        match self.api.upload_report(&session_id, upload).await {
            Ok(reply) => {
                info!("Received report analysis for {}", file_name);
                self.apply(|state| state.upload_reply_received(&ticket, reply));
                self.title_refresh_due = true;
            }
            Err(e) => {
                error!("Failed to upload {}: {}", file_name, e);
                self.apply(|state| state.upload_failed(&ticket));
            }
        }
    }

    pub fn dismiss_error(&mut self) {
        self.apply(SessionState::error_dismissed);
    }

    /// Delay after which [`refresh_titles`](Self::refresh_titles) should run,
    /// or `None` when no reply arrived since the last chat list refresh.
    ///
    /// The server may retitle a chat after its first exchange, so a front end
    /// schedules the refresh once the reply is on screen.
    pub fn pending_title_refresh(&self) -> Option<Duration> {
        self.title_refresh_due.then_some(self.title_refresh_delay)
    }

    /// Re-list chats if a reply left the titles stale.
    pub async fn refresh_titles(&mut self) {
        if self.title_refresh_due {
            self.refresh_chats().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryChatApi;
    use crate::models::MessageKind;

    fn controller(api: &InMemoryChatApi) -> SessionController {
        SessionController::new(Arc::new(api.clone())).with_title_refresh_delay(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_subscribers_see_each_snapshot() {
        let api = InMemoryChatApi::new();
        let mut controller = controller(&api);
        let mut updates = controller.subscribe();

        controller.new_chat().await;

        assert!(updates.has_changed().unwrap());
        let seen = updates.borrow_and_update().clone();
        assert_eq!(&seen, controller.state());
        assert_eq!(seen.chats.len(), 1);
    }

    #[tokio::test]
    async fn test_blank_message_is_ignored() {
        let api = InMemoryChatApi::new();
        let mut controller = controller(&api);
        controller.initialize().await;

        controller.send_message("   ").await;
        assert_eq!(controller.state().messages.len(), 1);
    }

    #[tokio::test]
    async fn test_reply_returns_before_title_refresh() {
        let api = InMemoryChatApi::new();
        let mut controller = controller(&api).with_title_refresh_delay(Duration::from_millis(500));
        controller.initialize().await;
        assert_eq!(controller.pending_title_refresh(), None);

        controller.send_message("Sore throat for a week").await;

        assert_eq!(
            controller.pending_title_refresh(),
            Some(Duration::from_millis(500))
        );
        assert_eq!(controller.state().chats[0].title, "New Conversation");
        assert!(!controller.state().is_loading);

        controller.refresh_titles().await;
        assert_eq!(controller.state().chats[0].title, "Sore throat for a week");
        assert_eq!(controller.pending_title_refresh(), None);
    }

    #[tokio::test]
    async fn test_failed_send_schedules_no_title_refresh() {
        let api = InMemoryChatApi::new();
        let mut controller = controller(&api);
        controller.initialize().await;

        api.set_offline(true);
        controller.send_message("hello?").await;
        assert_eq!(controller.pending_title_refresh(), None);
    }

    #[tokio::test]
    async fn test_display_messages_while_idle() {
        let api = InMemoryChatApi::new();
        let mut controller = controller(&api);
        controller.initialize().await;

        let shown = controller.display_messages();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].kind, MessageKind::Ai);
    }
}
