//! Client-side view of the chat sessions and the transitions that change it.
//!
//! `SessionState` is a plain snapshot. Every transition consumes it and
//! returns the next snapshot, so a front end can keep or publish each one.
//! Requests hand out a [`Ticket`]; a response applied with a ticket that is
//! no longer current is dropped without touching the state.

use chrono::{DateTime, Local};

use crate::models::{Chat, Message, NewChat, TEMP_CHAT_PREFIX};

pub const GREETING: &str = "Hello! How can I help you today?";
pub const TEMPORARY_GREETING: &str =
    "Hello! How can I help you today? (Note: This is a temporary chat)";
pub const EMPTY_REPLY: &str = "Sorry, I received an empty response.";
pub const EMPTY_UPLOAD_REPLY: &str = "File uploaded successfully.";
pub const SEND_FAILED_REPLY: &str = "Sorry, I'm having trouble connecting. Please try again.";
pub const UPLOAD_FAILED_REPLY: &str =
    "An error occurred while uploading the report. Please try again.";

pub const ERR_LOAD_CHATS: &str = "Failed to load chats. Please check your connection.";
pub const ERR_NEW_CHAT: &str = "Failed to create new chat. Creating temporary chat...";
pub const ERR_LOAD_HISTORY: &str = "Failed to load chat history.";
pub const ERR_DELETE: &str = "Failed to delete chat from server, but removing from list...";
pub const ERR_NO_ACTIVE_CHAT: &str = "No active chat. Please create a new chat.";
pub const ERR_SEND: &str = "Failed to send message. Please try again.";
pub const ERR_UPLOAD: &str = "Failed to upload file. Please try again.";

/// Stamp for an outstanding request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    generation: u64,
    chat_id: Option<String>,
}

impl Ticket {
    pub fn chat_id(&self) -> Option<&str> {
        self.chat_id.as_deref()
    }
}

/// What the controller must do after a chat was removed from the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowUp {
    None,
    Select(String),
    CreateNew,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub chats: Vec<Chat>,
    pub active_chat_id: Option<String>,
    pub messages: Vec<Message>,
    pub is_loading: bool,
    pub is_initialized: bool,
    /// The single dismissible error banner.
    pub error: Option<String>,
    generation: u64,
}

/// Sidebar title for a chat the server did not name.
pub fn default_title(now: DateTime<Local>) -> String {
    format!("New Chat {}", now.format("%-I:%M:%S %p"))
}

pub fn temporary_chat_id(now: DateTime<Local>) -> String {
    format!("{}{}", TEMP_CHAT_PREFIX, now.timestamp_millis())
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_chat(&self) -> Option<&Chat> {
        let id = self.active_chat_id.as_deref()?;
        self.chats.iter().find(|chat| chat.id == id)
    }

    /// Start a request tied to the active chat.
    pub fn begin(mut self) -> (Self, Ticket) {
        self.generation += 1;
        self.is_loading = true;
        let ticket = Ticket {
            generation: self.generation,
            chat_id: self.active_chat_id.clone(),
        };
        (self, ticket)
    }

    /// True while `ticket` belongs to the latest request for the chat still shown.
    pub fn is_current(&self, ticket: &Ticket) -> bool {
        ticket.generation == self.generation && ticket.chat_id == self.active_chat_id
    }

    /// Mark a sidebar request as outstanding without superseding pane requests.
    pub fn loading_started(mut self) -> Self {
        self.is_loading = true;
        self
    }

    fn finish(mut self) -> Self {
        self.is_loading = false;
        self
    }

    pub fn error_set(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }

    pub fn error_dismissed(mut self) -> Self {
        self.error = None;
        self
    }

    pub fn initialized(mut self) -> Self {
        self.is_initialized = true;
        self.finish()
    }

    pub fn chats_loaded(mut self, chats: Vec<Chat>) -> Self {
        self.chats = chats;
        self.error = None;
        self.finish()
    }

    /// The cached list stays as it was.
    pub fn chats_failed(self) -> Self {
        self.error_set(ERR_LOAD_CHATS).finish()
    }

    pub fn chat_created(mut self, created: NewChat, now: DateTime<Local>) -> Self {
        let id = created
            .id
            .unwrap_or_else(|| now.timestamp_millis().to_string());
        let title = created.title.unwrap_or_else(|| default_title(now));
        self.activate_new(Chat::new(id, title), GREETING);
        self.error = None;
        self.finish()
    }

    pub fn chat_creation_failed(mut self, now: DateTime<Local>) -> Self {
        let chat = Chat::new(temporary_chat_id(now), default_title(now));
        self.activate_new(chat, TEMPORARY_GREETING);
        self.error_set(ERR_NEW_CHAT).finish()
    }

    fn activate_new(&mut self, chat: Chat, greeting: &str) {
        self.generation += 1;
        self.active_chat_id = Some(chat.id.clone());
        self.chats.insert(0, chat);
        self.messages = vec![Message::ai(greeting)];
    }

    /// Switch to `chat_id` and start loading its history.
    ///
    /// Returns `None` when the chat is already active.
    pub fn begin_select(mut self, chat_id: &str) -> (Self, Option<Ticket>) {
        if self.active_chat_id.as_deref() == Some(chat_id) {
            return (self, None);
        }
        self.active_chat_id = Some(chat_id.to_string());
        let (state, ticket) = self.begin();
        (state, Some(ticket))
    }

    pub fn history_loaded(mut self, ticket: &Ticket, history: Vec<Message>) -> Self {
        if !self.is_current(ticket) {
            return self;
        }
        self.messages = if history.is_empty() {
            vec![Message::ai(GREETING)]
        } else {
            history
        };
        self.error = None;
        self.finish()
    }

    pub fn history_failed(mut self, ticket: &Ticket) -> Self {
        if !self.is_current(ticket) {
            return self;
        }
        self.messages = vec![Message::ai(GREETING)];
        self.error_set(ERR_LOAD_HISTORY).finish()
    }

    /// Drop `chat_id` from the list whether or not the server deleted it.
    pub fn chat_removed(mut self, chat_id: &str, server_ok: bool) -> (Self, FollowUp) {
        self.chats.retain(|chat| chat.id != chat_id);
        self.error = if server_ok {
            None
        } else {
            Some(ERR_DELETE.to_string())
        };

        let follow_up = if self.active_chat_id.as_deref() != Some(chat_id) {
            FollowUp::None
        } else {
            self.active_chat_id = None;
            self.messages.clear();
            match self.chats.first() {
                Some(next) => FollowUp::Select(next.id.clone()),
                None => FollowUp::CreateNew,
            }
        };
        (self.finish(), follow_up)
    }

    /// Append the user's message and start the request, or refuse without an active chat.
    pub fn send_started(self, content: impl Into<String>) -> (Self, Option<Ticket>) {
        if self.active_chat_id.is_none() {
            return (self.error_set(ERR_NO_ACTIVE_CHAT), None);
        }
        let mut state = self;
        state.messages.push(Message::human(content));
        state.error = None;
        let (state, ticket) = state.begin();
        (state, Some(ticket))
    }

    pub fn upload_started(self, file_name: &str) -> (Self, Option<Ticket>) {
        self.send_started(format!("Uploaded file: {}", file_name))
    }

    pub fn reply_received(self, ticket: &Ticket, reply: Option<String>) -> Self {
        self.append_reply(ticket, reply.unwrap_or_else(|| EMPTY_REPLY.to_string()), None)
    }

    pub fn send_failed(self, ticket: &Ticket) -> Self {
        self.append_reply(ticket, SEND_FAILED_REPLY.to_string(), Some(ERR_SEND))
    }

    pub fn upload_reply_received(self, ticket: &Ticket, reply: Option<String>) -> Self {
        self.append_reply(
            ticket,
            reply.unwrap_or_else(|| EMPTY_UPLOAD_REPLY.to_string()),
            None,
        )
    }

    pub fn upload_failed(self, ticket: &Ticket) -> Self {
        self.append_reply(ticket, UPLOAD_FAILED_REPLY.to_string(), Some(ERR_UPLOAD))
    }

    fn append_reply(mut self, ticket: &Ticket, content: String, error: Option<&str>) -> Self {
        if !self.is_current(ticket) {
            return self;
        }
        self.messages.push(Message::ai(content));
        if let Some(error) = error {
            self.error = Some(error.to_string());
        }
        self.finish()
    }
}
