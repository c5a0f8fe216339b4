pub mod api;
pub mod config;
pub mod controller;
pub mod error;
pub mod memory;
pub mod models;
pub mod render;
pub mod state;

// Re-export commonly used types
pub use api::{ChatApi, HttpChatApi};
pub use config::ClientConfig;
pub use controller::SessionController;
pub use error::{ApiError, Result};
pub use memory::InMemoryChatApi;
pub use models::{Chat, Doctor, LabMetric, Message, MessageKind, ReportSummary, ReportUpload};
pub use render::{MessageView, Reply, classify, classify_message, classify_reply};
pub use state::{FollowUp, SessionState, Ticket};
