use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, error};

use crate::{
    config::ClientConfig,
    error::{ApiError, Result},
    models::{Chat, Message, NewChat, ReportUpload},
};

/// Keys under which `/get_chats` may nest its list.
const CHAT_LIST_KEYS: &[&str] = &["chats", "data"];
/// Keys under which `/get_chat_history` may nest its list.
const HISTORY_KEYS: &[&str] = &["messages", "history", "data"];

/// The remote chat backend, one request per call.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn list_chats(&self) -> Result<Vec<Chat>>;
    async fn new_chat(&self) -> Result<NewChat>;
    async fn chat_history(&self, chat_id: &str) -> Result<Vec<Message>>;
    async fn delete_chat(&self, chat_id: &str) -> Result<()>;

    /// Send a user message; returns the assistant's reply text, if any.
    async fn send_message(&self, session_id: &str, message: &str) -> Result<Option<String>>;

    /// Upload a lab report as `report_image`; returns the assistant's reply text, if any.
    async fn upload_report(&self, session_id: &str, upload: ReportUpload)
    -> Result<Option<String>>;
}

/// [`ChatApi`] over HTTP.
#[derive(Clone)]
pub struct HttpChatApi {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpChatApi {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let base_url = reqwest::Url::parse(&config.base_url)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", config.base_url, e)))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ApiError::InvalidUrl(config.base_url.clone()));
        }
        let config = config.with_base_url(base_url.as_str());

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| ApiError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        self.config.endpoint(path)
    }

    fn chat_url(&self, path: &str, chat_id: &str) -> String {
        self.url(&format!("{}/{}", path, urlencoding::encode(chat_id)))
    }

    /// Run the request and return the 2xx response; other statuses become errors.
    async fn checked(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = request.send().await.map_err(|e| {
            error!("Request failed: {}", e);
            ApiError::Network(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Server answered {}: {}", status, body);
            return Err(ApiError::status(status.as_u16(), body));
        }
        Ok(response)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value> {
        let body = self.checked(request).await?.text().await?;
        debug!("Response body: {}", body);
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }

    /// Like [`send`](Self::send) but only the status counts; the body is ignored.
    async fn send_status(&self, request: reqwest::RequestBuilder) -> Result<()> {
        self.checked(request).await?;
        Ok(())
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn list_chats(&self) -> Result<Vec<Chat>> {
        let data = self.send(self.client.get(self.url("get_chats"))).await?;
        nested_list(data, CHAT_LIST_KEYS)
    }

    async fn new_chat(&self) -> Result<NewChat> {
        let data = self.send(self.client.post(self.url("new_chat"))).await?;
        Ok(new_chat_from(&data))
    }

    async fn chat_history(&self, chat_id: &str) -> Result<Vec<Message>> {
        let url = self.chat_url("get_chat_history", chat_id);
        let data = self.send(self.client.get(url)).await?;
        nested_list(data, HISTORY_KEYS)
    }

    async fn delete_chat(&self, chat_id: &str) -> Result<()> {
        let url = self.chat_url("delete_chat", chat_id);
        self.send_status(self.client.delete(url)).await
    }

    async fn send_message(&self, session_id: &str, message: &str) -> Result<Option<String>> {
        let body = json!({ "message": message, "session_id": session_id });
        let data = self
            .send(self.client.post(self.url("chat")).json(&body))
            .await?;
        Ok(reply_text(&data))
    }

    async fn upload_report(
        &self,
        session_id: &str,
        upload: ReportUpload,
    ) -> Result<Option<String>> {
        let part = Part::bytes(upload.bytes)
            .file_name(upload.file_name)
            .mime_str(&upload.content_type)
            .map_err(|e| ApiError::Decode(format!("Invalid content type: {}", e)))?;
        let form = Form::new()
            .part("report_image", part)
            .text("session_id", session_id.to_string());

        let data = self
            .send(self.client.post(self.url("upload_report")).multipart(form))
            .await?;
        Ok(reply_text(&data))
    }
}

/// Decode a list that is either the body itself or nested under one of `keys`.
///
/// Any other shape decodes to an empty list.
pub fn nested_list<T: DeserializeOwned>(data: Value, keys: &[&str]) -> Result<Vec<T>> {
    let list = match data {
        Value::Array(_) => data,
        Value::Object(mut map) => keys
            .iter()
            .find_map(|key| match map.remove(*key) {
                Some(list @ Value::Array(_)) => Some(list),
                _ => None,
            })
            .unwrap_or_else(|| Value::Array(Vec::new())),
        _ => Value::Array(Vec::new()),
    };
    Ok(serde_json::from_value(list)?)
}

/// Read `{session_id|id, title?}`, accepting numeric ids.
pub fn new_chat_from(data: &Value) -> NewChat {
    let id = ["session_id", "id"]
        .iter()
        .find_map(|key| non_empty_text(data.get(*key)?));
    let title = data.get("title").and_then(non_empty_text);
    NewChat { id, title }
}

/// Read the assistant's reply from `response`, falling back to `message`.
pub fn reply_text(data: &Value) -> Option<String> {
    ["response", "message"]
        .iter()
        .find_map(|key| non_empty_text(data.get(*key)?))
}

fn non_empty_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
