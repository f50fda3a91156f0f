//! Wire types for the platform Bot API.

use serde::{Deserialize, Serialize};

/// An inline action button attached to a notification.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: String,
    pub payload: String,
}

impl Action {
    /// A callback button carrying an opaque payload.
    pub fn callback(text: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            kind: "callback",
            text: text.into(),
            payload: payload.into(),
        }
    }
}

/// A group channel the bot is a member of.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelInfo {
    #[serde(rename = "chat_id")]
    pub channel_id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl ChannelInfo {
    /// Group channels with the bot still active are pool candidates.
    pub fn is_pool_candidate(&self) -> bool {
        self.kind.as_deref() == Some("chat") && self.status.as_deref() == Some("active")
    }
}

/// One long-poll batch.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateBatch {
    #[serde(default)]
    pub updates: Vec<Update>,
    #[serde(default)]
    pub marker: Option<i64>,
}

/// A single inbound update.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_type: String,
    #[serde(default)]
    pub callback: Option<CallbackEvent>,
    #[serde(default)]
    pub message: Option<MessageEvent>,
}

impl Update {
    /// Collapse the raw update into the event the router cares about.
    pub fn event(&self) -> Option<UpdateEvent<'_>> {
        match self.update_type.as_str() {
            "message_callback" => self.callback.as_ref().map(UpdateEvent::Callback),
            "message_created" => self.message.as_ref().map(UpdateEvent::Message),
            _ => None,
        }
    }
}

/// Routed view of an update.
#[derive(Debug, Clone, Copy)]
pub enum UpdateEvent<'a> {
    Callback(&'a CallbackEvent),
    Message(&'a MessageEvent),
}

/// A button tap.
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackEvent {
    pub callback_id: String,
    #[serde(default)]
    pub payload: String,
    pub user: EventUser,
}

/// A free-form inbound message.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageEvent {
    pub sender: EventUser,
    #[serde(default)]
    pub body: MessageBody,
}

/// Message body: text plus attachments.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageBody {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// An inbound attachment; only the payload url is interesting.
#[derive(Debug, Clone, Deserialize)]
pub struct Attachment {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: AttachmentPayload,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AttachmentPayload {
    #[serde(default)]
    pub url: Option<String>,
}

impl MessageBody {
    /// First image url among the attachments, if any.
    pub fn first_image_url(&self) -> Option<&str> {
        self.attachments
            .iter()
            .find(|a| a.kind == "image")
            .and_then(|a| a.payload.url.as_deref())
    }

    /// Urls of all image and file attachments (verification documents).
    pub fn document_urls(&self) -> Vec<String> {
        self.attachments
            .iter()
            .filter(|a| a.kind == "image" || a.kind == "file")
            .filter_map(|a| a.payload.url.clone())
            .collect()
    }
}

/// The user behind an event.
#[derive(Debug, Clone, Deserialize)]
pub struct EventUser {
    pub user_id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl EventUser {
    /// Best available display name.
    pub fn display_name(&self) -> &str {
        self.username
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or("anonymous")
    }
}
