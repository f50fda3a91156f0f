//! Bot platform collaborators: notifications, channel membership, long-poll
//! intake, and the optional media describer.
//!
//! The engine only sees the traits defined here; [`client::BotApiClient`] is
//! the production implementation against the platform Bot API, and tests
//! substitute their own.

pub mod client;
pub mod poll;
mod types;

pub use client::BotApiClient;
pub use types::{
    Action, CallbackEvent, ChannelInfo, MessageEvent, Update, UpdateBatch, UpdateEvent,
};

use async_trait::async_trait;
use thiserror::Error;

/// Errors from the bot platform.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("platform api error (status {status}): {message}")]
    Api { status: u16, message: String },
    #[error("unexpected response shape: {0}")]
    Decode(String),
}

impl PlatformError {
    /// Static label for metrics.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Http(_) => "http",
            Self::Api { .. } => "api",
            Self::Decode(_) => "decode",
        }
    }
}

/// Sends notifications to individual users. Fire-and-forget from the engine's
/// perspective: a failure is logged by the caller, never retried inline.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `text` to `recipient`, with optional inline actions attached.
    async fn notify(
        &self,
        recipient: i64,
        text: &str,
        actions: &[Action],
    ) -> Result<(), PlatformError>;

    /// Acknowledge a button tap so the client stops its spinner.
    async fn answer_callback(
        &self,
        callback_id: &str,
        notification: Option<&str>,
    ) -> Result<(), PlatformError>;
}

/// Manages group channel membership and enumeration.
#[async_trait]
pub trait Membership: Send + Sync {
    async fn add_members(&self, channel_id: i64, user_ids: &[i64]) -> Result<(), PlatformError>;

    async fn remove_members(&self, channel_id: i64, user_ids: &[i64])
    -> Result<(), PlatformError>;

    /// Group channels the bot is currently a member of.
    async fn list_channels(&self) -> Result<Vec<ChannelInfo>, PlatformError>;
}

/// Produces a machine description of a piece of media. Used only by the
/// photo-description workflow, orthogonal to dispatch.
#[async_trait]
pub trait MediaDescriber: Send + Sync {
    async fn describe(&self, media_url: &str) -> Result<String, PlatformError>;
}
