//! Production Bot API client.
//!
//! Thin reqwest wrapper over the platform HTTP surface: messages with inline
//! keyboards, callback answers, channel membership, and the paginated
//! channel list.

use super::types::{Action, ChannelInfo, UpdateBatch};
use super::{Membership, Notifier, PlatformError};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

/// HTTP client for the platform Bot API.
#[derive(Clone)]
pub struct BotApiClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl BotApiClient {
    /// Build a client. `base_url` has no trailing slash.
    pub fn new(base_url: &str, token: &str, http_timeout: Duration) -> Result<Self, PlatformError> {
        let http = reqwest::Client::builder().timeout(http_timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, PlatformError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(PlatformError::Api {
            status: status.as_u16(),
            message,
        })
    }

    /// Long-poll for updates. `marker` resumes after the last seen batch;
    /// `timeout_secs` is how long the server may hold the request open.
    pub async fn get_updates(
        &self,
        marker: Option<i64>,
        timeout_secs: u64,
    ) -> Result<UpdateBatch, PlatformError> {
        let mut request = self
            .http
            .get(self.url("/updates"))
            .query(&[("access_token", self.token.as_str())])
            .query(&[("timeout", timeout_secs)]);
        if let Some(marker) = marker {
            request = request.query(&[("marker", marker)]);
        }

        // The poll request must outlive the server-side hold time.
        let response = request
            .timeout(Duration::from_secs(timeout_secs + 10))
            .send()
            .await?;
        let response = Self::check(response).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl Notifier for BotApiClient {
    async fn notify(
        &self,
        recipient: i64,
        text: &str,
        actions: &[Action],
    ) -> Result<(), PlatformError> {
        let mut body = json!({ "text": text });
        if !actions.is_empty() {
            let buttons: Vec<Vec<&Action>> = actions.iter().map(|a| vec![a]).collect();
            body["attachments"] = json!([{
                "type": "inline_keyboard",
                "payload": { "buttons": buttons }
            }]);
        }

        let response = self
            .http
            .post(self.url("/messages"))
            .query(&[("access_token", self.token.as_str())])
            .query(&[("user_id", recipient)])
            .json(&body)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        notification: Option<&str>,
    ) -> Result<(), PlatformError> {
        // notification must be a string; empty acknowledges silently
        let body = json!({ "notification": notification.unwrap_or("") });
        let response = self
            .http
            .post(self.url("/answers"))
            .query(&[
                ("access_token", self.token.as_str()),
                ("callback_id", callback_id),
            ])
            .json(&body)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl Membership for BotApiClient {
    async fn add_members(&self, channel_id: i64, user_ids: &[i64]) -> Result<(), PlatformError> {
        // One at a time: a user already present must not sink the others
        for &user_id in user_ids {
            let response = self
                .http
                .post(self.url(&format!("/chats/{channel_id}/members")))
                .query(&[("access_token", self.token.as_str())])
                .json(&json!({ "user_ids": [user_id] }))
                .send()
                .await?;

            match Self::check(response).await {
                Ok(_) => {}
                Err(PlatformError::Api { status, message })
                    if message.to_lowercase().contains("already")
                        || message.to_lowercase().contains("member") =>
                {
                    tracing::debug!(
                        channel_id,
                        user_id,
                        status,
                        "User already in channel, continuing"
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn remove_members(
        &self,
        channel_id: i64,
        user_ids: &[i64],
    ) -> Result<(), PlatformError> {
        for &user_id in user_ids {
            let response = self
                .http
                .delete(self.url(&format!("/chats/{channel_id}/members")))
                .query(&[("access_token", self.token.as_str())])
                .query(&[("user_id", user_id)])
                .send()
                .await?;
            Self::check(response).await?;
        }
        Ok(())
    }

    async fn list_channels(&self) -> Result<Vec<ChannelInfo>, PlatformError> {
        #[derive(serde::Deserialize)]
        struct Page {
            #[serde(default)]
            chats: Vec<ChannelInfo>,
            #[serde(default)]
            marker: Option<i64>,
        }

        let mut channels = Vec::new();
        let mut marker: Option<i64> = None;

        loop {
            let mut request = self
                .http
                .get(self.url("/chats"))
                .query(&[("access_token", self.token.as_str())])
                .query(&[("count", 100)]);
            if let Some(marker) = marker {
                request = request.query(&[("marker", marker)]);
            }

            let response = Self::check(request.send().await?).await?;
            let page: Page = response.json().await?;

            channels.extend(page.chats.into_iter().filter(|c| c.is_pool_candidate()));

            match page.marker {
                Some(next) => marker = Some(next),
                None => break,
            }
        }

        Ok(channels)
    }
}
