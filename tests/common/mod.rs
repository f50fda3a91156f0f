//! Shared harness for integration tests: an in-memory database wired to a
//! recording mock of the bot platform.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use wavecall::Switchboard;
use wavecall::config::DispatchConfig;
use wavecall::db::{Database, Role, VerificationStatus};
use wavecall::platform::{
    Action, ChannelInfo, MediaDescriber, Membership, Notifier, PlatformError,
};

/// One captured notification.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub recipient: i64,
    pub text: String,
    pub actions: Vec<Action>,
}

/// Recording platform double with per-recipient failure injection.
#[derive(Default)]
pub struct MockPlatform {
    pub sent: Mutex<Vec<SentMessage>>,
    pub acks: Mutex<Vec<(String, Option<String>)>>,
    pub failing_recipients: Mutex<HashSet<i64>>,
    pub fail_membership: AtomicBool,
    pub fail_removal: AtomicBool,
    pub channels: Mutex<Vec<ChannelInfo>>,
    pub added_members: Mutex<Vec<(i64, i64)>>,
    pub removed_members: Mutex<Vec<(i64, i64)>>,
}

impl MockPlatform {
    /// Make every delivery to `recipient` fail.
    pub fn fail_deliveries_to(&self, recipient: i64) {
        self.failing_recipients.lock().unwrap().insert(recipient);
    }

    pub fn set_channels(&self, channels: Vec<(i64, &str)>) {
        *self.channels.lock().unwrap() = channels
            .into_iter()
            .map(|(channel_id, title)| ChannelInfo {
                channel_id,
                title: Some(title.to_string()),
                kind: Some("chat".to_string()),
                status: Some("active".to_string()),
            })
            .collect();
    }

    /// Texts delivered to one recipient, in order.
    pub fn texts_for(&self, recipient: i64) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.recipient == recipient)
            .map(|m| m.text.clone())
            .collect()
    }

    /// Recipients of every delivered message, in order.
    pub fn recipients(&self) -> Vec<i64> {
        self.sent.lock().unwrap().iter().map(|m| m.recipient).collect()
    }

    /// Callback payloads attached to messages sent to one recipient.
    pub fn payloads_for(&self, recipient: i64) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.recipient == recipient)
            .flat_map(|m| m.actions.iter().map(|a| a.payload.clone()))
            .collect()
    }

    pub fn clear_sent(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl Notifier for MockPlatform {
    async fn notify(
        &self,
        recipient: i64,
        text: &str,
        actions: &[Action],
    ) -> Result<(), PlatformError> {
        if self.failing_recipients.lock().unwrap().contains(&recipient) {
            return Err(PlatformError::Api {
                status: 500,
                message: "injected delivery failure".into(),
            });
        }
        self.sent.lock().unwrap().push(SentMessage {
            recipient,
            text: text.to_string(),
            actions: actions.to_vec(),
        });
        Ok(())
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        notification: Option<&str>,
    ) -> Result<(), PlatformError> {
        self.acks
            .lock()
            .unwrap()
            .push((callback_id.to_string(), notification.map(String::from)));
        Ok(())
    }
}

#[async_trait]
impl Membership for MockPlatform {
    async fn add_members(&self, channel_id: i64, user_ids: &[i64]) -> Result<(), PlatformError> {
        if self.fail_membership.load(Ordering::Relaxed) {
            return Err(PlatformError::Api {
                status: 403,
                message: "injected membership failure".into(),
            });
        }
        let mut added = self.added_members.lock().unwrap();
        for &user_id in user_ids {
            added.push((channel_id, user_id));
        }
        Ok(())
    }

    async fn remove_members(&self, channel_id: i64, user_ids: &[i64]) -> Result<(), PlatformError> {
        if self.fail_removal.load(Ordering::Relaxed) {
            return Err(PlatformError::Api {
                status: 403,
                message: "injected removal failure".into(),
            });
        }
        let mut removed = self.removed_members.lock().unwrap();
        for &user_id in user_ids {
            removed.push((channel_id, user_id));
        }
        Ok(())
    }

    async fn list_channels(&self) -> Result<Vec<ChannelInfo>, PlatformError> {
        Ok(self.channels.lock().unwrap().clone())
    }
}

/// Describer double returning a fixed text.
pub struct FixedDescriber(pub String);

#[async_trait]
impl MediaDescriber for FixedDescriber {
    async fn describe(&self, _media_url: &str) -> Result<String, PlatformError> {
        Ok(self.0.clone())
    }
}

/// Dispatch tuning for tests: no wave interval, no debounce window.
pub fn test_tuning() -> DispatchConfig {
    DispatchConfig {
        wave_interval_secs: 0,
        debounce_secs: 0,
        ..DispatchConfig::default()
    }
}

/// In-memory engine wired to a fresh mock platform.
pub async fn harness() -> (Arc<Switchboard>, Arc<MockPlatform>) {
    harness_with(test_tuning(), None).await
}

pub async fn harness_with(
    tuning: DispatchConfig,
    describer: Option<Arc<dyn MediaDescriber>>,
) -> (Arc<Switchboard>, Arc<MockPlatform>) {
    let db = Database::new(":memory:").await.unwrap();
    let platform = Arc::new(MockPlatform::default());
    let switchboard = Arc::new(Switchboard::new(
        db,
        platform.clone() as Arc<dyn Notifier>,
        platform.clone() as Arc<dyn Membership>,
        describer,
        tuning,
    ));
    (switchboard, platform)
}

pub async fn seed_needy(switchboard: &Switchboard, id: i64) {
    switchboard
        .db()
        .users()
        .upsert(id, &format!("needy-{id}"), Role::Needy)
        .await
        .unwrap();
}

pub async fn seed_volunteer(switchboard: &Switchboard, id: i64, status: VerificationStatus) {
    switchboard
        .db()
        .users()
        .upsert(id, &format!("vol-{id}"), Role::Volunteer)
        .await
        .unwrap();
    switchboard
        .db()
        .volunteers()
        .set_verification_status(id, status)
        .await
        .unwrap();
}

pub async fn seed_moderator(switchboard: &Switchboard, id: i64) {
    switchboard
        .db()
        .users()
        .upsert(id, &format!("mod-{id}"), Role::Moderator)
        .await
        .unwrap();
}

pub async fn seed_rooms(switchboard: &Switchboard, count: usize) {
    for n in 0..count {
        switchboard
            .db()
            .rooms()
            .upsert_channel(9000 + n as i64, &format!("Support {n}"))
            .await
            .unwrap();
    }
}
