//! Wave-based volunteer dispatch and the request lifecycle.
//!
//! [`Switchboard`] is the engine facade: it owns the database, the platform
//! collaborators, and the dispatch tuning, and every operation the router or
//! a background task invokes lives on it. The wave dispatcher itself is here;
//! acceptance arbitration is in [`accept`], the photo-description workflow in
//! [`photo`].

pub mod accept;
pub mod photo;

use crate::config::DispatchConfig;
use crate::db::{Database, RequestKind, RequestRecord, RequestStatus, Role, Urgency};
use crate::debounce::Debounce;
use crate::error::{EngineError, EngineResult};
use crate::metrics;
use crate::platform::{Action, MediaDescriber, Membership, Notifier};
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Descriptive tags a volunteer may attach to the requester after a finished
/// request, shown as a keyboard. Stored values feed later wave texts.
const REQUESTER_TAGS: &[(&str, &str)] = &[
    ("Elderly", "elderly"),
    ("Blind", "blind"),
    ("Poor camera", "bad_camera"),
    ("Poor microphone", "bad_mic"),
    ("Hard of hearing", "hearing"),
];

/// The dispatch engine.
///
/// Cheap to clone via `Arc`; all interior state is either the database pool
/// or concurrent maps.
pub struct Switchboard {
    db: Database,
    notifier: Arc<dyn Notifier>,
    membership: Arc<dyn Membership>,
    describer: Option<Arc<dyn MediaDescriber>>,
    debounce: Debounce,
    tuning: DispatchConfig,
}

impl Switchboard {
    pub fn new(
        db: Database,
        notifier: Arc<dyn Notifier>,
        membership: Arc<dyn Membership>,
        describer: Option<Arc<dyn MediaDescriber>>,
        tuning: DispatchConfig,
    ) -> Self {
        let debounce = Debounce::new(Duration::from_secs(tuning.debounce_secs));
        Self {
            db,
            notifier,
            membership,
            describer,
            debounce,
            tuning,
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn notifier(&self) -> &dyn Notifier {
        self.notifier.as_ref()
    }

    pub(crate) fn membership(&self) -> &dyn Membership {
        self.membership.as_ref()
    }

    pub(crate) fn describer(&self) -> Option<&dyn MediaDescriber> {
        self.describer.as_deref()
    }

    pub fn debounce(&self) -> &Debounce {
        &self.debounce
    }

    pub fn tuning(&self) -> &DispatchConfig {
        &self.tuning
    }

    /// TTL applied to per-actor conversation state.
    pub fn conversation_ttl(&self) -> u64 {
        self.tuning.conversation_ttl_secs
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Register or refresh a user on contact.
    pub async fn register_user(&self, id: i64, name: &str, role: Role) -> EngineResult<()> {
        self.db.users().upsert(id, name, role).await?;
        info!(user_id = id, role = role.as_str(), "User registered");
        Ok(())
    }

    /// Register the user only if unseen, defaulting to the needy role.
    /// Existing users keep their stored role and name refresh is skipped.
    pub async fn ensure_registered(&self, id: i64, name: &str) -> EngineResult<Role> {
        if let Some(user) = self.db.users().find(id).await? {
            return Ok(user.role);
        }
        self.db.users().upsert(id, name, Role::Needy).await?;
        Ok(Role::Needy)
    }

    // =========================================================================
    // Request lifecycle
    // =========================================================================

    /// Create a help request and dispatch the first wave synchronously.
    ///
    /// A first-wave failure does not undo creation; the timer retries on the
    /// next tick.
    pub async fn create_request(
        &self,
        requester_id: i64,
        kind: RequestKind,
        urgency: Urgency,
        photo_url: Option<&str>,
    ) -> EngineResult<RequestRecord> {
        if self.db.users().find(requester_id).await?.is_none() {
            return Err(EngineError::UserNotFound(requester_id));
        }

        let request = self
            .db
            .requests()
            .create(requester_id, kind, urgency, photo_url)
            .await?;
        metrics::record_request_created(kind.as_str());
        self.db
            .audit()
            .log(
                requester_id,
                "create_request",
                "request",
                &request.id,
                Some(serde_json::json!({
                    "kind": kind.as_str(),
                    "urgency": urgency.as_str(),
                })),
            )
            .await?;
        info!(
            request_id = %request.id,
            requester_id,
            kind = kind.as_str(),
            urgency = urgency.as_str(),
            "Request created"
        );

        if let Err(e) = self.dispatch_wave(&request).await {
            warn!(request_id = %request.id, error = %e, "First wave failed, timer will retry");
        }

        Ok(request)
    }

    /// Complete an active request. Either party may finish; the room (if any)
    /// is released, the requester is prompted to rate, and the volunteer to
    /// tag the requester.
    pub async fn complete_request(&self, request_id: &str, actor_id: i64) -> EngineResult<()> {
        let request = self
            .db
            .requests()
            .find(request_id)
            .await?
            .ok_or_else(|| EngineError::RequestNotFound(request_id.to_string()))?;

        let volunteer_id = request.assigned_volunteer_id;
        if actor_id != request.requester_id && Some(actor_id) != volunteer_id {
            return Err(EngineError::AccessDenied);
        }

        if !self.db.requests().complete(request_id).await? {
            return Err(EngineError::NotCompletable);
        }

        if let Some(room_id) = request.chat_room_id {
            if let Some(room) = self.db.rooms().find(room_id).await? {
                let mut participants = vec![request.requester_id];
                participants.extend(volunteer_id);
                self.release_room(&room, &participants).await?;
            }
        }

        self.db
            .audit()
            .log(actor_id, "complete_request", "request", request_id, None)
            .await?;
        info!(request_id, actor_id, "Request completed");

        if let Some(volunteer_id) = volunteer_id {
            let rate_buttons: Vec<Action> = (1..=5)
                .map(|n| Action::callback(format!("{n} ⭐"), format!("rate_volunteer_{request_id}_{n}")))
                .collect();
            self.notify_quiet(
                request.requester_id,
                "The request is finished. How was the help?",
                &rate_buttons,
            )
            .await;

            let mut tag_buttons: Vec<Action> = REQUESTER_TAGS
                .iter()
                .map(|(label, tag)| {
                    Action::callback(*label, format!("add_tag_{request_id}_{tag}"))
                })
                .collect();
            tag_buttons.push(Action::callback("Skip", format!("skip_tags_{request_id}")));
            self.notify_quiet(
                volunteer_id,
                "Thank you for helping! You can note what kind of help this person needs.",
                &tag_buttons,
            )
            .await;
        }

        Ok(())
    }

    /// Cancel a pending request. Only the original requester, only before
    /// acceptance.
    pub async fn cancel_request(&self, request_id: &str, actor_id: i64) -> EngineResult<()> {
        if !self.db.requests().cancel(request_id, actor_id).await? {
            return Err(EngineError::NotCancellable);
        }
        self.db
            .audit()
            .log(actor_id, "cancel_request", "request", request_id, None)
            .await?;
        info!(request_id, actor_id, "Request cancelled");
        Ok(())
    }

    /// Record the requester's 1-5 rating for the volunteer who helped.
    pub async fn rate_volunteer(
        &self,
        request_id: &str,
        rater_id: i64,
        rating: i64,
    ) -> EngineResult<()> {
        let request = self
            .db
            .requests()
            .find(request_id)
            .await?
            .ok_or_else(|| EngineError::RequestNotFound(request_id.to_string()))?;
        if request.requester_id != rater_id {
            return Err(EngineError::AccessDenied);
        }
        let Some(volunteer_id) = request.assigned_volunteer_id else {
            return Err(EngineError::NotCompletable);
        };
        let rating = rating.clamp(1, 5);

        self.db
            .volunteers()
            .record_review(request_id, volunteer_id, rating, "")
            .await?;
        self.db
            .audit()
            .log(
                rater_id,
                "rate_volunteer",
                "request",
                request_id,
                Some(serde_json::json!({ "rating": rating })),
            )
            .await?;

        self.notify_quiet(
            volunteer_id,
            &format!("You received a {rating}/5 rating for your last help. Thank you!"),
            &[],
        )
        .await;
        Ok(())
    }

    /// Let the volunteer who helped attach descriptive tags to the requester.
    pub async fn tag_requester(
        &self,
        request_id: &str,
        volunteer_id: i64,
        tags: &[String],
    ) -> EngineResult<()> {
        let request = self
            .db
            .requests()
            .find(request_id)
            .await?
            .ok_or_else(|| EngineError::RequestNotFound(request_id.to_string()))?;
        if request.assigned_volunteer_id != Some(volunteer_id) {
            return Err(EngineError::AccessDenied);
        }

        self.db.users().add_tags(request.requester_id, tags).await?;
        self.db
            .audit()
            .log(
                volunteer_id,
                "tag_requester",
                "user",
                &request.requester_id.to_string(),
                Some(serde_json::json!({ "tags": tags })),
            )
            .await?;
        Ok(())
    }

    // =========================================================================
    // Wave dispatch
    // =========================================================================

    /// Send the next wave for a pending request.
    ///
    /// Selects up to `wave_size` eligible volunteers not yet offered this
    /// request, shuffled so no volunteer subset is starved. With zero
    /// candidates the request is declared exhausted and the requester told
    /// once. Returns how many volunteers were notified.
    pub async fn dispatch_wave(&self, request: &RequestRecord) -> EngineResult<usize> {
        if request.status != RequestStatus::Pending || request.is_exhausted() {
            return Ok(0);
        }

        let mut candidates = self
            .db
            .volunteers()
            .eligible_for_wave(&request.id, request.kind)
            .await?;

        if candidates.is_empty() {
            self.exhaust(request).await?;
            return Ok(0);
        }

        candidates.shuffle(&mut rand::thread_rng());
        candidates.truncate(self.tuning.wave_size);

        let text = self.wave_text(request).await?;
        let accept = Action::callback("Help", format!("accept_request_{}", request.id));

        let mut delivered = 0usize;
        for &volunteer_id in &candidates {
            match self
                .notifier
                .notify(volunteer_id, &text, std::slice::from_ref(&accept))
                .await
            {
                Ok(()) => delivered += 1,
                Err(e) => {
                    // Failure still records the exclusion: the id was offered.
                    metrics::record_delivery_failure();
                    warn!(
                        request_id = %request.id,
                        volunteer_id,
                        error = %e,
                        "Wave notification failed"
                    );
                }
            }
        }

        self.db.requests().record_wave(&request.id, &candidates).await?;
        metrics::record_wave(delivered);
        info!(
            request_id = %request.id,
            wave = request.current_wave + 1,
            offered = candidates.len(),
            delivered,
            "Wave sent"
        );
        Ok(delivered)
    }

    /// Notification text for a wave, carrying urgency and requester tags.
    async fn wave_text(&self, request: &RequestRecord) -> EngineResult<String> {
        let mut text = match request.kind {
            RequestKind::Call => "Someone needs help over a call.".to_string(),
            RequestKind::Photo => "Someone needs a photo described.".to_string(),
        };
        if request.urgency == Urgency::Urgent {
            text = format!("❗ URGENT: {text}");
        }
        if let Some(user) = self.db.users().find(request.requester_id).await? {
            if !user.tags.is_empty() {
                text.push_str(&format!("\nAbout them: {}", user.tags.join(", ")));
            }
        }
        Ok(text)
    }

    /// Declare a request out of waves and tell the requester, exactly once.
    /// The once-gate is the guarded sentinel write in the request store.
    async fn exhaust(&self, request: &RequestRecord) -> EngineResult<()> {
        if self.db.requests().mark_exhausted(&request.id).await? {
            metrics::record_exhausted();
            warn!(request_id = %request.id, "Request exhausted, no volunteers left");
            self.notify_quiet(
                request.requester_id,
                "Unfortunately no volunteer is available right now. \
                 Please try again a little later.",
                &[],
            )
            .await;
        }
        Ok(())
    }

    /// One timer pass over every stale pending request, urgent first. A
    /// request with budget left gets its next wave; one that spent all its
    /// waves without an acceptance is declared exhausted. A failed request
    /// does not stop the pass.
    pub async fn wave_timer_pass(&self) -> EngineResult<usize> {
        let cutoff = chrono::Utc::now().timestamp() - self.tuning.wave_interval_secs as i64;
        let stale = self.db.requests().stale_pending(cutoff).await?;

        let mut dispatched = 0usize;
        for request in &stale {
            let result = if request.current_wave >= self.tuning.max_waves {
                self.exhaust(request).await.map(|()| 0)
            } else {
                self.dispatch_wave(request).await
            };
            match result {
                Ok(n) => dispatched += n,
                Err(e) => {
                    metrics::record_operation_error("wave_timer", e.error_code());
                    error!(request_id = %request.id, error = %e, "Timer wave failed");
                }
            }
        }
        if !stale.is_empty() {
            debug!(stale = stale.len(), dispatched, "Wave timer pass");
        }
        Ok(dispatched)
    }

    /// Fire-and-forget notification: delivery failure is logged and counted,
    /// never surfaced to the operation.
    pub(crate) async fn notify_quiet(&self, recipient: i64, text: &str, actions: &[Action]) {
        if let Err(e) = self.notifier.notify(recipient, text, actions).await {
            metrics::record_delivery_failure();
            warn!(recipient, error = %e, "Notification failed");
        }
    }
}

/// Background wave timer. Runs until the process exits; a failed pass is
/// logged and the next tick retries.
pub async fn run_wave_timer(switchboard: Arc<Switchboard>) {
    let period = Duration::from_secs(switchboard.tuning().timer_interval_secs);
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    info!(period_secs = period.as_secs(), "Wave timer started");

    loop {
        ticker.tick().await;
        if let Err(e) = switchboard.wave_timer_pass().await {
            error!(error = %e, "Wave timer pass failed");
        }
    }
}

/// Background purge of expired conversation state.
pub async fn run_state_purge(switchboard: Arc<Switchboard>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(60));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        match switchboard.db().conversation().purge_expired().await {
            Ok(0) => {}
            Ok(purged) => debug!(purged, "Expired conversation state purged"),
            Err(e) => error!(error = %e, "Conversation state purge failed"),
        }
    }
}
