//! Routes inbound platform updates into engine operations.
//!
//! Deliberately thin glue: callback payloads are parsed into [`Payload`]
//! values, free-form messages are interpreted through the actor's stored
//! conversation state, and everything else is menus and help text. No
//! business rule lives here; the engine enforces them all.

use crate::db::{ConversationState, RequestKind, Role, Urgency};
use crate::dispatch::Switchboard;
use crate::error::{AcceptOutcome, EngineError, EngineResult};
use crate::metrics;
use crate::platform::{Action, CallbackEvent, MessageEvent, Update, UpdateEvent};
use std::sync::Arc;
use tracing::{info, warn};

/// A parsed callback payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Accept { request_id: String },
    Complete { request_id: String },
    Cancel { request_id: String },
    Rate { request_id: String, rating: i64 },
    AddTag { request_id: String, tag: String },
    SkipTags { request_id: String },
    Complain { request_id: String },
    PhotoFeedback { request_id: String, helpful: bool },
    VerifyResolve { verification_id: i64, approve: bool },
    ComplaintResolve { complaint_id: i64, block: bool },
    NewCallRequest { urgency: Urgency },
    NewPhotoRequest,
    StartVerification,
}

/// Parse a raw callback payload. Unknown payloads return `None` and are
/// acknowledged without effect.
pub fn parse_payload(payload: &str) -> Option<Payload> {
    // Longer prefixes first: `complaint_block_` would otherwise be eaten by
    // `complaint_`.
    if let Some(rest) = payload.strip_prefix("accept_request_") {
        return Some(Payload::Accept { request_id: rest.to_string() });
    }
    if let Some(rest) = payload.strip_prefix("take_photo_") {
        return Some(Payload::Accept { request_id: rest.to_string() });
    }
    if let Some(rest) = payload.strip_prefix("complete_request_") {
        return Some(Payload::Complete { request_id: rest.to_string() });
    }
    if let Some(rest) = payload.strip_prefix("cancel_request_") {
        return Some(Payload::Cancel { request_id: rest.to_string() });
    }
    if let Some(rest) = payload.strip_prefix("rate_volunteer_") {
        let (request_id, rating) = rest.rsplit_once('_')?;
        return Some(Payload::Rate {
            request_id: request_id.to_string(),
            rating: rating.parse().ok()?,
        });
    }
    if let Some(rest) = payload.strip_prefix("add_tag_") {
        let (request_id, tag) = rest.split_once('_')?;
        return Some(Payload::AddTag {
            request_id: request_id.to_string(),
            tag: tag.to_string(),
        });
    }
    if let Some(rest) = payload.strip_prefix("skip_tags_") {
        return Some(Payload::SkipTags { request_id: rest.to_string() });
    }
    if let Some(rest) = payload.strip_prefix("photo_helpful_") {
        return Some(Payload::PhotoFeedback { request_id: rest.to_string(), helpful: true });
    }
    if let Some(rest) = payload.strip_prefix("photo_not_helpful_") {
        return Some(Payload::PhotoFeedback { request_id: rest.to_string(), helpful: false });
    }
    if let Some(rest) = payload.strip_prefix("verify_approve_") {
        return Some(Payload::VerifyResolve { verification_id: rest.parse().ok()?, approve: true });
    }
    if let Some(rest) = payload.strip_prefix("verify_reject_") {
        return Some(Payload::VerifyResolve { verification_id: rest.parse().ok()?, approve: false });
    }
    if let Some(rest) = payload.strip_prefix("complaint_block_") {
        return Some(Payload::ComplaintResolve { complaint_id: rest.parse().ok()?, block: true });
    }
    if let Some(rest) = payload.strip_prefix("complaint_dismiss_") {
        return Some(Payload::ComplaintResolve { complaint_id: rest.parse().ok()?, block: false });
    }
    if let Some(rest) = payload.strip_prefix("complaint_") {
        return Some(Payload::Complain { request_id: rest.to_string() });
    }
    match payload {
        "new_call_request" => Some(Payload::NewCallRequest { urgency: Urgency::Normal }),
        "new_urgent_request" => Some(Payload::NewCallRequest { urgency: Urgency::Urgent }),
        "new_photo_request" => Some(Payload::NewPhotoRequest),
        "start_verification" => Some(Payload::StartVerification),
        _ => None,
    }
}

/// Update router. One instance serves the whole intake loop.
pub struct Router {
    switchboard: Arc<Switchboard>,
}

impl Router {
    pub fn new(switchboard: Arc<Switchboard>) -> Self {
        Self { switchboard }
    }

    /// Route one update. User-facing failures are answered in place and do
    /// not propagate; internal failures do.
    pub async fn route(&self, update: &Update) -> EngineResult<()> {
        match update.event() {
            Some(UpdateEvent::Callback(cb)) => self.handle_callback(cb).await,
            Some(UpdateEvent::Message(msg)) => self.handle_message(msg).await,
            None => Ok(()),
        }
    }

    // =========================================================================
    // Callbacks
    // =========================================================================

    async fn handle_callback(&self, cb: &CallbackEvent) -> EngineResult<()> {
        let sb = &self.switchboard;
        let user_id = cb.user.user_id;
        sb.ensure_registered(user_id, cb.user.display_name()).await?;

        if !sb.debounce().allow(user_id, &cb.payload) {
            metrics::record_debounced();
            self.ack(cb, None).await;
            return Ok(());
        }

        let Some(payload) = parse_payload(&cb.payload) else {
            warn!(user_id, payload = %cb.payload, "Unknown callback payload");
            self.ack(cb, None).await;
            return Ok(());
        };

        let result = self.apply_callback(cb, user_id, payload).await;
        match result {
            Ok(()) => Ok(()),
            Err(e) => {
                metrics::record_operation_error("callback", e.error_code());
                // A failed operation must not lock the button for the window
                sb.debounce().clear(user_id, &cb.payload);
                match e.user_message() {
                    Some(msg) => {
                        self.ack(cb, Some(msg)).await;
                        Ok(())
                    }
                    None => {
                        self.ack(cb, Some("Something went wrong. Please try again."))
                            .await;
                        Err(e)
                    }
                }
            }
        }
    }

    async fn apply_callback(
        &self,
        cb: &CallbackEvent,
        user_id: i64,
        payload: Payload,
    ) -> EngineResult<()> {
        let sb = &self.switchboard;
        match payload {
            Payload::Accept { request_id } => {
                let ack = match sb.accept(&request_id, user_id).await? {
                    AcceptOutcome::Accepted => "You took the request.",
                    AcceptOutcome::AlreadyTaken => {
                        "This request was already taken by another volunteer."
                    }
                    AcceptOutcome::Ineligible(reason) => reason.user_message(),
                };
                self.ack(cb, Some(ack)).await;
            }
            Payload::Complete { request_id } => {
                sb.complete_request(&request_id, user_id).await?;
                self.ack(cb, Some("The request is finished. Thank you!")).await;
            }
            Payload::Cancel { request_id } => {
                sb.cancel_request(&request_id, user_id).await?;
                self.ack(cb, Some("Your request was cancelled.")).await;
            }
            Payload::Rate { request_id, rating } => {
                sb.rate_volunteer(&request_id, user_id, rating).await?;
                self.ack(cb, Some("Thanks for the feedback!")).await;
            }
            Payload::AddTag { request_id, tag } => {
                sb.tag_requester(&request_id, user_id, &[tag]).await?;
                self.ack(cb, Some("Noted.")).await;
            }
            Payload::SkipTags { .. } => {
                self.ack(cb, None).await;
            }
            Payload::Complain { request_id } => {
                let request = sb
                    .db()
                    .requests()
                    .find(&request_id)
                    .await?
                    .ok_or_else(|| EngineError::RequestNotFound(request_id.clone()))?;
                if request.requester_id != user_id {
                    return Err(EngineError::AccessDenied);
                }
                let Some(volunteer_id) = request.assigned_volunteer_id else {
                    return Err(EngineError::RequestNotFound(request_id));
                };
                sb.db()
                    .conversation()
                    .put(
                        user_id,
                        &ConversationState::AwaitingComplaintReason {
                            request_id,
                            volunteer_id,
                        },
                        sb.conversation_ttl(),
                    )
                    .await?;
                self.ack(cb, None).await;
                sb.notify_quiet(
                    user_id,
                    "Please describe in one message what went wrong.",
                    &[],
                )
                .await;
            }
            Payload::PhotoFeedback { request_id, helpful } => {
                sb.photo_feedback(&request_id, user_id, helpful).await?;
                self.ack(cb, None).await;
            }
            Payload::VerifyResolve { verification_id, approve } => {
                sb.resolve_verification(verification_id, user_id, approve, None)
                    .await?;
                self.ack(cb, Some("Resolved.")).await;
            }
            Payload::ComplaintResolve { complaint_id, block } => {
                sb.resolve_complaint(
                    complaint_id,
                    user_id,
                    block,
                    "Complaint upheld by moderator",
                )
                .await?;
                self.ack(cb, Some("Resolved.")).await;
            }
            Payload::NewCallRequest { urgency } => {
                let request = sb
                    .create_request(user_id, RequestKind::Call, urgency, None)
                    .await?;
                self.ack(cb, Some("We are looking for a volunteer.")).await;
                sb.notify_quiet(
                    user_id,
                    "Volunteers are being notified. You can cancel while waiting.",
                    &[Action::callback(
                        "Cancel",
                        format!("cancel_request_{}", request.id),
                    )],
                )
                .await;
            }
            Payload::NewPhotoRequest => {
                sb.db()
                    .conversation()
                    .put(
                        user_id,
                        &ConversationState::AwaitingPhotoUpload,
                        sb.conversation_ttl(),
                    )
                    .await?;
                self.ack(cb, None).await;
                sb.notify_quiet(user_id, "Send the photo you need described.", &[])
                    .await;
            }
            Payload::StartVerification => {
                sb.db()
                    .conversation()
                    .put(
                        user_id,
                        &ConversationState::AwaitingVerificationDocs,
                        sb.conversation_ttl(),
                    )
                    .await?;
                self.ack(cb, None).await;
                sb.notify_quiet(
                    user_id,
                    "Send your documents (photos or files) in one message. \
                     You can add a comment in the same message.",
                    &[],
                )
                .await;
            }
        }
        Ok(())
    }

    // =========================================================================
    // Messages
    // =========================================================================

    async fn handle_message(&self, msg: &MessageEvent) -> EngineResult<()> {
        let sb = &self.switchboard;
        let user_id = msg.sender.user_id;
        let role = sb.ensure_registered(user_id, msg.sender.display_name()).await?;
        let text = msg.body.text.as_deref().unwrap_or("").trim().to_string();

        if let Some(state) = sb.db().conversation().take(user_id).await? {
            return self.resume_conversation(msg, user_id, state, &text).await;
        }

        match text.as_str() {
            "/start" | "menu" => {
                self.send_menu(user_id, role).await;
            }
            "/volunteer" => {
                sb.register_user(user_id, msg.sender.display_name(), Role::Volunteer)
                    .await?;
                sb.notify_quiet(
                    user_id,
                    "You are registered as a volunteer. Get verified to receive \
                     call requests.",
                    &[Action::callback("Get verified", "start_verification")],
                )
                .await;
            }
            _ => {
                self.send_menu(user_id, role).await;
            }
        }
        Ok(())
    }

    async fn resume_conversation(
        &self,
        msg: &MessageEvent,
        user_id: i64,
        state: ConversationState,
        text: &str,
    ) -> EngineResult<()> {
        let sb = &self.switchboard;
        match state {
            ConversationState::AwaitingComplaintReason { request_id, volunteer_id } => {
                if text.is_empty() {
                    sb.db()
                        .conversation()
                        .put(
                            user_id,
                            &ConversationState::AwaitingComplaintReason {
                                request_id,
                                volunteer_id,
                            },
                            sb.conversation_ttl(),
                        )
                        .await?;
                    sb.notify_quiet(user_id, "Please describe the problem in text.", &[])
                        .await;
                    return Ok(());
                }
                self.respond(user_id, sb.file_complaint(&request_id, user_id, text).await)
                    .await
            }
            ConversationState::AwaitingVerificationDocs => {
                let documents = msg.body.document_urls();
                if documents.is_empty() {
                    sb.db()
                        .conversation()
                        .put(
                            user_id,
                            &ConversationState::AwaitingVerificationDocs,
                            sb.conversation_ttl(),
                        )
                        .await?;
                    sb.notify_quiet(
                        user_id,
                        "Please attach your documents as photos or files.",
                        &[],
                    )
                    .await;
                    return Ok(());
                }
                let comment = (!text.is_empty()).then_some(text);
                self.respond(
                    user_id,
                    sb.submit_verification(user_id, &documents, comment).await,
                )
                .await
            }
            ConversationState::AwaitingPhotoUpload => {
                let Some(photo_url) = msg.body.first_image_url() else {
                    sb.db()
                        .conversation()
                        .put(
                            user_id,
                            &ConversationState::AwaitingPhotoUpload,
                            sb.conversation_ttl(),
                        )
                        .await?;
                    sb.notify_quiet(user_id, "That was not a photo. Please send one.", &[])
                        .await;
                    return Ok(());
                };
                self.respond(
                    user_id,
                    sb.create_photo_request(user_id, photo_url, Urgency::Normal)
                        .await
                        .map(|_| ()),
                )
                .await
            }
            ConversationState::ComposingDescription { request_id } => {
                if text.is_empty() {
                    sb.db()
                        .conversation()
                        .put(
                            user_id,
                            &ConversationState::ComposingDescription { request_id },
                            sb.conversation_ttl(),
                        )
                        .await?;
                    sb.notify_quiet(user_id, "Please send the description as text.", &[])
                        .await;
                    return Ok(());
                }
                self.respond(
                    user_id,
                    sb.submit_description(&request_id, user_id, text).await.map(|_| ()),
                )
                .await
            }
        }
    }

    async fn send_menu(&self, user_id: i64, role: Role) {
        let sb = &self.switchboard;
        match role {
            Role::Needy => {
                sb.notify_quiet(
                    user_id,
                    "What do you need?",
                    &[
                        Action::callback("Call a volunteer", "new_call_request"),
                        Action::callback("Urgent call", "new_urgent_request"),
                        Action::callback("Describe a photo", "new_photo_request"),
                    ],
                )
                .await;
            }
            Role::Volunteer => {
                sb.notify_quiet(
                    user_id,
                    "You will be notified when someone needs help.",
                    &[Action::callback("Get verified", "start_verification")],
                )
                .await;
            }
            Role::Moderator => {
                sb.notify_quiet(
                    user_id,
                    "You will be notified about new verification requests and \
                     complaints.",
                    &[],
                )
                .await;
            }
        }
    }

    /// Map an engine result onto the message channel: user-facing failures
    /// become a notification and are swallowed, internal ones propagate.
    async fn respond<T>(&self, user_id: i64, result: EngineResult<T>) -> EngineResult<()> {
        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                metrics::record_operation_error("message", e.error_code());
                if let Some(msg) = e.user_message() {
                    self.switchboard.notify_quiet(user_id, msg, &[]).await;
                    Ok(())
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Acknowledge a button tap; a failed ack only costs the tapper their
    /// spinner.
    async fn ack(&self, cb: &CallbackEvent, notification: Option<&str>) {
        if let Err(e) = self
            .switchboard
            .notifier()
            .answer_callback(&cb.callback_id, notification)
            .await
        {
            info!(callback_id = %cb.callback_id, error = %e, "Callback ack failed");
        }
    }
}
