//! Photo-description workflow.
//!
//! Photo requests ride the same wave machinery as calls, with relaxed
//! eligibility and no room lease. The accepted volunteer sends a text
//! description; the requester answers helpful or not helpful. "Not helpful"
//! marks that volunteer failed for the request and sends it back into the
//! wave cycle, with everyone merely notified before becoming eligible again.

use super::Switchboard;
use crate::db::{ConversationState, RequestKind, RequestRecord, RequestStatus, Urgency};
use crate::error::{EngineError, EngineResult};
use crate::platform::Action;
use tracing::{info, warn};

impl Switchboard {
    /// Create a photo-description request and dispatch the first wave. When a
    /// machine describer is configured the requester also gets an immediate
    /// automatic description; its failure never affects dispatch.
    pub async fn create_photo_request(
        &self,
        requester_id: i64,
        photo_url: &str,
        urgency: Urgency,
    ) -> EngineResult<RequestRecord> {
        let request = self
            .create_request(requester_id, RequestKind::Photo, urgency, Some(photo_url))
            .await?;

        if let Some(describer) = self.describer() {
            match describer.describe(photo_url).await {
                Ok(text) => {
                    self.notify_quiet(
                        requester_id,
                        &format!(
                            "While a volunteer is on the way, here is an automatic \
                             description:\n{text}"
                        ),
                        &[],
                    )
                    .await;
                }
                Err(e) => {
                    warn!(request_id = %request.id, error = %e, "Automatic description failed");
                }
            }
        }

        Ok(request)
    }

    /// Hand the photo to the accepting volunteer and set them up to compose a
    /// description. Called from the acceptance arbiter after the assignment
    /// CAS wins.
    pub(super) async fn start_photo_session(
        &self,
        request: &RequestRecord,
        volunteer_id: i64,
    ) -> EngineResult<()> {
        let photo_url = request.photo_url.as_deref().unwrap_or("(photo missing)");

        self.db()
            .conversation()
            .put(
                volunteer_id,
                &ConversationState::ComposingDescription {
                    request_id: request.id.clone(),
                },
                self.conversation_ttl(),
            )
            .await?;

        self.notify_quiet(
            volunteer_id,
            &format!(
                "You took the photo request. Please look at the photo and reply \
                 with a description:\n{photo_url}"
            ),
            &[],
        )
        .await;
        self.notify_quiet(
            request.requester_id,
            "A volunteer is looking at your photo now.",
            &[],
        )
        .await;
        Ok(())
    }

    /// Relay the volunteer's description to the requester with feedback
    /// buttons. The request stays active until the requester reacts.
    pub async fn submit_description(
        &self,
        request_id: &str,
        volunteer_id: i64,
        description: &str,
    ) -> EngineResult<()> {
        let request = self
            .db()
            .requests()
            .find(request_id)
            .await?
            .ok_or_else(|| EngineError::RequestNotFound(request_id.to_string()))?;

        if request.assigned_volunteer_id != Some(volunteer_id) {
            return Err(EngineError::AccessDenied);
        }
        if request.status != RequestStatus::Active {
            return Err(EngineError::NotCompletable);
        }

        self.notify_quiet(
            request.requester_id,
            &format!("A volunteer describes your photo:\n{description}"),
            &[
                Action::callback("Helpful 👍", format!("photo_helpful_{request_id}")),
                Action::callback("Not helpful 👎", format!("photo_not_helpful_{request_id}")),
            ],
        )
        .await;
        self.notify_quiet(volunteer_id, "Description sent. Thank you!", &[])
            .await;

        self.db()
            .audit()
            .log(volunteer_id, "submit_description", "request", request_id, None)
            .await?;
        info!(request_id, volunteer_id, "Photo description relayed");
        Ok(())
    }

    /// Requester's verdict on the delivered description.
    ///
    /// Helpful completes the request. Not helpful permanently excludes this
    /// volunteer for this request, restarts the wave budget, and dispatches
    /// the next wave immediately.
    pub async fn photo_feedback(
        &self,
        request_id: &str,
        requester_id: i64,
        helpful: bool,
    ) -> EngineResult<()> {
        let request = self
            .db()
            .requests()
            .find(request_id)
            .await?
            .ok_or_else(|| EngineError::RequestNotFound(request_id.to_string()))?;

        if request.requester_id != requester_id {
            return Err(EngineError::AccessDenied);
        }
        let Some(volunteer_id) = request.assigned_volunteer_id else {
            return Err(EngineError::NotCompletable);
        };

        if helpful {
            if !self.db().requests().complete(request_id).await? {
                return Err(EngineError::NotCompletable);
            }
            self.db()
                .audit()
                .log(requester_id, "photo_helpful", "request", request_id, None)
                .await?;
            self.notify_quiet(volunteer_id, "Your description helped. Thank you!", &[])
                .await;
            info!(request_id, volunteer_id, "Photo request completed");
            return Ok(());
        }

        if !self
            .db()
            .requests()
            .reopen_with_failed_volunteer(request_id, volunteer_id)
            .await?
        {
            return Err(EngineError::NotCompletable);
        }
        // The composing state may still be pending on the volunteer side.
        self.db().conversation().clear(volunteer_id).await?;
        self.db()
            .audit()
            .log(
                requester_id,
                "photo_not_helpful",
                "request",
                request_id,
                Some(serde_json::json!({ "failed_volunteer_id": volunteer_id })),
            )
            .await?;
        info!(request_id, volunteer_id, "Photo request reopened after negative feedback");

        self.notify_quiet(
            volunteer_id,
            "The requester marked your description as not helpful. \
             The request was passed to other volunteers.",
            &[],
        )
        .await;
        self.notify_quiet(requester_id, "We are looking for another volunteer.", &[])
            .await;

        if let Some(reopened) = self.db().requests().find(request_id).await? {
            if let Err(e) = self.dispatch_wave(&reopened).await {
                warn!(request_id, error = %e, "Reopen wave failed, timer will retry");
            }
        }
        Ok(())
    }
}
