//! Verification and complaint workflows.
//!
//! Both are moderator-gated state machines that end in a one-way eligibility
//! mutation. New cases fan out to every moderator; resolutions notify the
//! affected volunteer. Resolving an already-resolved case is refused, so a
//! double-tap on a moderator button changes nothing.

use crate::db::Role;
use crate::dispatch::Switchboard;
use crate::error::{EngineError, EngineResult};
use crate::platform::Action;
use tracing::info;

impl Switchboard {
    // =========================================================================
    // Verification
    // =========================================================================

    /// A volunteer submits documents for verification. One pending request
    /// per volunteer; duplicates are refused without touching anything.
    pub async fn submit_verification(
        &self,
        volunteer_id: i64,
        document_urls: &[String],
        comment: Option<&str>,
    ) -> EngineResult<i64> {
        let user = self
            .db()
            .users()
            .find(volunteer_id)
            .await?
            .ok_or(EngineError::UserNotFound(volunteer_id))?;
        if user.role != Role::Volunteer {
            return Err(EngineError::AccessDenied);
        }

        let Some(verification_id) = self
            .db()
            .moderation()
            .create_verification(volunteer_id, document_urls, comment)
            .await?
        else {
            return Err(EngineError::DuplicateVerification);
        };

        self.db()
            .audit()
            .log(
                volunteer_id,
                "submit_verification",
                "verification",
                &verification_id.to_string(),
                Some(serde_json::json!({ "documents": document_urls.len() })),
            )
            .await?;
        info!(volunteer_id, verification_id, "Verification request filed");

        let mut text = format!(
            "Verification request #{verification_id} from {} (id {volunteer_id}), \
             {} document(s).",
            user.name,
            document_urls.len()
        );
        if let Some(comment) = comment {
            text.push_str(&format!("\nComment: {comment}"));
        }
        self.notify_moderators(
            &text,
            &[
                Action::callback("Approve", format!("verify_approve_{verification_id}")),
                Action::callback("Reject", format!("verify_reject_{verification_id}")),
            ],
        )
        .await?;

        self.notify_quiet(
            volunteer_id,
            "Your documents were sent for review. We will let you know the outcome.",
            &[],
        )
        .await;
        Ok(verification_id)
    }

    /// Moderator resolves a verification request. Approval promotes the
    /// volunteer to verified; rejection resets to unverified so they may
    /// resubmit.
    pub async fn resolve_verification(
        &self,
        verification_id: i64,
        moderator_id: i64,
        approve: bool,
        note: Option<&str>,
    ) -> EngineResult<()> {
        self.require_moderator(moderator_id).await?;

        let Some(volunteer_id) = self
            .db()
            .moderation()
            .resolve_verification(verification_id, moderator_id, approve, note)
            .await?
        else {
            return Err(EngineError::AlreadyResolved);
        };

        self.db()
            .audit()
            .log(
                moderator_id,
                if approve { "approve_verification" } else { "reject_verification" },
                "verification",
                &verification_id.to_string(),
                None,
            )
            .await?;
        info!(verification_id, moderator_id, volunteer_id, approve, "Verification resolved");

        let text = if approve {
            "You are now a verified volunteer. You will receive call requests.".to_string()
        } else {
            let mut t = "Your verification was declined. You may submit new documents."
                .to_string();
            if let Some(note) = note {
                t.push_str(&format!("\nReason: {note}"));
            }
            t
        };
        self.notify_quiet(volunteer_id, &text, &[]).await;
        Ok(())
    }

    // =========================================================================
    // Complaints
    // =========================================================================

    /// The requester files a complaint about the volunteer who handled their
    /// request.
    pub async fn file_complaint(
        &self,
        request_id: &str,
        complainant_id: i64,
        reason: &str,
    ) -> EngineResult<i64> {
        let request = self
            .db()
            .requests()
            .find(request_id)
            .await?
            .ok_or_else(|| EngineError::RequestNotFound(request_id.to_string()))?;
        if request.requester_id != complainant_id {
            return Err(EngineError::AccessDenied);
        }
        let Some(accused_id) = request.assigned_volunteer_id else {
            return Err(EngineError::RequestNotFound(request_id.to_string()));
        };

        let complaint_id = self
            .db()
            .moderation()
            .create_complaint(request_id, complainant_id, accused_id, reason)
            .await?;

        self.db()
            .audit()
            .log(
                complainant_id,
                "file_complaint",
                "complaint",
                &complaint_id.to_string(),
                Some(serde_json::json!({ "request_id": request_id })),
            )
            .await?;
        info!(complaint_id, request_id, complainant_id, accused_id, "Complaint filed");

        self.notify_moderators(
            &format!(
                "Complaint #{complaint_id} about volunteer {accused_id} \
                 (request {request_id}):\n{reason}"
            ),
            &[
                Action::callback("Block volunteer", format!("complaint_block_{complaint_id}")),
                Action::callback("Dismiss", format!("complaint_dismiss_{complaint_id}")),
            ],
        )
        .await?;

        self.notify_quiet(
            complainant_id,
            "Your complaint was passed to the moderators. Thank you.",
            &[],
        )
        .await;
        Ok(complaint_id)
    }

    /// Moderator resolves a complaint. Blocking removes the volunteer from
    /// candidacy until manually unblocked; dismissal changes nothing beyond
    /// the complaint record.
    pub async fn resolve_complaint(
        &self,
        complaint_id: i64,
        moderator_id: i64,
        block: bool,
        note: &str,
    ) -> EngineResult<()> {
        self.require_moderator(moderator_id).await?;

        let Some(accused_id) = self
            .db()
            .moderation()
            .resolve_complaint(complaint_id, moderator_id, block, note)
            .await?
        else {
            return Err(EngineError::AlreadyResolved);
        };

        self.db()
            .audit()
            .log(
                moderator_id,
                if block { "block_volunteer" } else { "dismiss_complaint" },
                "complaint",
                &complaint_id.to_string(),
                None,
            )
            .await?;
        info!(complaint_id, moderator_id, accused_id, block, "Complaint resolved");

        if block {
            self.notify_quiet(
                accused_id,
                "Following a complaint you were blocked and will no longer \
                 receive requests.",
                &[],
            )
            .await;
        }
        Ok(())
    }

    /// Manual unblock, moderator only.
    pub async fn unblock_volunteer(
        &self,
        volunteer_id: i64,
        moderator_id: i64,
    ) -> EngineResult<()> {
        self.require_moderator(moderator_id).await?;
        self.db().volunteers().unblock(volunteer_id).await?;
        self.db()
            .audit()
            .log(
                moderator_id,
                "unblock_volunteer",
                "user",
                &volunteer_id.to_string(),
                None,
            )
            .await?;
        info!(volunteer_id, moderator_id, "Volunteer unblocked");
        self.notify_quiet(volunteer_id, "You were unblocked and may help again.", &[])
            .await;
        Ok(())
    }

    async fn require_moderator(&self, user_id: i64) -> EngineResult<()> {
        match self.db().users().find(user_id).await? {
            Some(user) if user.role == Role::Moderator => Ok(()),
            _ => Err(EngineError::AccessDenied),
        }
    }

    /// Fan a notification out to every moderator; per-recipient failures are
    /// logged and do not stop the fan-out.
    async fn notify_moderators(&self, text: &str, actions: &[Action]) -> EngineResult<()> {
        let moderators = self.db().users().find_by_role(Role::Moderator).await?;
        for moderator in &moderators {
            self.notify_quiet(moderator.id, text, actions).await;
        }
        Ok(())
    }
}
