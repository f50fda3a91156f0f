//! Acceptance arbitration: at most one volunteer wins a request.
//!
//! Ineligibility is decided by a read-only pre-check and mutates nothing.
//! The race itself is decided by the guarded UPDATE in the request store;
//! losing it is an ordinary outcome, not an error. For call requests the
//! room lease rides on acceptance: if the lease fails the assignment is
//! rolled back and the request re-enters the wave cycle.

use super::Switchboard;
use crate::db::{RequestKind, RequestStatus, Role};
use crate::error::{AcceptOutcome, EngineError, EngineResult, IneligibleReason};
use crate::metrics;
use crate::platform::Action;
use tracing::{info, warn};

impl Switchboard {
    /// A volunteer tries to take a request.
    pub async fn accept(&self, request_id: &str, volunteer_id: i64) -> EngineResult<AcceptOutcome> {
        let request = self
            .db()
            .requests()
            .find(request_id)
            .await?
            .ok_or_else(|| EngineError::RequestNotFound(request_id.to_string()))?;

        if request.status != RequestStatus::Pending || request.is_exhausted() {
            metrics::record_accept_outcome("already_taken");
            return Ok(AcceptOutcome::AlreadyTaken);
        }

        if let Some(reason) = self.ineligible_reason(volunteer_id, request.kind).await? {
            metrics::record_accept_outcome("ineligible");
            info!(
                request_id,
                volunteer_id,
                reason = reason.as_str(),
                "Accept refused, volunteer ineligible"
            );
            return Ok(AcceptOutcome::Ineligible(reason));
        }

        // The atomic step. Everything before this was advisory.
        if !self.db().requests().try_assign(request_id, volunteer_id).await? {
            metrics::record_accept_outcome("already_taken");
            info!(request_id, volunteer_id, "Accept lost the race");
            return Ok(AcceptOutcome::AlreadyTaken);
        }

        match request.kind {
            RequestKind::Call => {
                let participants = [request.requester_id, volunteer_id];
                let room = match self.lease_room(request_id, &participants).await {
                    Ok(room) => room,
                    Err(e) => {
                        // Roll the assignment back so waves can continue.
                        self.db().requests().unassign(request_id, volunteer_id).await?;
                        warn!(
                            request_id,
                            volunteer_id,
                            error = %e,
                            "Room binding failed, acceptance rolled back"
                        );
                        self.notify_quiet(
                            volunteer_id,
                            e.user_message()
                                .unwrap_or("Could not set up the support room. Please try again."),
                            &[],
                        )
                        .await;
                        self.notify_quiet(
                            request.requester_id,
                            "We found a volunteer but could not open a room. \
                             Your request is still being dispatched.",
                            &[],
                        )
                        .await;
                        return Err(e);
                    }
                };
                self.db().requests().set_chat_room(request_id, Some(room.id)).await?;

                self.notify_quiet(
                    request.requester_id,
                    &format!(
                        "A volunteer accepted your request! Join \"{}\" to talk.",
                        room.title
                    ),
                    &[],
                )
                .await;
                self.notify_quiet(
                    volunteer_id,
                    &format!(
                        "You took the request. Meet the person in \"{}\".",
                        room.title
                    ),
                    &[Action::callback(
                        "Finish",
                        format!("complete_request_{request_id}"),
                    )],
                )
                .await;
            }
            RequestKind::Photo => {
                self.start_photo_session(&request, volunteer_id).await?;
            }
        }

        self.db()
            .audit()
            .log(volunteer_id, "accept_request", "request", request_id, None)
            .await?;
        metrics::record_accept_outcome("accepted");
        info!(request_id, volunteer_id, "Request accepted");
        Ok(AcceptOutcome::Accepted)
    }

    /// Read-only eligibility pre-check. `None` means the volunteer may try.
    async fn ineligible_reason(
        &self,
        volunteer_id: i64,
        kind: RequestKind,
    ) -> EngineResult<Option<IneligibleReason>> {
        let Some(user) = self.db().users().find(volunteer_id).await? else {
            return Ok(Some(IneligibleReason::NotVolunteer));
        };
        if user.role != Role::Volunteer {
            return Ok(Some(IneligibleReason::NotVolunteer));
        }
        let Some(volunteer) = self.db().volunteers().find(volunteer_id).await? else {
            return Ok(Some(IneligibleReason::NotVolunteer));
        };
        if volunteer.is_blocked {
            return Ok(Some(IneligibleReason::Blocked));
        }
        if kind == RequestKind::Call && !volunteer.verification_status.can_take_calls() {
            return Ok(Some(IneligibleReason::NotVerified));
        }
        if self.db().volunteers().has_active_request(volunteer_id).await? {
            return Ok(Some(IneligibleReason::Busy));
        }
        Ok(None)
    }
}
