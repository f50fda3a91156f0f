//! Unified error handling for wavecall.
//!
//! This module provides the error hierarchy for the dispatch engine, with
//! automatic conversions, user-facing message generation, and metric labeling.

use thiserror::Error;

use crate::db::DbError;
use crate::platform::PlatformError;

/// Why a volunteer cannot take a request right now.
///
/// Ineligibility is decided before any state mutation; the volunteer always
/// gets a human-readable explanation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IneligibleReason {
    /// Volunteer is blocked following a complaint resolution.
    Blocked,
    /// Call requests require a verified or trusted volunteer.
    NotVerified,
    /// Volunteer already holds an active request.
    Busy,
    /// The caller is not registered as a volunteer at all.
    NotVolunteer,
}

impl IneligibleReason {
    /// Static label for metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blocked => "blocked",
            Self::NotVerified => "not_verified",
            Self::Busy => "busy",
            Self::NotVolunteer => "not_volunteer",
        }
    }

    /// Explanation shown to the volunteer.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Blocked => "You are blocked and cannot take requests.",
            Self::NotVerified => "Only verified volunteers can take call requests.",
            Self::Busy => "You already have an active request. Finish it first.",
            Self::NotVolunteer => "Only volunteers can take requests.",
        }
    }
}

/// Outcome of an accept attempt.
///
/// Losing the race is expected under concurrency and is not an error: the
/// loser is told "already taken", nothing more.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptOutcome {
    /// This volunteer won the request.
    Accepted,
    /// Another volunteer got there first (or the request expired).
    AlreadyTaken,
    /// Rejected before any state mutation.
    Ineligible(IneligibleReason),
}

/// Errors raised by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("request not found: {0}")]
    RequestNotFound(String),

    #[error("user not found: {0}")]
    UserNotFound(i64),

    #[error("request cannot be cancelled")]
    NotCancellable,

    #[error("request cannot be completed")]
    NotCompletable,

    #[error("a verification request is already pending")]
    DuplicateVerification,

    #[error("workflow record already resolved")]
    AlreadyResolved,

    #[error("no free chat room available")]
    NoFreeRoom,

    #[error("could not add participants to chat room")]
    MembershipFailed,

    #[error("access denied")]
    AccessDenied,

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Platform(#[from] PlatformError),
}

impl EngineError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::RequestNotFound(_) => "request_not_found",
            Self::UserNotFound(_) => "user_not_found",
            Self::NotCancellable => "not_cancellable",
            Self::NotCompletable => "not_completable",
            Self::DuplicateVerification => "duplicate_verification",
            Self::AlreadyResolved => "already_resolved",
            Self::NoFreeRoom => "no_free_room",
            Self::MembershipFailed => "membership_failed",
            Self::AccessDenied => "access_denied",
            Self::Db(_) => "db_error",
            Self::Platform(_) => "platform_error",
        }
    }

    /// Message shown to the actor, if the failure warrants one.
    ///
    /// Data-layer and platform failures stay internal; the actor gets a
    /// generic apology from the router instead.
    pub fn user_message(&self) -> Option<&'static str> {
        match self {
            Self::RequestNotFound(_) => Some("Request not found or already handled."),
            Self::NotCancellable => {
                Some("This request can no longer be cancelled. Use \"finish\" instead.")
            }
            Self::NotCompletable => Some("This request is not active."),
            Self::DuplicateVerification => {
                Some("You already have a verification request under review.")
            }
            Self::AlreadyResolved => Some("This case has already been handled."),
            Self::NoFreeRoom => {
                Some("All support rooms are busy right now. Please try again shortly.")
            }
            Self::MembershipFailed => {
                Some("Could not add you to the support room. Please try again.")
            }
            Self::AccessDenied => Some("You do not have access to this action."),
            Self::UserNotFound(_) | Self::Db(_) | Self::Platform(_) => None,
        }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
