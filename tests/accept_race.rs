//! Acceptance arbitration: one winner per request, ineligibility without
//! mutation, and rollback when room binding fails.

mod common;

use common::{harness, seed_needy, seed_rooms, seed_volunteer};
use std::sync::atomic::Ordering;
use wavecall::AcceptOutcome;
use wavecall::IneligibleReason;
use wavecall::db::{RequestKind, RequestStatus, Urgency, VerificationStatus};
use wavecall::error::EngineError;

#[tokio::test]
async fn exactly_one_winner() {
    let (sb, _platform) = harness().await;
    seed_needy(&sb, 1).await;
    seed_volunteer(&sb, 100, VerificationStatus::Verified).await;
    seed_volunteer(&sb, 101, VerificationStatus::Verified).await;
    seed_rooms(&sb, 1).await;

    let request = sb
        .create_request(1, RequestKind::Call, Urgency::Normal, None)
        .await
        .unwrap();

    assert_eq!(sb.accept(&request.id, 100).await.unwrap(), AcceptOutcome::Accepted);
    assert_eq!(sb.accept(&request.id, 101).await.unwrap(), AcceptOutcome::AlreadyTaken);

    let stored = sb.db().requests().find(&request.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RequestStatus::Active);
    assert_eq!(stored.assigned_volunteer_id, Some(100));
    assert!(stored.chat_room_id.is_some());
}

#[tokio::test]
async fn blocked_volunteer_is_refused_without_mutation() {
    let (sb, _platform) = harness().await;
    seed_needy(&sb, 1).await;
    seed_volunteer(&sb, 100, VerificationStatus::Verified).await;
    seed_volunteer(&sb, 101, VerificationStatus::Verified).await;
    sb.db().volunteers().block(101, "upheld complaint").await.unwrap();
    seed_rooms(&sb, 1).await;

    let request = sb
        .create_request(1, RequestKind::Call, Urgency::Normal, None)
        .await
        .unwrap();

    assert_eq!(
        sb.accept(&request.id, 101).await.unwrap(),
        AcceptOutcome::Ineligible(IneligibleReason::Blocked)
    );

    // Nothing moved and nothing was audited for the refusal
    let stored = sb.db().requests().find(&request.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RequestStatus::Pending);
    let entries = sb.db().audit().for_target("request", &request.id).await.unwrap();
    assert!(entries.iter().all(|e| e.action != "accept_request"));
}

#[tokio::test]
async fn call_requires_verification_photo_does_not() {
    let (sb, _platform) = harness().await;
    seed_needy(&sb, 1).await;
    seed_volunteer(&sb, 100, VerificationStatus::Unverified).await;
    seed_rooms(&sb, 1).await;

    let call = sb
        .create_request(1, RequestKind::Call, Urgency::Normal, None)
        .await
        .unwrap();
    assert_eq!(
        sb.accept(&call.id, 100).await.unwrap(),
        AcceptOutcome::Ineligible(IneligibleReason::NotVerified)
    );

    let photo = sb
        .create_photo_request(1, "https://cdn.example/p.jpg", Urgency::Normal)
        .await
        .unwrap();
    assert_eq!(sb.accept(&photo.id, 100).await.unwrap(), AcceptOutcome::Accepted);
}

#[tokio::test]
async fn busy_volunteer_cannot_hold_two_requests() {
    let (sb, _platform) = harness().await;
    seed_needy(&sb, 1).await;
    seed_needy(&sb, 2).await;
    seed_volunteer(&sb, 100, VerificationStatus::Verified).await;
    seed_rooms(&sb, 2).await;

    let first = sb
        .create_request(1, RequestKind::Call, Urgency::Normal, None)
        .await
        .unwrap();
    let second = sb
        .create_request(2, RequestKind::Call, Urgency::Normal, None)
        .await
        .unwrap();

    assert_eq!(sb.accept(&first.id, 100).await.unwrap(), AcceptOutcome::Accepted);
    assert_eq!(
        sb.accept(&second.id, 100).await.unwrap(),
        AcceptOutcome::Ineligible(IneligibleReason::Busy)
    );
}

#[tokio::test]
async fn membership_failure_rolls_acceptance_back() {
    let (sb, platform) = harness().await;
    seed_needy(&sb, 1).await;
    seed_volunteer(&sb, 100, VerificationStatus::Verified).await;
    seed_rooms(&sb, 1).await;
    platform.fail_membership.store(true, Ordering::Relaxed);

    let request = sb
        .create_request(1, RequestKind::Call, Urgency::Normal, None)
        .await
        .unwrap();

    let err = sb.accept(&request.id, 100).await.unwrap_err();
    assert!(matches!(err, EngineError::MembershipFailed));

    // Request is pending again, room back in the pool
    let stored = sb.db().requests().find(&request.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RequestStatus::Pending);
    assert!(stored.assigned_volunteer_id.is_none());
    let rooms = sb.db().rooms().all().await.unwrap();
    assert!(rooms.iter().all(|r| !r.is_occupied));

    // Both parties were told
    assert!(!platform.texts_for(100).is_empty());
    assert!(platform.texts_for(1).iter().any(|t| t.contains("still being dispatched")));

    // The volunteer may retry once the platform recovers
    platform.fail_membership.store(false, Ordering::Relaxed);
    assert_eq!(sb.accept(&request.id, 100).await.unwrap(), AcceptOutcome::Accepted);
}

#[tokio::test]
async fn empty_pool_surfaces_no_free_room() {
    let (sb, _platform) = harness().await;
    seed_needy(&sb, 1).await;
    seed_volunteer(&sb, 100, VerificationStatus::Verified).await;

    let request = sb
        .create_request(1, RequestKind::Call, Urgency::Normal, None)
        .await
        .unwrap();

    let err = sb.accept(&request.id, 100).await.unwrap_err();
    assert!(matches!(err, EngineError::NoFreeRoom));

    let stored = sb.db().requests().find(&request.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RequestStatus::Pending);
}

#[tokio::test]
async fn unknown_request_is_an_error() {
    let (sb, _platform) = harness().await;
    seed_volunteer(&sb, 100, VerificationStatus::Verified).await;

    let err = sb.accept("no-such-request", 100).await.unwrap_err();
    assert!(matches!(err, EngineError::RequestNotFound(_)));
}
