//! Photo-description workflow: relaxed eligibility, description relay,
//! feedback, and the reopen-with-failed-volunteer policy.

mod common;

use common::{FixedDescriber, harness, harness_with, seed_needy, seed_volunteer, test_tuning};
use std::sync::Arc;
use wavecall::AcceptOutcome;
use wavecall::db::{ConversationState, RequestStatus, Urgency, VerificationStatus};

const PHOTO: &str = "https://cdn.example/street.jpg";

#[tokio::test]
async fn automatic_description_arrives_when_describer_configured() {
    let (sb, platform) = harness_with(
        test_tuning(),
        Some(Arc::new(FixedDescriber("a quiet street at dusk".into()))),
    )
    .await;
    seed_needy(&sb, 1).await;

    sb.create_photo_request(1, PHOTO, Urgency::Normal).await.unwrap();
    assert!(
        platform
            .texts_for(1)
            .iter()
            .any(|t| t.contains("a quiet street at dusk"))
    );
}

#[tokio::test]
async fn helpful_description_completes_the_request() {
    let (sb, platform) = harness().await;
    seed_needy(&sb, 1).await;
    seed_volunteer(&sb, 100, VerificationStatus::Unverified).await;

    let request = sb.create_photo_request(1, PHOTO, Urgency::Normal).await.unwrap();
    assert_eq!(sb.accept(&request.id, 100).await.unwrap(), AcceptOutcome::Accepted);

    // The volunteer got the photo and a composing state
    assert!(platform.texts_for(100).iter().any(|t| t.contains(PHOTO)));
    assert_eq!(
        sb.db().conversation().take(100).await.unwrap(),
        Some(ConversationState::ComposingDescription { request_id: request.id.clone() })
    );

    sb.submit_description(&request.id, 100, "a red bus at a stop").await.unwrap();
    let relayed = platform.texts_for(1);
    assert!(relayed.iter().any(|t| t.contains("a red bus at a stop")));
    assert!(
        platform
            .payloads_for(1)
            .contains(&format!("photo_helpful_{}", request.id))
    );

    sb.photo_feedback(&request.id, 1, true).await.unwrap();
    let stored = sb.db().requests().find(&request.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RequestStatus::Completed);
}

#[tokio::test]
async fn not_helpful_reopens_and_excludes_only_the_failed_volunteer() {
    let (sb, platform) = harness().await;
    seed_needy(&sb, 1).await;
    seed_volunteer(&sb, 100, VerificationStatus::Unverified).await;
    seed_volunteer(&sb, 101, VerificationStatus::Unverified).await;

    let request = sb.create_photo_request(1, PHOTO, Urgency::Normal).await.unwrap();
    sb.accept(&request.id, 100).await.unwrap();
    sb.submit_description(&request.id, 100, "not sure, maybe a dog").await.unwrap();

    platform.clear_sent();
    sb.photo_feedback(&request.id, 1, false).await.unwrap();

    // Reopened at wave zero, assignment cleared
    let stored = sb.db().requests().find(&request.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RequestStatus::Pending);
    assert!(stored.assigned_volunteer_id.is_none());

    // The reopen wave went out immediately, skipping the failed volunteer
    let wave_payload = format!("accept_request_{}", request.id);
    assert!(platform.payloads_for(101).contains(&wave_payload));
    assert!(!platform.payloads_for(100).contains(&wave_payload));

    // The failed volunteer cannot slip back in by tapping the old button
    assert_eq!(sb.accept(&request.id, 100).await.unwrap(), AcceptOutcome::AlreadyTaken);
    // Another volunteer still can
    assert_eq!(sb.accept(&request.id, 101).await.unwrap(), AcceptOutcome::Accepted);
}

#[tokio::test]
async fn description_from_the_wrong_volunteer_is_refused() {
    let (sb, _platform) = harness().await;
    seed_needy(&sb, 1).await;
    seed_volunteer(&sb, 100, VerificationStatus::Unverified).await;
    seed_volunteer(&sb, 101, VerificationStatus::Unverified).await;

    let request = sb.create_photo_request(1, PHOTO, Urgency::Normal).await.unwrap();
    sb.accept(&request.id, 100).await.unwrap();

    let err = sb.submit_description(&request.id, 101, "drive-by answer").await.unwrap_err();
    assert!(matches!(err, wavecall::EngineError::AccessDenied));
}
