//! Verification and complaint workflows end to end: moderator fan-out,
//! eligibility mutation, and single-shot resolutions.

mod common;

use common::{harness, seed_moderator, seed_needy, seed_rooms, seed_volunteer};
use wavecall::AcceptOutcome;
use wavecall::db::{RequestKind, Urgency, VerificationStatus};
use wavecall::error::EngineError;

#[tokio::test]
async fn verification_approval_promotes_volunteer() {
    let (sb, platform) = harness().await;
    seed_volunteer(&sb, 100, VerificationStatus::Unverified).await;
    seed_moderator(&sb, 900).await;
    seed_moderator(&sb, 901).await;

    let verification_id = sb
        .submit_verification(100, &["https://cdn.example/doc.jpg".into()], Some("my documents"))
        .await
        .unwrap();

    // Every moderator got the case with both resolution buttons
    for moderator in [900, 901] {
        let payloads = platform.payloads_for(moderator);
        assert!(payloads.contains(&format!("verify_approve_{verification_id}")));
        assert!(payloads.contains(&format!("verify_reject_{verification_id}")));
    }

    // The case sits in the moderation queue until someone resolves it
    let queue = sb.db().moderation().pending_verifications().await.unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].id, verification_id);
    assert_eq!(queue[0].document_urls, vec!["https://cdn.example/doc.jpg"]);

    // A second submission while one is pending is refused
    let err = sb.submit_verification(100, &[], None).await.unwrap_err();
    assert!(matches!(err, EngineError::DuplicateVerification));

    sb.resolve_verification(verification_id, 900, true, None).await.unwrap();
    assert!(sb.db().moderation().pending_verifications().await.unwrap().is_empty());
    let volunteer = sb.db().volunteers().find(100).await.unwrap().unwrap();
    assert!(volunteer.verification_status.can_take_calls());
    assert!(platform.texts_for(100).iter().any(|t| t.contains("verified volunteer")));

    // The second moderator's button is now a no-op
    let err = sb.resolve_verification(verification_id, 901, false, None).await.unwrap_err();
    assert!(matches!(err, EngineError::AlreadyResolved));
}

#[tokio::test]
async fn rejection_allows_resubmission() {
    let (sb, platform) = harness().await;
    seed_volunteer(&sb, 100, VerificationStatus::Unverified).await;
    seed_moderator(&sb, 900).await;

    let id = sb.submit_verification(100, &[], None).await.unwrap();
    sb.resolve_verification(id, 900, false, Some("documents unreadable"))
        .await
        .unwrap();

    let volunteer = sb.db().volunteers().find(100).await.unwrap().unwrap();
    assert_eq!(volunteer.verification_status, VerificationStatus::Unverified);
    assert!(
        platform
            .texts_for(100)
            .iter()
            .any(|t| t.contains("documents unreadable"))
    );

    assert!(sb.submit_verification(100, &[], None).await.is_ok());
}

#[tokio::test]
async fn only_moderators_resolve() {
    let (sb, _platform) = harness().await;
    seed_volunteer(&sb, 100, VerificationStatus::Unverified).await;
    seed_volunteer(&sb, 101, VerificationStatus::Verified).await;

    let id = sb.submit_verification(100, &[], None).await.unwrap();
    let err = sb.resolve_verification(id, 101, true, None).await.unwrap_err();
    assert!(matches!(err, EngineError::AccessDenied));
}

#[tokio::test]
async fn upheld_complaint_blocks_and_removes_from_candidacy() {
    let (sb, platform) = harness().await;
    seed_needy(&sb, 1).await;
    seed_volunteer(&sb, 100, VerificationStatus::Verified).await;
    seed_moderator(&sb, 900).await;
    seed_rooms(&sb, 1).await;

    let request = sb
        .create_request(1, RequestKind::Call, Urgency::Normal, None)
        .await
        .unwrap();
    assert_eq!(sb.accept(&request.id, 100).await.unwrap(), AcceptOutcome::Accepted);
    sb.complete_request(&request.id, 1).await.unwrap();

    let complaint_id = sb
        .file_complaint(&request.id, 1, "was rude on the call")
        .await
        .unwrap();
    assert!(
        platform
            .payloads_for(900)
            .contains(&format!("complaint_block_{complaint_id}"))
    );

    sb.resolve_complaint(complaint_id, 900, true, "Complaint upheld").await.unwrap();
    let volunteer = sb.db().volunteers().find(100).await.unwrap().unwrap();
    assert!(volunteer.is_blocked);
    assert!(platform.texts_for(100).iter().any(|t| t.contains("blocked")));

    // Blocked volunteers never appear in later waves
    seed_needy(&sb, 2).await;
    platform.clear_sent();
    sb.create_request(2, RequestKind::Call, Urgency::Normal, None).await.unwrap();
    assert!(platform.texts_for(100).is_empty());

    // Manual unblock restores candidacy
    sb.unblock_volunteer(100, 900).await.unwrap();
    assert!(!sb.db().volunteers().find(100).await.unwrap().unwrap().is_blocked);
}

#[tokio::test]
async fn only_the_requester_may_complain() {
    let (sb, _platform) = harness().await;
    seed_needy(&sb, 1).await;
    seed_volunteer(&sb, 100, VerificationStatus::Verified).await;
    seed_rooms(&sb, 1).await;

    let request = sb
        .create_request(1, RequestKind::Call, Urgency::Normal, None)
        .await
        .unwrap();
    sb.accept(&request.id, 100).await.unwrap();

    let err = sb.file_complaint(&request.id, 100, "self-report").await.unwrap_err();
    assert!(matches!(err, EngineError::AccessDenied));
}
