//! Room pool lifecycle: lease/release membership handling and the
//! reconciliation pass against the platform channel list.

mod common;

use common::{harness, seed_rooms};
use std::sync::atomic::Ordering;

#[tokio::test]
async fn lease_adds_members_release_removes_them() {
    let (sb, platform) = harness().await;
    seed_rooms(&sb, 2).await;

    let room = sb.lease_room("req-1", &[1, 100]).await.unwrap();
    assert!(room.is_occupied);
    assert_eq!(room.current_request_id.as_deref(), Some("req-1"));
    assert_eq!(
        platform.added_members.lock().unwrap().as_slice(),
        &[(room.channel_id, 1), (room.channel_id, 100)]
    );

    sb.release_room(&room, &[1, 100]).await.unwrap();
    assert_eq!(
        platform.removed_members.lock().unwrap().as_slice(),
        &[(room.channel_id, 1), (room.channel_id, 100)]
    );
    let freed = sb.db().rooms().find(room.id).await.unwrap().unwrap();
    assert!(!freed.is_occupied);
    assert!(freed.current_request_id.is_none());
}

#[tokio::test]
async fn release_frees_room_even_when_removal_fails() {
    let (sb, platform) = harness().await;
    seed_rooms(&sb, 1).await;

    let room = sb.lease_room("req-1", &[1, 100]).await.unwrap();
    platform.fail_removal.store(true, Ordering::Relaxed);

    sb.release_room(&room, &[1, 100]).await.unwrap();
    let freed = sb.db().rooms().find(room.id).await.unwrap().unwrap();
    assert!(!freed.is_occupied);
}

#[tokio::test]
async fn occupied_rooms_are_never_double_leased() {
    let (sb, _platform) = harness().await;
    seed_rooms(&sb, 1).await;

    sb.lease_room("req-1", &[1, 100]).await.unwrap();
    let err = sb.lease_room("req-2", &[2, 101]).await.unwrap_err();
    assert!(matches!(err, wavecall::EngineError::NoFreeRoom));

    let rooms = sb.db().rooms().all().await.unwrap();
    assert_eq!(
        rooms.iter().filter(|r| r.current_request_id.as_deref() == Some("req-1")).count(),
        1
    );
}

#[tokio::test]
async fn reconcile_inserts_newly_seen_channels() {
    let (sb, platform) = harness().await;
    platform.set_channels(vec![(500, "Support A"), (501, "Support B")]);

    sb.reconcile_rooms().await.unwrap();
    let rooms = sb.db().rooms().all().await.unwrap();
    assert_eq!(rooms.len(), 2);

    // Idempotent: a second pass adds nothing
    sb.reconcile_rooms().await.unwrap();
    assert_eq!(sb.db().rooms().all().await.unwrap().len(), 2);
}

#[tokio::test]
async fn reconcile_deletes_free_and_flags_occupied() {
    let (sb, platform) = harness().await;
    platform.set_channels(vec![(500, "Support A"), (501, "Support B")]);
    sb.reconcile_rooms().await.unwrap();

    // Occupy one room
    let claimed = sb.db().rooms().claim_free("req-1").await.unwrap().unwrap();

    // The bot drops out of both channels
    platform.set_channels(vec![]);
    sb.reconcile_rooms().await.unwrap();

    let remaining = sb.db().rooms().all().await.unwrap();
    // The free room is gone; the occupied one stays, flagged
    assert_eq!(remaining.len(), 1);
    let survivor = &remaining[0];
    assert_eq!(survivor.channel_id, claimed.channel_id);
    assert!(survivor.is_occupied);
    assert!(survivor.missing_since.is_some());

    // Seen again: rehabilitated and usable
    platform.set_channels(vec![(claimed.channel_id, "Support A")]);
    sb.db().rooms().release(survivor.id).await.unwrap();
    sb.reconcile_rooms().await.unwrap();
    let back = sb.db().rooms().find(survivor.id).await.unwrap().unwrap();
    assert!(back.missing_since.is_none());
    assert!(sb.db().rooms().claim_free("req-2").await.unwrap().is_some());
}
