//! Chat room pool: leasing, release, and platform reconciliation.
//!
//! Rooms are pre-provisioned group channels the bot is a member of. A lease
//! claims one free room atomically and adds both participants to the
//! channel; membership failure aborts the lease and the room returns to the
//! pool. Release is the mirror image with best-effort member removal. A
//! periodic reconciliation pass keeps the pool aligned with the platform's
//! channel list.

use crate::db::RoomRecord;
use crate::dispatch::Switchboard;
use crate::error::{EngineError, EngineResult};
use crate::metrics;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Attempts made to claim a free room before giving up on a transient
/// data-layer failure.
const CLAIM_ATTEMPTS: u32 = 3;

impl Switchboard {
    /// Lease a free room for a request and add the participants to its
    /// channel. Membership failure aborts: the room is released and the
    /// error surfaced, no silent retry.
    pub async fn lease_room(
        &self,
        request_id: &str,
        participant_ids: &[i64],
    ) -> EngineResult<RoomRecord> {
        let mut last_err = None;
        let mut claimed = None;
        for attempt in 1..=CLAIM_ATTEMPTS {
            match self.db().rooms().claim_free(request_id).await {
                Ok(room) => {
                    claimed = room;
                    break;
                }
                Err(e) => {
                    warn!(request_id, attempt, error = %e, "Room claim attempt failed");
                    last_err = Some(e);
                }
            }
        }
        let room = match (claimed, last_err) {
            (Some(room), _) => room,
            (None, Some(e)) => return Err(e.into()),
            (None, None) => return Err(EngineError::NoFreeRoom),
        };

        if let Err(e) = self
            .membership()
            .add_members(room.channel_id, participant_ids)
            .await
        {
            warn!(
                request_id,
                room_id = room.id,
                channel_id = room.channel_id,
                error = %e,
                "Adding participants failed, lease aborted"
            );
            self.db().rooms().release(room.id).await?;
            self.refresh_room_gauges().await;
            return Err(EngineError::MembershipFailed);
        }

        self.refresh_room_gauges().await;
        info!(
            request_id,
            room_id = room.id,
            channel_id = room.channel_id,
            "Room leased"
        );
        Ok(room)
    }

    /// Return a room to the pool. Member removal is best-effort: the room is
    /// freed regardless of the removal outcome.
    pub async fn release_room(
        &self,
        room: &RoomRecord,
        participant_ids: &[i64],
    ) -> EngineResult<()> {
        if let Err(e) = self
            .membership()
            .remove_members(room.channel_id, participant_ids)
            .await
        {
            warn!(
                room_id = room.id,
                channel_id = room.channel_id,
                error = %e,
                "Removing participants failed, releasing room anyway"
            );
        }

        self.db().rooms().release(room.id).await?;
        self.refresh_room_gauges().await;
        info!(room_id = room.id, channel_id = room.channel_id, "Room released");
        Ok(())
    }

    /// Reconcile the pool against the platform channel list.
    ///
    /// Newly-seen channels become pool entries (dedup by external id, a
    /// previously-missing room is rehabilitated); channels the bot left are
    /// deleted while free and flagged while occupied. Flagged rooms carry an
    /// active session, so they are warned about, never dropped.
    pub async fn reconcile_rooms(&self) -> EngineResult<()> {
        let channels = self.membership().list_channels().await?;
        let seen: HashSet<i64> = channels.iter().map(|c| c.channel_id).collect();

        let mut inserted = 0usize;
        for channel in &channels {
            let title = channel.title.as_deref().unwrap_or("Support room");
            if self.db().rooms().upsert_channel(channel.channel_id, title).await? {
                inserted += 1;
            }
        }

        let mut removed = 0usize;
        for room in self.db().rooms().all().await? {
            if seen.contains(&room.channel_id) {
                continue;
            }
            if self.db().rooms().delete_if_free(room.channel_id).await? {
                removed += 1;
            } else if let Some(request_id) =
                self.db().rooms().flag_missing(room.channel_id).await?
            {
                warn!(
                    room_id = room.id,
                    channel_id = room.channel_id,
                    request_id = %request_id,
                    "Bot lost an occupied room; flagged, session kept"
                );
            }
        }

        let (free, occupied) = self.db().rooms().occupancy_counts().await?;
        metrics::set_room_occupancy(free, occupied);
        info!(
            channels = channels.len(),
            inserted, removed, free, occupied, "Room pool reconciled"
        );
        Ok(())
    }

    async fn refresh_room_gauges(&self) {
        match self.db().rooms().occupancy_counts().await {
            Ok((free, occupied)) => metrics::set_room_occupancy(free, occupied),
            Err(e) => warn!(error = %e, "Room occupancy count failed"),
        }
    }
}

/// Background reconciliation task. Runs an initial pass immediately so the
/// pool is populated before the first acceptance.
pub async fn run_room_reconciler(switchboard: Arc<Switchboard>, interval_secs: u64) {
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    info!(interval_secs, "Room reconciler started");

    loop {
        ticker.tick().await;
        if let Err(e) = switchboard.reconcile_rooms().await {
            metrics::record_operation_error("reconcile_rooms", e.error_code());
            error!(error = %e, "Room reconciliation failed");
        }
    }
}
