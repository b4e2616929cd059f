use std::collections::{BTreeMap, HashSet};

use crate::model::*;

use super::overlap::{is_available, validate_range, validate_window};
use super::{Engine, EngineError, MAX_LOCK_ATTEMPTS};

impl Engine {
    pub async fn get(&self, id: ReservationId) -> Result<Reservation, EngineError> {
        for _ in 0..MAX_LOCK_ATTEMPTS {
            let room_id = self
                .room_of(&id)
                .ok_or(EngineError::ReservationNotFound(id))?;
            let Some(rs) = self.room(&room_id) else { continue };
            let guard = rs.read().await;
            if let Some(r) = guard.get(id) {
                return Ok(r.clone());
            }
        }
        Err(EngineError::ReservationNotFound(id))
    }

    /// Whether `[start, end)` on `room_id` is free of active reservations,
    /// ignoring `exclude`. Reads committed state only; a later write may
    /// still be rejected.
    pub async fn is_available(
        &self,
        room_id: RoomId,
        start: Ms,
        end: Ms,
        exclude: Option<ReservationId>,
    ) -> Result<bool, EngineError> {
        let span = validate_range(start, end)?;
        let Some(rs) = self.room(&room_id) else {
            return Ok(true);
        };
        let guard = rs.read().await;
        Ok(is_available(&guard, &span, exclude))
    }

    /// Clone every reservation matching `keep`, reading only `room_id` when given.
    async fn collect(
        &self,
        room_id: Option<RoomId>,
        keep: impl Fn(&Reservation) -> bool,
    ) -> Vec<Reservation> {
        let rooms = match room_id {
            Some(id) => self.room(&id).into_iter().collect(),
            None => self.all_rooms(),
        };
        let mut out = Vec::new();
        for rs in rooms {
            let guard = rs.read().await;
            out.extend(guard.reservations.iter().filter(|r| keep(r)).cloned());
        }
        out
    }

    /// Newest first. `page` is 1-based; callers clamp `page` and `page_size`.
    pub async fn list(&self, filter: &ReservationFilter, page: usize, page_size: usize) -> Page {
        let mut items = self.collect(filter.room_id, |r| filter.matches(r)).await;
        items.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        let total = items.len();
        let skip = page.saturating_sub(1).saturating_mul(page_size);
        let items = items.into_iter().skip(skip).take(page_size).collect();
        Page { items, total }
    }

    /// Reservations per status, optionally restricted to those intersecting `window`.
    pub async fn status_counts(
        &self,
        window: Option<Span>,
    ) -> Result<BTreeMap<ReservationStatus, usize>, EngineError> {
        if let Some(w) = &window {
            validate_window(w)?;
        }
        let mut counts: BTreeMap<ReservationStatus, usize> =
            ReservationStatus::ALL.iter().map(|s| (*s, 0)).collect();
        for r in self
            .collect(None, |r| window.is_none_or(|w| w.overlaps(&r.span)))
            .await
        {
            *counts.entry(r.status).or_default() += 1;
        }
        Ok(counts)
    }

    pub async fn count_reservations(
        &self,
        status: Option<ReservationStatus>,
        window: Option<Span>,
    ) -> Result<usize, EngineError> {
        if let Some(w) = &window {
            validate_window(w)?;
        }
        Ok(self
            .collect(None, |r| {
                status.is_none_or(|s| s == r.status)
                    && window.is_none_or(|w| w.overlaps(&r.span))
            })
            .await
            .len())
    }

    /// Active reservations whose stay contains `now`.
    pub async fn active_at(&self, now: Ms) -> Vec<Reservation> {
        self.collect(None, |r| r.is_active() && r.span.contains_instant(now))
            .await
    }

    pub async fn occupancy(&self, now: Ms) -> Occupancy {
        let active = self.active_at(now).await;
        let rooms: HashSet<RoomId> = active.iter().map(|r| r.room_id).collect();
        Occupancy {
            rooms_occupied: rooms.len(),
            active_reservations: active.len(),
        }
    }
}
