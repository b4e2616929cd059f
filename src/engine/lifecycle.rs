use std::time::Instant;

use tracing::{debug, info};

use crate::auth::{Claims, Role};
use crate::limits::*;
use crate::model::*;
use crate::observability::observe;

use super::overlap::{check_no_conflict, now_ms, validate_range};
use super::{Engine, EngineError, MAX_LOCK_ATTEMPTS};

/// Who may drive a status transition.
#[derive(Clone, Copy)]
enum Access {
    OwnerOrStaff,
    Staff,
}

impl Engine {
    /// Place a new reservation. Starts `pending` unless an admin supplies
    /// another active initial status.
    pub async fn create(&self, claims: &Claims, req: NewReservation) -> Result<Reservation, EngineError> {
        let started = Instant::now();
        let result = self.create_inner(claims, req).await;
        observe("create", started, &result);
        result
    }

    async fn create_inner(&self, claims: &Claims, req: NewReservation) -> Result<Reservation, EngineError> {
        let span = validate_range(req.start, req.end)?;
        if !self.directory.room_exists(req.room_id).await? {
            return Err(EngineError::RoomNotFound(req.room_id));
        }
        if req.subject != claims.subject {
            claims.require(Role::Staff, "reserve for another subject")?;
        }
        let status = match req.initial_status {
            None | Some(ReservationStatus::Pending) => ReservationStatus::Pending,
            Some(status) => {
                claims.require(Role::Admin, "override the initial status")?;
                if status.is_terminal() {
                    return Err(EngineError::InvalidInitialStatus(status));
                }
                status
            }
        };
        if let Some(ref p) = req.payment_ref
            && p.len() > MAX_PAYMENT_REF_LEN {
                return Err(EngineError::LimitExceeded("payment reference too long"));
            }

        let permit = self.commit_permit().await;
        let guard = self.lock_room(req.room_id).await;
        if guard.reservations.len() >= MAX_RESERVATIONS_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many reservations on room"));
        }
        if let Err(e) = check_no_conflict(&guard, &span, None) {
            debug!("create on room {} for {span} rejected: {e}", req.room_id);
            return Err(e);
        }

        let id = self.next_id();
        let created_at = id.timestamp_ms() as Ms;
        let reservation = Reservation {
            id,
            room_id: req.room_id,
            subject: req.subject,
            span,
            status,
            payment_ref: req.payment_ref,
            created_at,
            updated_at: created_at,
        };
        self.commit(
            permit,
            vec![guard],
            Event::ReservationCreated {
                reservation: reservation.clone(),
            },
        )
        .await?;
        info!("reservation {id} created on room {} for {span} ({status})", reservation.room_id);
        Ok(reservation)
    }

    /// Move a reservation in time and/or to another room.
    pub async fn reschedule(
        &self,
        claims: &Claims,
        id: ReservationId,
        change: Reschedule,
    ) -> Result<Reservation, EngineError> {
        let started = Instant::now();
        let result = self.reschedule_inner(claims, id, change).await;
        observe("reschedule", started, &result);
        result
    }

    async fn reschedule_inner(
        &self,
        claims: &Claims,
        id: ReservationId,
        change: Reschedule,
    ) -> Result<Reservation, EngineError> {
        if let (Some(start), Some(end)) = (change.start, change.end) {
            validate_range(start, end)?;
        }
        if self.room_of(&id).is_none() {
            return Err(EngineError::ReservationNotFound(id));
        }
        if let Some(target) = change.room_id
            && !self.directory.room_exists(target).await? {
                return Err(EngineError::RoomNotFound(target));
            }

        for _ in 0..MAX_LOCK_ATTEMPTS {
            let from = self
                .room_of(&id)
                .ok_or(EngineError::ReservationNotFound(id))?;
            let to = change.room_id.unwrap_or(from);
            let permit = self.commit_permit().await;
            let guards = self.lock_rooms(&[from, to]).await;
            let source = guards.iter().position(|g| g.id == from).unwrap_or(0);
            let target = guards.iter().position(|g| g.id == to).unwrap_or(0);

            let Some(current) = guards[source].get(id).cloned() else {
                continue; // moved or deleted while we waited
            };
            claims.require_owner_or_staff(current.subject, "reschedule")?;
            if current.status.is_terminal() {
                return Err(EngineError::InvalidTransition {
                    id,
                    from: current.status,
                    attempted: "reschedule",
                });
            }
            let span = validate_range(
                change.start.unwrap_or(current.span.start),
                change.end.unwrap_or(current.span.end),
            )?;
            if from != to && guards[target].reservations.len() >= MAX_RESERVATIONS_PER_ROOM {
                return Err(EngineError::LimitExceeded("too many reservations on room"));
            }
            if let Err(e) = check_no_conflict(&guards[target], &span, Some(id)) {
                debug!("reschedule of {id} to room {to} for {span} rejected: {e}");
                return Err(e);
            }

            let updated_at = now_ms();
            self.commit(
                permit,
                guards,
                Event::ReservationRescheduled {
                    id,
                    from_room: from,
                    to_room: to,
                    span,
                    updated_at,
                },
            )
            .await?;
            info!("reservation {id} rescheduled to room {to} for {span}");
            return Ok(Reservation {
                room_id: to,
                span,
                updated_at,
                ..current
            });
        }
        Err(EngineError::ReservationNotFound(id))
    }

    /// `pending → confirmed`.
    pub async fn confirm(&self, claims: &Claims, id: ReservationId) -> Result<Reservation, EngineError> {
        self.transition(claims, id, ReservationStatus::Confirmed, "confirm", Access::Staff)
            .await
    }

    /// Any active status `→ cancelled`. Not idempotent.
    pub async fn cancel(&self, claims: &Claims, id: ReservationId) -> Result<Reservation, EngineError> {
        self.transition(claims, id, ReservationStatus::Cancelled, "cancel", Access::OwnerOrStaff)
            .await
    }

    /// `confirmed → checked_in` only; a pending reservation must be confirmed first.
    pub async fn check_in(&self, claims: &Claims, id: ReservationId) -> Result<Reservation, EngineError> {
        self.transition(claims, id, ReservationStatus::CheckedIn, "check in", Access::Staff)
            .await
    }

    /// `checked_in → completed`.
    pub async fn check_out(&self, claims: &Claims, id: ReservationId) -> Result<Reservation, EngineError> {
        self.transition(claims, id, ReservationStatus::Completed, "check out", Access::Staff)
            .await
    }

    async fn transition(
        &self,
        claims: &Claims,
        id: ReservationId,
        to: ReservationStatus,
        attempted: &'static str,
        access: Access,
    ) -> Result<Reservation, EngineError> {
        let started = Instant::now();
        let result = self.transition_inner(claims, id, to, attempted, access).await;
        observe(to.as_str(), started, &result);
        result
    }

    async fn transition_inner(
        &self,
        claims: &Claims,
        id: ReservationId,
        to: ReservationStatus,
        attempted: &'static str,
        access: Access,
    ) -> Result<Reservation, EngineError> {
        let permit = self.commit_permit().await;
        let guard = self.lock_reservation(id).await?;
        let current = guard
            .get(id)
            .cloned()
            .ok_or(EngineError::ReservationNotFound(id))?;
        match access {
            Access::OwnerOrStaff => claims.require_owner_or_staff(current.subject, attempted)?,
            Access::Staff => claims.require(Role::Staff, attempted)?,
        }
        if !current.status.can_transition_to(to) {
            debug!("{attempted} on {id} rejected: status is {}", current.status);
            return Err(EngineError::InvalidTransition {
                id,
                from: current.status,
                attempted,
            });
        }

        let updated_at = now_ms();
        let room_id = current.room_id;
        self.commit(
            permit,
            vec![guard],
            Event::StatusChanged {
                id,
                room_id,
                from: current.status,
                to,
                updated_at,
            },
        )
        .await?;
        info!("reservation {id} {} -> {to}", current.status);
        Ok(Reservation {
            status: to,
            updated_at,
            ..current
        })
    }

    /// Hard removal regardless of status. Administrative correction only.
    pub async fn delete(&self, claims: &Claims, id: ReservationId) -> Result<Reservation, EngineError> {
        let started = Instant::now();
        let result = self.delete_inner(claims, id).await;
        observe("delete", started, &result);
        result
    }

    async fn delete_inner(&self, claims: &Claims, id: ReservationId) -> Result<Reservation, EngineError> {
        let permit = self.commit_permit().await;
        let guard = self.lock_reservation(id).await?;
        let current = guard
            .get(id)
            .cloned()
            .ok_or(EngineError::ReservationNotFound(id))?;
        claims.require(Role::Admin, "delete")?;

        let room_id = current.room_id;
        self.commit(permit, vec![guard], Event::ReservationDeleted { id, room_id })
            .await?;
        info!("reservation {id} deleted from room {room_id} (was {})", current.status);
        Ok(current)
    }
}
