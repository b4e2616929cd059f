use std::fmt;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds. The only time type.
pub type Ms = i64;

pub type ReservationId = Ulid;
pub type RoomId = Ulid;
pub type SubjectId = Ulid;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// Touching spans (`self.end == other.start`) do not overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    CheckedIn,
    Completed,
    Cancelled,
}

impl ReservationStatus {
    pub const ALL: [ReservationStatus; 5] = [
        ReservationStatus::Pending,
        ReservationStatus::Confirmed,
        ReservationStatus::CheckedIn,
        ReservationStatus::Completed,
        ReservationStatus::Cancelled,
    ];

    /// Active reservations hold their room and count toward overlap checks.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ReservationStatus::Pending | ReservationStatus::Confirmed | ReservationStatus::CheckedIn
        )
    }

    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }

    /// The lifecycle graph:
    /// `pending → confirmed → checked_in → completed`, plus `→ cancelled`
    /// from every active state.
    pub fn can_transition_to(self, next: ReservationStatus) -> bool {
        use ReservationStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Confirmed, CheckedIn)
                | (CheckedIn, Completed)
                | (Pending | Confirmed | CheckedIn, Cancelled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::CheckedIn => "checked_in",
            ReservationStatus::Completed => "completed",
            ReservationStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub room_id: RoomId,
    pub subject: SubjectId,
    pub span: Span,
    pub status: ReservationStatus,
    /// Opaque link into the billing system.
    pub payment_ref: Option<String>,
    pub created_at: Ms,
    pub updated_at: Ms,
}

impl Reservation {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// All reservations ever placed on one room, terminal ones included.
#[derive(Debug, Clone)]
pub struct RoomState {
    pub id: RoomId,
    /// Sorted by `span.start`.
    pub reservations: Vec<Reservation>,
}

impl RoomState {
    pub fn new(id: RoomId) -> Self {
        Self {
            id,
            reservations: Vec::new(),
        }
    }

    /// Insert maintaining sort order by span.start.
    pub fn insert(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .binary_search_by_key(&reservation.span.start, |r| r.span.start)
            .unwrap_or_else(|e| e);
        self.reservations.insert(pos, reservation);
    }

    pub fn remove(&mut self, id: ReservationId) -> Option<Reservation> {
        let pos = self.reservations.iter().position(|r| r.id == id)?;
        Some(self.reservations.remove(pos))
    }

    pub fn get(&self, id: ReservationId) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == id)
    }

    pub fn get_mut(&mut self, id: ReservationId) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| r.id == id)
    }

    pub fn contains(&self, id: ReservationId) -> bool {
        self.get(id).is_some()
    }

    /// Reservations of any status whose span overlaps the query window.
    /// Binary search skips everything starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Reservation> {
        let right_bound = self
            .reservations
            .partition_point(|r| r.span.start < query.end);
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.span.end > query.start)
    }
}

/// WAL record format. One event per committed state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ReservationCreated {
        reservation: Reservation,
    },
    ReservationRescheduled {
        id: ReservationId,
        from_room: RoomId,
        to_room: RoomId,
        span: Span,
        updated_at: Ms,
    },
    StatusChanged {
        id: ReservationId,
        room_id: RoomId,
        from: ReservationStatus,
        to: ReservationStatus,
        updated_at: Ms,
    },
    ReservationDeleted {
        id: ReservationId,
        room_id: RoomId,
    },
}

impl Event {
    /// Rooms whose state this event touches. A reschedule that moves rooms touches two.
    pub fn rooms(&self) -> Vec<RoomId> {
        match self {
            Event::ReservationCreated { reservation } => vec![reservation.room_id],
            Event::ReservationRescheduled {
                from_room, to_room, ..
            } if from_room != to_room => vec![*from_room, *to_room],
            Event::ReservationRescheduled { to_room, .. } => vec![*to_room],
            Event::StatusChanged { room_id, .. } | Event::ReservationDeleted { room_id, .. } => {
                vec![*room_id]
            }
        }
    }
}

// ── Request and query types ──────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReservation {
    pub room_id: RoomId,
    pub subject: SubjectId,
    pub start: Ms,
    pub end: Ms,
    /// Administrative override; `None` means pending.
    pub initial_status: Option<ReservationStatus>,
    pub payment_ref: Option<String>,
}

impl NewReservation {
    pub fn new(room_id: RoomId, subject: SubjectId, start: Ms, end: Ms) -> Self {
        Self {
            room_id,
            subject,
            start,
            end,
            initial_status: None,
            payment_ref: None,
        }
    }

    pub fn with_status(mut self, status: ReservationStatus) -> Self {
        self.initial_status = Some(status);
        self
    }

    pub fn with_payment_ref(mut self, payment_ref: impl Into<String>) -> Self {
        self.payment_ref = Some(payment_ref.into());
        self
    }
}

/// Unset fields keep the reservation's current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reschedule {
    pub room_id: Option<RoomId>,
    pub start: Option<Ms>,
    pub end: Option<Ms>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReservationFilter {
    pub subject: Option<SubjectId>,
    pub room_id: Option<RoomId>,
    pub status: Option<ReservationStatus>,
}

impl ReservationFilter {
    pub fn subject(mut self, subject: SubjectId) -> Self {
        self.subject = Some(subject);
        self
    }

    pub fn room(mut self, room_id: RoomId) -> Self {
        self.room_id = Some(room_id);
        self
    }

    pub fn status(mut self, status: ReservationStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, r: &Reservation) -> bool {
        self.subject.is_none_or(|s| s == r.subject)
            && self.room_id.is_none_or(|id| id == r.room_id)
            && self.status.is_none_or(|s| s == r.status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub items: Vec<Reservation>,
    /// Matches before pagination.
    pub total: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Occupancy {
    pub rooms_occupied: usize,
    pub active_reservations: usize,
}
