use ulid::Ulid;

use crate::model::{ReservationStatus, Span};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// `end` is not after `start`.
    InvalidRange { start: i64, end: i64 },
    RoomNotFound(Ulid),
    ReservationNotFound(Ulid),
    /// The requested stay intersects an active reservation on the same room.
    Conflict { with: Ulid, span: Span },
    InvalidTransition {
        id: Ulid,
        from: ReservationStatus,
        attempted: &'static str,
    },
    /// A reservation cannot be created directly in a terminal status.
    InvalidInitialStatus(ReservationStatus),
    Forbidden { subject: Ulid, action: &'static str },
    LimitExceeded(&'static str),
    /// The log or the room catalog could not be reached. Never a conflict.
    Unavailable(String),
}

impl EngineError {
    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            EngineError::InvalidRange { .. } => "invalid_range",
            EngineError::RoomNotFound(_) | EngineError::ReservationNotFound(_) => "not_found",
            EngineError::Conflict { .. } => "conflict",
            EngineError::InvalidTransition { .. } | EngineError::InvalidInitialStatus(_) => {
                "invalid_transition"
            }
            EngineError::Forbidden { .. } => "forbidden",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::Unavailable(_) => "unavailable",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidRange { start, end } => {
                write!(f, "invalid range: end {end} is not after start {start}")
            }
            EngineError::RoomNotFound(id) => write!(f, "room not found: {id}"),
            EngineError::ReservationNotFound(id) => write!(f, "reservation not found: {id}"),
            EngineError::Conflict { with, span } => {
                write!(f, "conflict with reservation {with} occupying {span}")
            }
            EngineError::InvalidTransition {
                id,
                from,
                attempted,
            } => write!(f, "reservation {id} is {from}: cannot {attempted}"),
            EngineError::InvalidInitialStatus(status) => {
                write!(f, "cannot create a reservation as {status}")
            }
            EngineError::Forbidden { subject, action } => {
                write!(f, "subject {subject} may not {action}")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Unavailable(e) => write!(f, "store unavailable: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
