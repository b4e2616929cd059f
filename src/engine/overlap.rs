use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as Ms)
}

/// `end > start` plus engine bounds. Touches no state.
pub(crate) fn validate_range(start: Ms, end: Ms) -> Result<Span, EngineError> {
    if end <= start {
        return Err(EngineError::InvalidRange { start, end });
    }
    if start < MIN_VALID_TIMESTAMP_MS || end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if end - start > MAX_STAY_DURATION_MS {
        return Err(EngineError::LimitExceeded("stay too long"));
    }
    Ok(Span::new(start, end))
}

pub(crate) fn validate_window(window: &Span) -> Result<(), EngineError> {
    if window.duration_ms() > MAX_REPORT_WINDOW_MS {
        return Err(EngineError::LimitExceeded("report window too wide"));
    }
    Ok(())
}

/// First active reservation on `room` intersecting `span`, skipping `exclude`.
pub fn find_conflict<'a>(
    room: &'a RoomState,
    span: &Span,
    exclude: Option<ReservationId>,
) -> Option<&'a Reservation> {
    room.overlapping(span)
        .find(|r| r.is_active() && Some(r.id) != exclude)
}

pub fn is_available(room: &RoomState, span: &Span, exclude: Option<ReservationId>) -> bool {
    find_conflict(room, span, exclude).is_none()
}

pub(crate) fn check_no_conflict(
    room: &RoomState,
    span: &Span,
    exclude: Option<ReservationId>,
) -> Result<(), EngineError> {
    match find_conflict(room, span, exclude) {
        Some(existing) => Err(EngineError::Conflict {
            with: existing.id,
            span: existing.span,
        }),
        None => Ok(()),
    }
}
