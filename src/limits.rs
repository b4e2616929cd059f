use crate::model::Ms;

const DAY_MS: Ms = 86_400_000;

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2200-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 7_258_118_400_000;

/// Longest single stay.
pub const MAX_STAY_DURATION_MS: Ms = 366 * DAY_MS;

/// Widest window accepted by reporting reads.
pub const MAX_REPORT_WINDOW_MS: Ms = 10 * 366 * DAY_MS;

pub const MAX_RESERVATIONS_PER_ROOM: usize = 100_000;
pub const MAX_PAYMENT_REF_LEN: usize = 256;

pub const MAX_HOSTELS: usize = 1024;
pub const MAX_HOSTEL_NAME_LEN: usize = 128;

pub const WAL_CHANNEL_CAPACITY: usize = 4096;
