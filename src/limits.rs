//! Hard input bounds. Everything user-supplied is checked against these
//! before it reaches the WAL.

use crate::model::Ms;

pub const MAX_ROOMS: usize = 100_000;
pub const MAX_BOOKINGS_PER_ROOM: usize = 10_000;
pub const MAX_USERS: usize = 100_000;

/// Room numbers are short labels ("111", "2B"), not descriptions.
pub const MAX_ROOM_NUMBER_LEN: usize = 20;
pub const MAX_USERNAME_LEN: usize = 150;
pub const MIN_PASSWORD_LEN: usize = 8;

/// Seven significant digits with two decimal places: 99999.99 at most.
pub const MAX_COST_CENTS: i64 = 9_999_999;

pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;
/// 2100-01-01T00:00:00Z.
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

/// No booking runs longer than two years.
pub const MAX_SPAN_DURATION_MS: Ms = 2 * 366 * 24 * 3_600_000;
/// Availability queries are bounded the same way.
pub const MAX_QUERY_WINDOW_MS: Ms = 2 * 366 * 24 * 3_600_000;
