/// Longest single booking, in minutes (24 h).
pub const MAX_DURATION_MINUTES: u32 = 24 * 60;

/// Furthest the alternative search may look ahead.
pub const MAX_HORIZON_DAYS: u32 = 60;

/// Upper bound on alternatives returned by one search.
pub const MAX_ALTERNATIVES: usize = 20;

/// Smallest candidate step for the alternative search.
pub const MIN_STEP_MINUTES: u32 = 5;

pub const MAX_CLIENT_ID_LEN: usize = 128;
pub const MAX_LABEL_LEN: usize = 256;
pub const MAX_NOTE_LEN: usize = 2048;

/// Stored intervals (bookings of any status + blocked periods) per provider.
pub const MAX_INTERVALS_PER_PROVIDER: usize = 100_000;

/// Max bytes in one wire request line.
pub const MAX_REQUEST_LINE_BYTES: usize = 64 * 1024;

/// Valid timestamp range (ms since epoch): year 2000..2100.
pub const MIN_VALID_TIMESTAMP_MS: i64 = 946_684_800_000;
pub const MAX_VALID_TIMESTAMP_MS: i64 = 4_102_444_800_000;

/// Longest blocked period (vacations and the like).
pub const MAX_BLOCK_DAYS: i64 = 366;
