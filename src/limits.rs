/// Booking horizon: the furthest a reservation may be made, in days from today.
pub const BOOKING_HORIZON_DAYS: i64 = 14;

/// Minimum lead time for booking and cancelling, in days from today.
pub const MIN_LEAD_DAYS: i64 = 1;

/// Packing-list uploads larger than this are rejected.
pub const MAX_ATTACHMENT_BYTES: u64 = 10 * 1024 * 1024;

/// Accepted packing-list extensions, lowercase, without the dot.
pub const ATTACHMENT_EXTENSIONS: &[&str] = &["pdf", "doc", "docx"];

pub const MAX_CONTAINER_NO_LEN: usize = 64;
pub const MAX_REASON_LEN: usize = 500;
pub const MAX_FILE_NAME_LEN: usize = 255;

/// Widest date range a single overview or listing may cover (inclusive days).
pub const MAX_QUERY_DAYS: i64 = 93;
