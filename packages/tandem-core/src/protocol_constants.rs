//! Fixed protocol constants that should NOT be changed.
//!
//! These values are shared by the server and every client build; changing
//! them on one side only breaks interoperability between the two.

// ─────────────────────────────────────────────────────────────────────────────
// Session Codes
// ─────────────────────────────────────────────────────────────────────────────

/// Alphabet session codes are drawn from (base-36, uppercase).
pub const SESSION_CODE_ALPHABET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Default session code length.
///
/// 36^6 ≈ 2.2 billion codes, so collisions between live sessions are rare
/// but still re-checked before the first write.
pub const DEFAULT_SESSION_CODE_LENGTH: usize = 6;

/// Shortest configurable session code.
pub const MIN_SESSION_CODE_LENGTH: usize = 4;

/// Longest configurable session code.
///
/// A v4 UUID carries 122 random bits; 12 base-36 digits use about 62 of them.
pub const MAX_SESSION_CODE_LENGTH: usize = 12;

// ─────────────────────────────────────────────────────────────────────────────
// Sync Protocol
// ─────────────────────────────────────────────────────────────────────────────

/// Participants seek only when local time differs from the host's reported
/// time by more than this many seconds.
///
/// Smaller deltas are within push latency jitter and seeking on them causes
/// audible stutter.
pub const DRIFT_THRESHOLD_SECS: f64 = 2.0;

/// Interval between participant snapshot pulls (milliseconds).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Minimum spacing between host `update_time` pushes (milliseconds).
///
/// 500ms keeps the host at or below 2 time pushes per second.
pub const MIN_TIME_PUSH_INTERVAL_MS: u64 = 500;

/// Consecutive failed pulls before a connectivity warning is surfaced.
pub const CONNECTIVITY_WARNING_AFTER_MISSES: u32 = 3;

// ─────────────────────────────────────────────────────────────────────────────
// Session Lifetime
// ─────────────────────────────────────────────────────────────────────────────

/// Default idle window after which a session is reclaimed (seconds).
///
/// 6 hours covers a long listening party with the host paused.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 6 * 60 * 60;

/// Shortest idle window accepted by configuration (seconds).
pub const MIN_IDLE_TIMEOUT_SECS: u64 = 60;

/// Default number of code generation attempts before giving up.
pub const DEFAULT_MAX_CODE_ATTEMPTS: u32 = 8;

// ─────────────────────────────────────────────────────────────────────────────
// Storage
// ─────────────────────────────────────────────────────────────────────────────

/// Key prefix for session records in the external key-value backend.
pub const STORE_KEY_PREFIX: &str = "tandem:session:";

/// Timeout for key-value backend HTTP requests (seconds).
pub const STORE_TIMEOUT_SECS: u64 = 5;

/// Timeout for client-side session API requests (seconds).
///
/// Shorter than the poll interval multiple so a hung pull never stacks up
/// behind the next tick.
pub const API_TIMEOUT_SECS: u64 = 3;

// ─────────────────────────────────────────────────────────────────────────────
// Application Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Service identifier reported by the health endpoint.
pub const SERVICE_ID: &str = "tandem";

/// Capacity of the session event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default HTTP port range scanned when no port is configured.
pub const DEFAULT_PORT_RANGE: (u16, u16) = (49500, 49510);
