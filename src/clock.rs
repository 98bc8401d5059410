// Numan Thabit 2026
// clock.rs - scheduler time axis

use std::time::{SystemTime, UNIX_EPOCH};

/// Scheduler time: fractional seconds since the Unix epoch.
///
/// Tags live on the same axis, so a deadline can be compared against
/// wall time with no conversion.
pub type Time = f64;

/// Reserved sentinel meaning "no deadline recorded".
pub const TIME_ZERO: Time = 0.0;

/// Reserved sentinel meaning "never".
pub const TIME_MAX: Time = f64::MAX;

/// Tag value for an axis disabled on the high side (no reservation or
/// no weight): sorts after every real deadline.
pub const TAG_MAX: f64 = f64::MAX;

/// Tag value for a disabled limit axis: sorts before every real
/// deadline, so the request is always within limit.
pub const TAG_MIN: f64 = f64::MIN;

/// Current wall-clock time on the scheduler axis.
pub fn now() -> Time {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_secs_f64(),
        // clock set before the epoch; saturate rather than panic
        Err(_) => TIME_ZERO,
    }
}

/// Minimum of `current` and `possible`, except that a `TIME_ZERO`
/// candidate means "nothing recorded" and is ignored.
pub fn min_not_zero(current: Time, possible: Time) -> Time {
    if possible == TIME_ZERO {
        current
    } else {
        current.min(possible)
    }
}
