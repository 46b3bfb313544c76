use chrono::Utc;

/// Milliseconds since the Unix epoch according to the wall clock.
///
/// Clocks set before 1970 are clamped to zero.
#[inline]
pub(crate) fn wall_clock_millis() -> u64 {
  u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}
