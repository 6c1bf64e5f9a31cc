//! Internal time conversion helpers.
//!
//! The public API speaks signed milliseconds (what a UI slider holds) and
//! [`Duration`] (what the pipeline clock holds); FFmpeg speaks stream time
//! bases and `AV_TIME_BASE` microseconds. Everything crossing those
//! boundaries goes through here.

use std::time::Duration;

use ffmpeg_next::Rational;

/// Milliseconds in a [`Duration`], saturating at `i64::MAX`.
pub(crate) fn duration_to_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// `max(0, base + delta)` as a [`Duration`].
pub(crate) fn clamp_offset_ms(base_ms: i64, delta_ms: i64) -> Duration {
    let target = base_ms.saturating_add(delta_ms).max(0);
    Duration::from_millis(target as u64)
}

/// Duration in milliseconds with `1` standing in for "unknown".
pub(crate) fn duration_or_sentinel_ms(duration: Option<Duration>) -> i64 {
    duration
        .map(duration_to_ms)
        .filter(|&ms| ms > 0)
        .unwrap_or(1)
}

/// Rescale a PTS value from stream time base to a [`Duration`].
/// Negative timestamps map to zero.
pub(crate) fn pts_to_duration(pts: i64, time_base: Rational) -> Duration {
    let seconds =
        pts as f64 * f64::from(time_base.numerator()) / f64::from(time_base.denominator());
    if seconds.is_finite() && seconds > 0.0 {
        Duration::from_secs_f64(seconds)
    } else {
        Duration::ZERO
    }
}

/// Convert a [`Duration`] to a container seek timestamp in `AV_TIME_BASE`.
///
/// `input.seek()` with no stream selected expects microseconds.
pub(crate) fn duration_to_seek_timestamp(duration: Duration) -> i64 {
    let micros_per_second = i128::from(ffmpeg_sys_next::AV_TIME_BASE);
    let scaled = duration.as_micros() as i128 * micros_per_second / 1_000_000;
    i64::try_from(scaled).unwrap_or(i64::MAX)
}

/// Container duration in `AV_TIME_BASE` units to a [`Duration`], `None` when
/// the container does not report one.
pub(crate) fn container_duration(raw: i64) -> Option<Duration> {
    if raw <= 0 {
        return None;
    }
    let micros = raw as u128 * 1_000_000 / ffmpeg_sys_next::AV_TIME_BASE as u128;
    Some(Duration::from_micros(micros as u64))
}
