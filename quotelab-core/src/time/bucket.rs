//! Session-aware time bucketing.
//!
//! Buckets are laid out on the local wall clock of a time zone: a 5-minute
//! bucket starts at a local minute-of-day that is a multiple of 5, a daily
//! bucket starts at local midnight. The bucket start is rebuilt from wall-clock
//! components and resolved back to an instant, never derived from a raw UTC
//! offset, so boundaries stay stable across DST transitions.
//!
//! DST notes:
//! - On a fall-back day the repeated local hour maps to two instants. The
//!   bucket start is the latest candidate that is not after the timestamp, so
//!   each pass through the repeated hour gets its own buckets.
//! - On a spring-forward day a wall-clock bucket start may not exist. The start
//!   moves forward to the first valid local minute.

use super::interval::Interval;
use chrono::offset::LocalResult;
use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

/// Longest DST gap we step across when a wall-clock start does not exist.
const MAX_GAP_MINUTES: i64 = 180;

/// Floor `ts` to the start of its `interval` bucket in `tz`.
///
/// Accepts any instant. The result is never after `ts` and is idempotent:
/// `floor(floor(t)) == floor(t)`.
pub fn floor(ts: DateTime<Utc>, interval: Interval, tz: Tz) -> DateTime<Utc> {
    let local = ts.with_timezone(&tz);
    let date = local.date_naive();

    let wall = if interval.is_daily() {
        date.and_time(NaiveTime::MIN)
    } else {
        let minute_of_day = local.hour() * 60 + local.minute();
        let floored = minute_of_day - minute_of_day % interval.minutes();
        let time = NaiveTime::from_num_seconds_from_midnight_opt(floored * 60, 0)
            .unwrap_or(NaiveTime::MIN);
        date.and_time(time)
    };

    resolve_wall_clock(wall, tz, ts)
}

/// Bucket `[start, end)` containing `ts`. `end` is the next bucket's start.
pub fn bucket_range(
    ts: DateTime<Utc>,
    interval: Interval,
    tz: Tz,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = floor(ts, interval, tz);
    (start, next_bucket_start(start, interval, tz))
}

/// Start of the bucket after the one beginning at `start`.
///
/// A DST transition can stretch a wall-clock bucket by up to an hour, so when
/// the nominal width lands back inside the same bucket we probe forward in
/// one-hour steps.
pub fn next_bucket_start(start: DateTime<Utc>, interval: Interval, tz: Tz) -> DateTime<Utc> {
    let mut probe = start + interval.duration();
    for _ in 0..4 {
        let candidate = floor(probe, interval, tz);
        if candidate > start {
            return candidate;
        }
        probe += Duration::hours(1);
    }
    start + interval.duration()
}

/// Map a wall-clock time in `tz` to an instant no later than `not_after`.
fn resolve_wall_clock(wall: NaiveDateTime, tz: Tz, not_after: DateTime<Utc>) -> DateTime<Utc> {
    match tz.from_local_datetime(&wall) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(a, b) => {
            let (a, b) = (a.with_timezone(&Utc), b.with_timezone(&Utc));
            let (earliest, latest) = if a <= b { (a, b) } else { (b, a) };
            if latest <= not_after {
                latest
            } else {
                earliest
            }
        }
        LocalResult::None => {
            let mut probe = wall;
            for _ in 0..MAX_GAP_MINUTES {
                probe += Duration::minutes(1);
                if let Some(dt) = tz.from_local_datetime(&probe).earliest() {
                    return dt.with_timezone(&Utc).min(not_after);
                }
            }
            // No zone has a gap this long; truncate to the minute as a last resort.
            not_after
                .with_second(0)
                .and_then(|t| t.with_nanosecond(0))
                .unwrap_or(not_after)
        }
    }
}
