//! Wall-clock time handling: bucket widths, bucketing, trading sessions.

pub mod bucket;
pub mod interval;
pub mod session;

pub use bucket::{bucket_range, floor, next_bucket_start};
pub use interval::{Interval, IntervalError};
pub use session::{filter_by_session, Session, SessionError, SessionWindow};
