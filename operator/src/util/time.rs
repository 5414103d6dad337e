//! Conversions between `chrono::DateTime<Utc>` (used throughout the
//! reconciler) and `k8s_openapi`'s `jiff::Timestamp` (used by the generated
//! `Time` wrapper type), since both represent the same UTC instant.

use chrono::{DateTime, TimeZone, Utc};
use k8s_openapi::jiff::Timestamp;

pub(crate) fn to_chrono(ts: Timestamp) -> DateTime<Utc> {
    Utc.timestamp_opt(ts.as_second(), ts.subsec_nanosecond().max(0) as u32)
        .single()
        .expect("jiff::Timestamp is always representable as a chrono::DateTime<Utc>")
}

pub(crate) fn to_jiff(dt: DateTime<Utc>) -> Timestamp {
    Timestamp::new(dt.timestamp(), dt.timestamp_subsec_nanos() as i32)
        .expect("chrono::DateTime<Utc> is always representable as a jiff::Timestamp")
}
