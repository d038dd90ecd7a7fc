//! Creation-date handling.
//!
//! Every `creation_date` in the store is UTC with microsecond precision,
//! persisted as fixed-width `YYYY-MM-DDTHH:MM:SS.ssssss+00:00` text. The
//! fixed width keeps plain string comparison chronological, which the
//! latest-entry queries rely on.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{PrimitiveDateTime, UtcDateTime};

const STORE_FORMAT: &[BorrowedFormatItem<'_>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]+00:00"
);

/// Current UTC time, truncated to microseconds so that a value survives a
/// round trip through its text representation unchanged.
pub fn now() -> UtcDateTime {
    let now = UtcDateTime::now();
    // Safety: the truncated nanosecond value is always in range.
    now.replace_nanosecond(now.nanosecond() / 1_000 * 1_000).unwrap()
}

/// Format a timestamp in the store text format.
pub fn format(ts: UtcDateTime) -> Result<String> {
    PrimitiveDateTime::new(ts.date(), ts.time())
        .format(&STORE_FORMAT)
        .or_raise(|| ErrorKind::InvalidData("timestamp"))
}

/// Parse a timestamp from the store text format.
pub fn parse(text: &str) -> Result<UtcDateTime> {
    let parsed =
        PrimitiveDateTime::parse(text, &STORE_FORMAT).or_raise(|| ErrorKind::InvalidData("timestamp"))?;
    Ok(parsed.as_utc())
}

/// Serde adapter for `creation_date` fields on the boundary shapes.
pub mod serde_format {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::UtcDateTime;

    pub fn serialize<S: Serializer>(ts: &UtcDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        let text = super::format(*ts).map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&text)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<UtcDateTime, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::parse(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let ts = now();
        let text = format(ts).unwrap();
        assert_eq!(parse(&text).unwrap(), ts);
    }

    #[test]
    fn test_fixed_width() {
        let text = format(now()).unwrap();
        assert_eq!(text.len(), "2026-08-01T12:34:56.123456+00:00".len());
        assert!(text.ends_with("+00:00"));
    }

    #[test]
    fn test_text_order_is_chronological() {
        let early = UtcDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let late = UtcDateTime::from_unix_timestamp(1_700_000_001).unwrap();
        assert!(format(early).unwrap() < format(late).unwrap());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse("yesterday, around teatime").is_err());
        assert!(parse("2026-08-01").is_err());
    }
}
