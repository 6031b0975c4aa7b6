//! ClickHouse type conversion helpers

use chrono::{DateTime, Utc};
use time::OffsetDateTime;

/// Convert a chrono UTC timestamp to `time::OffsetDateTime` for the
/// ClickHouse serde bindings (microsecond precision).
pub fn chrono_to_time(dt: DateTime<Utc>) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp_nanos(dt.timestamp_micros() as i128 * 1_000)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

/// Convert ClickHouse microseconds-since-epoch back into chrono.
pub fn micros_to_chrono(micros: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(micros).unwrap_or(DateTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chrono_round_trips_through_time() {
        let now = Utc::now();
        let converted = chrono_to_time(now);
        assert_eq!(
            converted.unix_timestamp_nanos() / 1_000,
            now.timestamp_micros() as i128
        );
    }

    #[test]
    fn micros_round_trip() {
        let dt = micros_to_chrono(1_700_000_000_123_456);
        assert_eq!(dt.timestamp_micros(), 1_700_000_000_123_456);
    }
}
