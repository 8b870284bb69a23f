//! Hour-bucket helpers shared by the writer (choosing a target file),
//! registry (naming files), and executor (computing file-hour ranges)
//! (§3.1, §6.1).

/// Nanoseconds per second.
pub const NANOS_PER_SEC: i64 = 1_000_000_000;
/// Seconds per hour bucket (§3.1: "integer seconds truncated to 3600").
pub const SECONDS_PER_HOUR: i64 = 3600;

/// `floor(timestamp_ns, 3600s)`, returned in seconds: the file-hour a given
/// event timestamp targets by default (§4.2).
pub fn hour_floor_seconds(timestamp_ns: i64) -> i64 {
    let secs = timestamp_ns.div_euclid(NANOS_PER_SEC);
    secs.div_euclid(SECONDS_PER_HOUR) * SECONDS_PER_HOUR
}

/// The half-open `[hour, hour + 3600s)` range, in nanoseconds, that a file
/// named for `hour_start_sec` nominally covers (§3.1).
pub fn hour_range_ns(hour_start_sec: i64) -> (i64, i64) {
    let start = hour_start_sec * NANOS_PER_SEC;
    let end = (hour_start_sec + SECONDS_PER_HOUR) * NANOS_PER_SEC;
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hour_floor_truncates_to_3600s() {
        assert_eq!(hour_floor_seconds(1_600_000_010_000_000_000), 1_599_998_400);
    }

    #[test]
    fn hour_range_is_half_open_3600s_wide() {
        let (start, end) = hour_range_ns(1_599_998_400);
        assert_eq!(start, 1_599_998_400_000_000_000);
        assert_eq!(end - start, 3600 * NANOS_PER_SEC);
    }
}
