use chrono::Duration;

const SECOND_MS: i64 = 1000;
const MINUTE_MS: i64 = 60 * SECOND_MS;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;

/// `1d 5h 30m 10s` style. Zero units are left out, seconds show up when they
/// are non-zero or when nothing else would be printed.
pub fn format_time_remaining(remaining: Duration) -> String {
    let ms = remaining.num_milliseconds().max(0);

    let days = ms / DAY_MS;
    let hours = ms % DAY_MS / HOUR_MS;
    let minutes = ms % HOUR_MS / MINUTE_MS;
    let seconds = ms % MINUTE_MS / SECOND_MS;

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    if parts.is_empty() || seconds > 0 {
        parts.push(format!("{seconds}s"));
    }

    parts.join(" ")
}

pub fn kilobytes(bytes: u64) -> String {
    format!("{:.1}KB", bytes as f64 / 1024.0)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::{format_time_remaining, kilobytes};

    #[test]
    fn test_basic() {
        let remaining = Duration::days(1)
            + Duration::hours(5)
            + Duration::minutes(30)
            + Duration::seconds(10);
        assert_eq!(format_time_remaining(remaining), "1d 5h 30m 10s");
        assert_eq!(format_time_remaining(Duration::hours(23)), "23h");
        assert_eq!(format_time_remaining(Duration::minutes(1)), "1m");
    }

    #[test]
    fn test_zero_units_are_skipped() {
        assert_eq!(format_time_remaining(Duration::hours(2) + Duration::seconds(4)), "2h 4s");
        assert_eq!(format_time_remaining(Duration::days(2) + Duration::minutes(3)), "2d 3m");
    }

    #[test]
    fn test_nothing_left() {
        assert_eq!(format_time_remaining(Duration::zero()), "0s");
        assert_eq!(format_time_remaining(Duration::milliseconds(999)), "0s");
        assert_eq!(format_time_remaining(Duration::seconds(-5)), "0s");
    }

    #[test]
    fn test_kilobytes() {
        assert_eq!(kilobytes(501 * 1024), "501.0KB");
        assert_eq!(kilobytes(1536), "1.5KB");
    }
}
