/// Format whole seconds as `HH:MM:SS`. Fractions are floored; hours may exceed 24.
pub fn seconds_to_clock(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;

    format!("{:02}:{:02}:{:02}", hours, minutes, secs)
}

/// Parse `H:M:S` into seconds, or `None` when the text is not exactly three
/// integer fields or the total does not fit in a `u64`.
pub fn parse_clock(text: &str) -> Option<u64> {
    let mut fields = text.trim().split(':');
    let hours: u64 = fields.next()?.parse().ok()?;
    let minutes: u64 = fields.next()?.parse().ok()?;
    let secs: u64 = fields.next()?.parse().ok()?;
    if fields.next().is_some() {
        return None;
    }

    hours
        .checked_mul(3600)?
        .checked_add(minutes.checked_mul(60)?)?
        .checked_add(secs)
}

/// Lenient form of [`parse_clock`]: malformed text reads as `0`.
///
/// A zero result is not proof of success; use [`parse_clock`] when the caller
/// needs to tell the two apart.
pub fn clock_to_seconds(text: &str) -> u64 {
    parse_clock(text).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seconds_to_clock() {
        assert_eq!(seconds_to_clock(0.0), "00:00:00");
        assert_eq!(seconds_to_clock(59.9), "00:00:59");
        assert_eq!(seconds_to_clock(3661.0), "01:01:01");
        assert_eq!(seconds_to_clock(90000.0), "25:00:00");
    }

    #[test]
    fn test_clock_to_seconds() {
        assert_eq!(clock_to_seconds("00:01:05"), 65);
        assert_eq!(clock_to_seconds("1:2:3"), 3723);
        assert_eq!(clock_to_seconds("100:00:00"), 360_000);
    }

    #[test]
    fn test_malformed_clock_reads_as_zero() {
        for text in [
            "abc",
            "1:2",
            "",
            "1:2:3:4",
            "01:xx:03",
            "-1:00:00",
            "99999999999999999:00:00",
            "00:9999999999999999999:00",
        ] {
            assert_eq!(clock_to_seconds(text), 0, "{:?}", text);
            assert_eq!(parse_clock(text), None, "{:?}", text);
        }
    }

    #[test]
    fn test_round_trip() {
        for text in ["00:00:00", "00:00:59", "01:30:00", "23:59:59", "99:59:59"] {
            assert_eq!(seconds_to_clock(clock_to_seconds(text) as f64), text);
        }
    }
}
