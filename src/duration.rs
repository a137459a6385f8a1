//! Parsing and formatting of duration strings such as `"30s"` or `"500ms"`.

use std::time::Duration;

use thiserror::Error;

/// Suffix to nanoseconds multiplier (order matters: longer suffixes first)
const UNITS: &[(&str, f64)] = &[
    ("ns", 1.0),
    ("µs", 1_000.0),
    ("us", 1_000.0),
    ("ms", 1_000_000.0),
    ("s", 1_000_000_000.0),
    ("m", 60_000_000_000.0),
];

/// A duration string that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid duration '{0}' (expected a number followed by ns, us, ms, s or m)")]
pub struct DurationError(pub String);

/// Parse duration strings like "30s", "2.5s", "500ms", "1m", "0ns"
pub fn parse_duration(s: &str) -> Result<Duration, DurationError> {
    let s = s.trim();

    for (suffix, multiplier) in UNITS {
        if let Some(val_str) = s.strip_suffix(suffix) {
            let val: f64 = val_str
                .trim()
                .parse()
                .map_err(|_| DurationError(s.to_string()))?;
            if !val.is_finite() || val < 0.0 {
                return Err(DurationError(s.to_string()));
            }
            return Ok(Duration::from_nanos((val * multiplier) as u64));
        }
    }

    Err(DurationError(s.to_string()))
}

/// Format a duration for display
pub fn format_duration(d: Duration) -> String {
    let nanos = d.as_nanos();
    if nanos == 0 {
        "0ns".to_string()
    } else if nanos < 1_000 {
        format!("{}ns", nanos)
    } else if nanos < 1_000_000 {
        format!("{:.2}µs", nanos as f64 / 1_000.0)
    } else if nanos < 1_000_000_000 {
        format!("{:.2}ms", nanos as f64 / 1_000_000.0)
    } else {
        format!("{:.2}s", d.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_seconds() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        let d = parse_duration("2.5s").unwrap();
        assert!((d.as_secs_f64() - 2.5).abs() < 0.0001);
    }

    #[test]
    fn test_parse_milliseconds() {
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
    }

    #[test]
    fn test_parse_microseconds() {
        assert_eq!(parse_duration("16µs").unwrap().as_nanos(), 16_000);
        assert_eq!(parse_duration("16us").unwrap().as_nanos(), 16_000);
    }

    #[test]
    fn test_parse_minutes() {
        assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
    }

    #[test]
    fn test_parse_zero() {
        assert_eq!(parse_duration("0ns").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("0s").unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_duration("30").is_err());
        assert!(parse_duration("fast").is_err());
        assert!(parse_duration("-1s").is_err());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::ZERO), "0ns");
        assert_eq!(format_duration(Duration::from_millis(5)), "5.00ms");
        assert_eq!(format_duration(Duration::from_secs(30)), "30.00s");
    }
}
