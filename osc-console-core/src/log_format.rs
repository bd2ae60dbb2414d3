//! Text format shared by the message log and the log parser.
//!
//! Event line:   `HH:MM:SS.mmm SOURCE ADDRESS (TAGS): ARG, ARG, ...`
//! Comment line: `HH:MM:SS.mmm *** TEXT`

use chrono::Timelike;

use osc_console_types::MessageRecord;

/// Marker that turns a line into a comment.
pub const COMMENT_MARKER: &str = "***";

/// Seconds since local midnight, right now.
pub fn local_time_of_day() -> f64 {
    let now = chrono::Local::now();
    // nanosecond() exceeds 1e9 during a leap second
    let nanos = now.nanosecond().min(999_999_999);
    now.num_seconds_from_midnight() as f64 + nanos as f64 / 1e9
}

/// Render seconds-since-midnight as `HH:MM:SS.mmm`. Negative input renders as zero.
pub fn format_time_of_day(secs: f64) -> String {
    let total_ms = if secs.is_finite() && secs > 0.0 {
        (secs * 1000.0).round() as u64
    } else {
        0
    };
    let h = total_ms / 3_600_000;
    let m = (total_ms / 60_000) % 60;
    let s = (total_ms / 1000) % 60;
    let ms = total_ms % 1000;
    format!("{:02}:{:02}:{:02}.{:03}", h, m, s, ms)
}

/// Convert clock fields to seconds since midnight.
pub fn time_from_parts(hours: u32, minutes: u32, seconds: u32, millis: u32) -> f64 {
    3600.0 * hours as f64 + 60.0 * minutes as f64 + seconds as f64 + 0.001 * millis as f64
}

/// Parse `HH:MM:SS`, `HH:MM:SS.mmm`, `MM:SS(.mmm)` or plain seconds.
pub fn parse_time_of_day(text: &str) -> Option<f64> {
    let text = text.trim();
    if !text.contains(':') {
        let secs: f64 = text.parse().ok()?;
        return (secs.is_finite() && secs >= 0.0).then_some(secs);
    }

    let (clock, millis) = match text.split_once('.') {
        Some((clock, frac)) => {
            if frac.is_empty() || frac.len() > 3 || !frac.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            // ".5" means 500 ms
            let padded = format!("{:0<3}", frac);
            (clock, padded.parse::<u32>().ok()?)
        }
        None => (text, 0),
    };

    let fields: Vec<u32> = clock
        .split(':')
        .map(|f| f.parse::<u32>().ok())
        .collect::<Option<Vec<_>>>()?;
    match fields.as_slice() {
        [h, m, s] if *m < 60 && *s < 60 => Some(time_from_parts(*h, *m, *s, millis)),
        [m, s] if *s < 60 => Some(time_from_parts(0, *m, *s, millis)),
        _ => None,
    }
}

/// Format one received or replayed message as a log line.
pub fn format_event_line(timestamp: f64, record: &MessageRecord) -> String {
    format!(
        "{} {} {} ({}): {}",
        format_time_of_day(timestamp),
        record.source,
        record.address,
        record.type_tags,
        record.joined_args()
    )
}

/// Format a comment line. Comments are shown on replay but never dispatched.
pub fn format_comment_line(timestamp: f64, text: &str) -> String {
    format!("{} {} {}", format_time_of_day(timestamp), COMMENT_MARKER, text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use osc_console_types::OscArg;

    #[test]
    fn formats_time_of_day() {
        assert_eq!(format_time_of_day(0.0), "00:00:00.000");
        assert_eq!(format_time_of_day(1.5), "00:00:01.500");
        assert_eq!(format_time_of_day(3723.042), "01:02:03.042");
        assert_eq!(format_time_of_day(-4.0), "00:00:00.000");
    }

    #[test]
    fn parses_clock_forms() {
        assert_eq!(parse_time_of_day("01:02:03.042"), Some(time_from_parts(1, 2, 3, 42)));
        assert_eq!(parse_time_of_day("01:02:03"), Some(3723.0));
        assert_eq!(parse_time_of_day("02:03.5"), Some(time_from_parts(0, 2, 3, 500)));
        assert_eq!(parse_time_of_day("12.25"), Some(12.25));
    }

    #[test]
    fn rejects_bad_clock_forms() {
        assert_eq!(parse_time_of_day("aa:bb:cc"), None);
        assert_eq!(parse_time_of_day("00:61:00"), None);
        assert_eq!(parse_time_of_day("00:00:00.1234"), None);
        assert_eq!(parse_time_of_day("-3"), None);
    }

    #[test]
    fn formats_event_line() {
        let rec = MessageRecord::new(
            "/foo",
            "if",
            vec![OscArg::Int(5), OscArg::Float(1.5)],
            "127.0.0.1:9",
        );
        assert_eq!(
            format_event_line(1.0, &rec),
            "00:00:01.000 127.0.0.1:9 /foo (if): 5, 1.5"
        );
    }

    #[test]
    fn formats_comment_line() {
        assert_eq!(
            format_comment_line(61.25, "take two"),
            "00:01:01.250 *** take two"
        );
    }

    #[test]
    fn local_time_is_within_a_day() {
        let t = local_time_of_day();
        assert!((0.0..86_401.0).contains(&t));
    }
}
