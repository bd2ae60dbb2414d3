//! Log parser: turns a saved message log back into timestamped events.
//!
//! Two line grammars, tried in order:
//! - event:   `HH:MM:SS.mmm SOURCE ADDRESS (TAGS): ARG, ARG, ...`
//! - comment: `HH:MM:SS.mmm *** TEXT`
//!
//! Anything else is reported and skipped. Parsing never fails as a whole;
//! every problem becomes a `ParseDiagnostic` handed to the caller's callback
//! as soon as it is found.

use std::fmt;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use osc_console_types::{LogEvent, MessageRecord, OscArg};

use crate::log_format::{format_time_of_day, time_from_parts, COMMENT_MARKER};

static EVENT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{2}):(\d{2}):(\d{2})(?:\.(\d{3}))? (\S+) (\S+) \(([^)]*)\):(?: (.*))?$")
        .expect("event line regex")
});

static COMMENT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{2}):(\d{2}):(\d{2})(?:\.(\d{3}))? \*\*\* ?(.*)$").expect("comment line regex")
});

/// A non-fatal finding while parsing. Line numbers are 1-based.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseDiagnostic {
    /// A comment line; shown to the user, never replayed.
    Comment { timestamp: f64, text: String },
    /// Tag outside `i h f d s S b`; the tag and its argument were dropped.
    UnknownTag { line: usize, tag: char },
    /// An argument did not read as its tag's type; line skipped.
    BadArgument { line: usize, tag: char, value: String },
    /// Tag and argument counts differ; line skipped.
    ArgumentCount {
        line: usize,
        expected: usize,
        found: usize,
    },
    /// Matched neither grammar; line skipped.
    Unparseable { line: usize, text: String },
    /// Events were not in time order and have been sorted.
    Reordered,
}

impl ParseDiagnostic {
    pub fn is_comment(&self) -> bool {
        matches!(self, Self::Comment { .. })
    }
}

impl fmt::Display for ParseDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Comment { timestamp, text } => {
                write!(f, "[{}] {}", format_time_of_day(*timestamp), text)
            }
            Self::UnknownTag { line, tag } => {
                write!(f, "Line {}: unknown type tag '{}' dropped", line, tag)
            }
            Self::BadArgument { line, tag, value } => {
                write!(f, "Line {}: cannot read '{}' as type '{}'", line, value, tag)
            }
            Self::ArgumentCount {
                line,
                expected,
                found,
            } => write!(
                f,
                "Line {}: expected {} arguments, found {}",
                line, expected, found
            ),
            Self::Unparseable { line, text } => {
                write!(f, "Unable to parse line {}: {}", line, text)
            }
            Self::Reordered => f.write_str("Log lines were out of time order and have been sorted"),
        }
    }
}

/// Output of `parse_log`.
#[derive(Debug, Clone, Default)]
pub struct ParsedLog {
    /// Ascending by timestamp; equal timestamps keep file order.
    pub events: Vec<LogEvent>,
    /// Timestamp of the first event, 0 if there are none.
    pub first_time: f64,
    /// Timestamp of the last event plus one second, 0 if there are none.
    pub last_time: f64,
    pub diagnostics: Vec<ParseDiagnostic>,
}

/// Parse a whole log. `on_diagnostic` sees each diagnostic as it is found.
pub fn parse_log(text: &str, on_diagnostic: &mut dyn FnMut(&ParseDiagnostic)) -> ParsedLog {
    let mut events = Vec::new();
    let mut diagnostics = Vec::new();
    let mut report = |d: ParseDiagnostic| {
        on_diagnostic(&d);
        diagnostics.push(d);
    };

    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        if line.trim().is_empty() {
            continue;
        }
        // a note that happens to look like "SRC ADDR (TAGS):" is still a note
        let event_caps = EVENT_LINE
            .captures(line)
            .filter(|caps| &caps[5] != COMMENT_MARKER);
        if let Some(caps) = event_caps {
            if let Some(event) = parse_event(&caps, line_no, &mut report) {
                events.push(event);
            }
        } else if let Some(caps) = COMMENT_LINE.captures(line) {
            report(ParseDiagnostic::Comment {
                timestamp: capture_time(&caps),
                text: caps[5].to_string(),
            });
        } else {
            report(ParseDiagnostic::Unparseable {
                line: line_no,
                text: line.to_string(),
            });
        }
    }

    if events
        .windows(2)
        .any(|w| w[1].timestamp < w[0].timestamp)
    {
        // sort_by is stable, so equal timestamps keep file order
        events.sort_by(|a: &LogEvent, b: &LogEvent| a.timestamp.total_cmp(&b.timestamp));
        report(ParseDiagnostic::Reordered);
    }

    let first_time = events.first().map_or(0.0, |e| e.timestamp);
    let last_time = events.last().map_or(0.0, |e| e.timestamp + 1.0);

    ParsedLog {
        events,
        first_time,
        last_time,
        diagnostics,
    }
}

fn capture_time(caps: &Captures) -> f64 {
    let field = |i: usize| -> u32 {
        caps.get(i)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0)
    };
    time_from_parts(field(1), field(2), field(3), field(4))
}

fn parse_event(
    caps: &Captures,
    line: usize,
    report: &mut impl FnMut(ParseDiagnostic),
) -> Option<LogEvent> {
    let timestamp = capture_time(caps);
    let source = &caps[5];
    let address = &caps[6];
    let tags: Vec<char> = caps[7].chars().collect();
    let rest = caps.get(8).map_or("", |m| m.as_str());

    let raw_args: Vec<&str> = if tags.is_empty() {
        if rest.is_empty() {
            Vec::new()
        } else {
            rest.split(", ").collect()
        }
    } else {
        // the last argument keeps any ", " it contains
        rest.splitn(tags.len(), ", ").collect()
    };
    if raw_args.len() != tags.len() {
        report(ParseDiagnostic::ArgumentCount {
            line,
            expected: tags.len(),
            found: raw_args.len(),
        });
        return None;
    }

    let mut type_tags = String::with_capacity(tags.len());
    let mut args = Vec::with_capacity(tags.len());
    for (&tag, &raw) in tags.iter().zip(&raw_args) {
        let value = match tag {
            'i' | 'h' => raw.trim().parse::<i64>().ok().map(OscArg::Int),
            'f' | 'd' => raw.trim().parse::<f64>().ok().map(OscArg::Float),
            's' | 'S' => Some(OscArg::Str(raw.to_string())),
            'b' => Some(decode_hex(raw).map_or_else(|| OscArg::Str(raw.to_string()), OscArg::Blob)),
            _ => {
                report(ParseDiagnostic::UnknownTag { line, tag });
                continue;
            }
        };
        match value {
            Some(arg) => {
                type_tags.push(tag);
                args.push(arg);
            }
            None => {
                report(ParseDiagnostic::BadArgument {
                    line,
                    tag,
                    value: raw.to_string(),
                });
                return None;
            }
        }
    }

    Some(LogEvent::new(
        timestamp,
        MessageRecord::new(address, type_tags, args, source),
    ))
}

/// Blobs are logged as lowercase hex; anything else is kept as text.
fn decode_hex(text: &str) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 || !text.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&text[i..i + 2], 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_format::format_event_line;

    fn parse(text: &str) -> ParsedLog {
        parse_log(text, &mut |_| {})
    }

    #[test]
    fn parses_event_lines() {
        let log = parse(
            "00:00:01.000 127.0.0.1:9 /foo (i): 5\n\
             00:00:02.000 127.0.0.1:9 /bar (f): 1.5\n",
        );
        assert!(log.diagnostics.is_empty());
        assert_eq!(log.events.len(), 2);
        assert_eq!(log.events[0].timestamp, 1.0);
        assert_eq!(log.events[0].message.address, "/foo");
        assert_eq!(log.events[0].message.args, vec![OscArg::Int(5)]);
        assert_eq!(log.events[1].message.args, vec![OscArg::Float(1.5)]);
        assert_eq!(log.first_time, 1.0);
        assert_eq!(log.last_time, 3.0);
    }

    #[test]
    fn timestamp_fields() {
        let log = parse("01:02:03.042 src /x (): ");
        assert_eq!(log.events[0].timestamp, time_from_parts(1, 2, 3, 42));
        assert!(log.events[0].message.args.is_empty());
        assert_eq!(log.events[0].message.type_tags, "");
    }

    #[test]
    fn accepts_timestamps_without_millis() {
        let log = parse("10:00:00 127.0.0.1:9 /foo (s): hi");
        assert_eq!(log.events[0].timestamp, 36_000.0);
    }

    #[test]
    fn all_recognised_tags() {
        let log = parse("00:00:01.000 src /all (ihfdsSb): 1, -2, 0.5, 2.25, a, b, c");
        assert!(log.diagnostics.is_empty());
        let msg = &log.events[0].message;
        assert_eq!(msg.type_tags, "ihfdsSb");
        assert_eq!(
            msg.args,
            vec![
                OscArg::Int(1),
                OscArg::Int(-2),
                OscArg::Float(0.5),
                OscArg::Float(2.25),
                OscArg::Str("a".into()),
                OscArg::Str("b".into()),
                OscArg::Str("c".into()),
            ]
        );
    }

    #[test]
    fn hex_blob_text_decodes_to_bytes() {
        let log = parse("00:00:01.000 src /blob (bb): 00ab10, not hex");
        assert!(log.diagnostics.is_empty());
        assert_eq!(
            log.events[0].message.args,
            vec![
                OscArg::Blob(vec![0x00, 0xab, 0x10]),
                OscArg::Str("not hex".into()),
            ]
        );
    }

    #[test]
    fn unknown_tag_dropped_with_its_argument() {
        let mut seen = Vec::new();
        let log = parse_log("00:00:01.000 src /x (iTf): 1, true, 2.0", &mut |d| {
            seen.push(d.clone())
        });
        assert_eq!(seen, vec![ParseDiagnostic::UnknownTag { line: 1, tag: 'T' }]);
        let msg = &log.events[0].message;
        assert_eq!(msg.type_tags, "if");
        assert_eq!(msg.args, vec![OscArg::Int(1), OscArg::Float(2.0)]);
    }

    #[test]
    fn comment_lines_are_reported_not_replayed() {
        let mut seen = Vec::new();
        let log = parse_log(
            "00:00:01.000 *** Opening server on port 37000\n\
             00:00:02.000 src /x (i): 1\n",
            &mut |d| seen.push(d.clone()),
        );
        assert_eq!(log.events.len(), 1);
        assert_eq!(
            seen,
            vec![ParseDiagnostic::Comment {
                timestamp: 1.0,
                text: "Opening server on port 37000".into()
            }]
        );
        assert!(seen[0].is_comment());
    }

    #[test]
    fn note_shaped_like_event_stays_a_comment() {
        let log = parse("00:00:01.000 *** check (i): 5");
        assert!(log.events.is_empty());
        assert!(log.diagnostics[0].is_comment());
    }

    #[test]
    fn garbage_lines_skipped() {
        let log = parse("hello\n00:00:02.000 src /x (i): 1\nnope nope\n");
        assert_eq!(log.events.len(), 1);
        assert_eq!(
            log.diagnostics,
            vec![
                ParseDiagnostic::Unparseable {
                    line: 1,
                    text: "hello".into()
                },
                ParseDiagnostic::Unparseable {
                    line: 3,
                    text: "nope nope".into()
                },
            ]
        );
        assert_eq!(
            log.diagnostics[0].to_string(),
            "Unable to parse line 1: hello"
        );
    }

    #[test]
    fn bad_argument_skips_line() {
        let log = parse("00:00:01.000 src /x (i): five");
        assert!(log.events.is_empty());
        assert_eq!(
            log.diagnostics,
            vec![ParseDiagnostic::BadArgument {
                line: 1,
                tag: 'i',
                value: "five".into()
            }]
        );
    }

    #[test]
    fn argument_count_mismatch_skips_line() {
        let log = parse("00:00:01.000 src /x (ii): 5");
        assert!(log.events.is_empty());
        assert_eq!(
            log.diagnostics,
            vec![ParseDiagnostic::ArgumentCount {
                line: 1,
                expected: 2,
                found: 1
            }]
        );
    }

    #[test]
    fn last_string_keeps_commas() {
        let log = parse("00:00:01.000 src /x (is): 1, a, b, c");
        assert_eq!(
            log.events[0].message.args[1],
            OscArg::Str("a, b, c".into())
        );
    }

    #[test]
    fn empty_input() {
        let log = parse("");
        assert!(log.events.is_empty());
        assert_eq!(log.first_time, 0.0);
        assert_eq!(log.last_time, 0.0);
    }

    #[test]
    fn blank_lines_are_ignored() {
        let log = parse("\n   \n00:00:01.000 src /x (): \n\n");
        assert_eq!(log.events.len(), 1);
        assert!(log.diagnostics.is_empty());
    }

    #[test]
    fn out_of_order_lines_are_sorted_stably() {
        let log = parse(
            "00:00:03.000 src /c (): \n\
             00:00:01.000 src /a (): \n\
             00:00:01.000 src /b (): \n",
        );
        let addrs: Vec<_> = log
            .events
            .iter()
            .map(|e| e.message.address.as_str())
            .collect();
        assert_eq!(addrs, vec!["/a", "/b", "/c"]);
        assert_eq!(log.diagnostics, vec![ParseDiagnostic::Reordered]);
        assert_eq!(log.first_time, 1.0);
        assert_eq!(log.last_time, 4.0);
    }

    #[test]
    fn windows_line_endings() {
        let log = parse("00:00:01.000 src /x (i): 1\r\n00:00:02.000 src /y (i): 2\r\n");
        assert_eq!(log.events.len(), 2);
        assert_eq!(log.events[1].message.args, vec![OscArg::Int(2)]);
    }

    #[test]
    fn formatted_lines_parse_back() {
        // distinct ms-resolution timestamps, tags restricted to i/f/s
        let originals: Vec<LogEvent> = (0..20u32)
            .map(|n| {
                let ts = time_from_parts(n % 24, (n * 7) % 60, (n * 13) % 60, (n * 37) % 1000);
                let args = vec![
                    OscArg::Int(n as i64 * 1000 - 7),
                    OscArg::Float(n as f64 / 8.0),
                    OscArg::Str(format!("item{}", n)),
                ];
                LogEvent::new(ts, MessageRecord::new(format!("/path/{}", n), "ifs", args, "10.0.0.1:8000"))
            })
            .collect();
        let mut sorted = originals.clone();
        sorted.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

        let text: String = sorted
            .iter()
            .map(|e| format_event_line(e.timestamp, &e.message) + "\n")
            .collect();
        let log = parse(&text);
        assert!(log.diagnostics.is_empty());
        assert_eq!(log.events, sorted);
    }
}
