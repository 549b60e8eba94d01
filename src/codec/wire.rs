//! Line-oriented text format for event logs.
//!
//! ```text
//! F: 1
//! P: <samples> <self_ns> <children_ns> <coarse_time> <process_clock>
//! N: <id> <name>
//! T: <thread_id> <base>
//! E: <frame> <level> <id|name> <delta> <duration> [<cpu_ns>]
//! ```
//!
//! Each `E:` line is positioned relative to a running per-thread cursor that
//! starts at the `T:` base and moves to every event's start. With
//! `coarse_time` set, timestamps are 100 ns ticks.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::Path;
use std::str::{FromStr, SplitWhitespace};

use log::{debug, info};

use super::interner::NameInterner;
use crate::capture::{Calibration, Event, EventLog, Name};
use crate::utils::config::{
    COARSE_TICK_NS, EVENT_PREFIX, FORMAT_INLINE_NAMES, FORMAT_NAME_TABLE, FORMAT_PREFIX,
    NAME_PREFIX, PROPS_PREFIX, THREAD_PREFIX,
};
use crate::utils::error::CodecError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NameEncoding {
    /// Every event line carries its name
    Inline,
    /// Names are listed once in `N:` lines and referenced by id
    #[default]
    Table,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeResolution {
    #[default]
    Nanos,
    /// 100 ns ticks; lossy
    Coarse,
}

impl TimeResolution {
    fn tick_ns(self) -> u64 {
        match self {
            TimeResolution::Nanos => 1,
            TimeResolution::Coarse => COARSE_TICK_NS,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EncodeOptions {
    pub names: NameEncoding,
    pub resolution: TimeResolution,
    /// Append each event's CPU time
    pub with_cpu: bool,
}

impl EncodeOptions {
    pub fn new() -> Self {
        Self {
            with_cpu: true,
            ..Self::default()
        }
    }

    pub fn with_names(mut self, names: NameEncoding) -> Self {
        self.names = names;
        self
    }

    pub fn with_resolution(mut self, resolution: TimeResolution) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_cpu(mut self, with_cpu: bool) -> Self {
        self.with_cpu = with_cpu;
        self
    }
}

fn check_name(name: &str) -> Result<(), CodecError> {
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return Err(CodecError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Write `log` to `out`
pub fn serialize<W: Write>(log: &EventLog, mut out: W, options: &EncodeOptions) -> Result<(), CodecError> {
    let format = match options.names {
        NameEncoding::Inline => FORMAT_INLINE_NAMES,
        NameEncoding::Table => FORMAT_NAME_TABLE,
    };
    let tick = options.resolution.tick_ns();
    let process_clock = log.threads.values().flatten().any(|e| e.process_clock);

    writeln!(out, "{} {}", FORMAT_PREFIX, format)?;
    writeln!(
        out,
        "{} {} {} {} {} {}",
        PROPS_PREFIX,
        log.calibration.samples,
        log.calibration.self_ns,
        log.calibration.children_ns,
        u8::from(options.resolution == TimeResolution::Coarse),
        u8::from(process_clock)
    )?;

    let mut ids: HashMap<&str, u32> = HashMap::new();
    for event in log.threads.values().flatten() {
        check_name(&event.name)?;
        if options.names == NameEncoding::Table && !ids.contains_key(event.name.as_str()) {
            let id = ids.len() as u32;
            ids.insert(event.name.as_str(), id);
            writeln!(out, "{} {:3} {}", NAME_PREFIX, id, event.name)?;
        }
    }

    for (thread_id, events) in &log.threads {
        let Some(first) = events.first() else {
            continue;
        };
        let mut cursor = (first.start_ns / tick) as i64;
        writeln!(out, "{} {:3} {}", THREAD_PREFIX, thread_id, cursor)?;

        for event in events {
            let start = (event.start_ns / tick) as i64;
            let stop = (event.stop_ns / tick) as i64;
            write!(
                out,
                "{} {} {} ",
                EVENT_PREFIX,
                u8::from(event.frame),
                event.stack_level
            )?;
            match options.names {
                NameEncoding::Inline => write!(out, "{}", event.name)?,
                NameEncoding::Table => write!(out, "{}", ids[event.name.as_str()])?,
            }
            write!(out, " {} {}", start - cursor, stop - start)?;
            if options.with_cpu {
                write!(out, " {}", event.cpu_ns)?;
            }
            writeln!(out)?;
            cursor = start;
        }
    }
    out.flush()?;
    Ok(())
}

pub fn serialize_to_string(log: &EventLog, options: &EncodeOptions) -> Result<String, CodecError> {
    let mut buf = Vec::new();
    serialize(log, &mut buf, options)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Write `log` to a file
pub fn write_log(log: &EventLog, path: impl AsRef<Path>, options: &EncodeOptions) -> Result<(), CodecError> {
    let path = path.as_ref();
    info!("Writing event log to: {}", path.display());
    let file = File::create(path)?;
    serialize(log, BufWriter::new(file), options)
}

/// Cursor over one line's tokens that reports errors with the line number
struct Tokens<'a> {
    inner: SplitWhitespace<'a>,
    line: usize,
}

impl<'a> Tokens<'a> {
    fn error(&self, message: impl Into<String>) -> CodecError {
        CodecError::Parse {
            line: self.line,
            message: message.into(),
        }
    }

    fn word(&mut self, what: &str) -> Result<&'a str, CodecError> {
        let line = self.line;
        self.inner.next().ok_or_else(|| CodecError::Parse {
            line,
            message: format!("missing {}", what),
        })
    }

    fn number<T: FromStr>(&mut self, what: &str) -> Result<T, CodecError> {
        let word = self.word(what)?;
        word.parse()
            .map_err(|_| self.error(format!("invalid {}: {:?}", what, word)))
    }

    fn flag(&mut self, what: &str) -> Result<bool, CodecError> {
        match self.number::<u8>(what)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(self.error(format!("invalid {}: {}", what, other))),
        }
    }

    fn optional_number<T: FromStr>(&mut self, what: &str) -> Result<Option<T>, CodecError> {
        match self.inner.next() {
            None => Ok(None),
            Some(word) => word
                .parse()
                .map(Some)
                .map_err(|_| self.error(format!("invalid {}: {:?}", what, word))),
        }
    }
}

/// Reads event logs, sharing one name interner across files
#[derive(Debug, Default)]
pub struct Decoder {
    interner: NameInterner,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interner(&self) -> &NameInterner {
        &self.interner
    }

    pub fn decode_str(&mut self, text: &str) -> Result<EventLog, CodecError> {
        self.decode(text.as_bytes())
    }

    pub fn read_file(&mut self, path: impl AsRef<Path>) -> Result<EventLog, CodecError> {
        let path = path.as_ref();
        debug!("Reading event log from: {}", path.display());
        let file = File::open(path)?;
        self.decode(BufReader::new(file))
    }

    pub fn decode<R: BufRead>(&mut self, reader: R) -> Result<EventLog, CodecError> {
        let mut log = EventLog::default();
        let mut format = FORMAT_INLINE_NAMES;
        let mut seen_props = false;
        let mut tick = 1u64;
        let mut process_clock = false;
        let mut names: HashMap<u32, Name> = HashMap::new();
        let mut thread: Option<(u32, i64)> = None;

        for (idx, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| match e.kind() {
                ErrorKind::InvalidData => CodecError::Parse {
                    line: idx + 1,
                    message: "line is not valid UTF-8".to_string(),
                },
                _ => CodecError::Io(e),
            })?;
            let mut tokens = Tokens {
                inner: line.split_whitespace(),
                line: idx + 1,
            };
            let Some(prefix) = tokens.inner.next() else {
                continue;
            };

            match prefix {
                FORMAT_PREFIX => {
                    format = tokens.number("format")?;
                    if format != FORMAT_INLINE_NAMES && format != FORMAT_NAME_TABLE {
                        return Err(tokens.error(format!("unsupported format {}", format)));
                    }
                }
                PROPS_PREFIX => {
                    log.calibration = Calibration {
                        samples: tokens.number("sample count")?,
                        self_ns: tokens.number("self overhead")?,
                        children_ns: tokens.number("children overhead")?,
                    };
                    tick = if tokens.flag("time resolution")? {
                        COARSE_TICK_NS
                    } else {
                        1
                    };
                    process_clock = tokens.flag("clock kind")?;
                    seen_props = true;
                }
                NAME_PREFIX => {
                    let id = tokens.number("name id")?;
                    let name = tokens.word("name")?;
                    names.insert(id, self.interner.intern(name));
                }
                THREAD_PREFIX => {
                    let thread_id = tokens.number("thread id")?;
                    let base: i64 = tokens.number("base time")?;
                    if base < 0 || (base as u64).checked_mul(tick).is_none() {
                        return Err(tokens.error("base time out of range"));
                    }
                    log.threads.entry(thread_id).or_default();
                    thread = Some((thread_id, base));
                }
                EVENT_PREFIX => {
                    let Some((thread_id, cursor)) = thread.as_mut() else {
                        return Err(tokens.error("event outside of a thread section"));
                    };
                    let frame = tokens.flag("frame flag")?;
                    let stack_level = tokens.number("stack level")?;
                    let name = if format == FORMAT_NAME_TABLE {
                        let id: u32 = tokens.number("name id")?;
                        names
                            .get(&id)
                            .cloned()
                            .ok_or(CodecError::UnknownNameId { line: idx + 1, id })?
                    } else {
                        self.interner.intern(tokens.word("name")?)
                    };
                    let delta: i64 = tokens.number("time delta")?;
                    let duration: u64 = tokens.number("duration")?;
                    let cpu_ns = tokens.optional_number("cpu time")?.unwrap_or(0);

                    let start = cursor
                        .checked_add(delta)
                        .ok_or_else(|| tokens.error("timestamp overflow"))?;
                    if start < 0 {
                        return Err(tokens.error("event starts before time zero"));
                    }
                    *cursor = start;
                    let start_ns = (start as u64)
                        .checked_mul(tick)
                        .ok_or_else(|| tokens.error("timestamp overflow"))?;
                    let stop_ns = duration
                        .checked_mul(tick)
                        .and_then(|d| start_ns.checked_add(d))
                        .ok_or_else(|| tokens.error("timestamp overflow"))?;
                    let event = Event {
                        name,
                        stack_level,
                        frame,
                        process_clock,
                        start_ns,
                        stop_ns,
                        cpu_ns,
                    };
                    log.threads.entry(*thread_id).or_default().push(event);
                }
                other => return Err(tokens.error(format!("unknown line prefix {:?}", other))),
            }
        }

        if !seen_props {
            return Err(CodecError::MissingHeader);
        }
        debug!(
            "Decoded {} events in {} threads",
            log.event_count(),
            log.threads.len()
        );
        Ok(log)
    }
}

/// Decode one log with a fresh interner
pub fn deserialize<R: BufRead>(reader: R) -> Result<EventLog, CodecError> {
    Decoder::new().decode(reader)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_log() -> EventLog {
        let mut log = EventLog::new(Calibration::new(1000, 42_000, 97_000));
        log.threads.insert(
            0,
            vec![
                Event::new("frame", 0, 1_000, 9_000).with_frame(true),
                Event::new("update", 1, 1_200, 4_000).with_cpu(2_500),
                Event::new("draw", 1, 4_100, 8_800),
            ],
        );
        log.threads
            .insert(1, vec![Event::new("worker", 0, 500, 20_000)]);
        log
    }

    #[test]
    fn test_header_and_name_table() {
        let text = serialize_to_string(&sample_log(), &EncodeOptions::new()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "F: 1");
        assert_eq!(lines[1], "P: 1000 42000 97000 0 0");
        assert_eq!(lines[2], "N:   0 frame");
        assert_eq!(lines[6], "T:   0 1000");
        assert_eq!(lines[7], "E: 1 0 0 0 8000 0");
        assert_eq!(lines[8], "E: 0 1 1 200 2800 2500");
        assert_eq!(lines[9], "E: 0 1 2 2900 4700 0");
    }

    #[test]
    fn test_inline_round_trip() {
        let log = sample_log();
        let options = EncodeOptions::new().with_names(NameEncoding::Inline);
        let text = serialize_to_string(&log, &options).unwrap();
        let back = Decoder::new().decode_str(&text).unwrap();

        assert_eq!(back.calibration, log.calibration);
        for (id, events) in &log.threads {
            let decoded = &back.threads[id];
            assert_eq!(decoded.len(), events.len());
            for (a, b) in events.iter().zip(decoded) {
                assert!(a.same_interval(b), "{a:?} != {b:?}");
                assert_eq!(a.cpu_ns, b.cpu_ns);
            }
        }
    }

    #[test]
    fn test_coarse_resolution_scales_ticks() {
        let mut log = EventLog::new(Calibration::new(1, 1, 1));
        log.threads
            .insert(0, vec![Event::new("f", 0, 1_000, 2_500)]);
        let options = EncodeOptions::new().with_resolution(TimeResolution::Coarse);
        let text = serialize_to_string(&log, &options).unwrap();
        assert!(text.contains("E: 0 0 0 0 15 0"));

        let back = deserialize(text.as_bytes()).unwrap();
        assert_eq!(back.threads[&0][0].start_ns, 1_000);
        assert_eq!(back.threads[&0][0].stop_ns, 2_500);
    }

    #[test]
    fn test_unknown_name_id_reports_line() {
        let text = "F: 1\nP: 10 1 2 0 0\nN: 0 a\nT: 0 0\nE: 0 0 7 0 5\n";
        match deserialize(text.as_bytes()) {
            Err(CodecError::UnknownNameId { line, id }) => {
                assert_eq!(line, 5);
                assert_eq!(id, 7);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_malformed_line_reports_line() {
        let text = "F: 0\nP: 10 1 2 0 0\nT: 0 0\nE: 0 zero a 0 5\n";
        match deserialize(text.as_bytes()) {
            Err(CodecError::Parse { line, .. }) => assert_eq!(line, 4),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_missing_header() {
        assert!(matches!(
            deserialize("F: 0\n".as_bytes()),
            Err(CodecError::MissingHeader)
        ));
    }

    #[test]
    fn test_name_with_space_is_rejected() {
        let mut log = EventLog::new(Calibration::default());
        log.threads.insert(0, vec![Event::new("two words", 0, 0, 1)]);
        assert!(matches!(
            serialize_to_string(&log, &EncodeOptions::new()),
            Err(CodecError::InvalidName(_))
        ));
    }

    #[test]
    fn test_process_clock_flag_round_trips() {
        let mut log = EventLog::new(Calibration::default());
        let mut event = Event::new("p", 0, 0, 10);
        event.process_clock = true;
        log.threads.insert(0, vec![event]);
        let text = serialize_to_string(&log, &EncodeOptions::new()).unwrap();
        let back = deserialize(text.as_bytes()).unwrap();
        assert!(back.threads[&0][0].process_clock);
    }

    fn parse_error_line(text: &[u8]) -> (usize, String) {
        match deserialize(text) {
            Err(CodecError::Parse { line, message }) => (line, message),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_duration_overflow_is_parse_error() {
        let text = "F: 0\nP: 10 1 1 0 0\nT: 0 0\nE: 0 0 a 5 18446744073709551615\n";
        assert_eq!(
            parse_error_line(text.as_bytes()),
            (4, "timestamp overflow".to_string())
        );
    }

    #[test]
    fn test_cursor_overflow_is_parse_error() {
        let text = "F: 0\nP: 10 1 1 0 0\nT: 0 9223372036854775807\nE: 0 0 a 1 1\n";
        assert_eq!(
            parse_error_line(text.as_bytes()),
            (4, "timestamp overflow".to_string())
        );
    }

    #[test]
    fn test_coarse_tick_overflow_is_parse_error() {
        let text = "F: 0\nP: 10 1 1 1 0\nT: 0 0\nE: 0 0 a 922337203685477580 1\n";
        assert_eq!(
            parse_error_line(text.as_bytes()),
            (4, "timestamp overflow".to_string())
        );
    }

    #[test]
    fn test_base_out_of_range() {
        let negative = "F: 0\nP: 10 1 1 0 0\nT: 0 -5\n";
        assert_eq!(parse_error_line(negative.as_bytes()).0, 3);

        let coarse = "F: 0\nP: 10 1 1 1 0\nT: 0 9223372036854775807\n";
        assert_eq!(
            parse_error_line(coarse.as_bytes()),
            (3, "base time out of range".to_string())
        );
    }

    #[test]
    fn test_event_before_time_zero() {
        let text = "F: 0\nP: 10 1 1 0 0\nT: 0 10\nE: 0 0 a -11 1\n";
        assert_eq!(
            parse_error_line(text.as_bytes()),
            (4, "event starts before time zero".to_string())
        );
    }

    #[test]
    fn test_invalid_utf8_reports_line() {
        let mut bytes = b"F: 0\nP: 10 1 1 0 0\nT: 0 0\n".to_vec();
        bytes.extend_from_slice(b"E: 0 0 \xff\xfe 0 1\n");
        assert_eq!(parse_error_line(&bytes).0, 4);
    }
}
