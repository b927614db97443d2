//! JSONL session reader: parses recorded `ticks.jsonl` files back into TickFrames.
//!
//! Reads the header line (format, tick rate, base speed) then yields frames
//! one at a time. Works with any `BufRead`: files, in-memory buffers, stdin.

use crate::types::{CompactTick, TickFrame};
use std::io::BufRead;

/// Value of the header's `"format"` field.
pub const FORMAT: &str = "motion-tempo";

/// Parsed JSONL header (first line of a session file).
#[derive(Debug)]
pub struct SessionHeader {
    pub tick_hz: u32,
    pub base_speed: f64,
    pub raw: serde_json::Value,
}

/// Line-by-line JSONL session reader.
pub struct SessionReader<R: BufRead> {
    reader: R,
    pub header: SessionHeader,
    line_buf: String,
}

impl<R: BufRead> SessionReader<R> {
    /// Read and validate the header line. Fails if it is missing,
    /// unparseable, or not a `"format": "motion-tempo"` header.
    pub fn open(mut reader: R) -> Result<Self, String> {
        let mut first_line = String::new();
        reader
            .read_line(&mut first_line)
            .map_err(|e| format!("read header: {}", e))?;

        let first_line = first_line.trim();
        if first_line.is_empty() {
            return Err("empty file".into());
        }

        let raw: serde_json::Value =
            serde_json::from_str(first_line).map_err(|e| format!("parse header: {}", e))?;

        let format = raw["format"].as_str().ok_or("missing \"format\" field")?;
        if format != FORMAT {
            return Err(format!("unknown format: {}", format));
        }

        let tick_hz = raw["tick_hz"].as_u64().unwrap_or(60) as u32;
        let base_speed = raw["base_speed"].as_f64().unwrap_or(1.0);

        Ok(Self {
            reader,
            header: SessionHeader {
                tick_hz,
                base_speed,
                raw,
            },
            line_buf: String::new(),
        })
    }

    /// Read the next frame. Returns `None` at EOF, `Err` for unparseable lines.
    pub fn next_frame(&mut self) -> Option<Result<TickFrame, String>> {
        loop {
            self.line_buf.clear();
            match self.reader.read_line(&mut self.line_buf) {
                Ok(0) => return None,
                Ok(_) => {
                    let trimmed = self.line_buf.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    return Some(
                        serde_json::from_str::<CompactTick>(trimmed)
                            .map(TickFrame::from)
                            .map_err(|e| format!("parse frame: {}", e)),
                    );
                }
                Err(e) => return Some(Err(format!("read line: {}", e))),
            }
        }
    }

    /// Read all remaining frames, skipping malformed lines.
    pub fn read_all(mut self) -> Vec<TickFrame> {
        let mut frames = Vec::new();
        while let Some(result) = self.next_frame() {
            if let Ok(frame) = result {
                frames.push(frame);
            }
        }
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PermissionState, SessionState};
    use std::io::Cursor;

    fn header() -> String {
        r#"{"format":"motion-tempo","tick_hz":30,"base_speed":1.1}"#.to_string()
    }

    fn line(ts: u64, rate: Option<f64>) -> String {
        serde_json::to_string(&CompactTick {
            t: ts,
            n: ts / 16,
            ta: 1.0,
            ca: 0.8,
            pc: 6.7,
            ts: 1.10,
            ds: 1.10,
            du: false,
            r: rate,
            ps: rate.map(|r: f64| -12.0 * r.log2()),
            s: SessionState::Playing,
            pm: PermissionState::Granted,
        })
        .unwrap()
    }

    #[test]
    fn test_open_valid_header() {
        let reader = SessionReader::open(Cursor::new(header() + "\n")).unwrap();
        assert_eq!(reader.header.tick_hz, 30);
        assert!((reader.header.base_speed - 1.1).abs() < 1e-12);
    }

    #[test]
    fn test_open_rejects_bad_headers() {
        assert!(SessionReader::open(Cursor::new("")).is_err());
        let err = SessionReader::open(Cursor::new("{\"tick_hz\":60}\n")).err().unwrap();
        assert!(err.contains("format"), "got: {}", err);
        let err = SessionReader::open(Cursor::new("{\"format\":\"steel\"}\n")).err().unwrap();
        assert!(err.contains("unknown format"), "got: {}", err);
    }

    #[test]
    fn test_frames_and_applied_params() {
        let data = format!("{}\n{}\n\n{}\n", header(), line(16, None), line(32, Some(1.1)));
        let frames = SessionReader::open(Cursor::new(data)).unwrap().read_all();
        assert_eq!(frames.len(), 2);
        assert!(frames[0].applied.is_none());
        let p = frames[1].applied.unwrap();
        assert!((p.rate - 1.1).abs() < 1e-12);
        assert!(p.pitch_semitones.unwrap() < 0.0);
    }

    #[test]
    fn test_malformed_line() {
        let data = format!("{}\ngarbage\n{}\n", header(), line(48, None));
        let mut reader = SessionReader::open(Cursor::new(data)).unwrap();
        assert!(reader.next_frame().unwrap().is_err());
        assert_eq!(reader.next_frame().unwrap().unwrap().timestamp_ms, 48);
        assert!(reader.next_frame().is_none());
    }
}
