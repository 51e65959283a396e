//! JSONL frequency log reader: replays recorded analyser output.
//!
//! First line is a header `{"format":"visumusic-frequencies","rate_hz":20}`,
//! every following line one sample `{"t":50000,"hz":440.0}` (`"hz":null` for
//! no dominant frequency). Works with any `BufRead`: files, in-memory
//! buffers, stdin.

use crate::types::{FrequencySample, SessionClock};
use crossbeam_channel::Sender;
use log::{info, warn};
use std::io::BufRead;
use std::thread;
use std::time::Duration;

pub const LOG_FORMAT: &str = "visumusic-frequencies";

/// Parsed header line.
#[derive(Debug)]
pub struct LogHeader {
    pub format: String,
    pub rate_hz: u32,
    pub raw: serde_json::Value,
}

/// Line-by-line frequency log reader.
pub struct SampleReader<R: BufRead> {
    reader: R,
    pub header: LogHeader,
    line_buf: String,
}

impl<R: BufRead> SampleReader<R> {
    /// Read and validate the header line.
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

        let format = raw["format"]
            .as_str()
            .ok_or("missing \"format\" field")?
            .to_string();
        if format != LOG_FORMAT {
            return Err(format!("unknown format: {}", format));
        }
        let rate_hz = raw["rate_hz"].as_u64().unwrap_or(20) as u32;

        Ok(Self {
            reader,
            header: LogHeader {
                format,
                rate_hz,
                raw,
            },
            line_buf: String::new(),
        })
    }

    /// Read the next sample. `None` at EOF, `Err` for unparseable lines.
    pub fn next_sample(&mut self) -> Option<Result<FrequencySample, String>> {
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
                        serde_json::from_str::<FrequencySample>(trimmed)
                            .map_err(|e| format!("parse sample: {}", e)),
                    );
                }
                Err(e) => return Some(Err(format!("read line: {}", e))),
            }
        }
    }

    /// Read all remaining samples, skipping malformed lines.
    pub fn read_all(mut self) -> Vec<FrequencySample> {
        let mut samples = Vec::new();
        let mut skipped = 0;
        while let Some(result) = self.next_sample() {
            match result {
                Ok(s) => samples.push(s),
                Err(_) => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!("Skipped {} malformed line(s)", skipped);
        }
        samples
    }
}

/// Sends recorded samples to the coordinator at their recorded pace.
pub struct Replay {
    samples: Vec<FrequencySample>,
    clock: SessionClock,
    tx: Sender<FrequencySample>,
}

impl Replay {
    pub fn new(samples: Vec<FrequencySample>, clock: SessionClock, tx: Sender<FrequencySample>) -> Self {
        Self { samples, clock, tx }
    }

    /// Blocks until every sample is sent or the coordinator is gone.
    /// Timestamps are re-based onto the session clock.
    pub fn run(self) {
        info!("Replaying {} samples", self.samples.len());
        let Some(first) = self.samples.first().map(|s| s.timestamp_us) else {
            return;
        };
        let start = self.clock.now_us();
        for sample in &self.samples {
            let due = start + sample.timestamp_us.saturating_sub(first);
            let now = self.clock.now_us();
            if due > now {
                thread::sleep(Duration::from_micros(due - now));
            }
            let rebased = FrequencySample::new(self.clock.now_us(), sample.frequency_hz);
            if self.tx.send(rebased).is_err() {
                return;
            }
        }
        info!("Replay complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::io::Cursor;

    fn header() -> String {
        format!(r#"{{"format":"{}","rate_hz":10}}"#, LOG_FORMAT)
    }

    #[test]
    fn test_open_valid_header() {
        let reader = SampleReader::open(Cursor::new(header() + "\n")).unwrap();
        assert_eq!(reader.header.format, LOG_FORMAT);
        assert_eq!(reader.header.rate_hz, 10);
    }

    #[test]
    fn test_open_missing_format() {
        let err = SampleReader::open(Cursor::new("{\"rate_hz\":10}\n")).err().unwrap();
        assert!(err.contains("format"), "got: {}", err);
    }

    #[test]
    fn test_open_wrong_format() {
        let err = SampleReader::open(Cursor::new("{\"format\":\"something-else\"}\n")).err().unwrap();
        assert!(err.contains("unknown format"), "got: {}", err);
    }

    #[test]
    fn test_open_empty_file() {
        assert!(SampleReader::open(Cursor::new("")).is_err());
    }

    #[test]
    fn test_read_samples_and_skip_blank_lines() {
        let data = header() + "\n{\"t\":0,\"hz\":440.0}\n\n{\"t\":100000,\"hz\":null}\n";
        let samples = SampleReader::open(Cursor::new(data)).unwrap().read_all();
        assert_eq!(
            samples,
            vec![FrequencySample::new(0, Some(440.0)), FrequencySample::silent(100_000)]
        );
    }

    #[test]
    fn test_read_all_skips_malformed() {
        let data = header() + "\n{\"t\":1,\"hz\":1.0}\ngarbage\n{\"t\":3,\"hz\":3.0}\n";
        let samples = SampleReader::open(Cursor::new(data)).unwrap().read_all();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].timestamp_us, 3);
    }

    #[test]
    fn test_next_sample_reports_error() {
        let data = header() + "\nnot json\n";
        let mut reader = SampleReader::open(Cursor::new(data)).unwrap();
        assert!(reader.next_sample().unwrap().is_err());
        assert!(reader.next_sample().is_none());
    }

    #[test]
    fn test_replay_sends_all_in_order() {
        let (tx, rx) = unbounded();
        let samples = vec![
            FrequencySample::new(1_000, Some(220.0)),
            FrequencySample::new(3_000, None),
            FrequencySample::new(5_000, Some(330.0)),
        ];
        Replay::new(samples, SessionClock::new(), tx).run();
        let got: Vec<Option<f32>> = rx.try_iter().map(|s| s.frequency_hz).collect();
        assert_eq!(got, vec![Some(220.0), None, Some(330.0)]);
    }
}
