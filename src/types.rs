use crate::error::TranscriptError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

// ─── Frequency samples from the analysis side ───────────────────────────────

/// One dominant-frequency estimate from the analyser.
/// Short keys match the JSONL replay format: `{"t": 1000, "hz": 440.0}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencySample {
    /// Microseconds since stream start
    #[serde(rename = "t")]
    pub timestamp_us: u64,
    /// Dominant frequency in Hz, None if nothing stood out this frame
    #[serde(rename = "hz")]
    pub frequency_hz: Option<f32>,
}

impl FrequencySample {
    pub fn new(timestamp_us: u64, frequency_hz: Option<f32>) -> Self {
        Self {
            timestamp_us,
            frequency_hz,
        }
    }

    pub fn silent(timestamp_us: u64) -> Self {
        Self::new(timestamp_us, None)
    }
}

// ─── Note symbols ───────────────────────────────────────────────────────────

/// A pitch in ABC notation with an explicit octave number.
///
/// `octave` 0 is the octave starting at middle C, written in uppercase
/// (`C` .. `B`). Octave 1 is lowercase (`c` .. `b`); higher octaves append
/// `'`, lower octaves append `,`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteSymbol {
    /// Uppercase letter, optionally prefixed by `^` (sharp)
    pub pitch: String,
    pub octave: i32,
}

impl NoteSymbol {
    pub fn new(pitch: impl Into<String>, octave: i32) -> Self {
        Self {
            pitch: pitch.into(),
            octave,
        }
    }

    /// Signed count of octave marks: positive for `'`, negative for `,`.
    pub fn marks(&self) -> i32 {
        if self.octave >= 1 {
            self.octave - 1
        } else {
            self.octave
        }
    }
}

impl fmt::Display for NoteSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.octave >= 1 {
            write!(f, "{}", self.pitch.to_lowercase())?;
            for _ in 0..(self.octave - 1) {
                f.write_str("'")?;
            }
        } else {
            f.write_str(&self.pitch)?;
            for _ in 0..(-self.octave) {
                f.write_str(",")?;
            }
        }
        Ok(())
    }
}

/// One beat of the transcript.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Note(NoteSymbol),
    /// Rest, with the reason no pitch could be written
    Rest(TranscriptError),
}

impl Token {
    pub fn is_rest(&self) -> bool {
        matches!(self, Token::Rest(_))
    }

    pub fn text(&self, rest_symbol: &str) -> String {
        match self {
            Token::Note(symbol) => symbol.to_string(),
            Token::Rest(_) => rest_symbol.to_string(),
        }
    }
}

/// A frequency reading and the token it produced. Lives for one `append`.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteEvent {
    pub frequency_hz: Option<f32>,
    pub token: Token,
}

/// Result of one `TranscriptEngine::append` call.
#[derive(Debug, Clone, PartialEq)]
pub enum AppendOutcome {
    /// First reading of the stream, discarded
    Suppressed,
    Accepted(NoteEvent),
}

// ─── Rendering ──────────────────────────────────────────────────────────────

/// Options handed to the notation renderer with every transcript.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    pub scale: f32,
    /// Staff width in pixels
    pub line_width: u32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            scale: 1.0,
            line_width: 740,
        }
    }
}

/// Live readout produced on the fast tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Readout {
    pub timestamp_us: u64,
    pub frequency_hz: Option<f32>,
    /// Scientific note name with cents deviation, e.g. `A4+12`
    pub note_name: Option<String>,
}

impl fmt::Display for Readout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.frequency_hz, &self.note_name) {
            (Some(hz), Some(name)) => write!(
                f,
                "t={:>10}µs  {:>8.2} Hz  ({})",
                self.timestamp_us, hz, name
            ),
            _ => write!(f, "t={:>10}µs  ---", self.timestamp_us),
        }
    }
}

/// Messages from the coordinator to display consumers.
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayEvent {
    Transcript { text: String, options: RenderOptions },
    Readout(Readout),
}

// ─── Session clock ──────────────────────────────────────────────────────────

/// Monotonic clock for the transcription session.
#[derive(Clone)]
pub struct SessionClock {
    start: Instant,
}

impl SessionClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn now_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Constants ──────────────────────────────────────────────────────────────

/// Rest token in ABC.
pub const REST_SYMBOL: &str = "z";
/// Bar token in ABC.
pub const BAR_SYMBOL: &str = "|";

pub const DEFAULT_HEADER: &str = "X:1\nT:Live transcript\nM:4/4\nL:1/4\nK:C clef=treble";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_rendering_by_octave() {
        assert_eq!(NoteSymbol::new("C", 0).to_string(), "C");
        assert_eq!(NoteSymbol::new("C", 1).to_string(), "c");
        assert_eq!(NoteSymbol::new("^F", 2).to_string(), "^f'");
        assert_eq!(NoteSymbol::new("A", 3).to_string(), "a''");
        assert_eq!(NoteSymbol::new("G", -1).to_string(), "G,");
        assert_eq!(NoteSymbol::new("^D", -3).to_string(), "^D,,,");
    }

    #[test]
    fn test_marks_are_signed_mark_count() {
        assert_eq!(NoteSymbol::new("C", 0).marks(), 0);
        assert_eq!(NoteSymbol::new("C", 1).marks(), 0);
        assert_eq!(NoteSymbol::new("C", 3).marks(), 2);
        assert_eq!(NoteSymbol::new("C", -2).marks(), -2);
    }

    #[test]
    fn test_sample_uses_short_keys() {
        let s = FrequencySample::new(1500, Some(440.0));
        let json = serde_json::to_string(&s).unwrap();
        assert_eq!(json, r#"{"t":1500,"hz":440.0}"#);
        let silent: FrequencySample = serde_json::from_str(r#"{"t":7,"hz":null}"#).unwrap();
        assert_eq!(silent, FrequencySample::silent(7));
    }

    #[test]
    fn test_rest_token_text() {
        let rest = Token::Rest(TranscriptError::NoSignal);
        assert!(rest.is_rest());
        assert_eq!(rest.text(REST_SYMBOL), "z");
        let note = Token::Note(NoteSymbol::new("A", 0));
        assert_eq!(note.text(REST_SYMBOL), "A");
    }
}
