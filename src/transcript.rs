//! Rolling ABC transcript.
//!
//! Each accepted frequency becomes one quarter-note token. Tokens are grouped
//! into measures closed by `|`, measures into display lines, and the oldest
//! note lines are dropped once more than `max_lines` are on screen. The
//! header block is never dropped.

use crate::config::TranscriptConfig;
use crate::error::{ConfigError, TranscriptError};
use crate::pitch::NoteMapper;
use crate::types::*;
use log::{debug, info, trace};
use std::collections::VecDeque;

/// Header plus note lines, in the notation mini-language.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotationBuffer {
    header: Vec<String>,
    /// Closed note lines, oldest first
    lines: VecDeque<String>,
    /// The open line tokens are appended to
    current: String,
    /// Accepted notes since initialisation
    beat_count: u64,
    /// Tokens of the measure not yet closed by a bar
    pending_measure: Vec<String>,
}

impl NotationBuffer {
    fn with_header(template: &str) -> Self {
        Self {
            header: template
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
            ..Default::default()
        }
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Note lines currently on screen, oldest first, open line included once
    /// it has content.
    pub fn note_lines(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self.lines.iter().map(String::as_str).collect();
        if !self.current.is_empty() {
            out.push(&self.current);
        }
        out
    }

    pub fn note_line_count(&self) -> usize {
        self.lines.len() + usize::from(!self.current.is_empty())
    }

    pub fn beat_count(&self) -> u64 {
        self.beat_count
    }

    pub fn pending_measure(&self) -> &[String] {
        &self.pending_measure
    }

    /// Full transcript text: header, then note lines, newline separated.
    pub fn text(&self) -> String {
        let mut out = self.header.join("\n");
        for line in self.note_lines() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(line);
        }
        out
    }
}

/// Turns a stream of frequency estimates into a bounded rolling transcript.
pub struct TranscriptEngine<M: NoteMapper> {
    mapper: M,
    config: TranscriptConfig,
    buffer: NotationBuffer,
    /// True until the first reading of a stream has been discarded
    suppress_first: bool,
}

impl<M: NoteMapper> TranscriptEngine<M> {
    /// Fails if the config would leave the measure or line layout empty.
    pub fn new(config: TranscriptConfig, mapper: M) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut engine = Self {
            mapper,
            buffer: NotationBuffer::default(),
            suppress_first: true,
            config,
        };
        let header = engine.config.header.clone();
        engine.initialize(&header);
        Ok(engine)
    }

    /// Start a fresh stream with the given header block.
    pub fn initialize(&mut self, header_template: &str) {
        self.buffer = NotationBuffer::with_header(header_template);
        self.suppress_first = true;
        info!(
            "Transcript initialised ({} header lines, max {} note lines)",
            self.buffer.header.len(),
            self.config.max_lines
        );
    }

    /// Append one beat for this tick's frequency estimate.
    ///
    /// The reading is always mapped, but the first one after `initialize` is
    /// then discarded. Missing or unmappable frequencies, and pitches outside
    /// the octave bounds, become rests.
    pub fn append(&mut self, frequency_hz: Option<f32>) -> AppendOutcome {
        let classified = self.classify(frequency_hz);
        if self.suppress_first {
            self.suppress_first = false;
            debug!("Discarding first reading {:?} ({:?})", frequency_hz, classified);
            return AppendOutcome::Suppressed;
        }

        let token = match classified {
            Ok(symbol) => Token::Note(symbol),
            Err(reason) => {
                debug!("Rest: {}", reason);
                Token::Rest(reason)
            }
        };
        self.push_token(&token);

        AppendOutcome::Accepted(NoteEvent {
            frequency_hz,
            token,
        })
    }

    fn classify(&self, frequency_hz: Option<f32>) -> Result<NoteSymbol, TranscriptError> {
        let hz = frequency_hz
            .filter(|hz| hz.is_finite() && *hz > 0.0)
            .ok_or(TranscriptError::NoSignal)?;
        let symbol = self
            .mapper
            .frequency_to_note(hz)
            .ok_or(TranscriptError::NoSignal)?;

        let marks = symbol.marks();
        let too_high = marks > self.config.max_octave_marks_high as i32;
        let too_low = -marks > self.config.max_octave_marks_low as i32;
        if too_high || too_low {
            return Err(TranscriptError::OutOfRange {
                symbol: symbol.to_string(),
            });
        }
        Ok(symbol)
    }

    fn push_token(&mut self, token: &Token) {
        let text = token.text(&self.config.rest_symbol);
        let buf = &mut self.buffer;

        buf.current.push_str(&text);
        buf.pending_measure.push(text);
        buf.beat_count += 1;

        if buf.beat_count % self.config.beats_per_measure as u64 == 0 {
            buf.current.push_str(BAR_SYMBOL);
            buf.pending_measure.clear();
        } else {
            buf.current.push(' ');
        }

        if buf.beat_count % self.config.beats_per_line() == 0 {
            let closed = std::mem::replace(&mut buf.current, BAR_SYMBOL.to_string());
            buf.lines.push_back(closed);
            self.evict();
        }

        trace!("Transcript:\n{}", self.buffer.text());
    }

    /// Drop the oldest closed lines until the open line plus the closed lines
    /// fit in `max_lines`.
    fn evict(&mut self) {
        let keep_closed = self.config.max_lines.saturating_sub(1);
        let mut dropped = 0;
        while self.buffer.lines.len() > keep_closed {
            self.buffer.lines.pop_front();
            dropped += 1;
        }
        if dropped > 0 {
            debug!("Evicted {} note line(s)", dropped);
        }
    }

    pub fn buffer(&self) -> &NotationBuffer {
        &self.buffer
    }

    pub fn text(&self) -> String {
        self.buffer.text()
    }

    pub fn note_counter(&self) -> u64 {
        self.buffer.beat_count
    }

    pub fn note_line_count(&self) -> usize {
        self.buffer.note_line_count()
    }

    pub fn config(&self) -> &TranscriptConfig {
        &self.config
    }

    pub fn mapper(&self) -> &M {
        &self.mapper
    }
}
