//! Error types.
//!
//! `TranscriptError` classifies why a tick could not contribute a pitch. None
//! of its variants ever reach a caller as a failure: `NoSignal` and
//! `OutOfRange` turn into rest tokens, `NotReady` turns the tick into a no-op.

use std::io;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranscriptError {
    /// No dominant frequency this tick (missing, NaN, infinite or non-positive).
    #[error("no signal")]
    NoSignal,
    /// The mapped symbol has more octave marks than the configured bound.
    #[error("symbol {symbol} outside representable pitch range")]
    OutOfRange { symbol: String },
    /// The analysis side has not produced a sample yet.
    #[error("analysis not ready")]
    NotReady,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config: {0}")]
    Io(#[from] io::Error),
    #[error("parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}
