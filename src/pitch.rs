//! Frequency → note mapping.
//!
//! The transcript engine only sees the [`NoteMapper`] trait; the analysis side
//! decides how a frequency becomes a pitch. [`EqualTemperament`] is the stock
//! 12-TET mapper spelled the way ABC expects (sharps as `^`).

use crate::types::NoteSymbol;

const PITCH_CLASSES: [&str; 12] = ["C", "^C", "D", "^D", "E", "F", "^F", "G", "^G", "A", "^A", "B"];
const NOTE_NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

/// MIDI note number of A4.
pub const A4_MIDI: f64 = 69.0;
/// MIDI note number of middle C, the lowest note of ABC octave 0.
pub const MIDDLE_C_MIDI: i32 = 60;

/// Maps a frequency to a note symbol (the analyser's `frequencyToNote`).
pub trait NoteMapper {
    /// Returns None when the frequency has no sensible pitch.
    fn frequency_to_note(&self, frequency_hz: f32) -> Option<NoteSymbol>;

    /// Scientific pitch name for the live readout. Mappers with their own
    /// tuning should override this so the readout agrees with the transcript.
    fn readout_name(&self, frequency_hz: f32) -> Option<String> {
        nearest_note_name(frequency_hz as f64, 440.0)
    }
}

impl<F> NoteMapper for F
where
    F: Fn(f32) -> Option<NoteSymbol>,
{
    fn frequency_to_note(&self, frequency_hz: f32) -> Option<NoteSymbol> {
        self(frequency_hz)
    }
}

/// Twelve-tone equal temperament around a reference A4.
#[derive(Debug, Clone, Copy)]
pub struct EqualTemperament {
    pub reference_hz: f64,
}

impl EqualTemperament {
    pub fn new(reference_hz: f64) -> Self {
        Self { reference_hz }
    }
}

impl Default for EqualTemperament {
    fn default() -> Self {
        Self::new(440.0)
    }
}

impl NoteMapper for EqualTemperament {
    fn frequency_to_note(&self, frequency_hz: f32) -> Option<NoteSymbol> {
        let midi = hz_to_midi_with_reference(frequency_hz as f64, self.reference_hz)?;
        let note = midi.round() as i32;
        let pitch = PITCH_CLASSES[note.rem_euclid(12) as usize];
        let octave = note.div_euclid(12) - MIDDLE_C_MIDI / 12;
        Some(NoteSymbol::new(pitch, octave))
    }

    fn readout_name(&self, frequency_hz: f32) -> Option<String> {
        nearest_note_name(frequency_hz as f64, self.reference_hz)
    }
}

/// Convert a (possibly fractional) MIDI note number to Hz.
pub fn midi_to_hz(midi: f64) -> f64 {
    440.0 * 2.0f64.powf((midi - A4_MIDI) / 12.0)
}

/// Fractional MIDI note number for a frequency, None for non-positive or
/// non-finite input.
pub fn hz_to_midi(hz: f64) -> Option<f64> {
    hz_to_midi_with_reference(hz, 440.0)
}

fn hz_to_midi_with_reference(hz: f64, reference_hz: f64) -> Option<f64> {
    if !hz.is_finite() || hz <= 0.0 {
        return None;
    }
    let midi = A4_MIDI + 12.0 * (hz / reference_hz).log2();
    midi.is_finite().then_some(midi)
}

/// Scientific pitch name with cents deviation, e.g. `A4`, `C#5+12`, `E2-30`,
/// relative to the given A4 reference.
pub fn nearest_note_name(hz: f64, reference_hz: f64) -> Option<String> {
    let midi = hz_to_midi_with_reference(hz, reference_hz)?;
    let note_num = midi.round() as i32;
    let cents = ((midi - note_num as f64) * 100.0).round() as i32;

    let name = NOTE_NAMES[note_num.rem_euclid(12) as usize];
    let octave = note_num.div_euclid(12) - 1;

    Some(if cents == 0 {
        format!("{}{}", name, octave)
    } else if cents > 0 {
        format!("{}{}+{}", name, octave, cents)
    } else {
        format!("{}{}{}", name, octave, cents)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(hz: f32) -> String {
        EqualTemperament::default()
            .frequency_to_note(hz)
            .map(|s| s.to_string())
            .unwrap_or_default()
    }

    #[test]
    fn test_a4_is_uppercase_a() {
        assert_eq!(note(440.0), "A");
    }

    #[test]
    fn test_octave_spelling() {
        assert_eq!(note(261.63), "C"); // C4
        assert_eq!(note(523.25), "c"); // C5
        assert_eq!(note(880.0), "a"); // A5
        assert_eq!(note(1046.5), "c'"); // C6
        assert_eq!(note(130.81), "C,"); // C3
        assert_eq!(note(55.0), "A,,,"); // A1
    }

    #[test]
    fn test_sharps_use_caret() {
        assert_eq!(note(466.16), "^A"); // A#4
        assert_eq!(note(369.99), "^F"); // F#4
        assert_eq!(note(138.59), "^C,"); // C#3
    }

    #[test]
    fn test_rounds_to_nearest_semitone() {
        assert_eq!(note(445.0), "A");
        assert_eq!(note(455.0), "^A");
    }

    #[test]
    fn test_invalid_frequencies_have_no_note() {
        let m = EqualTemperament::default();
        assert!(m.frequency_to_note(0.0).is_none());
        assert!(m.frequency_to_note(-440.0).is_none());
        assert!(m.frequency_to_note(f32::NAN).is_none());
        assert!(m.frequency_to_note(f32::INFINITY).is_none());
    }

    #[test]
    fn test_reference_pitch_shifts_mapping() {
        let baroque = EqualTemperament::new(415.0);
        assert_eq!(baroque.frequency_to_note(415.0).unwrap().to_string(), "A");
    }

    #[test]
    fn test_closure_mapper() {
        let always_c = |_: f32| Some(NoteSymbol::new("C", 0));
        assert_eq!(always_c.frequency_to_note(1234.0).unwrap().to_string(), "C");
    }

    #[test]
    fn test_midi_roundtrip() {
        assert!((midi_to_hz(69.0) - 440.0).abs() < 1e-9);
        assert!((hz_to_midi(midi_to_hz(60.0)).unwrap() - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_nearest_note_name() {
        assert_eq!(nearest_note_name(440.0, 440.0).unwrap(), "A4");
        assert_eq!(nearest_note_name(261.63, 440.0).unwrap(), "C4");
        assert_eq!(nearest_note_name(445.0, 440.0).unwrap(), "A4+20");
        assert_eq!(nearest_note_name(435.0, 440.0).unwrap(), "A4-20");
        assert!(nearest_note_name(0.0, 440.0).is_none());
    }

    #[test]
    fn test_readout_name_follows_reference_pitch() {
        let baroque = EqualTemperament::new(415.0);
        assert_eq!(baroque.readout_name(415.0).unwrap(), "A4");
        assert_eq!(EqualTemperament::default().readout_name(415.0).unwrap(), "G#4-1");
        let always_c = |_: f32| Some(NoteSymbol::new("C", 0));
        assert_eq!(always_c.readout_name(440.0).unwrap(), "A4");
    }
}
