use crate::pitch::midi_to_hz;
use crate::types::*;
use crossbeam_channel::Sender;
use log::{info, warn};
use std::f64::consts::PI;
use std::thread;
use std::time::Duration;

/// Stands in for the audio analyser: plays a scripted melody as a stream of
/// dominant-frequency estimates, without any audio hardware.
///
/// Like a real analyser it needs a moment before producing anything (the
/// coordinator sees "not ready" until then), its first estimate is a
/// start-up transient, and rests come through as `None`.
pub struct Simulator {
    clock: SessionClock,
    tx: Sender<FrequencySample>,
    sample_rate_hz: u32,
    beat_ms: u64,
    warmup_ms: u32,
}

impl Simulator {
    pub fn new(clock: SessionClock, tx: Sender<FrequencySample>, sample_rate_hz: u32, beat_ms: u64) -> Self {
        Self {
            clock,
            tx,
            sample_rate_hz: sample_rate_hz.max(1),
            beat_ms: beat_ms.max(1),
            warmup_ms: 300,
        }
    }

    pub fn with_warmup(mut self, warmup_ms: u32) -> Self {
        self.warmup_ms = warmup_ms;
        self
    }

    /// Play the named demo in a loop. Blocks the calling thread; returns once
    /// the coordinator has gone away.
    pub fn run(&self, demo: &str) {
        let steps = demo_melody(demo);
        info!("Simulator starting demo '{}' ({} steps)...", demo, steps.len());
        thread::sleep(Duration::from_millis(self.warmup_ms as u64));

        let tick = Duration::from_micros(1_000_000 / self.sample_rate_hz as u64);
        let transient = FrequencySample::new(self.clock.now_us(), Some(STARTUP_TRANSIENT_HZ));
        if self.tx.send(transient).is_err() {
            return;
        }

        loop {
            for hz in synthesize(&steps, self.beat_ms, self.sample_rate_hz) {
                let sample = FrequencySample::new(self.clock.now_us(), hz);
                if self.tx.send(sample).is_err() {
                    info!("Simulator stopping: coordinator gone");
                    return;
                }
                thread::sleep(tick);
            }
            info!("Demo '{}' complete, repeating", demo);
        }
    }
}

/// Spurious reading an analyser reports before it has settled.
pub const STARTUP_TRANSIENT_HZ: f32 = 11_025.0;

// ─── Melody script ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Hold a MIDI note for a number of beats, with light vibrato
    Note { midi: f64, beats: f32 },
    /// Silence
    Rest { beats: f32 },
    /// Slide from `from` to `to` (MIDI) over a number of beats
    Glide { from: f64, to: f64, beats: f32 },
}

/// Render a script to per-sample frequency estimates.
pub fn synthesize(steps: &[Step], beat_ms: u64, sample_rate_hz: u32) -> Vec<Option<f32>> {
    let per_beat = beat_ms as f64 * sample_rate_hz as f64 / 1000.0;
    let mut out = Vec::new();
    for step in steps {
        match *step {
            Step::Note { midi, beats } => {
                let n = (per_beat * beats as f64).round() as usize;
                for i in 0..n {
                    let t = i as f64 / sample_rate_hz as f64;
                    let cents = VIBRATO_CENTS * (2.0 * PI * VIBRATO_HZ * t).sin();
                    out.push(Some(midi_to_hz(midi + cents / 100.0) as f32));
                }
            }
            Step::Rest { beats } => {
                let n = (per_beat * beats as f64).round() as usize;
                out.extend(std::iter::repeat(None).take(n));
            }
            Step::Glide { from, to, beats } => {
                let n = (per_beat * beats as f64).round() as usize;
                for i in 0..n {
                    let t = i as f64 / n as f64;
                    out.push(Some(midi_to_hz(from + (to - from) * t) as f32));
                }
            }
        }
    }
    out
}

const VIBRATO_CENTS: f64 = 12.0;
const VIBRATO_HZ: f64 = 5.5;

pub const DEMO_NAMES: [&str; 4] = ["scale", "arpeggio", "ode", "sweep"];

/// Look up a demo melody by name. Unknown names fall back to "scale".
pub fn demo_melody(name: &str) -> Vec<Step> {
    let note = |midi: i32| Step::Note {
        midi: midi as f64,
        beats: 1.0,
    };
    match name {
        "scale" => {
            // C major up and down from middle C, then a bar of rest
            let up = [60, 62, 64, 65, 67, 69, 71, 72];
            let mut steps: Vec<Step> = up.iter().map(|&m| note(m)).collect();
            steps.extend(up.iter().rev().skip(1).map(|&m| note(m)));
            steps.push(Step::Rest { beats: 5.0 });
            steps
        }
        "arpeggio" => {
            // I-vi-IV-V arpeggios over two octaves
            let chords: [[i32; 4]; 4] = [[48, 52, 55, 60], [45, 48, 52, 57], [41, 45, 48, 53], [43, 47, 50, 55]];
            let mut steps = Vec::new();
            for chord in chords {
                for octave in [0, 12] {
                    steps.extend(chord.iter().map(|&m| note(m + octave)));
                }
            }
            steps
        }
        "ode" => {
            let phrase = [64, 64, 65, 67, 67, 65, 64, 62, 60, 60, 62, 64];
            let mut steps: Vec<Step> = phrase.iter().map(|&m| note(m)).collect();
            steps.push(Step::Note { midi: 64.0, beats: 1.5 });
            steps.push(Step::Note { midi: 62.0, beats: 0.5 });
            steps.push(Step::Note { midi: 62.0, beats: 2.0 });
            steps.push(Step::Rest { beats: 2.0 });
            steps
        }
        "sweep" => {
            // Whole range of a piano and beyond; the extremes land outside
            // the notation range and are transcribed as rests.
            vec![
                Step::Glide { from: 21.0, to: 120.0, beats: 12.0 },
                Step::Rest { beats: 2.0 },
                Step::Glide { from: 120.0, to: 21.0, beats: 12.0 },
                Step::Rest { beats: 2.0 },
            ]
        }
        other => {
            warn!("Unknown demo '{}', using 'scale' (available: {})", other, DEMO_NAMES.join(", "));
            demo_melody("scale")
        }
    }
}
