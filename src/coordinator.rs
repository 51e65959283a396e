use crate::config::TranscriptConfig;
use crate::error::{ConfigError, TranscriptError};
use crate::pitch::NoteMapper;
use crate::render::NotationRenderer;
use crate::transcript::TranscriptEngine;
use crate::types::*;
use crossbeam_channel::{never, select, tick, Receiver};
use log::{debug, info, trace};
use std::time::{Duration, Instant};

/// The coordinator owns the transcript engine and drives it from two timers.
///
/// - **fast tick** (`fast_tick_ms`, ≈50 ms): hands a live readout of the
///   latest frequency estimate to the renderer.
/// - **slow tick** (`slow_tick_ms`, ≈1 s): appends the latest estimate to the
///   transcript and hands the full transcript to the renderer.
///
/// Frequency samples arrive on a channel from the analysis side at their own
/// rate; only the most recent one is kept. Neither timer ever overlaps
/// itself: a tick that came due while the previous callback of the same
/// timer was still running is dropped, not queued.
pub struct Coordinator<M: NoteMapper, R: NotationRenderer> {
    sample_rx: Receiver<FrequencySample>,
    shutdown_rx: Option<Receiver<()>>,
    engine: TranscriptEngine<M>,
    renderer: R,
    render_options: RenderOptions,
    fast_period: Duration,
    slow_period: Duration,
    latest: Option<FrequencySample>,
    stats: TickStats,
}

/// Counters reported when the coordinator stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    pub samples: u64,
    pub appended: u64,
    pub rests: u64,
    pub not_ready: u64,
    pub dropped_ticks: u64,
}

/// Fixed-interval timer guard: admits a tick only if it fired after the
/// previous callback of the same timer finished.
#[derive(Debug, Default)]
pub struct TickGate {
    busy_until: Option<Instant>,
}

impl TickGate {
    pub fn admit(&self, fired_at: Instant) -> bool {
        match self.busy_until {
            Some(done) => fired_at >= done,
            None => true,
        }
    }

    pub fn finish(&mut self, at: Instant) {
        self.busy_until = Some(at);
    }
}

impl<M: NoteMapper, R: NotationRenderer> Coordinator<M, R> {
    pub fn new(
        sample_rx: Receiver<FrequencySample>,
        renderer: R,
        mapper: M,
        config: TranscriptConfig,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            sample_rx,
            shutdown_rx: None,
            renderer,
            render_options: config.render,
            fast_period: Duration::from_millis(config.fast_tick_ms),
            slow_period: Duration::from_millis(config.slow_tick_ms),
            latest: None,
            stats: TickStats::default(),
            engine: TranscriptEngine::new(config, mapper)?,
        })
    }

    /// Stop the run loop when this channel receives or disconnects.
    pub fn with_shutdown(mut self, shutdown_rx: Receiver<()>) -> Self {
        self.shutdown_rx = Some(shutdown_rx);
        self
    }

    pub fn on_sample(&mut self, sample: FrequencySample) {
        self.stats.samples += 1;
        trace!("Sample t={}µs hz={:?}", sample.timestamp_us, sample.frequency_hz);
        self.latest = Some(sample);
    }

    /// Live readout of the latest estimate. Nothing to show before the first
    /// sample.
    pub fn on_fast_tick(&mut self) {
        let Some(sample) = self.latest else {
            return;
        };
        let readout = Readout {
            timestamp_us: sample.timestamp_us,
            frequency_hz: sample.frequency_hz,
            note_name: sample
                .frequency_hz
                .and_then(|hz| self.engine.mapper().readout_name(hz)),
        };
        trace!("Readout {}", readout);
        self.renderer.show_readout(&readout);
    }

    /// Append the latest estimate and re-render. A no-op returning
    /// `NotReady` until the analysis side has produced a sample.
    pub fn on_slow_tick(&mut self) -> Result<AppendOutcome, TranscriptError> {
        let Some(sample) = self.latest else {
            self.stats.not_ready += 1;
            debug!("Slow tick skipped: {}", TranscriptError::NotReady);
            return Err(TranscriptError::NotReady);
        };

        let outcome = self.engine.append(sample.frequency_hz);
        if let AppendOutcome::Accepted(ref event) = outcome {
            self.stats.appended += 1;
            if event.token.is_rest() {
                self.stats.rests += 1;
            }
        }
        self.renderer
            .render_notation(&self.engine.text(), &self.render_options);
        Ok(outcome)
    }

    /// Run until shutdown or until the sample source disconnects.
    /// Blocks the calling thread.
    pub fn run(&mut self) -> TickStats {
        info!(
            "Coordinator running (fast tick {:?}, slow tick {:?})",
            self.fast_period, self.slow_period
        );

        let samples = self.sample_rx.clone();
        let shutdown = self.shutdown_rx.clone().unwrap_or_else(never);
        let fast = tick(self.fast_period);
        let slow = tick(self.slow_period);
        let mut fast_gate = TickGate::default();
        let mut slow_gate = TickGate::default();

        loop {
            select! {
                recv(samples) -> msg => match msg {
                    Ok(sample) => self.on_sample(sample),
                    Err(_) => {
                        info!("Frequency source closed");
                        break;
                    }
                },
                recv(fast) -> fired => {
                    let Ok(fired_at) = fired else { continue };
                    if fast_gate.admit(fired_at) {
                        self.on_fast_tick();
                        fast_gate.finish(Instant::now());
                    } else {
                        self.stats.dropped_ticks += 1;
                    }
                },
                recv(slow) -> fired => {
                    let Ok(fired_at) = fired else { continue };
                    if slow_gate.admit(fired_at) {
                        let _ = self.on_slow_tick();
                        slow_gate.finish(Instant::now());
                    } else {
                        self.stats.dropped_ticks += 1;
                        debug!("Slow tick dropped (previous still running)");
                    }
                },
                recv(shutdown) -> _ => {
                    info!("Shutdown requested");
                    break;
                },
            }
        }

        info!(
            "Coordinator stopping: {} samples, {} beats ({} rests), {} ticks not ready, {} dropped",
            self.stats.samples,
            self.stats.appended,
            self.stats.rests,
            self.stats.not_ready,
            self.stats.dropped_ticks
        );
        self.stats
    }

    pub fn engine(&self) -> &TranscriptEngine<M> {
        &self.engine
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn stats(&self) -> TickStats {
        self.stats
    }
}
