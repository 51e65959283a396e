use crate::types::*;
use crossbeam_channel::{Sender, TrySendError};
use log::{debug, warn};

/// Receives the full transcript after every update (the notation renderer).
pub trait NotationRenderer {
    fn render_notation(&mut self, transcript: &str, options: &RenderOptions);

    /// Live readout from the fast tick. Renderers that only draw notation
    /// ignore it.
    fn show_readout(&mut self, _readout: &Readout) {}
}

/// Forwards transcripts and readouts to every display consumer thread.
///
/// Readouts are best-effort: a full consumer queue drops the readout rather
/// than stalling the coordinator. Transcripts block until queued. A consumer
/// whose receiver is gone is removed.
pub struct DisplayFanout {
    txs: Vec<Sender<DisplayEvent>>,
}

impl DisplayFanout {
    pub fn new(txs: Vec<Sender<DisplayEvent>>) -> Self {
        Self { txs }
    }

    pub fn consumer_count(&self) -> usize {
        self.txs.len()
    }

    fn broadcast(&mut self, event: DisplayEvent, lossy: bool) {
        let before = self.txs.len();
        self.txs.retain(|tx| {
            if lossy {
                !matches!(tx.try_send(event.clone()), Err(TrySendError::Disconnected(_)))
            } else {
                tx.send(event.clone()).is_ok()
            }
        });
        if self.txs.len() < before {
            warn!("{} display consumer(s) disconnected", before - self.txs.len());
        }
    }
}

impl NotationRenderer for DisplayFanout {
    fn render_notation(&mut self, transcript: &str, options: &RenderOptions) {
        debug!("Rendering transcript ({} bytes) to {} consumer(s)", transcript.len(), self.txs.len());
        self.broadcast(
            DisplayEvent::Transcript {
                text: transcript.to_string(),
                options: *options,
            },
            false,
        );
    }

    fn show_readout(&mut self, readout: &Readout) {
        self.broadcast(DisplayEvent::Readout(readout.clone()), true);
    }
}
