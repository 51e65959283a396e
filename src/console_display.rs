use crate::types::*;
use crossbeam_channel::Receiver;
use std::io::{self, Write};
use std::time::{Duration, Instant};

/// Renders a live terminal view: the current pitch readout above the
/// transcript text.
pub struct ConsoleDisplay {
    rx: Receiver<DisplayEvent>,
    update_hz: u32,
}

impl ConsoleDisplay {
    pub fn new(rx: Receiver<DisplayEvent>, update_hz: u32) -> Self {
        Self { rx, update_hz }
    }

    pub fn run(&self) {
        let min_interval = if self.update_hz == 0 {
            Duration::from_millis(50)
        } else {
            Duration::from_millis((1000 / self.update_hz).max(1) as u64)
        };
        let mut last_draw: Option<Instant> = None;
        let mut transcript = String::new();
        let mut options = RenderOptions::default();
        let mut readout: Option<Readout> = None;
        let mut stdout = io::stdout();

        for event in self.rx.iter() {
            let force = match event {
                DisplayEvent::Transcript { text, options: o } => {
                    transcript = text;
                    options = o;
                    true
                }
                DisplayEvent::Readout(r) => {
                    readout = Some(r);
                    false
                }
            };
            if !force && last_draw.is_some_and(|t| t.elapsed() < min_interval) {
                continue;
            }
            last_draw = Some(Instant::now());

            // Clear screen and move cursor home
            print!("\x1b[2J\x1b[H");
            print!("{}", draw(&transcript, &options, readout.as_ref()));
            let _ = stdout.flush();
        }
    }
}

/// Text columns for a staff width in pixels.
pub fn columns_for(options: &RenderOptions) -> usize {
    ((options.line_width as f32 / (10.0 * options.scale)) as usize).clamp(40, 160)
}

/// One full frame of the dashboard.
pub fn draw(transcript: &str, options: &RenderOptions, readout: Option<&Readout>) -> String {
    let width = columns_for(options);
    let rule = "═".repeat(width + 2);
    let mut out = String::new();

    out.push_str(&format!("╔{}╗\n", rule));
    out.push_str(&boxed(" VISUMUSIC  Live Transcript", width));
    out.push_str(&format!("╠{}╣\n", rule));

    let pitch = match readout {
        Some(Readout {
            frequency_hz: Some(hz),
            note_name: Some(name),
            ..
        }) => format!(" Pitch: {:>8.2} Hz  {:<8} {}", hz, name, make_meter(*hz, 20)),
        Some(_) => " Pitch: ---".to_string(),
        None => " Pitch: (waiting for analyser)".to_string(),
    };
    out.push_str(&boxed(&pitch, width));
    out.push_str(&boxed("", width));

    for line in transcript.lines() {
        out.push_str(&boxed(&format!(" {}", line), width));
    }
    out.push_str(&format!("╚{}╝\n", rule));
    out
}

fn boxed(text: &str, width: usize) -> String {
    // Pad/truncate by char count to avoid splitting multi-byte chars
    let mut line: String = text.chars().take(width).collect();
    let len = line.chars().count();
    line.push_str(&" ".repeat(width - len));
    format!("║ {} ║\n", line)
}

/// Log-frequency position between 27.5 Hz (A0) and 4186 Hz (C8).
fn make_meter(hz: f32, width: usize) -> String {
    let lo = 27.5f32.log2();
    let hi = 4186.0f32.log2();
    let pos = ((hz.max(1.0).log2() - lo) / (hi - lo)).clamp(0.0, 1.0);
    let filled = (pos * width as f32).round() as usize;
    format!("[{}{}]", "█".repeat(filled), "░".repeat(width - filled))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_columns_scale_with_line_width() {
        let narrow = RenderOptions { scale: 1.0, line_width: 100 };
        let normal = RenderOptions::default();
        let huge = RenderOptions { scale: 0.5, line_width: 5000 };
        assert_eq!(columns_for(&narrow), 40);
        assert_eq!(columns_for(&normal), 74);
        assert_eq!(columns_for(&huge), 160);
    }

    #[test]
    fn test_draw_contains_every_transcript_line() {
        let text = "X:1\nM:4/4\nA B c d|";
        let frame = draw(text, &RenderOptions::default(), None);
        for line in text.lines() {
            assert!(frame.contains(line), "missing {:?}", line);
        }
        assert!(frame.contains("waiting for analyser"));
    }

    #[test]
    fn test_draw_lines_have_equal_width() {
        let long = "A ".repeat(200);
        let readout = Readout {
            timestamp_us: 0,
            frequency_hz: Some(440.0),
            note_name: Some("A4".into()),
        };
        let frame = draw(&long, &RenderOptions::default(), Some(&readout));
        let widths: Vec<usize> = frame.lines().map(|l| l.chars().count()).collect();
        assert!(widths.windows(2).all(|w| w[0] == w[1]), "{:?}", widths);
        assert!(frame.contains("A4"));
    }

    #[test]
    fn test_meter_bounds() {
        assert_eq!(make_meter(1.0, 10), format!("[{}]", "░".repeat(10)));
        assert_eq!(make_meter(10_000.0, 10), format!("[{}]", "█".repeat(10)));
    }
}
