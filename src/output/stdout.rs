//! Console feedback

use std::io::{Stdout, Write};
use tracing::warn;

use crate::analysis::{DetectionResult, Observer, VoteTally};

/// Prints detections for the user.
///
/// Verbosity 1 prints a readable line per card, 2 and above prints
/// comma-separated rows suitable for collecting statistics.
pub struct StdoutObserver<W: Write = Stdout> {
    out: W,
    verbosity: u8,
    detected: usize,
}

impl StdoutObserver {
    pub fn new(verbosity: u8) -> Self {
        Self::with_writer(std::io::stdout(), verbosity)
    }
}

impl<W: Write> StdoutObserver<W> {
    pub fn with_writer(out: W, verbosity: u8) -> Self {
        Self {
            out,
            verbosity,
            detected: 0,
        }
    }

    fn print(&mut self, line: &str) {
        if let Err(err) = writeln!(self.out, "{line}").and_then(|()| self.out.flush()) {
            warn!("Failed to write to console: {}", err);
        }
    }
}

impl<W: Write> Observer for StdoutObserver<W> {
    fn name(&self) -> &str {
        "stdout"
    }

    fn detector_started(&mut self) {
        self.detected = 0;
        self.print("Detector started");
    }

    fn card_detected(&mut self, result: &DetectionResult) {
        self.detected += 1;
        let secs = result.elapsed.as_secs_f64();
        match self.verbosity {
            0 => {}
            1 => self.print(&format!("Detected: {} ({:.2} secs)", result.card.name, secs)),
            _ => self.print(&format!(
                "OK, {}, {:.2}, {}",
                result.card.name,
                secs,
                result.tally.len()
            )),
        }
    }

    fn card_not_found(&mut self, slug: &str) {
        if self.verbosity >= 2 {
            self.print(&format!("Couldn't find data for card '{slug}', skipping"));
        }
    }

    fn detector_gave_up(&mut self, _tally: &VoteTally) {
        match self.verbosity {
            0 => {}
            1 => self.print("Detection taking too long, giving up"),
            _ => self.print("FAIL,,,"),
        }
    }

    fn detector_stopped(&mut self) {
        let line = format!("Detector stopped. Detected {} cards", self.detected);
        self.print(&line);
    }
}
