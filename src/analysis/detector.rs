//! Recognition loop
//!
//! Pulls frames from the capture queue and runs them through the processing
//! chain, the OCR backend and the vocabulary matcher. The top candidate of
//! every qualifying frame is a vote; a card is announced once one slug
//! collects more than `min_suggestions` votes in a row.
//!
//! After a detection, frames are skipped for `switch_time` so the card still
//! in view is not announced twice. If nothing is detected for `max_wait`, the
//! loop gives up on the current votes and starts over.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

use super::events::{DetectorEvent, EventBus};
use crate::capture::{CapturedFrame, FrameConsumer, QueueError};
use crate::storage::{CardCatalog, CardRecord};
use crate::vision::{ProcessingChain, TextExtractor, VocabularyMatcher};

/// Longest uninterrupted wait on the frame queue, bounds stop latency
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Recognition thresholds and timings
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// A slug needs more than this many votes to be announced
    pub min_suggestions: u32,
    /// Give up on the current votes after this long without a detection
    pub max_wait: Duration,
    /// OCR text with fewer characters is ignored
    pub min_card_name: usize,
    /// Candidate lists longer than this are too ambiguous to vote with
    pub max_guesses: usize,
    /// Frames are skipped for this long after a detection
    pub switch_time: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_suggestions: 8,
            max_wait: Duration::from_secs(80),
            min_card_name: 3,
            max_guesses: 5,
            switch_time: Duration::from_secs(2),
        }
    }
}

/// Votes per candidate slug
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoteTally {
    votes: HashMap<String, u32>,
}

impl VoteTally {
    /// Count a vote for `slug`, returning its new total
    pub fn vote(&mut self, slug: &str) -> u32 {
        let count = self.votes.entry(slug.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Votes for `slug`, 0 when absent
    pub fn get(&self, slug: &str) -> u32 {
        self.votes.get(slug).copied().unwrap_or(0)
    }

    /// Slug with the most votes
    pub fn leader(&self) -> Option<(&str, u32)> {
        self.votes
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(slug, count)| (slug.as_str(), *count))
    }

    /// Total number of votes cast
    pub fn total(&self) -> u32 {
        self.votes.values().sum()
    }

    pub fn clear(&mut self) {
        self.votes.clear();
    }

    /// Number of distinct slugs
    pub fn len(&self) -> usize {
        self.votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }
}

/// A confirmed card
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    /// Catalog entry of the winning slug
    pub card: CardRecord,
    /// Time since the previous detection (or start), cooldown excluded
    pub elapsed: Duration,
    /// The votes that triggered this detection
    pub tally: VoteTally,
}

impl DetectionResult {
    pub fn slug(&self) -> &str {
        &self.card.slug
    }
}

/// Where the loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    Starting,
    WaitingFrame,
    Processing,
    Voting,
    /// Inside the post-detection cooldown
    Paused,
    Stopped,
}

/// Requests a running loop to stop at its next cycle boundary.
///
/// Cheap to clone and usable from any thread, e.g. a Ctrl-C handler.
#[derive(Debug, Clone)]
pub struct StopHandle {
    running: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// In-memory recognition counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectorStats {
    /// Frames taken off the queue
    pub frames: u64,
    /// Frames skipped during cooldown
    pub skipped: u64,
    /// Frames whose text or candidates were unusable
    pub discarded: u64,
    /// Votes cast
    pub votes: u64,
    pub detections: u64,
    pub not_found: u64,
    pub give_ups: u64,
}

/// The voting state machine
pub struct RecognitionLoop {
    config: DetectorConfig,
    chain: ProcessingChain,
    extractor: Box<dyn TextExtractor>,
    matcher: Box<dyn VocabularyMatcher>,
    catalog: Box<dyn CardCatalog>,
    bus: EventBus,

    tally: VoteTally,
    /// Slug currently collecting consecutive votes
    current: Option<String>,
    last_detected_at: Instant,
    cooldown_until: Option<Instant>,
    state: DetectorState,
    running: Arc<AtomicBool>,
    stats: DetectorStats,
}

impl RecognitionLoop {
    pub fn new(
        config: DetectorConfig,
        chain: ProcessingChain,
        extractor: Box<dyn TextExtractor>,
        matcher: Box<dyn VocabularyMatcher>,
        catalog: Box<dyn CardCatalog>,
        bus: EventBus,
    ) -> Self {
        Self {
            config,
            chain,
            extractor,
            matcher,
            catalog,
            bus,
            tally: VoteTally::default(),
            current: None,
            last_detected_at: Instant::now(),
            cooldown_until: None,
            state: DetectorState::Starting,
            running: Arc::new(AtomicBool::new(true)),
            stats: DetectorStats::default(),
        }
    }

    /// Handle for stopping the loop from another thread
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            running: self.running.clone(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> DetectorStats {
        self.stats
    }

    /// Run until stopped or the frame source goes away
    pub fn run(&mut self, frames: &FrameConsumer) {
        if !self.is_running() {
            debug!("Detector stopped before it started");
            self.finish();
            return;
        }
        self.begin(Instant::now());

        while self.is_running() {
            if self.check_give_up(Instant::now()) {
                continue;
            }

            self.state = DetectorState::WaitingFrame;
            match self.wait_for_frame(frames) {
                Ok(Some(frame)) => {
                    let now = Instant::now();
                    let queued = now.saturating_duration_since(frame.timestamp);
                    trace!("Frame queued for {:?}", queued);
                    self.handle_frame(&frame, now);
                }
                Ok(None) => break,
                Err(QueueError::Timeout(waited)) => {
                    debug!("No frame for {:?}", waited);
                    self.give_up(Instant::now());
                }
                Err(QueueError::Disconnected) => {
                    warn!("Frame source disconnected, stopping detector");
                    break;
                }
            }
        }

        self.finish();
    }

    /// Wait up to `max_wait` for a frame, `None` if a stop was requested meanwhile
    fn wait_for_frame(&self, frames: &FrameConsumer) -> Result<Option<CapturedFrame>, QueueError> {
        let started = Instant::now();
        loop {
            if !self.is_running() {
                return Ok(None);
            }

            let remaining = self.config.max_wait.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                return Err(QueueError::Timeout(self.config.max_wait));
            }

            match frames.get(remaining.min(STOP_POLL_INTERVAL)) {
                Ok(frame) => return Ok(Some(frame)),
                Err(QueueError::Timeout(_)) => continue,
                Err(err) => return Err(err),
            }
        }
    }

    /// Reset timers and announce the start
    pub fn begin(&mut self, now: Instant) {
        self.state = DetectorState::Starting;
        self.tally.clear();
        self.current = None;
        self.last_detected_at = now;
        self.cooldown_until = None;

        info!(
            "Detector started (min_suggestions={}, max_guesses={}, max_wait={:?}, switch_time={:?})",
            self.config.min_suggestions,
            self.config.max_guesses,
            self.config.max_wait,
            self.config.switch_time
        );
        self.bus.send(DetectorEvent::Started);
        self.state = DetectorState::WaitingFrame;
    }

    /// Mark the loop stopped and announce it
    pub fn finish(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        debug!("Detector leaving state {:?}", self.state);
        self.state = DetectorState::Stopped;

        let stats = self.stats;
        info!(
            "Detector stopped: {} frames, {} votes, {} detected, {} not found, {} give-ups",
            stats.frames, stats.votes, stats.detections, stats.not_found, stats.give_ups
        );
        self.bus.send(DetectorEvent::Stopped);
    }

    /// Start the timeout from the later of the last detection and the cooldown end
    fn timer_origin(&self) -> Instant {
        match self.cooldown_until {
            Some(until) => until.max(self.last_detected_at),
            None => self.last_detected_at,
        }
    }

    /// Give up if nothing was detected within `max_wait`. Returns whether it did.
    pub fn check_give_up(&mut self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.timer_origin());
        if elapsed > self.config.max_wait {
            self.give_up(now);
            true
        } else {
            false
        }
    }

    fn give_up(&mut self, now: Instant) {
        let discarded = std::mem::take(&mut self.tally);
        self.current = None;
        self.last_detected_at = now;
        self.cooldown_until = None;
        self.stats.give_ups += 1;

        if discarded.is_empty() {
            debug!("No card within {:?}, restarting timer", self.config.max_wait);
        } else {
            info!(
                "Detection taking too long, dropping {} votes",
                discarded.total()
            );
        }
        self.bus.send(DetectorEvent::GaveUp(&discarded));
    }

    /// Run one recognition cycle over `frame`
    pub fn handle_frame(&mut self, frame: &CapturedFrame, now: Instant) {
        self.stats.frames += 1;
        self.bus.send(DetectorEvent::ImageCaptured {
            frame,
            region: self.chain.region(),
        });

        if self.cooldown_until.is_some_and(|until| now < until) {
            self.state = DetectorState::Paused;
            self.stats.skipped += 1;
            return;
        }

        self.state = DetectorState::Processing;
        let processed = self.chain.apply(frame);
        self.bus.send(DetectorEvent::ImageProcessed(&processed));

        let text = self.extractor.extract(&processed);
        let text = text.trim();
        if text.chars().count() < self.config.min_card_name {
            trace!("Ignoring short OCR text {:?}", text);
            self.stats.discarded += 1;
            return;
        }

        let compact: String = text.split_whitespace().collect();
        let candidates = self.matcher.suggest(&compact);
        if candidates.is_empty() || candidates.len() > self.config.max_guesses {
            trace!(
                "Ignoring {:?}: {} candidates (max {})",
                text,
                candidates.len(),
                self.config.max_guesses
            );
            self.stats.discarded += 1;
            return;
        }

        self.state = DetectorState::Voting;
        let best = &candidates[0];
        let votes = self.vote(best);
        debug!("OCR {:?} -> {} ({} votes)", text, best, votes);
        self.bus.send(DetectorEvent::CardGuesses(&self.tally));

        if votes > self.config.min_suggestions {
            self.resolve(best, now);
        }
        self.state = DetectorState::WaitingFrame;
    }

    /// Count a vote; a change of top candidate starts a new run
    fn vote(&mut self, slug: &str) -> u32 {
        if self.current.as_deref() != Some(slug) {
            self.tally.clear();
            self.current = Some(slug.to_string());
        }
        self.stats.votes += 1;
        self.tally.vote(slug)
    }

    fn resolve(&mut self, slug: &str, now: Instant) {
        let tally = std::mem::take(&mut self.tally);
        self.current = None;

        let card = if self.catalog.exists(slug) {
            self.catalog.get(slug).cloned()
        } else {
            None
        };
        let Some(card) = card else {
            warn!("Couldn't find data for card {:?}, skipping", slug);
            self.stats.not_found += 1;
            self.bus.send(DetectorEvent::CardNotFound(slug));
            return;
        };

        let result = DetectionResult {
            card,
            elapsed: now.saturating_duration_since(self.timer_origin()),
            tally,
        };
        self.stats.detections += 1;
        info!(
            "Detected {} ({:.2} secs)",
            result.card.name,
            result.elapsed.as_secs_f64()
        );
        self.bus.send(DetectorEvent::CardDetected(&result));

        self.last_detected_at = now;
        self.cooldown_until = Some(now + self.config.switch_time);
    }
}
