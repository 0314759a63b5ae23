//! Beat counter driven by an audio (or wall) clock.
//!
//! The clock does not own a timer. Hosts call [`BeatClock::update`] with the
//! current [`AudioClock`] time once per frame; the fractional beat count
//! advances by `elapsed * bpm / 60` and observers fire when the integer beat
//! changes.

use std::fmt;
use std::time::Instant;

/// BPM floor protecting interval computations from division by zero.
pub const MIN_BPM: f64 = 1.0;

/// Remaining beats below this count as "on the sync point".
pub const SYNC_EPSILON: f64 = 0.001;

/// Half-width, in beats, of the window reported by [`BeatClock::is_on_beat`].
pub const ON_BEAT_TOLERANCE: f64 = 0.05;

/// Monotonic time source in seconds.
pub trait AudioClock {
    fn now(&self) -> f64;
}

/// [`AudioClock`] backed by [`Instant`], measured from construction.
#[derive(Debug, Clone, Copy)]
pub struct SystemAudioClock {
    origin: Instant,
}

impl Default for SystemAudioClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl AudioClock for SystemAudioClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Callback invoked with the new integer beat.
pub type BeatObserver = Box<dyn FnMut(u64) + Send>;

pub struct BeatClock {
    bpm: f64,
    total_beats: f64,
    last_update: f64,
    running: bool,
    last_beat: Option<u64>,
    observers: Vec<BeatObserver>,
}

impl fmt::Debug for BeatClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeatClock")
            .field("bpm", &self.bpm)
            .field("total_beats", &self.total_beats)
            .field("running", &self.running)
            .field("last_beat", &self.last_beat)
            .field("observer_count", &self.observers.len())
            .finish_non_exhaustive()
    }
}

impl BeatClock {
    pub fn new(bpm: f64) -> Self {
        Self {
            bpm: bpm.max(MIN_BPM),
            total_beats: 0.0,
            last_update: 0.0,
            running: false,
            last_beat: None,
            observers: Vec::new(),
        }
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Changes the tempo; beats already counted are kept.
    pub fn set_bpm(&mut self, bpm: f64) {
        let bpm = if bpm.is_finite() { bpm.max(MIN_BPM) } else { MIN_BPM };
        if (bpm - self.bpm).abs() > f64::EPSILON {
            tracing::info!(from = self.bpm, to = bpm, "[beat] tempo changed");
        }
        self.bpm = bpm;
    }

    pub fn seconds_per_beat(&self) -> f64 {
        60.0 / self.bpm
    }

    pub fn total_beats(&self) -> f64 {
        self.total_beats
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Integer beat most recently reported to observers.
    pub fn current_beat(&self) -> Option<u64> {
        self.last_beat
    }

    /// Registers a callback invoked synchronously from [`Self::update`].
    pub fn subscribe(&mut self, observer: BeatObserver) {
        self.observers.push(observer);
    }

    /// Starts counting from `now`. Has no effect while already running.
    pub fn start(&mut self, now: f64) {
        if self.running {
            return;
        }
        self.running = true;
        self.last_update = now;
        tracing::debug!(now, bpm = self.bpm, "[beat] clock started");
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Zeroes the beat count and restarts from `now`.
    pub fn reset(&mut self, now: f64) {
        self.total_beats = 0.0;
        self.last_beat = None;
        self.last_update = now;
    }

    /// Advances the beat count to `now`.
    ///
    /// Returns the new integer beat when it changed, after notifying observers.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn update(&mut self, now: f64) -> Option<u64> {
        if !self.running {
            return None;
        }

        let delta = (now - self.last_update).max(0.0);
        self.last_update = now;
        self.total_beats += delta * self.bpm / 60.0;

        let beat = self.total_beats.floor() as u64;
        if self.last_beat.is_some_and(|last| beat <= last) {
            return None;
        }

        self.last_beat = Some(beat);
        for observer in &mut self.observers {
            observer(beat);
        }
        tracing::trace!(beat, "[beat] tick");
        Some(beat)
    }

    fn remainder(&self, period: u32) -> f64 {
        self.total_beats % f64::from(period.max(1))
    }

    /// Beats left until the next multiple of `period`; 0 when already on it.
    pub fn beats_until_next_sync(&self, period: u32) -> f64 {
        let remainder = self.remainder(period);
        if remainder < SYNC_EPSILON {
            0.0
        } else {
            f64::from(period.max(1)) - remainder
        }
    }

    /// Clock time of the next multiple of `period`, as seen from `now`.
    pub fn next_sync_time(&self, period: u32, now: f64) -> f64 {
        now + self.beats_until_next_sync(period) * self.seconds_per_beat()
    }

    /// Whether the count sits within [`ON_BEAT_TOLERANCE`] of a multiple of `period`.
    pub fn is_on_beat(&self, period: u32) -> bool {
        let remainder = self.remainder(period);
        remainder < ON_BEAT_TOLERANCE || remainder > f64::from(period.max(1)) - ON_BEAT_TOLERANCE
    }
}

impl Default for BeatClock {
    fn default() -> Self {
        Self::new(120.0)
    }
}
