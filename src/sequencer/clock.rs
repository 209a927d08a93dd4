// Clock - Transport clock abstraction over the audio-domain time source
// All scheduling math is expressed in seconds of this clock

use std::rc::Rc;
use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// A monotonic, drift-free audio time source
///
/// Returns `None` until the underlying device is initialized (for example
/// before the first user gesture unlocks output).
pub trait AudioClock {
    /// Current audio time in seconds
    fn now(&self) -> Option<f64>;
}

/// Shared handle to the process-wide audio clock
///
/// Both schedulers hold a clone; the clock itself is injected, never looked
/// up ambiently.
#[derive(Clone)]
pub struct TransportClock {
    inner: Rc<dyn AudioClock>,
}

impl TransportClock {
    pub fn new(clock: impl AudioClock + 'static) -> Self {
        Self {
            inner: Rc::new(clock),
        }
    }

    /// Current audio time, `None` while the clock is not ready
    pub fn now(&self) -> Option<f64> {
        self.inner.now()
    }

    pub fn is_ready(&self) -> bool {
        self.inner.now().is_some()
    }

    /// Wall-clock delay until audio time `time`, zero if it already passed
    pub fn delay_until(&self, time: f64) -> Duration {
        match self.now() {
            Some(now) if time > now => Duration::from_secs_f64(time - now),
            _ => Duration::ZERO,
        }
    }
}

impl std::fmt::Debug for TransportClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportClock")
            .field("now", &self.now())
            .finish()
    }
}

/// Sample-counting clock advanced by the audio callback
///
/// The output callback calls [`SampleClock::advance`] with the number of
/// frames it rendered; readers derive seconds from the frame count. The
/// clock reports not-ready until [`SampleClock::start`] sets a sample rate.
#[derive(Debug, Clone, Default)]
pub struct SampleClock {
    /// Frames rendered since start (incremented by audio callback)
    sample_position: Arc<AtomicU64>,
    /// Sample rate as f64 bits, 0 while not started
    sample_rate: Arc<AtomicU64>,
}

impl SampleClock {
    /// Create a clock that is not ready yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a clock that is already running at `sample_rate`
    pub fn with_sample_rate(sample_rate: f64) -> Self {
        let clock = Self::new();
        clock.start(sample_rate);
        clock
    }

    /// Mark the device as initialized; ignored for non-positive rates
    pub fn start(&self, sample_rate: f64) {
        if sample_rate > 0.0 {
            self.sample_rate
                .store(sample_rate.to_bits(), Ordering::Release);
        }
    }

    /// Advance sample position (called from audio callback)
    pub fn advance(&self, frames: usize) {
        self.sample_position
            .fetch_add(frames as u64, Ordering::Relaxed);
    }

    /// Advance by a duration, rounded to whole frames
    pub fn advance_seconds(&self, seconds: f64) {
        if let Some(rate) = self.sample_rate() {
            self.advance((seconds * rate).round() as usize);
        }
    }

    /// Get current sample position
    pub fn current_sample(&self) -> u64 {
        self.sample_position.load(Ordering::Relaxed)
    }

    /// Sample rate, `None` until started
    pub fn sample_rate(&self) -> Option<f64> {
        let bits = self.sample_rate.load(Ordering::Acquire);
        (bits != 0).then(|| f64::from_bits(bits))
    }
}

impl AudioClock for SampleClock {
    fn now(&self) -> Option<f64> {
        self.sample_rate()
            .map(|rate| self.current_sample() as f64 / rate)
    }
}

/// Monotonic clock backed by the runtime's `Instant`
///
/// Uses `tokio::time::Instant` so paused-time tests see the same time the
/// poll loop sleeps against.
#[derive(Debug, Clone, Default)]
pub struct SystemClock {
    origin: Arc<OnceLock<tokio::time::Instant>>,
}

impl SystemClock {
    /// A clock that is ready immediately, reading 0.0 now
    pub fn running() -> Self {
        let clock = Self::suspended();
        clock.resume();
        clock
    }

    /// A clock that reports not-ready until [`SystemClock::resume`]
    pub fn suspended() -> Self {
        Self::default()
    }

    /// Initialize the clock; later calls keep the first origin
    pub fn resume(&self) {
        let _ = self.origin.get_or_init(tokio::time::Instant::now);
    }
}

impl AudioClock for SystemClock {
    fn now(&self) -> Option<f64> {
        self.origin
            .get()
            .map(|origin| origin.elapsed().as_secs_f64())
    }
}
