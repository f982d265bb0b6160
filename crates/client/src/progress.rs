use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

struct SpeedSample {
    bytes: u64,
    timestamp: Instant,
}

/// Calculates transfer speed using a sliding window of samples.
pub struct SpeedCalculator {
    inner: Mutex<SpeedInner>,
}

struct SpeedInner {
    samples: Vec<SpeedSample>,
    max_samples: usize,
    window_size: Duration,
}

impl SpeedCalculator {
    /// Creates a new calculator.
    ///
    /// - `window_size`: time window for speed calculation (default 5 s).
    /// - `max_samples`: maximum retained samples (default 100).
    pub fn new(window_size: Option<Duration>, max_samples: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(SpeedInner {
                samples: Vec::new(),
                max_samples: max_samples.unwrap_or(100),
                window_size: window_size.unwrap_or(Duration::from_secs(5)),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SpeedInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a sample of `bytes` transferred at the current instant.
    pub fn add_sample(&self, bytes: u64) {
        let mut s = self.lock();
        let now = Instant::now();
        s.samples.push(SpeedSample {
            bytes,
            timestamp: now,
        });

        // Prune samples outside the window.
        if let Some(cutoff) = now.checked_sub(s.window_size) {
            s.samples.retain(|sample| sample.timestamp >= cutoff);
        }

        if s.samples.len() > s.max_samples {
            let excess = s.samples.len() - s.max_samples;
            s.samples.drain(..excess);
        }
    }

    /// Returns the average speed in bytes/second within the window.
    ///
    /// Returns 0.0 if fewer than 2 samples.
    pub fn bytes_per_second(&self) -> f64 {
        let s = self.lock();
        let (Some(first), Some(last)) = (s.samples.first(), s.samples.last()) else {
            return 0.0;
        };
        if s.samples.len() < 2 {
            return 0.0;
        }

        let elapsed = last.timestamp.duration_since(first.timestamp);
        if elapsed.is_zero() {
            return 0.0;
        }

        let total_bytes: u64 = s.samples.iter().map(|sample| sample.bytes).sum();
        total_bytes as f64 / elapsed.as_secs_f64()
    }

    /// Estimates time remaining to transfer `remaining_bytes`.
    ///
    /// Returns `None` if speed is zero.
    pub fn eta(&self, remaining_bytes: u64) -> Option<Duration> {
        let speed = self.bytes_per_second();
        if speed <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining_bytes as f64 / speed))
    }

    /// Clears all recorded samples.
    pub fn reset(&self) {
        self.lock().samples.clear();
    }
}

impl Default for SpeedCalculator {
    fn default() -> Self {
        Self::new(None, None)
    }
}
