//! Build progress reporting.

use std::sync::atomic::{AtomicU64, Ordering};

/// Receives the fraction of the build that is done, in `[0, 1]`.
///
/// Called from build worker threads. Purely observational.
pub trait BuildProgress: Sync {
    fn set(&self, fraction: f64);
}

/// No progress reporting.
impl BuildProgress for () {
    #[inline(always)]
    fn set(&self, _fraction: f64) {}
}

/// Stores the latest reported fraction, readable from any thread.
#[derive(Debug, Default)]
pub struct AtomicProgress(AtomicU64);

impl AtomicProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }
}

impl BuildProgress for AtomicProgress {
    fn set(&self, fraction: f64) {
        self.0.store(fraction.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }
}

#[cfg(feature = "progress-bar")]
impl BuildProgress for indicatif::ProgressBar {
    fn set(&self, fraction: f64) {
        let length = self.length().unwrap_or(100);
        self.set_position((fraction.clamp(0.0, 1.0) * length as f64) as u64);
    }
}
