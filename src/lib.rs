//! N-dimensional bounding volume hierarchy with a parallel SAH build and a stack based
//! nearest-hit traversal.

use std::time::{Duration, Instant};

pub mod aabb;
pub mod build;
pub mod bvh;
pub mod config;
pub mod error;
pub mod flatten;
pub mod object;
pub mod par;
pub mod progress;
pub mod ray;
pub mod split;
pub mod test_util;
pub mod vector;

pub use aabb::Aabb;
pub use bvh::{BuildStats, Bvh, BvhNode, TraversalHit, TRAVERSAL_STACK_SIZE};
pub use config::{BuildArgs, BvhConfig};
pub use error::BvhError;
pub use object::{bvh_objects, BoundedObject, BvhObject};
pub use par::Scheduler;
pub use progress::{AtomicProgress, BuildProgress};
pub use ray::Ray;
pub use vector::{BvhVector, Real};

/// Profiler scope, a no-op unless the `profile` feature is enabled.
#[doc(hidden)]
#[macro_export]
macro_rules! scope {
    ($label:expr) => {
        #[cfg(feature = "profile")]
        profiling::scope!($label);
    };
}

/// Profiler scope that also logs its duration with the `scope_print` feature.
#[doc(hidden)]
#[macro_export]
macro_rules! scope_print {
    ($label:expr) => {
        $crate::scope!($label);
        #[cfg(feature = "scope_print")]
        let _scope_timer = $crate::ScopeTimer::new($label);
    };
}

/// Like [`scope_print!`], for the phases that are logged with `scope_print_major` alone.
#[doc(hidden)]
#[macro_export]
macro_rules! scope_print_major {
    ($label:expr) => {
        $crate::scope!($label);
        #[cfg(feature = "scope_print_major")]
        let _scope_timer = $crate::ScopeTimer::new($label);
    };
}

/// Logs the time between its creation and drop at debug level.
#[doc(hidden)]
pub struct ScopeTimer {
    label: &'static str,
    start: Instant,
}

impl ScopeTimer {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            start: Instant::now(),
        }
    }
}

impl Drop for ScopeTimer {
    fn drop(&mut self) {
        log::debug!("{:>8} {}", PrettyDuration(self.start.elapsed()), self.label);
    }
}

/// A wrapper struct for `std::time::Duration` to provide pretty-printing of durations.
#[doc(hidden)]
pub struct PrettyDuration(pub Duration);

impl std::fmt::Display for PrettyDuration {
    /// Durations are formatted as follows:
    /// - If the duration is greater than or equal to 1 second, it is formatted in seconds (s).
    /// - If the duration is greater than or equal to 1 millisecond but less than 1 second, it is formatted in milliseconds (ms).
    /// - If the duration is less than 1 millisecond, it is formatted in microseconds (µs).
    ///   In the case of seconds & milliseconds, the duration is always printed with a precision of two decimal places.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let duration = self.0;
        if duration.as_secs() > 0 {
            let seconds =
                duration.as_secs() as f64 + f64::from(duration.subsec_nanos()) / 1_000_000_000.0;
            write!(f, "{seconds:.2}s")
        } else if duration.subsec_millis() > 0 {
            let milliseconds =
                duration.as_millis() as f64 + f64::from(duration.subsec_micros() % 1_000) / 1_000.0;
            write!(f, "{milliseconds:.2}ms")
        } else {
            let microseconds = duration.as_micros();
            write!(f, "{microseconds}µs")
        }
    }
}
