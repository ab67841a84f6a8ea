//! Per-stage timing, feature-gated with `--features profiling`.
//!
//! Usage:
//!   let _g = crowd_pool::profiling::span("allocation");
//!   // run stage...
//!   let report = crowd_pool::profiling::drain();
//!
//! The scheduler wraps every stage body in a span automatically, mirroring
//! the per-processor sampling of the system this crate grew out of. With the
//! feature disabled, spans compile to nothing.

#[cfg(feature = "profiling")]
mod enabled {
    use std::sync::{Mutex, OnceLock};
    use std::time::Instant;

    /// One recorded stage execution.
    #[derive(Clone, Copy, Debug)]
    pub struct Sample {
        /// Stage name.
        pub stage: &'static str,
        /// Wall-clock duration in microseconds.
        pub micros: u64,
    }

    static SAMPLES: OnceLock<Mutex<Vec<Sample>>> = OnceLock::new();

    fn samples() -> &'static Mutex<Vec<Sample>> {
        SAMPLES.get_or_init(|| Mutex::new(Vec::new()))
    }

    /// RAII guard recording one span on drop.
    pub struct SpanGuard {
        stage: &'static str,
        start: Instant,
    }

    /// Opens a timing span for `stage`; the sample is recorded when the
    /// returned guard drops.
    pub fn span(stage: &'static str) -> SpanGuard {
        SpanGuard { stage, start: Instant::now() }
    }

    impl Drop for SpanGuard {
        fn drop(&mut self) {
            let micros = self.start.elapsed().as_micros() as u64;
            if let Ok(mut store) = samples().lock() {
                store.push(Sample { stage: self.stage, micros });
            }
        }
    }

    /// Takes all samples recorded so far.
    pub fn drain() -> Vec<Sample> {
        match samples().lock() {
            Ok(mut store) => std::mem::take(&mut *store),
            Err(_) => Vec::new(),
        }
    }
}

#[cfg(feature = "profiling")]
pub use enabled::{drain, span, Sample, SpanGuard};

#[cfg(not(feature = "profiling"))]
mod disabled {
    /// Zero-sized span guard; the disabled build records nothing.
    pub struct SpanGuard;

    /// No-op span.
    #[inline(always)]
    pub fn span(_stage: &'static str) -> SpanGuard {
        SpanGuard
    }
}

#[cfg(not(feature = "profiling"))]
pub use disabled::{span, SpanGuard};
