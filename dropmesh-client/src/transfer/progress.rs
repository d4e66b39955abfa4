use std::time::Duration;

/// Lower bound on elapsed time so the first chunk never divides by zero.
pub const MIN_ELAPSED_SECS: f64 = 1e-3;

/// Progress of one file, computed the same way on both ends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub transferred: u64,
    pub total: u64,
    /// `transferred / total`, or 1.0 for an empty file.
    pub fraction: f64,
    pub bytes_per_sec: f64,
}

impl Progress {
    pub fn compute(transferred: u64, total: u64, elapsed: Duration) -> Self {
        let fraction = if total == 0 {
            1.0
        } else {
            transferred as f64 / total as f64
        };
        let seconds = elapsed.as_secs_f64().max(MIN_ELAPSED_SECS);

        Self {
            transferred,
            total,
            fraction,
            bytes_per_sec: transferred as f64 / seconds,
        }
    }

    pub fn percent(&self) -> f64 {
        self.fraction * 100.0
    }
}
