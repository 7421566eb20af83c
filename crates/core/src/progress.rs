//! Shared progress counters for the generation currently running.
//!
//! The engine advances the counters while it samples; the progress endpoint
//! reads them. They are cleared after every request so a finished (or failed)
//! generation never leaks its progress into the next one. Generations are
//! serialized by the GPU call queue, so a single set of counters suffices.

use std::sync::Mutex;

use serde::Serialize;

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub job_count: u32,
    pub job_no: u32,
    pub sampling_step: u32,
    pub sampling_steps: u32,
    pub textinfo: Option<String>,
}

impl ProgressSnapshot {
    /// Completed fraction in `[0, 1]`, or `None` before any job has started.
    pub fn fraction(&self) -> Option<f64> {
        if self.job_count == 0 {
            return None;
        }
        let per_job = 1.0 / f64::from(self.job_count);
        let mut done = f64::from(self.job_no) * per_job;
        if self.sampling_steps > 0 {
            done += per_job * f64::from(self.sampling_step) / f64::from(self.sampling_steps);
        }
        Some(done.clamp(0.0, 1.0))
    }

    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}

/// Thread-safe progress counters.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    inner: Mutex<ProgressSnapshot>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn update(&self, f: impl FnOnce(&mut ProgressSnapshot)) {
        // A poisoned lock only means another thread panicked mid-update;
        // the counters are still usable.
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard);
    }

    /// Start a run of `job_count` jobs of `steps` sampling steps each.
    pub fn begin(&self, job_count: u32, steps: u32) {
        self.update(|p| {
            *p = ProgressSnapshot {
                job_count,
                sampling_steps: steps,
                ..ProgressSnapshot::default()
            }
        });
    }

    pub fn set_step(&self, step: u32) {
        self.update(|p| p.sampling_step = step.min(p.sampling_steps));
    }

    pub fn next_job(&self) {
        self.update(|p| {
            p.job_no = (p.job_no + 1).min(p.job_count);
            p.sampling_step = 0;
        });
    }

    pub fn set_textinfo(&self, text: impl Into<String>) {
        let text = text.into();
        self.update(|p| p.textinfo = Some(text));
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Reset all counters.
    pub fn clear(&self) {
        self.update(|p| *p = ProgressSnapshot::default());
    }
}
