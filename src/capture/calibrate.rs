//! Overhead self-calibration.
//!
//! Drives `samples` dummy push/pop pairs nested in one outer pair through a
//! real recorder, several times. Per trial, the outer span is what the
//! dummies cost their parent (children overhead) and the sum of the dummy
//! spans is what each dummy sees of itself (self overhead). Trials are
//! combined with a configurable trimming policy.

use std::hint::black_box;
use std::sync::Arc;
use std::time::Instant;

use log::debug;
use serde::{Deserialize, Serialize};

use super::recorder::ThreadRecorder;
use super::registry::CollectingSink;
use crate::utils::config::{
    CALIBRATION_SAMPLES_ENV, CALIBRATION_TRIALS_ENV, DEFAULT_CALIBRATION_SAMPLES,
    DEFAULT_CALIBRATION_TRIALS,
};
use crate::utils::error::CaptureError;

/// Measured instrumentation cost, scaled to `samples` calls.
///
/// A zero `samples` means "not calibrated"; mitigation is then a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Calibration {
    pub samples: u32,
    pub self_ns: u64,
    pub children_ns: u64,
}

impl Calibration {
    pub fn new(samples: u32, self_ns: u64, children_ns: u64) -> Self {
        Self {
            samples,
            self_ns,
            children_ns,
        }
    }

    pub fn is_calibrated(&self) -> bool {
        self.samples > 0
    }

    /// Self overhead accumulated by `calls` intervals
    pub fn self_overhead(&self, calls: u64) -> u64 {
        scale(self.self_ns, calls, self.samples)
    }

    /// Overhead `calls` child intervals add to their parent
    pub fn children_overhead(&self, calls: u64) -> u64 {
        scale(self.children_ns, calls, self.samples)
    }

    pub fn self_per_call_ns(&self) -> f64 {
        per_call(self.self_ns, self.samples)
    }

    pub fn children_per_call_ns(&self) -> f64 {
        per_call(self.children_ns, self.samples)
    }
}

fn scale(total_ns: u64, calls: u64, samples: u32) -> u64 {
    if samples == 0 {
        return 0;
    }
    (total_ns as u128 * calls as u128 / samples as u128) as u64
}

fn per_call(total_ns: u64, samples: u32) -> f64 {
    if samples == 0 {
        0.0
    } else {
        total_ns as f64 / samples as f64
    }
}

/// How per-trial measurements are combined
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrimPolicy {
    /// Plain arithmetic mean
    Mean,
    /// Drop the `discard` lowest and highest trials, average the rest
    Trimmed { discard: usize },
    /// Average the trials within `k` standard deviations of the mean
    SigmaClip { k: f64 },
}

impl Default for TrimPolicy {
    fn default() -> Self {
        TrimPolicy::Trimmed { discard: 1 }
    }
}

impl TrimPolicy {
    pub fn combine(&self, values: &[u64]) -> u64 {
        if values.is_empty() {
            return 0;
        }
        match *self {
            TrimPolicy::Mean => mean(values),
            TrimPolicy::Trimmed { discard } => {
                let mut sorted = values.to_vec();
                sorted.sort_unstable();
                if sorted.len() <= 2 * discard {
                    return sorted[sorted.len() / 2];
                }
                mean(&sorted[discard..sorted.len() - discard])
            }
            TrimPolicy::SigmaClip { k } => {
                let avg = values.iter().sum::<u64>() as f64 / values.len() as f64;
                let var = values
                    .iter()
                    .map(|&v| (v as f64 - avg).powi(2))
                    .sum::<f64>()
                    / values.len() as f64;
                let bound = k * var.sqrt();
                let kept: Vec<u64> = values
                    .iter()
                    .copied()
                    .filter(|&v| (v as f64 - avg).abs() <= bound)
                    .collect();
                if kept.is_empty() {
                    mean(values)
                } else {
                    mean(&kept)
                }
            }
        }
    }
}

fn mean(values: &[u64]) -> u64 {
    (values.iter().map(|&v| v as u128).sum::<u128>() / values.len() as u128) as u64
}

#[derive(Debug, Clone)]
pub struct CalibrationConfig {
    pub samples: u32,
    pub trials: u32,
    pub trim: TrimPolicy,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            samples: DEFAULT_CALIBRATION_SAMPLES,
            trials: DEFAULT_CALIBRATION_TRIALS,
            trim: TrimPolicy::default(),
        }
    }
}

impl CalibrationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `FPSPROF_CALIBRATION_SAMPLES` / `_TRIALS`
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(samples) = env_u32(CALIBRATION_SAMPLES_ENV) {
            config.samples = samples;
        }
        if let Some(trials) = env_u32(CALIBRATION_TRIALS_ENV) {
            config.trials = trials;
        }
        config
    }

    pub fn with_samples(mut self, samples: u32) -> Self {
        self.samples = samples;
        self
    }

    pub fn with_trials(mut self, trials: u32) -> Self {
        self.trials = trials;
        self
    }

    pub fn with_trim(mut self, trim: TrimPolicy) -> Self {
        self.trim = trim;
        self
    }
}

fn env_u32(key: &str) -> Option<u32> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// One trial: (self_ns, children_ns) for `samples` dummy intervals
fn run_trial(samples: u32) -> Result<(u64, u64), CaptureError> {
    let sink = Arc::new(CollectingSink::default());
    {
        let mut recorder = ThreadRecorder::new(sink.clone(), Instant::now());
        let outer = recorder.push(black_box("outer"), false);
        for _ in 0..samples {
            let inner = recorder.push(black_box("dummy"), false);
            recorder.pop(black_box(inner))?;
        }
        recorder.pop(outer)?;
    }

    let events = sink.take().into_iter().next().unwrap_or_default();
    let mut spans = events.iter().map(|e| e.duration_ns());
    let children_ns = spans.next().unwrap_or(0);
    let self_ns = spans.sum();
    Ok((self_ns, children_ns))
}

/// Measure the recorder's own overhead.
pub fn calibrate(config: &CalibrationConfig) -> Result<Calibration, CaptureError> {
    if config.samples == 0 || config.trials == 0 {
        return Ok(Calibration::default());
    }

    let mut self_trials = Vec::with_capacity(config.trials as usize);
    let mut children_trials = Vec::with_capacity(config.trials as usize);
    for trial in 0..config.trials {
        let (self_ns, children_ns) = run_trial(config.samples)?;
        debug!(
            "calibration trial {}: self {} ns, children {} ns per {} calls",
            trial, self_ns, children_ns, config.samples
        );
        self_trials.push(self_ns);
        children_trials.push(children_ns);
    }

    Ok(Calibration {
        samples: config.samples,
        self_ns: config.trim.combine(&self_trials),
        children_ns: config.trim.combine(&children_trials),
    })
}
