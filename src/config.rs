//! Voice Configuration
//!
//! Structural settings fixed for the lifetime of a prepared voice. Anything a
//! host can automate lives in the [`ParameterRegistry`](crate::params::ParameterRegistry)
//! instead.

use crate::error::{AttractorError, Result};
use crate::oscillator::MAX_STABLE_SUBSTEP;
use crate::pitch::PitchSettings;
use serde::{Deserialize, Serialize};

/// Configuration for a [`ChaosVoice`](crate::voice::ChaosVoice)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Parameter smoothing ramp in seconds (default: 0.05)
    pub ramp_seconds: f64,
    /// Largest RK4 step before sub-stepping kicks in (default: 0.005)
    pub max_stable_substep: f64,
    /// Pitch analysis window in samples (default: 2048)
    pub analysis_window: usize,
    /// Lowest detectable fundamental in Hz (default: 40)
    pub min_frequency: f64,
    /// Highest detectable fundamental in Hz (default: 4000)
    pub max_frequency: f64,
    /// NSDF peak height required to report a pitch (default: 0.5)
    pub clarity_threshold: f64,
    /// RMS below which the analysis window counts as silent (default: 1e-4)
    pub silence_rms: f64,
    /// Visualization FIFO capacity in points (default: 2048)
    pub fifo_capacity: usize,
    /// Trajectory points published per second of audio (default: 8000)
    pub points_per_second: f64,
    /// DC-blocking high-pass corner in Hz (default: 15)
    pub highpass_cutoff: f64,
    /// Anti-windup bounds of the lock's integral term (default: ±0.001)
    pub integral_limits: (f64, f64),
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            ramp_seconds: 0.05,
            max_stable_substep: MAX_STABLE_SUBSTEP,
            analysis_window: 2048,
            min_frequency: 40.0,
            max_frequency: 4000.0,
            clarity_threshold: 0.3,
            silence_rms: 1e-4,
            fifo_capacity: 2048,
            points_per_second: 8000.0,
            highpass_cutoff: 15.0,
            integral_limits: (-0.001, 0.001),
        }
    }
}

impl VoiceConfig {
    /// Seconds over which parameter changes ramp
    pub fn with_ramp_seconds(mut self, seconds: f64) -> Self {
        self.ramp_seconds = seconds;
        self
    }

    /// Largest RK4 substep before the oscillator subdivides
    pub fn with_max_stable_substep(mut self, substep: f64) -> Self {
        self.max_stable_substep = substep;
        self
    }

    /// Pitch analysis window in samples
    pub fn with_analysis_window(mut self, samples: usize) -> Self {
        self.analysis_window = samples;
        self
    }

    /// Pitch search range in Hz
    pub fn with_frequency_range(mut self, min: f64, max: f64) -> Self {
        self.min_frequency = min;
        self.max_frequency = max;
        self
    }

    /// Minimum NSDF peak height accepted as a pitch
    pub fn with_clarity_threshold(mut self, threshold: f64) -> Self {
        self.clarity_threshold = threshold;
        self
    }

    /// Visualization FIFO capacity in points
    pub fn with_fifo_capacity(mut self, capacity: usize) -> Self {
        self.fifo_capacity = capacity;
        self
    }

    /// Visualization points published per second
    pub fn with_points_per_second(mut self, rate: f64) -> Self {
        self.points_per_second = rate;
        self
    }

    /// Output DC-blocker corner in Hz
    pub fn with_highpass_cutoff(mut self, cutoff: f64) -> Self {
        self.highpass_cutoff = cutoff;
        self
    }

    /// Bounds on the lock's integral accumulator
    pub fn with_integral_limits(mut self, min: f64, max: f64) -> Self {
        self.integral_limits = (min, max);
        self
    }

    /// Settings handed to the pitch estimator
    pub fn pitch_settings(&self) -> PitchSettings {
        PitchSettings {
            min_frequency: self.min_frequency,
            max_frequency: self.max_frequency,
            clarity_threshold: self.clarity_threshold,
            silence_rms: self.silence_rms,
        }
    }

    /// Reject settings the voice cannot run with
    pub fn validate(&self) -> Result<()> {
        fn positive(name: &str, value: f64) -> Result<()> {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(AttractorError::InvalidConfig(format!(
                    "{} must be positive and finite, got {}",
                    name, value
                )))
            }
        }

        if !(self.ramp_seconds.is_finite() && self.ramp_seconds >= 0.0) {
            return Err(AttractorError::InvalidConfig(format!(
                "ramp_seconds must be non-negative, got {}",
                self.ramp_seconds
            )));
        }
        positive("max_stable_substep", self.max_stable_substep)?;
        positive("min_frequency", self.min_frequency)?;
        positive("max_frequency", self.max_frequency)?;
        positive("highpass_cutoff", self.highpass_cutoff)?;

        if self.analysis_window < 4 {
            return Err(AttractorError::InvalidConfig(format!(
                "analysis_window must hold at least 4 samples, got {}",
                self.analysis_window
            )));
        }
        if self.fifo_capacity == 0 {
            return Err(AttractorError::InvalidConfig(
                "fifo_capacity must be at least 1".to_string(),
            ));
        }
        if self.min_frequency >= self.max_frequency {
            return Err(AttractorError::InvalidConfig(format!(
                "min_frequency ({}) must be below max_frequency ({})",
                self.min_frequency, self.max_frequency
            )));
        }
        if !(0.0..=1.0).contains(&self.clarity_threshold) {
            return Err(AttractorError::InvalidConfig(format!(
                "clarity_threshold must lie in [0, 1], got {}",
                self.clarity_threshold
            )));
        }
        if !(self.points_per_second.is_finite() && self.points_per_second >= 0.0) {
            return Err(AttractorError::InvalidConfig(format!(
                "points_per_second must be non-negative, got {}",
                self.points_per_second
            )));
        }
        let (lo, hi) = self.integral_limits;
        if !(lo.is_finite() && hi.is_finite()) || lo > hi {
            return Err(AttractorError::InvalidConfig(format!(
                "integral_limits ({}, {}) are not an ordered range",
                lo, hi
            )));
        }
        Ok(())
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize from JSON and validate. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}
