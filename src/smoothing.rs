//! Parameter Smoothing
//!
//! Converts step-discontinuous control values into a per-sample continuous
//! signal. Every coefficient that feeds the chaotic oscillator passes through
//! one of these, since a hard jump in σ, ρ or the timestep throws the
//! trajectory off its attractor and is heard as a click.

/// Number of time constants that make up one ramp duration.
///
/// After five time constants the remaining distance is below 0.7%.
const TIME_CONSTANTS_PER_RAMP: f64 = 5.0;

/// Relative distance below which the smoother snaps onto its target
const SNAP_EPSILON: f64 = 1e-9;

/// Magnitude floor for the snap tolerance, so a zero target still settles
const SNAP_FLOOR: f64 = 1e-12;

/// Exponential-ramp smoother
///
/// `current += coeff * (target - current)` once per sample, with `coeff`
/// derived from the ramp duration. The value lands exactly on the target once
/// it is within a relative epsilon, so a settled smoother is bit-stable.
#[derive(Debug, Clone)]
pub struct SmoothedParameter {
    current: f64,
    target: f64,
    coeff: f64,
    sample_rate: f64,
    ramp_seconds: f64,
    smoothing: bool,
}

impl SmoothedParameter {
    /// Smoother resting at `initial`, ramping over `ramp_seconds`
    pub fn new(initial: f64, sample_rate: f64, ramp_seconds: f64) -> Self {
        let mut smoother = Self {
            current: initial,
            target: initial,
            coeff: 1.0,
            sample_rate,
            ramp_seconds,
            smoothing: false,
        };
        smoother.update_coeff();
        smoother
    }

    fn update_coeff(&mut self) {
        let ramp_samples = self.ramp_seconds * self.sample_rate;
        self.coeff = if ramp_samples <= 1.0 {
            1.0
        } else {
            let tau = ramp_samples / TIME_CONSTANTS_PER_RAMP;
            1.0 - libm::exp(-1.0 / tau)
        };
    }

    /// Re-derive the coefficient for a new sample rate and snap to target
    pub fn reset(&mut self, sample_rate: f64, ramp_seconds: f64) {
        self.sample_rate = sample_rate;
        self.ramp_seconds = ramp_seconds.max(0.0);
        self.update_coeff();
        self.snap();
    }

    /// Start ramping toward a new target
    #[inline]
    pub fn set_target(&mut self, target: f64) {
        if target != self.target {
            self.target = target;
            self.smoothing = target != self.current;
        }
    }

    /// Jump straight to a value, bypassing the ramp
    pub fn set_immediate(&mut self, value: f64) {
        self.target = value;
        self.snap();
    }

    /// Land on the current target without ramping
    pub fn snap(&mut self) {
        self.current = self.target;
        self.smoothing = false;
    }

    /// Advance one sample and return the smoothed value
    #[inline]
    pub fn next_value(&mut self) -> f64 {
        if self.smoothing {
            self.current += self.coeff * (self.target - self.current);

            let tolerance = SNAP_EPSILON * self.target.abs().max(SNAP_FLOOR);
            if (self.target - self.current).abs() <= tolerance {
                self.snap();
            }
        }
        self.current
    }

    /// Value returned by the last step
    #[inline]
    pub fn current(&self) -> f64 {
        self.current
    }

    /// Value the ramp is heading to
    #[inline]
    pub fn target(&self) -> f64 {
        self.target
    }

    /// True while a ramp is in progress
    pub fn is_smoothing(&self) -> bool {
        self.smoothing
    }
}

impl Default for SmoothedParameter {
    fn default() -> Self {
        Self::new(0.0, 44100.0, 0.05)
    }
}
