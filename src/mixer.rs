//! Voice Mixer
//!
//! Folds the three raw oscillator axes down to stereo. Every axis is scaled by
//! its fixed [`AXIS_SCALE`] entry and then by its own smoothed level and
//! constant-power pan. The sum is multiplied by the smoothed output level and the envelope.
//! A one-pole high-pass strips the sub-audio drift of the attractor from the
//! finished block.

use crate::smoothing::SmoothedParameter;
use core::f64::consts::{PI, TAU};

/// Fixed per-axis gain bringing raw Lorenz coordinates near unity, indexed
/// by [`Axis`]. Z spans roughly twice the range of X and Y.
pub const AXIS_SCALE: [f64; 3] = [0.05, 0.05, 0.025];

/// Default corner of the DC-blocking high-pass in Hz
pub const DEFAULT_HIGHPASS_CUTOFF: f64 = 15.0;

/// Decibels to linear gain
#[inline]
pub fn db_to_gain(db: f64) -> f64 {
    libm::pow(10.0, db / 20.0)
}

/// Constant-power pan law, `pan` in [-1, 1]
///
/// Returns `(left, right)` gains with `left² + right² = 1`.
#[inline]
pub fn pan_gains(pan: f64) -> (f64, f64) {
    let angle = (pan.clamp(-1.0, 1.0) + 1.0) * PI / 4.0;
    (libm::cos(angle), libm::sin(angle))
}

/// First-order RC high-pass
///
/// `y[n] = a · (y[n-1] + x[n] - x[n-1])` with `a = RC / (RC + 1/fs)`.
#[derive(Debug, Clone)]
pub struct OnePoleHighPass {
    cutoff: f64,
    sample_rate: f64,
    a: f64,
    prev_in: f64,
    prev_out: f64,
}

impl OnePoleHighPass {
    /// High-pass with corner `cutoff` Hz
    pub fn new(cutoff: f64, sample_rate: f64) -> Self {
        let mut hp = Self {
            cutoff,
            sample_rate,
            a: 1.0,
            prev_in: 0.0,
            prev_out: 0.0,
        };
        hp.update_coefficient();
        hp
    }

    fn update_coefficient(&mut self) {
        let rc = 1.0 / (TAU * self.cutoff.max(1e-3));
        let dt = 1.0 / self.sample_rate;
        self.a = rc / (rc + dt);
    }

    /// Recompute the coefficient for a new sample rate and clear history
    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.update_coefficient();
        self.reset();
    }

    /// Move the corner frequency
    pub fn set_cutoff(&mut self, cutoff: f64) {
        self.cutoff = cutoff;
        self.update_coefficient();
    }

    /// Corner frequency in Hz
    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    /// Clear the filter history
    pub fn reset(&mut self) {
        self.prev_in = 0.0;
        self.prev_out = 0.0;
    }

    /// Filter one sample
    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        let output = self.a * (self.prev_out + input - self.prev_in);
        self.prev_in = input;
        self.prev_out = output;
        output
    }
}

/// Oscillator axis addressed by level/pan controls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Map a selector value (0–2) to an axis
    pub fn from_selector(selector: f64) -> Self {
        match selector.round() as i64 {
            1 => Axis::Y,
            2 => Axis::Z,
            _ => Axis::X,
        }
    }

    /// Position in per-axis arrays
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Three-axis to stereo mixer with DC blocking
pub struct VoiceMixer {
    levels: [SmoothedParameter; 3],
    pans: [SmoothedParameter; 3],
    output: SmoothedParameter,
    highpass: [OnePoleHighPass; 2],
    sample_rate: f64,
    ramp_seconds: f64,
}

impl VoiceMixer {
    /// Mixer at -6 dB per axis with X left, Y right and Z centred
    pub fn new(sample_rate: f64) -> Self {
        let ramp_seconds = 0.05;
        let smoother = |v: f64| SmoothedParameter::new(v, sample_rate, ramp_seconds);
        let (level, pans) = (db_to_gain(-6.0), [-0.5, 0.5, 0.0]);
        Self {
            levels: [smoother(level), smoother(level), smoother(level)],
            pans: pans.map(smoother),
            output: smoother(1.0),
            highpass: [
                OnePoleHighPass::new(DEFAULT_HIGHPASS_CUTOFF, sample_rate),
                OnePoleHighPass::new(DEFAULT_HIGHPASS_CUTOFF, sample_rate),
            ],
            sample_rate,
            ramp_seconds,
        }
    }

    /// Set the DC-blocker corner on both channels
    pub fn with_highpass_cutoff(mut self, cutoff: f64) -> Self {
        for hp in &mut self.highpass {
            hp.set_cutoff(cutoff);
        }
        self
    }

    /// Seconds over which level and pan changes ramp
    pub fn set_ramp_length(&mut self, seconds: f64) {
        self.ramp_seconds = seconds.max(0.0);
        self.prepare(self.sample_rate);
    }

    /// Adopt a sample rate, snapping smoothers and clearing filter history
    pub fn prepare(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        let ramp_seconds = self.ramp_seconds;
        for s in self.smoothers_mut() {
            s.reset(sample_rate, ramp_seconds);
        }
        for hp in &mut self.highpass {
            hp.set_sample_rate(sample_rate);
        }
    }

    /// Snap smoothers to their targets and clear filter history
    pub fn reset(&mut self) {
        for s in self.smoothers_mut() {
            s.snap();
        }
        for hp in &mut self.highpass {
            hp.reset();
        }
    }

    fn smoothers_mut(&mut self) -> impl Iterator<Item = &mut SmoothedParameter> {
        self.levels
            .iter_mut()
            .chain(self.pans.iter_mut())
            .chain(core::iter::once(&mut self.output))
    }

    /// Set an axis level in dB
    pub fn set_level_db(&mut self, axis: Axis, db: f64) {
        self.levels[axis.index()].set_target(db_to_gain(db));
    }

    /// Set an axis pan, -1 (left) to 1 (right)
    pub fn set_pan(&mut self, axis: Axis, pan: f64) {
        self.pans[axis.index()].set_target(pan.clamp(-1.0, 1.0));
    }

    /// Set the master output level in dB
    pub fn set_output_db(&mut self, db: f64) {
        self.output.set_target(db_to_gain(db));
    }

    /// Mix one frame of raw oscillator output to `(left, right)`
    #[inline]
    pub fn mix(&mut self, axes: [f64; 3], envelope: f64) -> (f64, f64) {
        let mut left = 0.0;
        let mut right = 0.0;
        for (i, &raw) in axes.iter().enumerate() {
            let level = self.levels[i].next_value();
            let (gl, gr) = pan_gains(self.pans[i].next_value());
            let v = raw * AXIS_SCALE[i] * level;
            left += v * gl;
            right += v * gr;
        }
        let gain = self.output.next_value() * envelope;
        (left * gain, right * gain)
    }

    /// High-pass a finished stereo block in place
    pub fn highpass_block(&mut self, left: &mut [f32], right: &mut [f32]) {
        let [hp_l, hp_r] = &mut self.highpass;
        for sample in left.iter_mut() {
            *sample = hp_l.process(*sample as f64) as f32;
        }
        for sample in right.iter_mut() {
            *sample = hp_r.process(*sample as f64) as f32;
        }
    }
}

impl Default for VoiceMixer {
    fn default() -> Self {
        Self::new(44100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pan_law_is_constant_power() {
        for i in 0..=20 {
            let pan = -1.0 + i as f64 * 0.1;
            let (l, r) = pan_gains(pan);
            assert_relative_eq!(l * l + r * r, 1.0, epsilon = 1e-12);
        }
        let (l, r) = pan_gains(0.0);
        assert_relative_eq!(l, core::f64::consts::FRAC_1_SQRT_2, epsilon = 1e-12);
        assert_relative_eq!(r, core::f64::consts::FRAC_1_SQRT_2, epsilon = 1e-12);

        let (l, r) = pan_gains(-1.0);
        assert_relative_eq!(l, 1.0, epsilon = 1e-12);
        assert!(r.abs() < 1e-12);
    }

    #[test]
    fn test_db_to_gain() {
        assert_relative_eq!(db_to_gain(0.0), 1.0);
        assert_relative_eq!(db_to_gain(-20.0), 0.1, epsilon = 1e-12);
        assert!((db_to_gain(-6.0) - 0.501).abs() < 0.001);
    }

    #[test]
    fn test_highpass_blocks_dc() {
        let mut hp = OnePoleHighPass::new(15.0, 44100.0);
        let mut out = 0.0;
        for _ in 0..44100 {
            out = hp.process(1.0);
        }
        assert!(out.abs() < 1e-6);
    }

    #[test]
    fn test_highpass_passes_audio() {
        let sr = 44100.0;
        let mut hp = OnePoleHighPass::new(15.0, sr);
        let (mut sum_in, mut sum_out) = (0.0, 0.0);
        for n in 0..8820 {
            let x = libm::sin(TAU * 1000.0 * n as f64 / sr);
            let y = hp.process(x);
            if n >= 4410 {
                sum_in += x * x;
                sum_out += y * y;
            }
        }
        let ratio = (sum_out / sum_in).sqrt();
        assert!(ratio > 0.98 && ratio < 1.01, "ratio = {}", ratio);
    }

    #[test]
    fn test_mix_routes_axes_through_pan() {
        let mut mixer = VoiceMixer::new(1000.0);
        mixer.set_level_db(Axis::X, 0.0);
        mixer.set_pan(Axis::X, -1.0);
        mixer.reset();

        let (l, r) = mixer.mix([40.0, 0.0, 0.0], 1.0);
        assert_relative_eq!(l, 40.0 * AXIS_SCALE[Axis::X.index()], epsilon = 1e-12);
        assert!(r.abs() < 1e-12);
    }

    #[test]
    fn test_axis_scale_per_axis() {
        let mut mixer = VoiceMixer::new(1000.0);
        for axis in Axis::ALL {
            mixer.set_level_db(axis, 0.0);
            mixer.set_pan(axis, -1.0);
        }
        mixer.reset();

        let (x, _) = mixer.mix([20.0, 0.0, 0.0], 1.0);
        let (y, _) = mixer.mix([0.0, 20.0, 0.0], 1.0);
        let (z, _) = mixer.mix([0.0, 0.0, 20.0], 1.0);
        assert_relative_eq!(x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(y, 1.0, epsilon = 1e-12);
        assert_relative_eq!(z, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_mix_silent_without_envelope() {
        let mut mixer = VoiceMixer::default();
        assert_eq!(mixer.mix([10.0, -5.0, 30.0], 0.0), (0.0, 0.0));
    }

    #[test]
    fn test_level_changes_are_smoothed() {
        let mut mixer = VoiceMixer::new(1000.0);
        mixer.set_level_db(Axis::Z, 0.0);
        mixer.set_pan(Axis::Z, 0.0);
        mixer.reset();

        mixer.set_level_db(Axis::Z, -60.0);
        let (first, _) = mixer.mix([0.0, 0.0, 40.0], 1.0);
        // One sample into a 50 ms ramp is still close to full level
        let full = 40.0 * AXIS_SCALE[Axis::Z.index()] * core::f64::consts::FRAC_1_SQRT_2;
        assert!(first > 0.5 * full);

        let mut last = first;
        for _ in 0..200 {
            last = mixer.mix([0.0, 0.0, 40.0], 1.0).0;
        }
        assert!(last < 0.01);
    }

    #[test]
    fn test_highpass_block_filters_both_channels() {
        let mut mixer = VoiceMixer::default();
        let mut left = vec![0.5f32; 44100];
        let mut right = vec![-0.5f32; 44100];
        mixer.highpass_block(&mut left, &mut right);
        assert!(left[44099].abs() < 1e-5);
        assert!(right[44099].abs() < 1e-5);
        assert!(left[0] > 0.49);
    }

    #[test]
    fn test_axis_selector() {
        assert_eq!(Axis::from_selector(0.0), Axis::X);
        assert_eq!(Axis::from_selector(2.0), Axis::Z);
        assert_eq!(Axis::from_selector(7.0), Axis::X);
    }
}
