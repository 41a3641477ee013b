//! Pitch Estimation
//!
//! McLeod Pitch Method over a rolling analysis window:
//!
//! 1. The window mean is removed, so a DC offset (the Lorenz z axis sits
//!    around +25) does not swamp the autocorrelation
//! 2. Autocorrelation `r(τ)` of the window via a zero-padded real FFT
//! 3. Normalised square difference `n(τ) = 2r(τ) / m(τ)` where
//!    `m(τ) = Σ x[j]² + x[j+τ]²` over the overlapping part
//! 4. Key maxima: the highest NSDF value in each positive lobe after the
//!    first negative-going zero crossing. Only lobes that close again before
//!    the longest searched lag count.
//! 5. The first key maximum above `cutoff × highest` wins; its height is the
//!    clarity, and parabolic interpolation refines the period
//!
//! Chaotic signals alternate loop amplitudes, so the lag of two or three
//! periods often correlates better than one. The cutoff is therefore far
//! lower than the 0.8–1.0 used for instruments, and [`PitchTracker`] takes
//! the median of recent estimates before they drive the frequency lock.
//!
//! The window is shifted by one audio block per call, so an estimate lags the
//! true pitch by up to one window length.
//!
//! # References
//!
//! - "A Smarter Way to Find Pitch" - Philip McLeod & Geoff Wyvill (2005)

use realfft::num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use std::sync::Arc;

/// Fraction of the highest key maximum a candidate must reach
const KEY_MAX_CUTOFF: f64 = 0.4;

/// Estimates [`PitchTracker`] takes the median of
pub const TRACKER_DEPTH: usize = 5;

/// Detection limits and confidence thresholds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchSettings {
    pub min_frequency: f64,
    pub max_frequency: f64,
    /// Minimum NSDF peak height to report a pitch
    pub clarity_threshold: f64,
    /// Windows quieter than this RMS report no pitch
    pub silence_rms: f64,
}

impl Default for PitchSettings {
    fn default() -> Self {
        Self {
            min_frequency: 40.0,
            max_frequency: 4000.0,
            clarity_threshold: 0.3,
            silence_rms: 1e-4,
        }
    }
}

/// Rolling-window fundamental frequency estimator
pub struct PitchEstimator {
    settings: PitchSettings,
    sample_rate: f64,
    window: Vec<f64>,
    centred: Vec<f64>,
    fft_input: Vec<f64>,
    spectrum: Vec<Complex<f64>>,
    autocorr: Vec<f64>,
    nsdf: Vec<f64>,
    forward: Arc<dyn RealToComplex<f64>>,
    inverse: Arc<dyn ComplexToReal<f64>>,
    forward_scratch: Vec<Complex<f64>>,
    inverse_scratch: Vec<Complex<f64>>,
    latest: Option<f64>,
}

impl PitchEstimator {
    /// Estimator over a rolling window of `window_samples`
    pub fn new(sample_rate: f64, window_samples: usize) -> Self {
        let mut planner = RealFftPlanner::<f64>::new();
        let window_samples = window_samples.max(4);
        let fft_len = 2 * window_samples;
        let forward = planner.plan_fft_forward(fft_len);
        let inverse = planner.plan_fft_inverse(fft_len);

        Self {
            settings: PitchSettings::default(),
            sample_rate,
            window: vec![0.0; window_samples],
            centred: vec![0.0; window_samples],
            fft_input: forward.make_input_vec(),
            spectrum: forward.make_output_vec(),
            autocorr: inverse.make_output_vec(),
            nsdf: vec![0.0; window_samples],
            forward_scratch: forward.make_scratch_vec(),
            inverse_scratch: inverse.make_scratch_vec(),
            forward,
            inverse,
            latest: None,
        }
    }

    /// Replace the default search settings
    pub fn with_settings(mut self, settings: PitchSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Replace the search settings
    pub fn set_settings(&mut self, settings: PitchSettings) {
        self.settings = settings;
    }

    /// Re-plan for a new sample rate and window size, clearing history
    pub fn prepare(&mut self, sample_rate: f64, window_samples: usize) {
        if window_samples.max(4) != self.window.len() {
            *self = Self::new(sample_rate, window_samples).with_settings(self.settings);
        } else {
            self.sample_rate = sample_rate;
            self.reset();
        }
    }

    /// Clear the window and the latest estimate
    pub fn reset(&mut self) {
        self.window.fill(0.0);
        self.latest = None;
    }

    /// Analysis window length in samples
    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Most recent estimate
    pub fn latest(&self) -> Option<f64> {
        self.latest
    }

    /// Shift out the oldest samples and append `block` at the end of the window
    pub fn push_block(&mut self, block: &[f64]) {
        let n = self.window.len();
        if block.len() >= n {
            self.window.copy_from_slice(&block[block.len() - n..]);
        } else {
            self.window.copy_within(block.len().., 0);
            self.window[n - block.len()..].copy_from_slice(block);
        }
    }

    /// Estimate the pitch of the current rolling window
    pub fn estimate(&mut self) -> Option<f64> {
        let window = std::mem::take(&mut self.window);
        let result = self.estimate_window(&window);
        self.window = window;
        self.latest = result;
        result
    }

    /// Estimate the pitch of an arbitrary buffer no longer than the window
    pub fn estimate_window(&mut self, samples: &[f64]) -> Option<f64> {
        let n = samples.len().min(self.centred.len());
        if n < 4 {
            return None;
        }

        let mean = samples[..n].iter().sum::<f64>() / n as f64;
        let mut centred = std::mem::take(&mut self.centred);
        for (c, &s) in centred.iter_mut().zip(&samples[..n]) {
            *c = s - mean;
        }
        let result = self.analyse(&centred[..n]);
        self.centred = centred;
        result
    }

    /// MPM over a zero-mean buffer no longer than the window
    fn analyse(&mut self, samples: &[f64]) -> Option<f64> {
        let n = samples.len();
        let energy: f64 = samples.iter().map(|s| s * s).sum();
        let rms = (energy / n as f64).sqrt();
        if !rms.is_finite() || rms < self.settings.silence_rms {
            return None;
        }

        self.autocorrelate(samples)?;
        self.normalise(samples, energy);

        let max_lag = ((self.sample_rate / self.settings.min_frequency).ceil() as usize).min(n / 2);
        let min_lag = ((self.sample_rate / self.settings.max_frequency).floor() as usize).max(1);
        if min_lag + 2 >= max_lag {
            return None;
        }

        let (lag, clarity) = self.pick_period(min_lag, max_lag)?;
        if clarity < self.settings.clarity_threshold {
            return None;
        }

        let frequency = self.sample_rate / lag;
        (frequency.is_finite() && frequency > 0.0).then_some(frequency)
    }

    /// Fill `self.autocorr[..n]` with the linear autocorrelation of `samples`
    fn autocorrelate(&mut self, samples: &[f64]) -> Option<()> {
        let n = samples.len();
        self.fft_input.fill(0.0);
        self.fft_input[..n].copy_from_slice(samples);

        self.forward
            .process_with_scratch(&mut self.fft_input, &mut self.spectrum, &mut self.forward_scratch)
            .ok()?;

        for bin in self.spectrum.iter_mut() {
            *bin = Complex::new(bin.norm_sqr(), 0.0);
        }

        self.inverse
            .process_with_scratch(&mut self.spectrum, &mut self.autocorr, &mut self.inverse_scratch)
            .ok()?;

        // Unnormalised inverse transform scales by the FFT length
        let scale = 1.0 / self.autocorr.len() as f64;
        for r in &mut self.autocorr[..n] {
            *r *= scale;
        }
        Some(())
    }

    fn normalise(&mut self, samples: &[f64], energy: f64) {
        let n = samples.len();
        let mut m = 2.0 * energy;
        for tau in 0..n {
            if tau > 0 {
                m -= samples[tau - 1] * samples[tau - 1] + samples[n - tau] * samples[n - tau];
            }
            self.nsdf[tau] = if m > 1e-12 {
                2.0 * self.autocorr[tau] / m
            } else {
                0.0
            };
        }
    }

    /// Returns the refined period in samples and its clarity
    fn pick_period(&self, min_lag: usize, max_lag: usize) -> Option<(f64, f64)> {
        let nsdf = &self.nsdf[..=max_lag];

        // Skip the zero-lag lobe
        let mut tau = 1;
        while tau < max_lag && nsdf[tau] > 0.0 {
            tau += 1;
        }
        tau = tau.max(min_lag);

        let mut best: Option<(usize, f64)> = None;
        let mut candidates: [(usize, f64); 32] = [(0, 0.0); 32];
        let mut count = 0;

        while tau < max_lag {
            // Advance to the next positive lobe
            while tau < max_lag && nsdf[tau] <= 0.0 {
                tau += 1;
            }
            let mut peak: Option<(usize, f64)> = None;
            while tau < max_lag && nsdf[tau] > 0.0 {
                if peak.map_or(true, |(_, v)| nsdf[tau] > v) {
                    peak = Some((tau, nsdf[tau]));
                }
                tau += 1;
            }
            // A lobe still open at the search limit has no confirmed peak
            if tau >= max_lag {
                break;
            }
            if let Some((index, value)) = peak {
                if count < candidates.len() {
                    candidates[count] = (index, value);
                    count += 1;
                }
                if best.map_or(true, |(_, v)| value > v) {
                    best = Some((index, value));
                }
            }
        }

        let (_, highest) = best?;
        let threshold = KEY_MAX_CUTOFF * highest;
        let &(index, _) = candidates[..count].iter().find(|(_, v)| *v >= threshold)?;

        Some(self.interpolate(index))
    }

    /// Parabolic interpolation around an NSDF peak
    fn interpolate(&self, index: usize) -> (f64, f64) {
        let a = self.nsdf[index - 1];
        let b = self.nsdf[index];
        let c = self.nsdf[index + 1];
        let denom = a - 2.0 * b + c;
        if denom.abs() < 1e-12 {
            return (index as f64, b);
        }
        let shift = (0.5 * (a - c) / denom).clamp(-0.5, 0.5);
        let height = b - 0.25 * (a - c) * shift;
        (index as f64 + shift, height)
    }
}

/// Running median of the most recent [`TRACKER_DEPTH`] estimates
///
/// A single octave-low reading moves the median by at most one rank, so the
/// lock is not kicked by the subharmonic picks chaotic signals produce.
#[derive(Debug, Clone, Default)]
pub struct PitchTracker {
    history: [f64; TRACKER_DEPTH],
    len: usize,
    next: usize,
}

impl PitchTracker {
    /// Empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an estimate and return the median of the recent ones
    pub fn push(&mut self, hz: f64) -> f64 {
        self.history[self.next] = hz;
        self.next = (self.next + 1) % TRACKER_DEPTH;
        self.len = (self.len + 1).min(TRACKER_DEPTH);
        self.median().unwrap_or(hz)
    }

    /// Median of the recorded estimates, `None` before the first
    pub fn median(&self) -> Option<f64> {
        if self.len == 0 {
            return None;
        }
        let mut sorted = self.history;
        let recent = &mut sorted[..self.len];
        recent.sort_by(f64::total_cmp);
        Some(0.5 * (recent[(self.len - 1) / 2] + recent[self.len / 2]))
    }

    /// Forget every recorded estimate
    pub fn reset(&mut self) {
        self.len = 0;
        self.next = 0;
    }
}
