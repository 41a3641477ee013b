//! Modulation Sources
//!
//! The [`Modulator`] capability shared by every per-sample control generator
//! (the ADSR in [`crate::envelope`] and the LFO here).

use crate::smoothing::SmoothedParameter;
use core::f64::consts::{PI, TAU};

/// A per-sample control generator
pub trait Modulator {
    /// Adopt a sample rate and restart internal timing
    fn prepare(&mut self, sample_rate: f64);

    /// Produce the next value. Must be called exactly once per sample.
    fn process(&mut self) -> f64;

    /// Value returned by the most recent `process` call
    fn latest(&self) -> f64;
}

/// LFO waveform shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Waveform {
    #[default]
    Sine,
    Square,
    Triangle,
    SawUp,
    SawDown,
}

impl Waveform {
    /// Map a selector value (0–4) to a waveform
    pub fn from_selector(selector: f64) -> Self {
        match selector.round() as i64 {
            1 => Waveform::Square,
            2 => Waveform::Triangle,
            3 => Waveform::SawUp,
            4 => Waveform::SawDown,
            _ => Waveform::Sine,
        }
    }
}

/// Low Frequency Oscillator
///
/// Unipolar output in [0, 1]. The phase offset is smoothed so moving it does
/// not produce a step in the modulated coefficient.
pub struct Lfo {
    phase: f64,
    frequency: f64,
    waveform: Waveform,
    phase_offset: SmoothedParameter,
    sample_rate: f64,
    latest: f64,
}

impl Lfo {
    /// Sine LFO at 1 Hz
    pub fn new(sample_rate: f64) -> Self {
        Self {
            phase: 0.0,
            frequency: 1.0,
            waveform: Waveform::Sine,
            phase_offset: SmoothedParameter::new(0.0, sample_rate, 0.05),
            sample_rate,
            latest: 0.0,
        }
    }

    /// Set the rate in Hz
    pub fn set_frequency(&mut self, hz: f64) {
        self.frequency = hz.max(0.0);
    }

    /// Change the waveform, keeping the phase
    pub fn set_waveform(&mut self, waveform: Waveform) {
        self.waveform = waveform;
    }

    /// Phase offset in cycles (0–1)
    pub fn set_phase_offset(&mut self, cycles: f64) {
        self.phase_offset.set_target(cycles * TAU);
    }

    /// Restart at phase zero
    pub fn reset(&mut self) {
        self.phase = 0.0;
        self.phase_offset.snap();
    }

    fn shape(&self, phase: f64) -> f64 {
        match self.waveform {
            Waveform::Sine => (libm::sin(phase) + 1.0) * 0.5,
            Waveform::Square => {
                if phase < PI {
                    1.0
                } else {
                    0.0
                }
            }
            Waveform::Triangle => {
                if phase < PI {
                    phase / PI
                } else {
                    1.0 - (phase - PI) / PI
                }
            }
            Waveform::SawUp => phase / TAU,
            Waveform::SawDown => 1.0 - phase / TAU,
        }
    }
}

impl Default for Lfo {
    fn default() -> Self {
        Self::new(44100.0)
    }
}

impl Modulator for Lfo {
    fn prepare(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.phase_offset.reset(sample_rate, 0.05);
        self.phase = 0.0;
    }

    fn process(&mut self) -> f64 {
        let phase = (self.phase + self.phase_offset.next_value()).rem_euclid(TAU);
        self.latest = self.shape(phase);

        self.phase += self.frequency * TAU / self.sample_rate;
        if self.phase >= TAU {
            self.phase = self.phase.rem_euclid(TAU);
        }

        self.latest
    }

    fn latest(&self) -> f64 {
        self.latest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lfo_stays_unipolar() {
        for selector in 0..5 {
            let mut lfo = Lfo::new(1000.0);
            lfo.set_frequency(3.0);
            lfo.set_waveform(Waveform::from_selector(selector as f64));
            for _ in 0..2000 {
                let v = lfo.process();
                assert!((0.0..=1.0).contains(&v), "{:?} gave {}", lfo.waveform, v);
            }
        }
    }

    #[test]
    fn test_lfo_period() {
        let mut lfo = Lfo::new(1000.0);
        lfo.set_frequency(10.0);
        lfo.set_waveform(Waveform::SawUp);

        // Saw resets once per cycle: 10 cycles in one second
        let mut wraps = 0;
        let mut last = lfo.process();
        for _ in 1..1000 {
            let v = lfo.process();
            if v < last {
                wraps += 1;
            }
            last = v;
        }
        assert!((9..=10).contains(&wraps), "wraps = {}", wraps);
    }

    #[test]
    fn test_lfo_square_levels() {
        let mut lfo = Lfo::new(100.0);
        lfo.set_frequency(1.0);
        lfo.set_waveform(Waveform::Square);
        assert_eq!(lfo.process(), 1.0);
        for _ in 0..59 {
            lfo.process();
        }
        assert_eq!(lfo.process(), 0.0);
        assert_eq!(lfo.latest(), 0.0);
    }

    #[test]
    fn test_waveform_selector_falls_back_to_sine() {
        assert_eq!(Waveform::from_selector(7.0), Waveform::Sine);
        assert_eq!(Waveform::from_selector(2.2), Waveform::Triangle);
    }
}
