//! ADSR Envelope Generator
//!
//! Linear-segment monophonic envelope: Idle → Attack → Decay → Sustain →
//! Release → Idle. `note_on` restarts the attack from the current level, so a
//! retrigger never jumps. `note_off` enters Release from any active stage,
//! with the release slope computed from the level at that moment.

use crate::modulator::Modulator;

/// Current segment of the envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdsrStage {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// Segment durations (seconds) and sustain level (0–1)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdsrParameters {
    pub attack: f64,
    pub decay: f64,
    pub sustain: f64,
    pub release: f64,
}

impl Default for AdsrParameters {
    fn default() -> Self {
        Self {
            attack: 0.01,
            decay: 0.1,
            sustain: 0.8,
            release: 0.3,
        }
    }
}

pub struct Adsr {
    stage: AdsrStage,
    level: f64,
    params: AdsrParameters,
    attack_rate: f64,
    decay_rate: f64,
    release_rate: f64,
    sample_rate: f64,
}

impl Adsr {
    /// Idle envelope with default segments
    pub fn new(sample_rate: f64) -> Self {
        let mut adsr = Self {
            stage: AdsrStage::Idle,
            level: 0.0,
            params: AdsrParameters::default(),
            attack_rate: 0.0,
            decay_rate: 0.0,
            release_rate: 0.0,
            sample_rate,
        };
        adsr.recalculate_rates();
        adsr
    }

    fn rate(distance: f64, seconds: f64, sample_rate: f64) -> f64 {
        if seconds > 0.0 {
            distance / (seconds * sample_rate)
        } else {
            -1.0
        }
    }

    fn recalculate_rates(&mut self) {
        let sr = self.sample_rate;
        self.attack_rate = Self::rate(1.0, self.params.attack, sr);
        self.decay_rate = Self::rate(1.0 - self.params.sustain, self.params.decay, sr);
        self.release_rate = Self::rate(self.level, self.params.release, sr);
    }

    /// Install new segment settings. Only future slopes change.
    pub fn set_parameters(&mut self, params: AdsrParameters) {
        let params = AdsrParameters {
            attack: params.attack.max(0.0),
            decay: params.decay.max(0.0),
            sustain: params.sustain.clamp(0.0, 1.0),
            release: params.release.max(0.0),
        };
        if params == self.params {
            return;
        }

        let release_rate = self.release_rate;
        self.params = params;
        self.recalculate_rates();

        // A release already in flight keeps the slope it started with
        if self.stage == AdsrStage::Release {
            self.release_rate = release_rate;
        }
    }

    /// Current segment settings
    pub fn parameters(&self) -> AdsrParameters {
        self.params
    }

    /// Start the attack from the current level
    pub fn note_on(&mut self) {
        if self.attack_rate > 0.0 {
            self.stage = AdsrStage::Attack;
        } else if self.decay_rate > 0.0 {
            self.level = 1.0;
            self.stage = AdsrStage::Decay;
        } else {
            self.level = self.params.sustain;
            self.stage = AdsrStage::Sustain;
        }
    }

    /// Enter the release segment; with zero release time the envelope stops at once
    pub fn note_off(&mut self) {
        if self.stage == AdsrStage::Idle {
            return;
        }
        if self.params.release > 0.0 {
            // From level zero the release ends on the next sample
            self.release_rate = self.level / (self.params.release * self.sample_rate);
            self.stage = AdsrStage::Release;
        } else {
            self.reset();
        }
    }

    /// False only once the envelope is Idle
    pub fn is_active(&self) -> bool {
        self.stage != AdsrStage::Idle
    }

    /// Current segment
    pub fn stage(&self) -> AdsrStage {
        self.stage
    }

    /// Output of the last processed sample
    pub fn level(&self) -> f64 {
        self.level
    }

    /// Jump to Idle at level zero
    pub fn reset(&mut self) {
        self.stage = AdsrStage::Idle;
        self.level = 0.0;
    }

    fn enter_decay_or_sustain(&mut self) {
        if self.decay_rate > 0.0 {
            self.stage = AdsrStage::Decay;
        } else {
            self.level = self.params.sustain;
            self.stage = AdsrStage::Sustain;
        }
    }
}

impl Default for Adsr {
    fn default() -> Self {
        Self::new(44100.0)
    }
}

impl Modulator for Adsr {
    fn prepare(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.recalculate_rates();
    }

    fn process(&mut self) -> f64 {
        match self.stage {
            AdsrStage::Idle => {}
            AdsrStage::Attack => {
                self.level += self.attack_rate;
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.enter_decay_or_sustain();
                }
            }
            AdsrStage::Decay => {
                self.level -= self.decay_rate;
                if self.level <= self.params.sustain {
                    self.level = self.params.sustain;
                    self.stage = AdsrStage::Sustain;
                }
            }
            AdsrStage::Sustain => {
                // Glide onto a moved sustain level at the full-scale decay slope
                let max_step = if self.params.decay > 0.0 {
                    1.0 / (self.params.decay * self.sample_rate)
                } else {
                    1.0
                };
                let diff = self.params.sustain - self.level;
                self.level += diff.clamp(-max_step, max_step);
            }
            AdsrStage::Release => {
                self.level -= self.release_rate;
                if self.level <= 0.0 {
                    self.reset();
                }
            }
        }
        self.level
    }

    fn latest(&self) -> f64 {
        self.level
    }
}
