//! Parameter Registry
//!
//! A flat namespace of named float parameters shared between the host/UI
//! thread (writer) and the audio thread (reader). Each value is an
//! [`AtomicF64`], so reads on the audio path never block or tear.
//!
//! Components do not hold pointers into the registry. They receive an
//! `Arc<ParameterRegistry>` and read exactly the [`ParamId`]s they use.

use crate::error::{AttractorError, Result};
use crate::oscillator::OscParam;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Atomic f64 for lock-free communication between threads
///
/// Uses AtomicU64 internally since there's no native AtomicF64.
#[derive(Debug)]
pub struct AtomicF64(AtomicU64);

impl AtomicF64 {
    /// New atomic holding `value`
    pub fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    /// Load the value
    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    /// Store the value
    pub fn set(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

impl Default for AtomicF64 {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl Clone for AtomicF64 {
    fn clone(&self) -> Self {
        Self::new(self.get())
    }
}

/// Declared range and default of one parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub min: f64,
    pub max: f64,
    pub default: f64,
    /// Selector-style parameter, rounded to the nearest integer on write
    pub discrete: bool,
}

impl ParamSpec {
    const fn continuous(name: &'static str, min: f64, max: f64, default: f64) -> Self {
        Self {
            name,
            min,
            max,
            default,
            discrete: false,
        }
    }

    const fn selector(name: &'static str, max: f64, default: f64) -> Self {
        Self {
            name,
            min: 0.0,
            max,
            default,
            discrete: true,
        }
    }

    /// Map any host value into the legal range. Non-finite input yields the default.
    pub fn clamp(&self, value: f64) -> f64 {
        if !value.is_finite() {
            return self.default;
        }
        let value = if self.discrete { value.round() } else { value };
        value.clamp(self.min, self.max)
    }

    /// Width of the range, `max - min`
    pub fn span(&self) -> f64 {
        self.max - self.min
    }
}

macro_rules! params {
    ($($variant:ident => $spec:expr,)*) => {
        /// Every automatable parameter, in dense index order
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum ParamId {
            $($variant,)*
        }

        const SPECS: &[ParamSpec] = &[$($spec,)*];

        impl ParamId {
            pub const ALL: &'static [ParamId] = &[$(ParamId::$variant,)*];
        }
    };
}

params! {
    Sigma => ParamSpec::continuous("sigma", 0.0, 50.0, 10.0),
    Rho => ParamSpec::continuous("rho", 0.0, 100.0, 28.0),
    Beta => ParamSpec::continuous("beta", 0.0, 10.0, 8.0 / 3.0),
    Timestep => ParamSpec::continuous("timestep", 0.0001, 0.05, 0.001),
    Mx => ParamSpec::continuous("mx", 0.0005, 0.1, 0.005),
    My => ParamSpec::continuous("my", 0.0005, 0.1, 0.005),
    Mz => ParamSpec::continuous("mz", 0.0005, 0.1, 0.005),
    Cx => ParamSpec::continuous("cx", 0.0, 10.0, 1.0),
    Cy => ParamSpec::continuous("cy", 0.0, 10.0, 1.0),
    Cz => ParamSpec::continuous("cz", 0.0, 10.0, 1.0),
    Taming => ParamSpec::continuous("taming", 0.0, 0.001, 0.00001),
    LevelX => ParamSpec::continuous("level_x", -60.0, 0.0, -6.0),
    PanX => ParamSpec::continuous("pan_x", -1.0, 1.0, -0.5),
    LevelY => ParamSpec::continuous("level_y", -60.0, 0.0, -6.0),
    PanY => ParamSpec::continuous("pan_y", -1.0, 1.0, 0.5),
    LevelZ => ParamSpec::continuous("level_z", -60.0, 0.0, -6.0),
    PanZ => ParamSpec::continuous("pan_z", -1.0, 1.0, 0.0),
    OutputLevel => ParamSpec::continuous("output_level", -60.0, 6.0, 0.0),
    Attack => ParamSpec::continuous("attack", 0.0, 5.0, 0.01),
    Decay => ParamSpec::continuous("decay", 0.0, 5.0, 0.1),
    Sustain => ParamSpec::continuous("sustain", 0.0, 1.0, 0.8),
    Release => ParamSpec::continuous("release", 0.0, 10.0, 0.3),
    TargetFrequency => ParamSpec::continuous("target_frequency", 0.0, 2000.0, 0.0),
    Kp => ParamSpec::continuous("kp", 0.0, 1e-4, 1e-6),
    Ki => ParamSpec::continuous("ki", 0.0, 1e-5, 2e-8),
    Kd => ParamSpec::continuous("kd", 0.0, 1e-4, 1e-6),
    PidInterval => ParamSpec::continuous("pid_interval", 0.001, 0.1, 0.01),
    PitchSource => ParamSpec::selector("pitch_source", 2.0, 2.0),
    ModTarget => ParamSpec::selector("mod_target", 9.0, 0.0),
    ModAmount => ParamSpec::continuous("mod_amount", 0.0, 1.0, 0.0),
    LfoRate => ParamSpec::continuous("lfo_rate", 0.01, 20.0, 1.0),
    LfoWaveform => ParamSpec::selector("lfo_waveform", 4.0, 0.0),
    LfoAmount => ParamSpec::continuous("lfo_amount", 0.0, 1.0, 0.0),
    LfoTarget => ParamSpec::selector("lfo_target", 9.0, 1.0),
    ViewZoomX => ParamSpec::continuous("view_zoom_x", 10.0, 100.0, 50.0),
    ViewZoomY => ParamSpec::continuous("view_zoom_y", 10.0, 100.0, 50.0),
    ViewZoomZ => ParamSpec::continuous("view_zoom_z", 10.0, 100.0, 50.0),
}

impl ParamId {
    pub const COUNT: usize = SPECS.len();

    /// Position in the registry
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Range, default and name
    #[inline]
    pub fn spec(self) -> &'static ParamSpec {
        &SPECS[self.index()]
    }

    /// Stable parameter name used in saved state
    pub fn name(self) -> &'static str {
        self.spec().name
    }

    /// Look up a parameter by its stable name
    pub fn from_name(name: &str) -> Option<ParamId> {
        ParamId::ALL.iter().copied().find(|id| id.name() == name)
    }
}

/// Registry parameters that drive oscillator smoothers, paired once
pub const OSCILLATOR_BINDINGS: [(ParamId, OscParam); OscParam::COUNT] = [
    (ParamId::Sigma, OscParam::Sigma),
    (ParamId::Rho, OscParam::Rho),
    (ParamId::Beta, OscParam::Beta),
    (ParamId::Mx, OscParam::Mx),
    (ParamId::My, OscParam::My),
    (ParamId::Mz, OscParam::Mz),
    (ParamId::Cx, OscParam::Cx),
    (ParamId::Cy, OscParam::Cy),
    (ParamId::Cz, OscParam::Cz),
    (ParamId::Taming, OscParam::Taming),
    (ParamId::Timestep, OscParam::Dt),
];

/// Modulation destinations addressed by the `mod_target`/`lfo_target` selectors
pub const MOD_DESTINATIONS: [(ParamId, OscParam); 10] = [
    (ParamId::Sigma, OscParam::Sigma),
    (ParamId::Rho, OscParam::Rho),
    (ParamId::Beta, OscParam::Beta),
    (ParamId::Mx, OscParam::Mx),
    (ParamId::My, OscParam::My),
    (ParamId::Mz, OscParam::Mz),
    (ParamId::Cx, OscParam::Cx),
    (ParamId::Cy, OscParam::Cy),
    (ParamId::Cz, OscParam::Cz),
    (ParamId::Taming, OscParam::Taming),
];

/// Resolve a selector value to its destination
#[inline]
pub fn mod_destination(selector: f64) -> (ParamId, OscParam) {
    let index = (selector.max(0.0) as usize).min(MOD_DESTINATIONS.len() - 1);
    MOD_DESTINATIONS[index]
}

/// Shared, lock-free parameter store
#[derive(Debug)]
pub struct ParameterRegistry {
    values: [AtomicF64; ParamId::COUNT],
    reset_requested: AtomicBool,
}

impl ParameterRegistry {
    /// A registry with every parameter at its default
    pub fn new() -> Self {
        Self {
            values: core::array::from_fn(|i| AtomicF64::new(SPECS[i].default)),
            reset_requested: AtomicBool::new(false),
        }
    }

    /// Current value
    #[inline]
    pub fn get(&self, id: ParamId) -> f64 {
        self.values[id.index()].get()
    }

    /// Store a clamped value and return what was stored
    pub fn set(&self, id: ParamId, value: f64) -> f64 {
        let clamped = id.spec().clamp(value);
        self.values[id.index()].set(clamped);
        clamped
    }

    /// Current value of a named parameter
    pub fn get_by_name(&self, name: &str) -> Result<f64> {
        ParamId::from_name(name)
            .map(|id| self.get(id))
            .ok_or_else(|| AttractorError::UnknownParameter(name.to_string()))
    }

    /// Set a named parameter, returning the clamped value stored
    pub fn set_by_name(&self, name: &str, value: f64) -> Result<f64> {
        ParamId::from_name(name)
            .map(|id| self.set(id, value))
            .ok_or_else(|| AttractorError::UnknownParameter(name.to_string()))
    }

    /// Put every parameter back to its default
    pub fn restore_defaults(&self) {
        for &id in ParamId::ALL {
            self.values[id.index()].set(id.spec().default);
        }
        self.request_reset();
    }

    /// Ask the audio thread to snap smoothers and reset the voice on its next block
    pub fn request_reset(&self) {
        self.reset_requested.store(true, Ordering::Release);
    }

    /// Consume a pending reset request
    pub fn take_reset_request(&self) -> bool {
        self.reset_requested.swap(false, Ordering::Acquire)
    }
}

impl Default for ParameterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
