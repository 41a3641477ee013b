//! Parameter State Persistence
//!
//! Saves and restores the flat parameter set as a versioned JSON document,
//! and provides the factory preset library.
//!
//! Loading never ramps: it raises the registry's reset request, so the audio
//! thread snaps every smoother to the restored values and restarts the
//! oscillator and frequency lock on its next block.

use crate::error::{AttractorError, Result};
use crate::params::{ParamId, ParameterRegistry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Schema version written by [`ParameterRegistry::save_state`]
pub const STATE_VERSION: u32 = 1;

/// Serialized parameter set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterState {
    pub version: u32,
    pub name: String,
    /// Values keyed by parameter name
    pub parameters: BTreeMap<String, f64>,
}

impl ParameterState {
    /// Empty state labelled `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            version: STATE_VERSION,
            name: name.into(),
            parameters: BTreeMap::new(),
        }
    }

    /// A state holding every parameter at its default
    pub fn defaults(name: impl Into<String>) -> Self {
        let mut state = Self::new(name);
        for &id in ParamId::ALL {
            state.parameters.insert(id.name().to_string(), id.spec().default);
        }
        state
    }

    /// Record a parameter value
    pub fn with_value(mut self, id: ParamId, value: f64) -> Self {
        self.parameters.insert(id.name().to_string(), value);
        self
    }

    /// Stored value of a parameter, if present
    pub fn get(&self, id: ParamId) -> Option<f64> {
        self.parameters.get(id.name()).copied()
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse JSON produced by [`ParameterState::to_json`]
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl ParameterRegistry {
    /// Capture every current value under `name`
    pub fn save_state(&self, name: impl Into<String>) -> ParameterState {
        let mut state = ParameterState::new(name);
        for &id in ParamId::ALL {
            state.parameters.insert(id.name().to_string(), self.get(id));
        }
        state
    }

    /// Restore a saved parameter set and request a full voice reset.
    ///
    /// Values are clamped to their ranges. Parameters missing from the
    /// document return to their defaults; unknown names are skipped.
    /// Returns how many parameters were taken from the document.
    pub fn load_state(&self, state: &ParameterState) -> Result<usize> {
        if state.version == 0 || state.version > STATE_VERSION {
            return Err(AttractorError::UnsupportedStateVersion(state.version));
        }

        for (name, _) in state.parameters.iter() {
            if ParamId::from_name(name).is_none() {
                tracing::warn!(parameter = %name, state = %state.name, "ignoring unknown parameter");
            }
        }

        let mut applied = 0;
        for &id in ParamId::ALL {
            match state.parameters.get(id.name()) {
                Some(&value) => {
                    self.set(id, value);
                    applied += 1;
                }
                None => {
                    self.set(id, id.spec().default);
                }
            }
        }

        self.request_reset();
        tracing::info!(state = %state.name, applied, "parameter state loaded");
        Ok(applied)
    }
}

/// A built-in sound
#[derive(Debug, Clone, Copy)]
pub struct FactoryPreset {
    pub name: &'static str,
    pub description: &'static str,
    overrides: &'static [(ParamId, f64)],
}

impl FactoryPreset {
    /// Full parameter set: defaults with this preset's overrides applied
    pub fn state(&self) -> ParameterState {
        self.overrides
            .iter()
            .fold(ParameterState::defaults(self.name), |state, &(id, value)| {
                state.with_value(id, value)
            })
    }
}

const FACTORY_PRESETS: &[FactoryPreset] = &[
    FactoryPreset {
        name: "Classic Butterfly",
        description: "Textbook Lorenz coefficients with light taming",
        overrides: &[],
    },
    FactoryPreset {
        name: "Heavy Taming",
        description: "High rho held in check by strong cubic damping",
        overrides: &[
            (ParamId::Rho, 45.0),
            (ParamId::Taming, 0.0005),
            (ParamId::Cx, 0.5),
            (ParamId::Cy, 0.5),
            (ParamId::Cz, 0.5),
        ],
    },
    FactoryPreset {
        name: "Slow Drift",
        description: "Sub-audio trajectory with a slow LFO on rho",
        overrides: &[
            (ParamId::Timestep, 0.0003),
            (ParamId::Rho, 24.0),
            (ParamId::Attack, 0.5),
            (ParamId::Release, 2.0),
            (ParamId::LfoRate, 0.1),
            (ParamId::LfoAmount, 0.3),
            (ParamId::LfoTarget, 1.0),
        ],
    },
    FactoryPreset {
        name: "Locked A3",
        description: "Frequency lock holding the z axis loop rate near 220 Hz",
        overrides: &[
            (ParamId::Timestep, 0.004),
            (ParamId::TargetFrequency, 220.0),
            (ParamId::PitchSource, 2.0),
            (ParamId::LevelX, -18.0),
            (ParamId::LevelY, -18.0),
            (ParamId::LevelZ, 0.0),
        ],
    },
];

/// Every factory preset, in display order
pub fn factory_presets() -> &'static [FactoryPreset] {
    FACTORY_PRESETS
}

/// Look up a factory preset by exact name
pub fn factory_preset(name: &str) -> Option<&'static FactoryPreset> {
    FACTORY_PRESETS.iter().find(|p| p.name == name)
}
