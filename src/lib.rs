//! # Attractor: Chaotic Oscillator Synth Voice
//!
//! `attractor` is a monophonic synthesizer voice whose sound source is a
//! tamed, second-order Lorenz system integrated with adaptive-substep RK4.
//! A pitch estimator and a PID frequency lock steer the integration timestep
//! so the chaotic signal can follow a target fundamental.
//!
//! ## Architecture
//!
//! - **Sources** - [`oscillator`] on top of the generic [`rk4`] integrator,
//!   with per-sample [`smoothing`] of every coefficient
//! - **Control** - [`envelope`] and [`modulator`] (ADSR, LFO), [`midi`]
//!   decoding, the shared [`params`] registry
//! - **Analysis** - [`pitch`] (McLeod pitch method), [`pid`] and [`lock`]
//! - **Output** - [`mixer`] (level, constant-power pan, DC blocking) and the
//!   [`fifo`] carrying the trajectory to a display
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use attractor::prelude::*;
//! use std::sync::Arc;
//!
//! let params = Arc::new(ParameterRegistry::new());
//! let (mut voice, mut ui) = ChaosVoice::new(Arc::clone(&params), VoiceConfig::default())?;
//! voice.prepare(48000.0, 256);
//!
//! // Lock the voice onto A3
//! params.set(ParamId::TargetFrequency, 220.0);
//!
//! let mut left = vec![0.0f32; 256];
//! let mut right = vec![0.0f32; 256];
//! voice.process_block(&mut left, &mut right, &[MidiEvent::note_on(0, 57, 100)]);
//!
//! while let Some(point) = ui.try_pop_point() {
//!     println!("{:.3} {:.3} {:.3}", point.x, point.y, point.z);
//! }
//! # Ok::<(), attractor::AttractorError>(())
//! ```

pub mod config;
pub mod envelope;
pub mod error;
pub mod fifo;
pub mod lock;
pub mod midi;
pub mod mixer;
pub mod modulator;
pub mod oscillator;
pub mod params;
pub mod pid;
pub mod pitch;
pub mod rk4;
pub mod smoothing;
pub mod state;
pub mod voice;

/// Prelude module for convenient imports
pub mod prelude {
    // Voice
    pub use crate::config::VoiceConfig;
    pub use crate::voice::{ChaosVoice, UiHandle};

    // Sources
    pub use crate::oscillator::{ChaoticOscillator, OscParam, TamedLorenz};
    pub use crate::rk4::{Duffing, Lorenz, OdeSystem};
    pub use crate::smoothing::SmoothedParameter;

    // Control
    pub use crate::envelope::{Adsr, AdsrParameters, AdsrStage};
    pub use crate::midi::{MidiEvent, MidiMessage, NoteStack};
    pub use crate::modulator::{Lfo, Modulator, Waveform};
    pub use crate::params::{AtomicF64, ParamId, ParamSpec, ParameterRegistry};

    // Analysis
    pub use crate::lock::FrequencyLock;
    pub use crate::pid::PidController;
    pub use crate::pitch::{PitchEstimator, PitchSettings, PitchTracker};

    // Output
    pub use crate::fifo::{visualization_fifo, Point3, PointConsumer, PointProducer};
    pub use crate::mixer::{Axis, OnePoleHighPass, VoiceMixer};

    // Persistence
    pub use crate::error::AttractorError;
    pub use crate::state::{factory_preset, factory_presets, FactoryPreset, ParameterState};
}

// Re-export key types at crate root for convenience
pub use prelude::*;
