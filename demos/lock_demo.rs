//! Frequency lock demo
//!
//! Renders a few seconds of the voice offline with a fixed lock target and
//! logs the estimated pitch and the timestep the controller settles on.
//!
//! ```text
//! cargo run --example lock_demo -- 220
//! ```

use attractor::prelude::*;
use std::sync::Arc;

const SAMPLE_RATE: f64 = 48000.0;
const BLOCK: usize = 256;
const SECONDS: f64 = 4.0;

fn main() -> Result<(), AttractorError> {
    tracing_subscriber::fmt::init();

    let target = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse::<f64>().ok())
        .unwrap_or(220.0);

    let params = Arc::new(ParameterRegistry::new());
    let preset = factory_preset("Locked A3").map(FactoryPreset::state);
    if let Some(state) = preset {
        params.load_state(&state)?;
    }
    params.set(ParamId::TargetFrequency, target);

    let (mut voice, mut ui) = ChaosVoice::new(Arc::clone(&params), VoiceConfig::default())?;
    voice.prepare(SAMPLE_RATE, BLOCK);

    let mut left = vec![0.0f32; BLOCK];
    let mut right = vec![0.0f32; BLOCK];
    let mut points = Vec::new();
    let blocks = (SECONDS * SAMPLE_RATE / BLOCK as f64) as usize;
    let report_every = (0.25 * SAMPLE_RATE / BLOCK as f64) as usize;

    for block in 0..blocks {
        let events = if block == 0 {
            vec![MidiEvent::note_on(0, 57, 100)]
        } else {
            Vec::new()
        };
        voice.process_block(&mut left, &mut right, &events);
        ui.drain_points(&mut points);

        if block % report_every == 0 {
            let peak = left
                .iter()
                .chain(right.iter())
                .fold(0.0f32, |m, v| m.max(v.abs()));
            tracing::info!(
                time = block as f64 * BLOCK as f64 / SAMPLE_RATE,
                target,
                measured = ui.measured_frequency(),
                dt = voice.dt_target(),
                peak,
                points = points.len(),
                "lock status"
            );
        }
    }

    tracing::info!(
        recoveries = voice.oscillator().recoveries(),
        "render finished"
    );
    Ok(())
}
