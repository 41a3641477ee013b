//! Chaos Voice
//!
//! The monophonic audio processor. One [`ChaosVoice`] lives on the audio
//! thread; its [`UiHandle`] lives on the UI thread. They share only the
//! parameter registry (atomics), the measured-frequency readout (an atomic)
//! and the visualization FIFO (lock-free SPSC).
//!
//! Per block:
//!
//! 1. honour a pending reset request
//! 2. read every parameter once and retarget the smoothers
//! 3. per sample: apply due MIDI events, run the LFO and envelope, advance
//!    the oscillator, publish a decimated trajectory point, mix to stereo
//! 4. high-pass the block
//! 5. feed the pitch source axis into the estimator and publish the median
//!    of its recent estimates
//! 6. let the frequency lock run every controller update that fell due
//!
//! Long host blocks are cut into chunks no longer than the size given to
//! [`ChaosVoice::prepare`], so nothing on this path allocates.

use crate::config::VoiceConfig;
use crate::envelope::{Adsr, AdsrParameters};
use crate::error::Result;
use crate::fifo::{visualization_fifo, Point3, PointConsumer, PointDecimator, PointProducer};
use crate::lock::FrequencyLock;
use crate::midi::{cc_to_bipolar, note_to_frequency, MidiEvent, MidiMessage, NoteStack, CC_MOD_WHEEL};
use crate::mixer::{Axis, VoiceMixer};
use crate::modulator::{Lfo, Modulator, Waveform};
use crate::oscillator::{ChaoticOscillator, OscParam};
use crate::params::{
    mod_destination, AtomicF64, ParamId, ParameterRegistry, OSCILLATOR_BINDINGS,
};
use crate::pitch::{PitchEstimator, PitchTracker};
use std::sync::Arc;

/// Block size assumed until [`ChaosVoice::prepare`] is called
const DEFAULT_MAX_BLOCK: usize = 512;

/// UI-thread side of a voice
pub struct UiHandle {
    points: PointConsumer,
    measured: Arc<AtomicF64>,
    params: Arc<ParameterRegistry>,
}

impl UiHandle {
    /// Next trajectory point, if the audio thread has published one
    pub fn try_pop_point(&mut self) -> Option<Point3> {
        self.points.try_pop()
    }

    /// Move every queued point into `out`
    pub fn drain_points(&mut self, out: &mut Vec<Point3>) -> usize {
        self.points.drain_into(out)
    }

    /// Points waiting in the visualization FIFO
    pub fn pending_points(&self) -> usize {
        self.points.len()
    }

    /// Latest pitch estimate in Hz, 0 when there is none
    pub fn measured_frequency(&self) -> f64 {
        self.measured.get()
    }

    /// Shared parameter registry
    pub fn params(&self) -> &Arc<ParameterRegistry> {
        &self.params
    }

    /// Restart the voice from its initial condition on the next block
    pub fn request_reset(&self) {
        self.params.request_reset();
    }
}

/// Values read from the registry once per block
#[derive(Debug, Clone, Copy)]
struct BlockParams {
    /// Unmodulated oscillator targets, indexed by [`OscParam`]
    base: [f64; OscParam::COUNT],
    timestep: f64,
    target_frequency: f64,
    pitch_source: Axis,
    mod_amount: f64,
    mod_dest: (ParamId, OscParam),
    lfo_amount: f64,
    lfo_dest: (ParamId, OscParam),
}

/// Monophonic chaotic-oscillator voice
pub struct ChaosVoice {
    params: Arc<ParameterRegistry>,
    config: VoiceConfig,
    sample_rate: f64,
    oscillator: ChaoticOscillator,
    envelope: Adsr,
    lfo: Lfo,
    mixer: VoiceMixer,
    pitch: PitchEstimator,
    tracker: PitchTracker,
    /// Median of recent estimates, `None` while the last window had no pitch
    reading: Option<f64>,
    lock: FrequencyLock,
    notes: NoteStack,
    last_note: Option<u8>,
    /// Registry target frequency as of the last block, 0 to follow the note
    fixed_target: f64,
    mod_wheel: f64,
    points: PointProducer,
    decimator: PointDecimator,
    measured: Arc<AtomicF64>,
    pitch_scratch: Vec<f64>,
}

impl ChaosVoice {
    /// Build a voice and its UI handle. Fails if `config` does not validate.
    pub fn new(params: Arc<ParameterRegistry>, config: VoiceConfig) -> Result<(Self, UiHandle)> {
        config.validate()?;

        let sample_rate = 44100.0;
        let (producer, consumer) = visualization_fifo(config.fifo_capacity);
        let measured = Arc::new(AtomicF64::new(0.0));
        let timestep = ParamId::Timestep.spec();
        let (integral_min, integral_max) = config.integral_limits;

        let mut oscillator =
            ChaoticOscillator::new(sample_rate).with_max_substep(config.max_stable_substep);
        oscillator.set_ramp_length(config.ramp_seconds);
        let mut mixer = VoiceMixer::new(sample_rate).with_highpass_cutoff(config.highpass_cutoff);
        mixer.set_ramp_length(config.ramp_seconds);

        let mut voice = Self {
            oscillator,
            envelope: Adsr::new(sample_rate),
            lfo: Lfo::new(sample_rate),
            mixer,
            pitch: PitchEstimator::new(sample_rate, config.analysis_window)
                .with_settings(config.pitch_settings()),
            tracker: PitchTracker::new(),
            reading: None,
            lock: FrequencyLock::new(params.get(ParamId::Timestep), timestep.min, timestep.max)
                .with_integral_limits(integral_min, integral_max),
            notes: NoteStack::new(),
            last_note: None,
            fixed_target: 0.0,
            mod_wheel: 0.0,
            points: producer,
            decimator: PointDecimator::new(sample_rate, config.points_per_second),
            measured: Arc::clone(&measured),
            pitch_scratch: vec![0.0; DEFAULT_MAX_BLOCK],
            params: Arc::clone(&params),
            config,
            sample_rate,
        };
        voice.reset();

        let handle = UiHandle {
            points: consumer,
            measured,
            params,
        };
        Ok((voice, handle))
    }

    /// Adopt the host's sample rate and largest block size
    pub fn prepare(&mut self, sample_rate: f64, max_block: usize) {
        let max_block = max_block.max(1);
        self.sample_rate = sample_rate;

        self.oscillator.prepare(sample_rate);
        self.envelope.prepare(sample_rate);
        self.lfo.prepare(sample_rate);
        self.mixer.prepare(sample_rate);
        self.pitch.prepare(sample_rate, self.config.analysis_window);
        self.decimator
            .configure(sample_rate, self.config.points_per_second);
        self.pitch_scratch = vec![0.0; max_block];

        self.reset();
        tracing::info!(
            sample_rate,
            max_block,
            analysis_window = self.config.analysis_window,
            "voice prepared"
        );
    }

    /// Return every component to its initial state with smoothers snapped
    /// to the current parameter values
    pub fn reset(&mut self) {
        let block = self.read_params();
        self.apply_params(&block);
        self.fixed_target = block.target_frequency;

        self.notes.clear();
        self.last_note = None;
        self.mod_wheel = 0.0;
        self.envelope.reset();
        self.lfo.reset();
        self.mixer.reset();
        self.pitch.reset();
        self.tracker.reset();
        self.reading = None;
        self.lock.reset(block.timestep);
        self.oscillator.set_target(OscParam::Dt, self.lock.dt_target());
        self.oscillator.reset();
        self.decimator.reset();
        self.measured.set(0.0);
        tracing::debug!("voice reset");
    }

    /// Configuration the voice was built with
    pub fn config(&self) -> &VoiceConfig {
        &self.config
    }

    /// Current sample rate
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// The chaotic oscillator
    pub fn oscillator(&self) -> &ChaoticOscillator {
        &self.oscillator
    }

    /// The amplitude envelope
    pub fn envelope(&self) -> &Adsr {
        &self.envelope
    }

    /// Note currently held, most recent first
    pub fn current_note(&self) -> Option<u8> {
        self.notes.current()
    }

    /// Timestep the frequency lock is steering toward
    pub fn dt_target(&self) -> f64 {
        self.lock.dt_target()
    }

    /// Median of the recent pitch estimates the lock works from, `None` when
    /// the latest window had no confident reading
    pub fn measured_frequency(&self) -> Option<f64> {
        self.reading
    }

    /// Frequency the lock steers toward, 0 when there is none.
    /// Registry changes are picked up at the next block boundary.
    pub fn target_frequency(&self) -> f64 {
        if self.fixed_target > 0.0 {
            return self.fixed_target;
        }
        match self.last_note {
            Some(note) if self.envelope.is_active() => note_to_frequency(note),
            _ => 0.0,
        }
    }

    fn read_params(&self) -> BlockParams {
        let p = &self.params;
        let mut base = [0.0; OscParam::COUNT];
        for &(id, osc) in OSCILLATOR_BINDINGS.iter() {
            base[osc.index()] = p.get(id);
        }
        BlockParams {
            base,
            timestep: p.get(ParamId::Timestep),
            target_frequency: p.get(ParamId::TargetFrequency),
            pitch_source: Axis::from_selector(p.get(ParamId::PitchSource)),
            mod_amount: p.get(ParamId::ModAmount),
            mod_dest: mod_destination(p.get(ParamId::ModTarget)),
            lfo_amount: p.get(ParamId::LfoAmount),
            lfo_dest: mod_destination(p.get(ParamId::LfoTarget)),
        }
    }

    /// Retarget every smoother and per-block setting from `block` and the registry
    fn apply_params(&mut self, block: &BlockParams) {
        let p = &self.params;

        for osc in OscParam::ALL {
            if osc != OscParam::Dt {
                self.oscillator.set_target(osc, block.base[osc.index()]);
            }
        }

        self.envelope.set_parameters(AdsrParameters {
            attack: p.get(ParamId::Attack),
            decay: p.get(ParamId::Decay),
            sustain: p.get(ParamId::Sustain),
            release: p.get(ParamId::Release),
        });

        self.lfo.set_frequency(p.get(ParamId::LfoRate));
        self.lfo
            .set_waveform(Waveform::from_selector(p.get(ParamId::LfoWaveform)));

        let axes = [
            (Axis::X, ParamId::LevelX, ParamId::PanX),
            (Axis::Y, ParamId::LevelY, ParamId::PanY),
            (Axis::Z, ParamId::LevelZ, ParamId::PanZ),
        ];
        for (axis, level, pan) in axes {
            self.mixer.set_level_db(axis, p.get(level));
            self.mixer.set_pan(axis, p.get(pan));
        }
        self.mixer.set_output_db(p.get(ParamId::OutputLevel));

        self.lock.set_gains(
            p.get(ParamId::Kp),
            p.get(ParamId::Ki),
            p.get(ParamId::Kd),
        );
        self.lock.set_interval(p.get(ParamId::PidInterval));
    }

    /// True when the lock has a target and an audible voice to steer
    fn lock_engaged(&self) -> bool {
        self.envelope.is_active() && self.target_frequency() > 0.0
    }

    fn handle_midi(&mut self, message: MidiMessage, timestep: f64) {
        match message {
            MidiMessage::NoteOn { note, .. } => {
                if !self.envelope.is_active() {
                    // A note from silence starts a fresh trajectory
                    self.lock.reset(timestep);
                    self.oscillator.set_target(OscParam::Dt, self.lock.dt_target());
                    self.oscillator.reset();
                    self.tracker.reset();
                    tracing::debug!(note, "note start reset");
                }
                self.notes.push(note);
                self.last_note = Some(note);
                self.envelope.note_on();
            }
            MidiMessage::NoteOff { note } => {
                let was_sounding = self.notes.current() == Some(note);
                match self.notes.release(note) {
                    Some(fallback) => self.last_note = Some(fallback),
                    None if was_sounding => self.envelope.note_off(),
                    None => {}
                }
            }
            MidiMessage::ControlChange { controller, value } => {
                if controller == CC_MOD_WHEEL {
                    self.mod_wheel = cc_to_bipolar(value);
                }
            }
            MidiMessage::AllNotesOff => {
                self.notes.clear();
                self.envelope.note_off();
            }
        }
    }

    /// Push modulated targets for the mod wheel and LFO destinations
    #[inline]
    fn apply_modulation(&mut self, block: &BlockParams, lfo: f64) {
        let wheel = self.mod_wheel * block.mod_amount;
        let lfo = (2.0 * lfo - 1.0) * block.lfo_amount;

        if block.mod_dest == block.lfo_dest {
            self.modulate(block, block.mod_dest, wheel + lfo);
        } else {
            self.modulate(block, block.mod_dest, wheel);
            self.modulate(block, block.lfo_dest, lfo);
        }
    }

    /// Offset one destination by `amount` half-spans of its range
    #[inline]
    fn modulate(&mut self, block: &BlockParams, (id, osc): (ParamId, OscParam), amount: f64) {
        let spec = id.spec();
        let value = block.base[osc.index()] + amount * spec.span() * 0.5;
        self.oscillator.set_target(osc, spec.clamp(value));
    }

    /// Render one block of stereo audio, overwriting `left` and `right`.
    ///
    /// `midi` must be ordered by offset. Events beyond the block end are
    /// applied at its last frame.
    pub fn process_block(&mut self, left: &mut [f32], right: &mut [f32], midi: &[MidiEvent]) {
        let frames = left.len().min(right.len());
        let chunk = self.pitch_scratch.len().max(1);
        let mut cursor = 0;

        if frames == 0 {
            let timestep = self.params.get(ParamId::Timestep);
            for event in midi {
                self.handle_midi(event.message, timestep);
            }
            return;
        }

        let mut start = 0;
        while start < frames {
            let end = (start + chunk).min(frames);
            let last = end == frames;
            self.process_chunk(
                &mut left[start..end],
                &mut right[start..end],
                midi,
                &mut cursor,
                start,
                last,
            );
            start = end;
        }
    }

    fn process_chunk(
        &mut self,
        left: &mut [f32],
        right: &mut [f32],
        midi: &[MidiEvent],
        cursor: &mut usize,
        start: usize,
        last: bool,
    ) {
        if self.params.take_reset_request() {
            self.reset();
        }

        let frames = left.len();
        let block = self.read_params();
        self.apply_params(&block);
        self.fixed_target = block.target_frequency;

        // Follow the timestep knob whenever the lock is not steering
        if !self.lock_engaged() {
            self.lock.rebase(block.timestep);
        }
        self.oscillator.set_target(OscParam::Dt, self.lock.dt_target());

        let recoveries_before = self.oscillator.recoveries();

        for i in 0..frames {
            while let Some(event) = midi.get(*cursor) {
                let due = event.offset <= start + i || (last && i + 1 == frames);
                if !due {
                    break;
                }
                self.handle_midi(event.message, block.timestep);
                *cursor += 1;
            }

            let lfo = self.lfo.process();
            if block.mod_amount > 0.0 || block.lfo_amount > 0.0 {
                self.apply_modulation(&block, lfo);
            }

            let (x, y, z) = self.oscillator.next_sample();
            if self.decimator.tick() {
                self.points.push(Point3::from((x, y, z)));
            }
            self.pitch_scratch[i] = match block.pitch_source {
                Axis::X => x,
                Axis::Y => y,
                Axis::Z => z,
            };

            let env = self.envelope.process();
            let (l, r) = self.mixer.mix([x, y, z], env);
            left[i] = l as f32;
            right[i] = r as f32;
        }

        self.mixer.highpass_block(left, right);

        self.pitch.push_block(&self.pitch_scratch[..frames]);
        let tracker = &mut self.tracker;
        let measured = self.pitch.estimate().map(|hz| tracker.push(hz));
        self.reading = measured;
        self.measured.set(measured.unwrap_or(0.0));

        let target = self.target_frequency();
        let engaged = self.lock_engaged();
        let elapsed = frames as f64 / self.sample_rate;
        let applied = self.lock.advance(elapsed, target, measured, engaged);
        if applied > 0 {
            tracing::trace!(
                target,
                measured = measured.unwrap_or(0.0),
                dt_target = self.lock.dt_target(),
                updates = applied,
                "frequency lock update"
            );
        }

        let recovered = self.oscillator.recoveries() - recoveries_before;
        if recovered > 0 {
            tracing::warn!(recovered, "oscillator state went non-finite and was re-seeded");
        }
    }
}
