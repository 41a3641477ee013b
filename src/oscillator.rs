//! Chaotic Oscillator Core
//!
//! A damped, driven second-order Lorenz system with a cubic "taming" term:
//!
//! ```text
//! x' = vx                y' = vy                z' = vz
//! mx·vx' = σ(y − x)     − cx·vx − τ·vx³
//! my·vy' = x(ρ − z) − y − cy·vy − τ·vy³
//! mz·vz' = xy − βz      − cz·vz − τ·vz³
//! ```
//!
//! The timestep `dt` is the amount of simulated time that elapses per audio
//! sample, which makes it the oscillator's pitch control: doubling `dt` plays
//! the same trajectory twice as fast.

use crate::rk4::{self, OdeSystem};
use crate::smoothing::SmoothedParameter;

/// Largest RK4 step considered stable for the default mass/damping range
pub const MAX_STABLE_SUBSTEP: f64 = 0.005;

/// Initial condition used at start-up and after every reset
pub const INITIAL_STATE: [f64; 6] = [0.1, 0.0, 0.0, 0.0, 0.0, 0.0];

/// Smoothed coefficients of the oscillator, in a dense index order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OscParam {
    Sigma,
    Rho,
    Beta,
    Mx,
    My,
    Mz,
    Cx,
    Cy,
    Cz,
    Taming,
    Dt,
}

impl OscParam {
    pub const COUNT: usize = 11;

    pub const ALL: [OscParam; Self::COUNT] = [
        OscParam::Sigma,
        OscParam::Rho,
        OscParam::Beta,
        OscParam::Mx,
        OscParam::My,
        OscParam::Mz,
        OscParam::Cx,
        OscParam::Cy,
        OscParam::Cz,
        OscParam::Taming,
        OscParam::Dt,
    ];

    /// Position in per-parameter arrays
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Value used before any target has been set
    pub fn default_value(self) -> f64 {
        match self {
            OscParam::Sigma => 10.0,
            OscParam::Rho => 28.0,
            OscParam::Beta => 8.0 / 3.0,
            OscParam::Mx | OscParam::My | OscParam::Mz => 0.005,
            OscParam::Cx | OscParam::Cy | OscParam::Cz => 1.0,
            OscParam::Taming => 0.00001,
            OscParam::Dt => 0.001,
        }
    }
}

/// Right-hand side of the tamed second-order Lorenz system
///
/// State layout is `[x, y, z, vx, vy, vz]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TamedLorenz {
    pub sigma: f64,
    pub rho: f64,
    pub beta: f64,
    pub mass: [f64; 3],
    pub damping: [f64; 3],
    pub taming: f64,
}

impl Default for TamedLorenz {
    fn default() -> Self {
        Self {
            sigma: 10.0,
            rho: 28.0,
            beta: 8.0 / 3.0,
            mass: [0.005; 3],
            damping: [1.0; 3],
            taming: 0.00001,
        }
    }
}

impl OdeSystem<6> for TamedLorenz {
    #[inline]
    fn derivatives(&self, s: &[f64; 6]) -> [f64; 6] {
        let [x, y, z, vx, vy, vz] = *s;

        let fx = self.sigma * (y - x);
        let fy = x * (self.rho - z) - y;
        let fz = x * y - self.beta * z;

        let ax = (fx - self.damping[0] * vx - self.taming * vx * vx * vx) / self.mass[0];
        let ay = (fy - self.damping[1] * vy - self.taming * vy * vy * vy) / self.mass[1];
        let az = (fz - self.damping[2] * vz - self.taming * vz * vz * vz) / self.mass[2];

        [vx, vy, vz, ax, ay, az]
    }
}

/// The voice's sound source
///
/// Owns the 6-component phase-space state and one smoother per coefficient.
/// Each call to [`next_sample`](Self::next_sample) pulls every smoother once,
/// then integrates `dt` worth of simulated time.
pub struct ChaoticOscillator {
    state: [f64; 6],
    params: [SmoothedParameter; OscParam::COUNT],
    sample_rate: f64,
    ramp_seconds: f64,
    max_substep: f64,
    recoveries: u64,
}

impl ChaoticOscillator {
    /// Oscillator at the default coefficients, seeded at the initial state
    pub fn new(sample_rate: f64) -> Self {
        let ramp_seconds = 0.05;
        Self {
            state: INITIAL_STATE,
            params: OscParam::ALL
                .map(|p| SmoothedParameter::new(p.default_value(), sample_rate, ramp_seconds)),
            sample_rate,
            ramp_seconds,
            max_substep: MAX_STABLE_SUBSTEP,
            recoveries: 0,
        }
    }

    /// Override the sub-step ceiling (smaller is more accurate and more costly)
    pub fn with_max_substep(mut self, max_substep: f64) -> Self {
        self.set_max_substep(max_substep);
        self
    }

    /// Change the largest RK4 substep
    pub fn set_max_substep(&mut self, max_substep: f64) {
        if max_substep > 0.0 && max_substep.is_finite() {
            self.max_substep = max_substep;
        }
    }

    /// Set the smoothing ramp applied to coefficient changes
    pub fn set_ramp_length(&mut self, seconds: f64) {
        self.ramp_seconds = seconds.max(0.0);
        for p in &mut self.params {
            p.reset(self.sample_rate, self.ramp_seconds);
        }
    }

    /// Adopt a new sample rate; smoothers are snapped to their targets
    pub fn prepare(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        for p in &mut self.params {
            p.reset(sample_rate, self.ramp_seconds);
        }
    }

    /// Return to the initial condition and snap all smoothers
    pub fn reset(&mut self) {
        self.state = INITIAL_STATE;
        for p in &mut self.params {
            p.snap();
        }
    }

    /// Retarget a parameter; the smoothed value ramps toward it
    #[inline]
    pub fn set_target(&mut self, param: OscParam, value: f64) {
        self.params[param.index()].set_target(value);
    }

    /// Value a parameter is ramping toward
    pub fn target(&self, param: OscParam) -> f64 {
        self.params[param.index()].target()
    }

    /// Smoothed value a parameter has reached
    pub fn current(&self, param: OscParam) -> f64 {
        self.params[param.index()].current()
    }

    /// Current `[x, y, z, vx, vy, vz]` state
    pub fn state(&self) -> &[f64; 6] {
        &self.state
    }

    /// Sample rate the oscillator was prepared at
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Number of times the state blew up and was re-seeded
    pub fn recoveries(&self) -> u64 {
        self.recoveries
    }

    #[inline]
    fn next(&mut self, param: OscParam) -> f64 {
        self.params[param.index()].next_value()
    }

    /// Advance by one audio sample and return the raw (x, y, z) position
    pub fn next_sample(&mut self) -> (f64, f64, f64) {
        let system = TamedLorenz {
            sigma: self.next(OscParam::Sigma),
            rho: self.next(OscParam::Rho),
            beta: self.next(OscParam::Beta),
            mass: [
                self.next(OscParam::Mx),
                self.next(OscParam::My),
                self.next(OscParam::Mz),
            ],
            damping: [
                self.next(OscParam::Cx),
                self.next(OscParam::Cy),
                self.next(OscParam::Cz),
            ],
            taming: self.next(OscParam::Taming),
        };
        let dt = self.next(OscParam::Dt);

        rk4::advance(&system, &mut self.state, dt, self.max_substep);

        let [x, y, z, ..] = self.state;
        if !(x.is_finite() && y.is_finite() && z.is_finite()) {
            self.state = INITIAL_STATE;
            self.recoveries += 1;
        }

        (self.state[0], self.state[1], self.state[2])
    }
}

impl Default for ChaoticOscillator {
    fn default() -> Self {
        Self::new(44100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mixer::OnePoleHighPass;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn snapped(sample_rate: f64, values: &[(OscParam, f64)]) -> ChaoticOscillator {
        let mut osc = ChaoticOscillator::new(sample_rate);
        for &(p, v) in values {
            osc.set_target(p, v);
        }
        osc.reset();
        osc
    }

    #[test]
    fn test_initial_sample_near_initial_condition() {
        let mut osc = ChaoticOscillator::new(44100.0);
        let (x, y, z) = osc.next_sample();
        assert!((x - 0.1).abs() < 0.01);
        assert!(y.abs() < 0.01);
        assert!(z.abs() < 0.01);
    }

    #[test]
    fn test_default_trajectory_bounded_for_one_second() {
        let mut osc = ChaoticOscillator::new(44100.0);
        let mut hp = OnePoleHighPass::new(15.0, 44100.0);
        let mut sum_sq = 0.0;

        for _ in 0..44100 {
            let (x, y, z) = osc.next_sample();
            assert!(x.abs() < 100.0 && y.abs() < 100.0 && z.abs() < 150.0);
            let filtered = hp.process(x * 0.025);
            sum_sq += filtered * filtered;
        }

        assert_eq!(osc.recoveries(), 0);
        let rms = (sum_sq / 44100.0).sqrt();
        assert!(rms > 0.01 && rms < 1.0, "rms = {}", rms);
    }

    #[test]
    fn test_blow_up_resets_to_initial_condition() {
        // Tiny mass with heavy damping is far too stiff for the sub-step ceiling
        let mut osc = snapped(
            44100.0,
            &[
                (OscParam::Mx, 0.0001),
                (OscParam::My, 0.0001),
                (OscParam::Mz, 0.0001),
                (OscParam::Cx, 10.0),
                (OscParam::Cy, 10.0),
                (OscParam::Cz, 10.0),
                (OscParam::Dt, 0.01),
            ],
        );

        for _ in 0..2000 {
            let (x, y, z) = osc.next_sample();
            assert!(x.is_finite() && y.is_finite() && z.is_finite());
        }
        assert!(osc.recoveries() > 0);
    }

    #[test]
    fn test_random_parameter_sweep_never_emits_non_finite() {
        let mut rng = StdRng::seed_from_u64(0x10_2e_17);

        for _ in 0..40 {
            let mut osc = snapped(
                44100.0,
                &[
                    (OscParam::Sigma, rng.gen_range(0.0..50.0)),
                    (OscParam::Rho, rng.gen_range(0.0..100.0)),
                    (OscParam::Beta, rng.gen_range(0.0..10.0)),
                    (OscParam::Mx, rng.gen_range(0.0005..0.1)),
                    (OscParam::My, rng.gen_range(0.0005..0.1)),
                    (OscParam::Mz, rng.gen_range(0.0005..0.1)),
                    (OscParam::Cx, rng.gen_range(0.0..10.0)),
                    (OscParam::Cy, rng.gen_range(0.0..10.0)),
                    (OscParam::Cz, rng.gen_range(0.0..10.0)),
                    (OscParam::Taming, rng.gen_range(0.0..0.001)),
                    (OscParam::Dt, rng.gen_range(0.0001..0.01)),
                ],
            );

            let mut recoveries = osc.recoveries();
            for _ in 0..2000 {
                let (x, y, z) = osc.next_sample();
                assert!(x.is_finite() && y.is_finite() && z.is_finite());

                if osc.recoveries() != recoveries {
                    recoveries = osc.recoveries();
                    assert_eq!((x, y, z), (0.1, 0.0, 0.0));
                }
            }
        }
    }

    #[test]
    fn test_substep_convergence() {
        // Short horizon so chaotic divergence does not swamp the truncation error
        let run = |max_substep: f64| {
            let mut osc = snapped(44100.0, &[(OscParam::Dt, 0.004)]).with_max_substep(max_substep);
            for _ in 0..200 {
                osc.next_sample();
            }
            *osc.state()
        };

        let reference = run(0.000_125);
        let error = |s: [f64; 6]| {
            s.iter()
                .zip(reference.iter())
                .take(3)
                .map(|(a, b)| (a - b).abs())
                .fold(0.0, f64::max)
        };

        let coarse = error(run(0.004));
        let medium = error(run(0.002));
        let fine = error(run(0.001));

        assert!(coarse > medium, "{} <= {}", coarse, medium);
        assert!(medium > fine, "{} <= {}", medium, fine);
        assert!(fine < 1e-3);
    }

    #[test]
    fn test_larger_timestep_raises_pitch() {
        let crossings = |dt: f64| {
            let mut osc = snapped(44100.0, &[(OscParam::Dt, dt)]);
            let mut hp = OnePoleHighPass::new(15.0, 44100.0);
            let mut last = 0.0;
            let mut count = 0;
            for i in 0..22050 {
                let (x, _, _) = osc.next_sample();
                let y = hp.process(x);
                if i > 2000 && last <= 0.0 && y > 0.0 {
                    count += 1;
                }
                last = y;
            }
            count
        };

        let slow = crossings(0.001);
        let fast = crossings(0.002);
        assert!(slow > 0);
        assert!(fast as f64 > slow as f64 * 1.3, "{} vs {}", fast, slow);
    }

    #[test]
    fn test_coefficients_are_smoothed() {
        let mut osc = ChaoticOscillator::new(44100.0);
        osc.set_target(OscParam::Rho, 50.0);
        osc.next_sample();

        let rho = osc.current(OscParam::Rho);
        assert!(rho > 28.0 && rho < 50.0);
        assert_eq!(osc.target(OscParam::Rho), 50.0);

        osc.reset();
        assert_eq!(osc.current(OscParam::Rho), 50.0);
    }

    #[test]
    fn test_reset_restores_initial_state() {
        let mut osc = ChaoticOscillator::new(44100.0);
        for _ in 0..1000 {
            osc.next_sample();
        }
        assert_ne!(*osc.state(), INITIAL_STATE);

        osc.reset();
        assert_eq!(*osc.state(), INITIAL_STATE);
    }

    #[test]
    fn test_prepare_snaps_smoothers() {
        let mut osc = ChaoticOscillator::new(44100.0);
        osc.set_target(OscParam::Dt, 0.002);
        osc.prepare(48000.0);
        assert_eq!(osc.sample_rate(), 48000.0);
        assert_eq!(osc.current(OscParam::Dt), 0.002);
    }

    #[test]
    fn test_tamed_lorenz_reduces_to_force_balance() {
        let system = TamedLorenz::default();
        let d = system.derivatives(&[1.0, 2.0, 3.0, 0.0, 0.0, 0.0]);
        // Zero velocity: acceleration is just the Lorenz force over the mass
        assert!((d[3] - 10.0 * (2.0 - 1.0) / 0.005).abs() < 1e-9);
        assert!((d[4] - (1.0 * (28.0 - 3.0) - 2.0) / 0.005).abs() < 1e-9);
        assert!((d[5] - (2.0 - 8.0) / 0.005).abs() < 1e-9);
        assert_eq!(&d[..3], &[0.0, 0.0, 0.0]);
    }
}
