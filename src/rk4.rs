//! Fixed-Step Runge-Kutta Integration
//!
//! A single classical RK4 stepper shared by every chaotic system in the crate.
//! Systems only supply their right-hand side through [`OdeSystem`]; the
//! stepping and the adaptive sub-division live here once.
//!
//! `advance` splits a requested timestep into equal sub-steps no larger than
//! `max_substep`, which keeps explicit RK4 inside its stability region when a
//! controller pushes the per-sample timestep up.

/// Right-hand side of an autonomous system `ds/dt = f(s)` with `N` states
pub trait OdeSystem<const N: usize> {
    fn derivatives(&self, state: &[f64; N]) -> [f64; N];
}

#[inline]
fn offset<const N: usize>(state: &[f64; N], k: &[f64; N], h: f64) -> [f64; N] {
    let mut out = *state;
    for (o, d) in out.iter_mut().zip(k.iter()) {
        *o += h * d;
    }
    out
}

/// One classical fourth-order Runge-Kutta step of size `h`
#[inline]
pub fn step<S, const N: usize>(system: &S, state: &mut [f64; N], h: f64)
where
    S: OdeSystem<N> + ?Sized,
{
    let k1 = system.derivatives(state);
    let k2 = system.derivatives(&offset(state, &k1, 0.5 * h));
    let k3 = system.derivatives(&offset(state, &k2, 0.5 * h));
    let k4 = system.derivatives(&offset(state, &k3, h));

    let sixth = h / 6.0;
    for i in 0..N {
        state[i] += sixth * (k1[i] + 2.0 * k2[i] + 2.0 * k3[i] + k4[i]);
    }
}

/// Number of equal sub-steps needed so that none exceeds `max_substep`
#[inline]
pub fn substep_count(dt: f64, max_substep: f64) -> usize {
    if !(dt > 0.0) || !(max_substep > 0.0) {
        return 1;
    }
    (libm::ceil(dt / max_substep) as usize).max(1)
}

/// Advance `state` by `dt`, sub-stepping for stability.
///
/// Returns the number of RK4 steps taken. The system's coefficients are held
/// fixed across all sub-steps.
pub fn advance<S, const N: usize>(system: &S, state: &mut [f64; N], dt: f64, max_substep: f64) -> usize
where
    S: OdeSystem<N> + ?Sized,
{
    let count = substep_count(dt, max_substep);
    let h = dt / count as f64;
    for _ in 0..count {
        step(system, state, h);
    }
    count
}

/// The classic first-order Lorenz system (x, y, z)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lorenz {
    pub sigma: f64,
    pub rho: f64,
    pub beta: f64,
}

impl Default for Lorenz {
    fn default() -> Self {
        Self {
            sigma: 10.0,
            rho: 28.0,
            beta: 8.0 / 3.0,
        }
    }
}

impl OdeSystem<3> for Lorenz {
    fn derivatives(&self, s: &[f64; 3]) -> [f64; 3] {
        let [x, y, z] = *s;
        [
            self.sigma * (y - x),
            x * (self.rho - z) - y,
            x * y - self.beta * z,
        ]
    }
}

/// Driven, damped Duffing oscillator
///
/// State is (x, v, phase). The drive phase is carried as a state so the system
/// stays autonomous: `x'' + δx' + αx + βx³ = γ cos(ωt)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Duffing {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    pub delta: f64,
    pub omega: f64,
}

impl Default for Duffing {
    fn default() -> Self {
        // Ueda's chaotic regime
        Self {
            alpha: -1.0,
            beta: 1.0,
            gamma: 0.3,
            delta: 0.2,
            omega: 1.2,
        }
    }
}

impl OdeSystem<3> for Duffing {
    fn derivatives(&self, s: &[f64; 3]) -> [f64; 3] {
        let [x, v, phase] = *s;
        [
            v,
            self.gamma * libm::cos(phase) - self.delta * v - self.alpha * x - self.beta * x * x * x,
            self.omega,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// ds/dt = -k s, exact solution s0 e^{-kt}
    struct Decay(f64);

    impl OdeSystem<1> for Decay {
        fn derivatives(&self, s: &[f64; 1]) -> [f64; 1] {
            [-self.0 * s[0]]
        }
    }

    #[test]
    fn test_rk4_exponential_decay() {
        let system = Decay(1.0);
        let mut s = [1.0];
        for _ in 0..100 {
            step(&system, &mut s, 0.01);
        }
        assert_relative_eq!(s[0], (-1.0f64).exp(), epsilon = 1e-9);
    }

    #[test]
    fn test_substep_count() {
        assert_eq!(substep_count(0.001, 0.005), 1);
        assert_eq!(substep_count(0.005, 0.005), 1);
        assert_eq!(substep_count(0.0051, 0.005), 2);
        assert_eq!(substep_count(0.02, 0.005), 4);
        // Degenerate inputs fall back to a single step
        assert_eq!(substep_count(0.0, 0.005), 1);
        assert_eq!(substep_count(f64::NAN, 0.005), 1);
    }

    #[test]
    fn test_advance_stabilises_stiff_decay() {
        // k·h = 40 is far outside RK4's stability region for a single step
        let system = Decay(4000.0);

        let mut single = [1.0];
        step(&system, &mut single, 0.01);
        assert!(single[0].abs() > 1.0);

        let mut divided = [1.0];
        let steps = advance(&system, &mut divided, 0.01, 0.0005);
        assert_eq!(steps, 20);
        assert!(divided[0].abs() < 1.0);
    }

    #[test]
    fn test_lorenz_fixed_point_is_stationary() {
        let lorenz = Lorenz::default();
        let c = (lorenz.beta * (lorenz.rho - 1.0)).sqrt();
        let mut s = [c, c, lorenz.rho - 1.0];
        advance(&lorenz, &mut s, 0.01, 0.005);
        assert_relative_eq!(s[0], c, epsilon = 1e-9);
        assert_relative_eq!(s[2], lorenz.rho - 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_lorenz_stays_on_attractor() {
        let lorenz = Lorenz::default();
        let mut s = [0.1, 0.0, 0.0];
        for _ in 0..50_000 {
            advance(&lorenz, &mut s, 0.001, 0.005);
        }
        assert!(s.iter().all(|v| v.is_finite()));
        assert!(s[0].abs() < 30.0 && s[1].abs() < 40.0);
        assert!(s[2] > 0.0 && s[2] < 60.0);
    }

    #[test]
    fn test_duffing_bounded() {
        let duffing = Duffing::default();
        let mut s = [1.0, 0.0, 0.0];
        for _ in 0..20_000 {
            advance(&duffing, &mut s, 0.01, 0.005);
        }
        assert!(s[0].abs() < 3.0);
        assert!(s[1].abs() < 3.0);
        assert_relative_eq!(s[2], 1.2 * 200.0, epsilon = 1e-6);
    }
}
