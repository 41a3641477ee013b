//! PID Controller
//!
//! A plain discrete PID with a clamped integral. It knows nothing about
//! frequencies or timesteps: the caller decides what the correction means
//! and how often [`PidController::process`] runs.

/// Proportional/integral/derivative controller with anti-windup
#[derive(Debug, Clone)]
pub struct PidController {
    kp: f64,
    ki: f64,
    kd: f64,
    integral: f64,
    integral_min: f64,
    integral_max: f64,
    last_error: f64,
}

impl PidController {
    /// Controller with the given gains and unbounded integral
    pub fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self {
            kp,
            ki,
            kd,
            integral: 0.0,
            integral_min: f64::NEG_INFINITY,
            integral_max: f64::INFINITY,
            last_error: 0.0,
        }
    }

    /// Replace the gains, keeping the accumulated state
    pub fn set_gains(&mut self, kp: f64, ki: f64, kd: f64) {
        self.kp = kp;
        self.ki = ki;
        self.kd = kd;
    }

    /// Current `(kp, ki, kd)`
    pub fn gains(&self) -> (f64, f64, f64) {
        (self.kp, self.ki, self.kd)
    }

    /// Bound the accumulated integral term. Inverted bounds are swapped.
    pub fn set_integral_limits(&mut self, min: f64, max: f64) {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        self.integral_min = min;
        self.integral_max = max;
        self.integral = self.integral.clamp(min, max);
    }

    /// Accumulated, clamped integral term
    pub fn integral(&self) -> f64 {
        self.integral
    }

    /// One controller update, returning the correction to apply
    pub fn process(&mut self, target: f64, measured: f64) -> f64 {
        let error = target - measured;

        let proportional = error * self.kp;

        self.integral =
            (self.integral + error * self.ki).clamp(self.integral_min, self.integral_max);

        let derivative = (error - self.last_error) * self.kd;
        self.last_error = error;

        proportional + self.integral + derivative
    }

    /// Clear the integral and the previous error
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.last_error = 0.0;
    }
}

impl Default for PidController {
    fn default() -> Self {
        Self::new(1e-6, 2e-8, 1e-6)
    }
}
