//! Frequency Lock
//!
//! Steers the oscillator's timestep so its measured fundamental follows a
//! target frequency. The controller runs on its own fixed cadence: elapsed
//! audio time is accumulated and every whole `interval` triggers one PID
//! update, so a block may produce zero, one or several updates.
//!
//! Each correction is added to a running `dt_target` which is clamped to the
//! legal timestep range before the oscillator sees it.
//!
//! The lock is bypassed (corrections are not applied) while the voice is
//! silent, while there is no target, and whenever the pitch estimator has no
//! confident reading.

use crate::pid::PidController;

/// Default controller cadence in seconds
pub const DEFAULT_INTERVAL: f64 = 0.01;

/// Smallest cadence accepted by [`FrequencyLock::set_interval`]
const MIN_INTERVAL: f64 = 1e-4;

/// Closed-loop timestep controller
#[derive(Debug, Clone)]
pub struct FrequencyLock {
    pid: PidController,
    interval: f64,
    accumulator: f64,
    dt_target: f64,
    dt_min: f64,
    dt_max: f64,
    updates: u64,
}

impl FrequencyLock {
    /// A lock starting at `dt`, confined to `[dt_min, dt_max]`
    pub fn new(dt: f64, dt_min: f64, dt_max: f64) -> Self {
        let (dt_min, dt_max) = if dt_min <= dt_max {
            (dt_min, dt_max)
        } else {
            (dt_max, dt_min)
        };
        Self {
            pid: PidController::default(),
            interval: DEFAULT_INTERVAL,
            accumulator: 0.0,
            dt_target: dt.clamp(dt_min, dt_max),
            dt_min,
            dt_max,
            updates: 0,
        }
    }

    /// Seconds between controller updates
    pub fn with_interval(mut self, seconds: f64) -> Self {
        self.set_interval(seconds);
        self
    }

    /// Bounds on the controller's integral accumulator
    pub fn with_integral_limits(mut self, min: f64, max: f64) -> Self {
        self.pid.set_integral_limits(min, max);
        self
    }

    /// Change the update interval, floored at a small minimum
    pub fn set_interval(&mut self, seconds: f64) {
        if seconds.is_finite() {
            self.interval = seconds.max(MIN_INTERVAL);
        }
    }

    /// Seconds between controller updates
    pub fn interval(&self) -> f64 {
        self.interval
    }

    /// Set the PID gains
    pub fn set_gains(&mut self, kp: f64, ki: f64, kd: f64) {
        self.pid.set_gains(kp, ki, kd);
    }

    /// Set the integral accumulator bounds
    pub fn set_integral_limits(&mut self, min: f64, max: f64) {
        self.pid.set_integral_limits(min, max);
    }

    /// The underlying controller
    pub fn pid(&self) -> &PidController {
        &self.pid
    }

    /// Timestep the oscillator should be driven with
    pub fn dt_target(&self) -> f64 {
        self.dt_target
    }

    /// Total controller updates applied since the last reset
    pub fn updates(&self) -> u64 {
        self.updates
    }

    /// Move `dt_target` to `dt` without touching controller history
    pub fn rebase(&mut self, dt: f64) {
        if dt.is_finite() {
            self.dt_target = dt.clamp(self.dt_min, self.dt_max);
        }
    }

    /// Clear controller history and the cadence accumulator, starting from `dt`
    pub fn reset(&mut self, dt: f64) {
        self.pid.reset();
        self.accumulator = 0.0;
        self.updates = 0;
        self.rebase(dt);
    }

    /// Run exactly one controller update and return the new `dt_target`
    pub fn tick(&mut self, target: f64, measured: f64) -> f64 {
        let correction = self.pid.process(target, measured);
        if correction.is_finite() {
            self.dt_target = (self.dt_target + correction).clamp(self.dt_min, self.dt_max);
        }
        self.updates += 1;
        self.dt_target
    }

    /// Account for `elapsed` seconds of audio and run every update that fell due.
    ///
    /// Updates that fall due while bypassed are consumed without effect.
    /// Returns the number of updates applied.
    pub fn advance(
        &mut self,
        elapsed: f64,
        target: f64,
        measured: Option<f64>,
        engaged: bool,
    ) -> usize {
        if elapsed.is_finite() && elapsed > 0.0 {
            self.accumulator += elapsed;
        }

        let measured = match measured {
            Some(m) if engaged && target > 0.0 && m > 0.0 => Some(m),
            _ => None,
        };

        let mut applied = 0;
        while self.accumulator >= self.interval {
            self.accumulator -= self.interval;
            if let Some(m) = measured {
                self.tick(target, m);
                applied += 1;
            }
        }
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lock() -> FrequencyLock {
        let mut lock = FrequencyLock::new(0.001, 0.0001, 0.05)
            .with_interval(0.01)
            .with_integral_limits(-0.001, 0.001);
        lock.set_gains(1e-6, 2e-8, 1e-6);
        lock
    }

    #[test]
    fn test_lock_raises_dt_when_flat() {
        // A larger timestep plays the trajectory faster, so a flat voice
        // needs dt to grow
        let mut lock = lock();
        let mut last = lock.dt_target();
        for _ in 0..100 {
            let dt = lock.tick(220.0, 200.0);
            assert!(dt > last, "dt went from {} to {}", last, dt);
            last = dt;
        }
        assert!(last > 0.001 && last < 0.05);
        assert_eq!(lock.updates(), 100);
    }

    #[test]
    fn test_lock_lowers_dt_when_sharp() {
        let mut lock = lock();
        lock.rebase(0.01);
        let mut last = lock.dt_target();
        for _ in 0..100 {
            let dt = lock.tick(220.0, 240.0);
            assert!(dt < last);
            last = dt;
        }
    }

    #[test]
    fn test_lock_converges_on_linear_plant() {
        // Plant where the fundamental is proportional to dt
        let hz_per_dt = 50_000.0;
        let mut lock = lock();
        for _ in 0..2000 {
            let measured = hz_per_dt * lock.dt_target();
            lock.tick(220.0, measured);
        }
        let settled = hz_per_dt * lock.dt_target();
        assert!((settled - 220.0).abs() < 0.5, "settled at {} Hz", settled);
    }

    #[test]
    fn test_lock_clamps_dt_target() {
        let mut lock = FrequencyLock::new(0.001, 0.0001, 0.05);
        lock.set_gains(1.0, 0.0, 0.0);
        assert_eq!(lock.tick(1000.0, 0.0), 0.05);
        assert_eq!(lock.tick(0.0, 1000.0), 0.0001);

        lock.rebase(f64::NAN);
        assert_eq!(lock.dt_target(), 0.0001);
        lock.rebase(3.0);
        assert_eq!(lock.dt_target(), 0.05);
    }

    #[test]
    fn test_lock_cadence_is_block_independent() {
        // 256-frame blocks at 44.1 kHz for about one second
        let block = 256.0 / 44100.0;
        let mut steady = lock();
        let mut total = 0;
        for _ in 0..172 {
            total += steady.advance(block, 220.0, Some(200.0), true);
        }
        assert!((98..=100).contains(&total), "total = {}", total);

        // One long block catches up on every interval it spans
        let mut burst = lock();
        let applied = burst.advance(0.0555, 220.0, Some(200.0), true);
        assert_eq!(applied, 5);
    }

    #[test]
    fn test_lock_small_blocks_accumulate() {
        let mut lock = lock();
        assert_eq!(lock.advance(0.004, 220.0, Some(200.0), true), 0);
        assert_eq!(lock.advance(0.004, 220.0, Some(200.0), true), 0);
        assert_eq!(lock.advance(0.004, 220.0, Some(200.0), true), 1);
    }

    #[test]
    fn test_lock_bypass_leaves_dt_alone() {
        let mut lock = lock();
        let start = lock.dt_target();

        assert_eq!(lock.advance(0.1, 220.0, None, true), 0);
        assert_eq!(lock.advance(0.1, 0.0, Some(200.0), true), 0);
        assert_eq!(lock.advance(0.1, 220.0, Some(200.0), false), 0);
        assert_eq!(lock.dt_target(), start);

        // Bypassed intervals are consumed, not queued
        assert_eq!(lock.advance(0.005, 220.0, Some(200.0), true), 0);
    }

    #[test]
    fn test_lock_reset_clears_history() {
        let mut lock = lock();
        for _ in 0..10 {
            lock.tick(220.0, 100.0);
        }
        lock.advance(0.005, 220.0, None, true);
        lock.reset(0.002);

        assert_eq!(lock.dt_target(), 0.002);
        assert_eq!(lock.pid().integral(), 0.0);
        assert_eq!(lock.updates(), 0);
        assert_eq!(lock.advance(0.009, 220.0, Some(200.0), true), 0);
    }
}
