//! PID loop
//!
//! Floating point PID with setpoint ramping, a low-pass filtered derivative
//! and conditional-integration anti-windup. Output is a heater demand in
//! percent, clamped to 0..=100.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub const OUTPUT_MIN: f32 = 0.0;
pub const OUTPUT_MAX: f32 = 100.0;
/// Largest gain accepted from the link
pub const GAIN_MAX: f32 = 100.0;
/// Derivative low-pass coefficient (weight of the newest sample)
pub const DERIVATIVE_ALPHA: f32 = 0.1;
/// Default setpoint ramp, units per second
pub const DEFAULT_RAMP_RATE: f32 = 1.0;

/// PID coefficients
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PidGains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
}

impl PidGains {
    pub const fn new(kp: f32, ki: f32, kd: f32) -> Self {
        Self { kp, ki, kd }
    }

    /// Gains from the wire encoding (hundredths)
    pub fn from_x100(kp: i16, ki: i16, kd: i16) -> Self {
        Self {
            kp: kp as f32 / 100.0,
            ki: ki as f32 / 100.0,
            kd: kd as f32 / 100.0,
        }
    }

    /// Gains in the wire encoding (hundredths)
    pub fn to_x100(&self) -> [i16; 3] {
        let scale = |g: f32| libm::roundf(g * 100.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        [scale(self.kp), scale(self.ki), scale(self.kd)]
    }

    /// All gains within 0..=GAIN_MAX
    pub fn is_valid(&self) -> bool {
        [self.kp, self.ki, self.kd]
            .iter()
            .all(|g| g.is_finite() && (0.0..=GAIN_MAX).contains(g))
    }
}

impl Default for PidGains {
    fn default() -> Self {
        Self::new(2.0, 0.1, 0.5)
    }
}

/// One PID loop
#[derive(Debug, Clone)]
pub struct Pid {
    gains: PidGains,
    /// Setpoint in effect, moves toward `target` at `ramp_rate`
    setpoint: f32,
    /// Commanded setpoint
    target: f32,
    ramp_rate: f32,
    integral: f32,
    last_error: Option<f32>,
    derivative: f32,
    output: f32,
}

impl Pid {
    pub fn new(gains: PidGains, setpoint: f32) -> Self {
        Self {
            gains,
            setpoint,
            target: setpoint,
            ramp_rate: DEFAULT_RAMP_RATE,
            integral: 0.0,
            last_error: None,
            derivative: 0.0,
            output: 0.0,
        }
    }

    pub fn gains(&self) -> PidGains {
        self.gains
    }

    /// Replace the gains and clear accumulated state
    pub fn set_gains(&mut self, gains: PidGains) {
        self.gains = gains;
        self.reset();
    }

    /// Commanded setpoint
    pub fn target(&self) -> f32 {
        self.target
    }

    /// Setpoint currently used by the loop
    pub fn setpoint(&self) -> f32 {
        self.setpoint
    }

    /// Command a new setpoint; the loop ramps toward it
    pub fn set_target(&mut self, target: f32) {
        self.target = target;
    }

    /// Command a new setpoint and use it immediately
    pub fn jump_to(&mut self, target: f32) {
        self.target = target;
        self.setpoint = target;
    }

    pub fn set_ramp_rate(&mut self, per_second: f32) {
        self.ramp_rate = per_second.max(0.0);
    }

    pub fn output(&self) -> f32 {
        self.output
    }

    /// Clear integral and derivative history
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.last_error = None;
        self.derivative = 0.0;
        self.output = 0.0;
    }

    /// Run one step against the measured value over `dt` seconds
    pub fn compute(&mut self, measured: f32, dt: f32) -> f32 {
        if !measured.is_finite() || dt <= 0.0 {
            self.output = 0.0;
            return 0.0;
        }

        self.ramp(dt);

        let error = self.setpoint - measured;
        let p_term = self.gains.kp * error;

        let raw_derivative = match self.last_error {
            Some(last) => (error - last) / dt,
            None => 0.0,
        };
        self.derivative =
            DERIVATIVE_ALPHA * raw_derivative + (1.0 - DERIVATIVE_ALPHA) * self.derivative;
        let d_term = self.gains.kd * self.derivative;
        self.last_error = Some(error);

        let i_term = if self.gains.ki > 0.001 {
            // Only integrate while the output is not pinned in the direction
            // the error would push it.
            let unclamped = p_term + self.gains.ki * self.integral + d_term;
            let saturated_high = unclamped >= OUTPUT_MAX && error > 0.0;
            let saturated_low = unclamped <= OUTPUT_MIN && error < 0.0;
            if !saturated_high && !saturated_low {
                self.integral += error * dt;
            }
            let limit = OUTPUT_MAX / self.gains.ki;
            self.integral = self.integral.clamp(-limit, limit);
            self.gains.ki * self.integral
        } else {
            self.integral = 0.0;
            0.0
        };

        self.output = (p_term + i_term + d_term).clamp(OUTPUT_MIN, OUTPUT_MAX);
        self.output
    }

    fn ramp(&mut self, dt: f32) {
        let diff = self.target - self.setpoint;
        let step = self.ramp_rate * dt;
        if libm::fabsf(diff) <= step {
            self.setpoint = self.target;
        } else if diff > 0.0 {
            self.setpoint += step;
        } else {
            self.setpoint -= step;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 0.1;

    #[test]
    fn test_output_clamped() {
        let mut pid = Pid::new(PidGains::new(50.0, 0.0, 0.0), 93.0);
        assert_eq!(pid.compute(20.0, DT), OUTPUT_MAX);
        assert_eq!(pid.compute(150.0, DT), OUTPUT_MIN);
    }

    #[test]
    fn test_proportional_response() {
        let mut pid = Pid::new(PidGains::new(2.0, 0.0, 0.0), 93.0);
        let out = pid.compute(90.0, DT);
        assert!((out - 6.0).abs() < 1e-4);
    }

    #[test]
    fn test_integral_does_not_wind_up_while_saturated() {
        let mut pid = Pid::new(PidGains::new(10.0, 1.0, 0.0), 93.0);
        for _ in 0..1000 {
            pid.compute(20.0, DT);
        }
        // At setpoint the accumulated integral must not hold the heater on
        let out = pid.compute(93.0, DT);
        assert!(out < 5.0, "output {out}");
    }

    #[test]
    fn test_integral_removes_offset() {
        let mut pid = Pid::new(PidGains::new(1.0, 0.5, 0.0), 93.0);
        let first = pid.compute(92.0, DT);
        let mut last = first;
        for _ in 0..50 {
            last = pid.compute(92.0, DT);
        }
        assert!(last > first);
    }

    #[test]
    fn test_setpoint_ramps_toward_target() {
        let mut pid = Pid::new(PidGains::default(), 90.0);
        pid.set_target(95.0);
        assert_eq!(pid.target(), 95.0);
        pid.compute(90.0, 1.0);
        assert!((pid.setpoint() - 91.0).abs() < 1e-4);
        for _ in 0..10 {
            pid.compute(90.0, 1.0);
        }
        assert_eq!(pid.setpoint(), 95.0);
    }

    #[test]
    fn test_derivative_filtered() {
        let mut pid = Pid::new(PidGains::new(0.0, 0.0, 10.0), 93.0);
        pid.compute(93.0, DT);
        // A one-sample jump of 1 °C is attenuated by the filter
        let out = pid.compute(92.0, DT);
        assert!((out - 10.0).abs() < 1e-3, "output {out}");
    }

    #[test]
    fn test_non_finite_measurement_gives_zero() {
        let mut pid = Pid::new(PidGains::default(), 93.0);
        assert_eq!(pid.compute(f32::NAN, DT), 0.0);
    }

    #[test]
    fn test_gain_validation() {
        assert!(PidGains::new(0.0, 100.0, 5.0).is_valid());
        assert!(!PidGains::new(-0.1, 1.0, 1.0).is_valid());
        assert!(!PidGains::new(1.0, 100.5, 1.0).is_valid());
        assert_eq!(PidGains::from_x100(250, 10, 75).to_x100(), [250, 10, 75]);
    }
}
