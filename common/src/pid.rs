use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            kp: 0.06,
            ki: 0.0075,
            kd: 0.01,
        }
    }
}

/// Positional PID with output saturation.
///
/// `ki` already folds in the sample period and `kd` its reciprocal, so
/// `update` is called once per heater window with no explicit `dt`. The
/// derivative acts on the measurement rather than the error, so a setpoint
/// step does not kick the output.
#[derive(Debug, Clone)]
pub struct PidController {
    gains: PidGains,
    min_output: f64,
    max_output: f64,
    min_integrator: f64,
    max_integrator: f64,
    integrator: f64,
    derivator: f64,
}

impl PidController {
    pub fn new(gains: PidGains, min_output: f64, max_output: f64) -> Self {
        let (min_integrator, max_integrator) = if gains.ki > 0.0 {
            (min_output / gains.ki, max_output / gains.ki)
        } else {
            (0.0, 0.0)
        };

        Self {
            gains,
            min_output,
            max_output,
            min_integrator,
            max_integrator,
            integrator: 0.0,
            derivator: 0.0,
        }
    }

    pub fn gains(&self) -> PidGains {
        self.gains
    }

    pub fn integrator(&self) -> f64 {
        self.integrator
    }

    pub fn update(&mut self, current: f64, target: f64) -> f64 {
        let error = target - current;
        let p = self.gains.kp * error;

        let d = self.gains.kd * (self.derivator - current);
        self.derivator = current;

        self.integrator = (self.integrator + error).clamp(self.min_integrator, self.max_integrator);
        let i = self.integrator * self.gains.ki;

        (p + i + d).clamp(self.min_output, self.max_output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> PidController {
        PidController::new(PidGains::default(), 0.0, 8.0)
    }

    #[test]
    fn saturates_at_max_output_without_windup() {
        let mut pid = controller();
        let mut outputs = Vec::new();
        for _ in 0..2_000 {
            outputs.push(pid.update(200.0, 450.0));
        }

        assert!(outputs.iter().all(|output| *output <= 8.0));
        assert_eq!(outputs.last().copied(), Some(8.0));
        assert_eq!(pid.integrator(), 8.0 / 0.0075);

        // Once the error reverses, output leaves saturation on the very next
        // update because the integrator never grew past its clamp.
        let recovered = pid.update(460.0, 450.0);
        assert!(recovered < 8.0);
    }

    #[test]
    fn output_never_drops_below_min() {
        let mut pid = controller();
        for _ in 0..50 {
            assert_eq!(pid.update(500.0, 300.0), 0.0);
        }
        assert_eq!(pid.integrator(), 0.0);
    }

    #[test]
    fn derivative_uses_measurement_not_error() {
        let gains = PidGains {
            kp: 0.0,
            ki: 0.0,
            kd: 1.0,
        };
        let mut pid = PidController::new(gains, -100.0, 100.0);

        // First sample compares against the zeroed derivator.
        assert_eq!(pid.update(10.0, 50.0), -10.0);
        // Setpoint jump with a steady measurement produces no derivative kick.
        assert_eq!(pid.update(10.0, 90.0), 0.0);
        assert_eq!(pid.update(8.0, 90.0), 2.0);
    }

    #[test]
    fn zero_ki_disables_integrator() {
        let gains = PidGains {
            kp: 0.1,
            ki: 0.0,
            kd: 0.0,
        };
        let mut pid = PidController::new(gains, 0.0, 8.0);
        pid.update(100.0, 120.0);
        assert_eq!(pid.integrator(), 0.0);
        assert!((pid.update(100.0, 120.0) - 2.0).abs() < 1e-9);
    }
}
