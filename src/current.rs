//! Two-degree-of-freedom PI current control in flux linkage form.
use crate::error::{self, ConfigError};
use crate::util::Vector;

#[derive(Debug, Clone, Copy)]
pub struct CurrentConfig {
    /// Seconds
    pub sampling_period: f32,
    /// Henries
    pub d_inductance: f32,
    /// Henries
    pub q_inductance: f32,
    /// Closed-loop bandwidth, radians per second
    pub bandwidth: f32,
}

#[derive(Debug, Clone)]
pub struct CurrentController {
    sampling_period: f32,
    d_inductance: f32,
    q_inductance: f32,
    bandwidth: f32,
    integral: Vector,
}

impl CurrentController {
    pub fn new(config: CurrentConfig) -> Result<Self, ConfigError> {
        Ok(CurrentController {
            sampling_period: error::positive("sampling period", config.sampling_period)?,
            d_inductance: error::positive("d-axis inductance", config.d_inductance)?,
            q_inductance: error::positive("q-axis inductance", config.q_inductance)?,
            bandwidth: error::positive("current bandwidth", config.bandwidth)?,
            integral: Vector::ZERO,
        })
    }

    // The magnet flux cancels out of every difference, so it is left out
    fn flux(&self, current: Vector) -> Vector {
        Vector::new(self.d_inductance * current.d, self.q_inductance * current.q)
    }

    /// Unlimited voltage reference and the flux error for `update`
    pub fn output(&self, current_ref: Vector, current: Vector) -> (Vector, Vector) {
        let flux_ref = self.flux(current_ref);
        let flux = self.flux(current);
        let voltage_ref = self.bandwidth * flux_ref - 2. * self.bandwidth * flux + self.integral;
        (voltage_ref, flux_ref - flux)
    }

    /// `limited` is the voltage the modulator can realize, `speed` the
    /// electrical angular speed of the control frame
    pub fn update(&mut self, error: Vector, voltage_ref: Vector, limited: Vector, speed: f32) {
        let gain = self.bandwidth * Vector::new(self.bandwidth, speed);
        // Anti-windup through the realizable voltage
        let windup = (limited - voltage_ref) / self.bandwidth;
        self.integral += self.sampling_period * (gain * (error + windup));
    }
}
