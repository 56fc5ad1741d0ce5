//! Speed control with an explicit load torque estimate.
//!
//! The controller is a two-degree-of-freedom PI controller written in
//! disturbance observer form: the integral state is a load torque estimate
//! that is fed forward, so one bandwidth sets both reference tracking and
//! disturbance rejection.
use crate::error::{self, ConfigError};
use crate::util::saturate;

#[derive(Debug, Clone, Copy)]
pub struct SpeedConfig {
    /// Seconds
    pub sampling_period: f32,
    /// Closed-loop bandwidth, radians per second
    pub bandwidth: f32,
    /// Kilogram meters-squared
    pub inertia: f32,
    /// Newton meters
    pub torque_max: f32,
}

#[derive(Debug, Clone)]
pub struct SpeedController {
    sampling_period: f32,
    bandwidth: f32,
    inertia: f32,
    torque_max: f32,
    integral: f32,
}

impl SpeedController {
    pub fn new(config: SpeedConfig) -> Result<Self, ConfigError> {
        Ok(SpeedController {
            sampling_period: error::positive("sampling period", config.sampling_period)?,
            bandwidth: error::positive("speed bandwidth", config.bandwidth)?,
            inertia: error::positive("inertia", config.inertia)?,
            torque_max: error::positive("maximum torque", config.torque_max)?,
            integral: 0.,
        })
    }

    /// Torque reference and load torque estimate, speeds in mechanical rad/s
    pub fn output(&self, speed_ref: f32, speed: f32) -> (f32, f32) {
        let gain = self.bandwidth * self.inertia;
        let load_torque = self.integral - gain * speed;
        let torque_ref = gain * (speed_ref - speed) + load_torque;
        if libm::fabsf(torque_ref) > self.torque_max {
            log::debug!("Torque limiter triggered: {}", torque_ref);
        }
        (saturate(torque_ref, self.torque_max), load_torque)
    }

    /// `torque` is the torque actually produced, which may be below the reference
    pub fn update(&mut self, torque: f32, load_torque: f32) {
        self.integral += self.sampling_period * self.bandwidth * (torque - load_torque);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> SpeedController {
        SpeedController::new(SpeedConfig {
            sampling_period: 250E-6,
            bandwidth: 2. * core::f32::consts::PI * 4.,
            inertia: 0.015,
            torque_max: 20.,
        })
        .unwrap()
    }

    // Rigid rotor with a constant load, integrated at the sampling period
    fn run(load: f32, speed_ref: f32, samples: usize) -> (f32, f32, f32) {
        let mut ctrl = controller();
        let mut speed = speed_ref;
        let mut torque_ref = 0.;
        let mut peak = 0f32;
        for _ in 0..samples {
            let (tau, tau_load) = ctrl.output(speed_ref, speed);
            ctrl.update(tau, tau_load);
            speed += 250E-6 / 0.015 * (tau - load);
            torque_ref = tau;
            peak = peak.max(libm::fabsf(tau));
        }
        (torque_ref, speed, peak)
    }

    #[test]
    fn converges_to_load_torque() {
        let (torque, speed, peak) = run(7.5, 100., 20_000);
        assert!(libm::fabsf(torque - 7.5) < 1E-2, "torque {}", torque);
        assert!(libm::fabsf(speed - 100.) < 1E-2, "speed {}", speed);
        assert!(peak <= 20.);
    }

    #[test]
    fn respects_torque_limit() {
        let (torque, _, peak) = run(-30., 0., 4_000);
        assert!(peak <= 20.);
        assert_eq!(torque, -20.);
    }

    #[test]
    fn holds_at_rest() {
        let mut ctrl = controller();
        let (tau, tau_load) = ctrl.output(0., 0.);
        assert_eq!((tau, tau_load), (0., 0.));
        ctrl.update(tau, tau_load);
        assert_eq!(ctrl.output(0., 0.), (0., 0.));
    }
}
