//! Reduced-order flux observer for sensorless control.
//!
//! Estimates the stator flux linkage, the electrical angular speed and the
//! rotor angle from the realized voltage and the measured current, both given
//! in estimated rotor coordinates. The speed-dependent gain places the poles
//! of the linearized estimation error at a fixed location, set by the
//! observer bandwidth, at every operating point.
use core::f32::consts::PI;

use libm::fabsf;

use crate::error::{self, ConfigError};
use crate::util::{wrap_angle, Vector};

// Damping of the flux estimate at high speeds
const ZETA_INF: f32 = 0.7;

#[derive(Debug, Clone, Copy)]
pub struct ObserverConfig {
    /// Seconds
    pub sampling_period: f32,
    /// Ohms
    pub phase_resistance: f32,
    /// Henries
    pub d_inductance: f32,
    /// Henries
    pub q_inductance: f32,
    /// Weber-turns
    pub magnet_flux: f32,
    /// Speed estimation bandwidth, radians per second
    pub bandwidth: f32,
}

#[derive(Debug, Clone)]
pub struct Observer {
    sampling_period: f32,
    phase_resistance: f32,
    d_inductance: f32,
    q_inductance: f32,
    magnet_flux: f32,
    // Speed adaptation gains
    k_p: f32,
    k_i: f32,
    // Low speed flux correction gain
    b_p: f32,
    flux: Vector,
    // Integral state of the speed adaptation, the reported estimate
    speed: f32,
    angle: f32,
}

impl Observer {
    pub fn new(config: ObserverConfig) -> Result<Self, ConfigError> {
        let phase_resistance = error::non_negative("phase resistance", config.phase_resistance)?;
        let d_inductance = error::positive("d-axis inductance", config.d_inductance)?;
        let q_inductance = error::positive("q-axis inductance", config.q_inductance)?;
        let magnet_flux = error::non_negative("magnet flux", config.magnet_flux)?;
        let bandwidth = error::positive("observer bandwidth", config.bandwidth)?;
        Ok(Observer {
            sampling_period: error::positive("sampling period", config.sampling_period)?,
            phase_resistance,
            d_inductance,
            q_inductance,
            magnet_flux,
            k_p: 2. * bandwidth,
            k_i: bandwidth * bandwidth,
            b_p: 0.5 * phase_resistance * (d_inductance + q_inductance)
                / (d_inductance * q_inductance),
            flux: Vector::new(magnet_flux, 0.),
            speed: 0.,
            angle: 0.,
        })
    }

    /// Advances the estimates by one sampling period.
    ///
    /// `voltage` is the voltage realized over the sampling period that ends now.
    pub fn update(&mut self, voltage: Vector, current: Vector) {
        let auxiliary = Vector::new(self.magnet_flux, 0.)
            + (self.d_inductance - self.q_inductance) * current.conj();
        let error = Vector::new(
            self.d_inductance * current.d + self.magnet_flux,
            self.q_inductance * current.q,
        ) - self.flux;

        let gain = self.b_p + 2. * ZETA_INF * fabsf(self.speed);
        let norm = auxiliary.magnitude_squared();
        // No direction to correct along without auxiliary flux
        let (correction, angle_error) = if norm > 0. {
            (
                gain * auxiliary * (auxiliary.dot(error) / norm),
                error.cross(auxiliary) / norm,
            )
        } else {
            (Vector::ZERO, 0.)
        };

        // The proportional part only acts within this sample
        let speed = self.k_p * angle_error + self.speed;
        let back_emf = (speed * self.flux).perpendicular();
        self.flux += self.sampling_period
            * (voltage - self.phase_resistance * current - back_emf + correction);
        self.speed += self.sampling_period * self.k_i * angle_error;
        self.angle = wrap_angle(self.angle + self.sampling_period * speed);
        log::trace!(
            "Estimated flux: {:?}, speed: {}, angle: {}",
            self.flux,
            self.speed,
            self.angle
        );
    }

    /// Stator flux linkage in estimated rotor coordinates
    pub fn flux(&self) -> Vector {
        self.flux
    }

    /// Electrical radians per second
    pub fn speed(&self) -> f32 {
        self.speed
    }

    /// Electrical radians, in [0..2PI)
    pub fn angle(&self) -> f32 {
        debug_assert!((0. ..2. * PI).contains(&self.angle));
        self.angle
    }
}
