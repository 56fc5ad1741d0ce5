//! Torque to current reference mapping with field weakening.
use libm::{fabsf, sqrtf};

use crate::error::{self, ConfigError};
use crate::loci::{LociConfig, OptimalLoci};
use crate::util::{saturate, Vector, SQRT_3};

#[derive(Debug, Clone, Copy)]
pub struct ReferenceConfig {
    /// Seconds
    pub sampling_period: f32,
    pub loci: LociConfig,
    /// Fraction of the DC-bus voltage limit that may be used, (0..1]
    pub voltage_margin: f32,
    /// Amps per volt-second
    pub field_weakening_gain: f32,
}

#[derive(Debug, Clone)]
pub struct CurrentReference {
    sampling_period: f32,
    pole_pairs: f32,
    d_inductance: f32,
    q_inductance: f32,
    magnet_flux: f32,
    current_max: f32,
    voltage_margin: f32,
    field_weakening_gain: f32,
    loci: OptimalLoci,
    d_current_ref: f32,
}

impl CurrentReference {
    pub fn new(config: ReferenceConfig) -> Result<Self, ConfigError> {
        let loci = OptimalLoci::new(config.loci)?;
        Ok(CurrentReference {
            sampling_period: error::positive("sampling period", config.sampling_period)?,
            pole_pairs: config.loci.pole_pairs as f32,
            d_inductance: config.loci.d_inductance,
            q_inductance: config.loci.q_inductance,
            magnet_flux: config.loci.magnet_flux,
            current_max: config.loci.current_max,
            voltage_margin: error::positive("voltage margin", config.voltage_margin)?,
            field_weakening_gain: error::non_negative(
                "field weakening gain",
                config.field_weakening_gain,
            )?,
            loci,
            d_current_ref: 0.,
        })
    }

    pub fn loci(&self) -> &OptimalLoci {
        &self.loci
    }

    /// Current reference and the torque it produces.
    ///
    /// `speed` is the electrical angular speed of the rotor.
    pub fn output(&self, torque_ref: f32, speed: f32, dc_voltage: f32) -> (Vector, f32) {
        // Voltage dependent torque ceiling, not applicable at standstill
        let torque_max = if fabsf(speed) > 0. {
            let flux_max = self.voltage_margin * dc_voltage / (SQRT_3 * fabsf(speed));
            self.loci.torque_limit(flux_max)
        } else {
            self.loci.torque_limit(f32::INFINITY)
        };
        if fabsf(torque_ref) > torque_max {
            log::debug!("Torque ceiling {} reached by {}", torque_max, torque_ref);
        }
        let torque_ref = saturate(torque_ref, torque_max);

        let d_current = self.d_current_ref;
        let total_flux = self.magnet_flux + (self.d_inductance - self.q_inductance) * d_current;
        let q_current = if total_flux != 0. {
            torque_ref / (1.5 * self.pole_pairs * total_flux)
        } else {
            0.
        };

        let mtpa_d_current = self.loci.mtpa_d_current(fabsf(torque_ref));
        let q_current_max = remaining_current(self.current_max, d_current)
            .min(remaining_current(self.current_max, mtpa_d_current));
        if fabsf(q_current) > q_current_max {
            log::debug!("Current limiter triggered: {}", q_current);
        }
        let q_current = saturate(q_current, q_current_max);

        let torque = 1.5 * self.pole_pairs * total_flux * q_current;
        (Vector::new(d_current, q_current), torque)
    }

    /// Moves the direct current reference so that the voltage reference stays
    /// within the available voltage
    pub fn update(&mut self, torque: f32, voltage_ref: Vector, dc_voltage: f32) {
        let voltage_max = self.voltage_margin * dc_voltage / SQRT_3;
        let voltage_error = voltage_max - voltage_ref.magnitude();
        self.d_current_ref += self.sampling_period * self.field_weakening_gain * voltage_error;

        let upper = self.loci.mtpa_d_current(fabsf(torque));
        let lower = self.loci.limit_d_current(fabsf(torque));
        // The MTPA bound wins if the bounds cross
        self.d_current_ref = self.d_current_ref.max(lower).min(upper);
        log::trace!("Direct current reference: {}", self.d_current_ref);
    }

    pub fn d_current_ref(&self) -> f32 {
        self.d_current_ref
    }
}

// Largest quadrature current within the current circle
fn remaining_current(current_max: f32, d_current: f32) -> f32 {
    sqrtf((current_max * current_max - d_current * d_current).max(0.))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ipm() -> ReferenceConfig {
        ReferenceConfig {
            sampling_period: 250E-6,
            loci: LociConfig {
                pole_pairs: 3,
                d_inductance: 0.036,
                q_inductance: 0.051,
                magnet_flux: 0.545,
                current_max: 1.5 * 1.414 * 5.,
                min_d_current: None,
            },
            voltage_margin: 0.9,
            field_weakening_gain: 20. / (50. * 0.036),
        }
    }

    fn syrm() -> ReferenceConfig {
        ReferenceConfig {
            loci: LociConfig {
                pole_pairs: 2,
                d_inductance: 0.28,
                q_inductance: 0.044,
                magnet_flux: 0.,
                current_max: 2. * 1.414 * 15.5,
                min_d_current: Some(0.2 * 1.414 * 15.5),
            },
            ..ipm()
        }
    }

    #[test]
    fn zero_torque_gives_zero_current() {
        let reference = CurrentReference::new(ipm()).unwrap();
        let (current, torque) = reference.output(0., 0., 540.);
        assert_eq!(current, Vector::ZERO);
        assert_eq!(torque, 0.);
    }

    #[test]
    fn produces_requested_torque() {
        let reference = CurrentReference::new(ipm()).unwrap();
        let (current, torque) = reference.output(5., 100., 540.);
        assert!(fabsf(torque - 5.) < 1E-4);
        assert_eq!(current.d, 0.);
        assert!(current.q > 0.);
        let (negative, torque) = reference.output(-5., 100., 540.);
        assert!(fabsf(torque + 5.) < 1E-4);
        assert_eq!(negative.q, -current.q);
    }

    #[test]
    fn current_stays_within_limit() {
        let reference = CurrentReference::new(ipm()).unwrap();
        let (current, torque) = reference.output(1000., 0., 540.);
        assert!(current.magnitude() <= 1.5 * 1.414 * 5. + 1E-4);
        assert!(torque > 0. && torque < 1000.);
    }

    #[test]
    fn settles_at_mtpa_with_voltage_margin() {
        let mut reference = CurrentReference::new(ipm()).unwrap();
        for _ in 0..1000 {
            let (_, torque) = reference.output(10., 100., 540.);
            reference.update(torque, Vector::new(0., 50.), 540.);
        }
        let (current, torque) = reference.output(10., 100., 540.);
        assert!(current.d < 0.);
        assert!(fabsf(current.d - reference.loci().mtpa_d_current(fabsf(torque))) < 1E-2);
    }

    #[test]
    fn weakens_field_without_voltage_margin() {
        let mut reference = CurrentReference::new(ipm()).unwrap();
        let (_, torque) = reference.output(5., 500., 540.);
        reference.update(torque, Vector::ZERO, 540.);
        let mtpa = reference.d_current_ref();
        for _ in 0..2000 {
            let (_, torque) = reference.output(5., 500., 540.);
            reference.update(torque, Vector::new(0., 400.), 540.);
        }
        let weakened = reference.d_current_ref();
        assert!(weakened < mtpa);
        assert!(weakened >= -1.5 * 1.414 * 5.);
    }

    #[test]
    fn field_weakening_stops_at_mtpv() {
        let mut config = ipm();
        config.loci.current_max = 20.;
        let mut reference = CurrentReference::new(config).unwrap();
        for _ in 0..200 {
            let (_, torque) = reference.output(5., 500., 540.);
            assert!(fabsf(torque - 5.) < 1E-3);
            reference.update(torque, Vector::new(0., 1000.), 540.);
        }
        // Settled, the torque no longer changes
        let (_, torque) = reference.output(5., 500., 540.);
        let d_current = reference.d_current_ref();
        assert_eq!(d_current, reference.loci().limit_d_current(torque));
        // Inside the current limit, so on the MTPV locus
        assert!(d_current > -19.);

        let (current, _) = reference.output(5., 500., 540.);
        let loci = reference.loci();
        let mtpv = loci.mtpv(loci.flux(current).magnitude()).unwrap();
        assert!((current - mtpv).magnitude() < 1E-2, "{:?} {:?}", current, mtpv);
    }

    #[test]
    fn reluctance_machine_magnetizes_first() {
        let mut reference = CurrentReference::new(syrm()).unwrap();
        // No torque can be produced before there is d-axis flux
        let (current, torque) = reference.output(10., 0., 540.);
        assert_eq!((current, torque), (Vector::ZERO, 0.));
        for _ in 0..1000 {
            let (_, torque) = reference.output(10., 0., 540.);
            reference.update(torque, Vector::ZERO, 540.);
        }
        let (current, torque) = reference.output(10., 0., 540.);
        assert!(current.d > 0.);
        assert!(torque > 0.);
    }
}
