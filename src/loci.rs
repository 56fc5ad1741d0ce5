//! Optimal current loci of a synchronous machine.
//!
//! Gives the maximum-torque-per-ampere (MTPA) and maximum-torque-per-volt
//! (MTPV) loci, and the lookup functions the current reference generator
//! uses at run time:
//!
//! * MTPA direct current as a function of torque
//! * direct current on the limit boundary (MTPV locus, or the current limit
//!   circle where it is closer) as a function of torque
//! * maximum torque as a function of the available flux linkage
//!
//! The tables are sampled once at construction and interpolated linearly.
use core::f32::consts::{FRAC_1_SQRT_2, PI};

use alloc::vec::Vec;
use libm::{atanf, sqrtf};

use crate::error::{self, ConfigError};
use crate::util::{Lookup, Vector};

// Samples per locus segment
const SAMPLES: usize = 200;

#[derive(Debug, Clone, Copy)]
pub struct LociConfig {
    pub pole_pairs: usize,
    /// Henries
    pub d_inductance: f32,
    /// Henries
    pub q_inductance: f32,
    /// Permanent magnet flux linkage, Weber-turns. Zero for a reluctance machine.
    pub magnet_flux: f32,
    /// Amps, peak value
    pub current_max: f32,
    /// Amps, only read for reluctance machines
    pub min_d_current: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct OptimalLoci {
    pole_pairs: f32,
    d_inductance: f32,
    q_inductance: f32,
    magnet_flux: f32,
    current_max: f32,
    // Zero for permanent magnet machines
    min_d_current: f32,
    mtpa_table: Lookup,
    limit_table: Lookup,
    torque_limit_table: Lookup,
}

impl OptimalLoci {
    pub fn new(config: LociConfig) -> Result<Self, ConfigError> {
        if config.pole_pairs == 0 {
            log::error!("Invalid pole pair count");
            return Err(ConfigError::InvalidPolePairs);
        }
        let magnet_flux = error::non_negative("magnet flux", config.magnet_flux)?;
        let min_d_current = if magnet_flux == 0. {
            match config.min_d_current {
                Some(current) => error::positive("minimum d-axis current", current)?,
                None => {
                    log::error!("Reluctance machine without minimum d-axis current");
                    return Err(ConfigError::MissingMinimumCurrent);
                }
            }
        } else {
            0.
        };

        let mut loci = OptimalLoci {
            pole_pairs: config.pole_pairs as f32,
            d_inductance: error::positive("d-axis inductance", config.d_inductance)?,
            q_inductance: error::positive("q-axis inductance", config.q_inductance)?,
            magnet_flux,
            current_max: error::positive("maximum current", config.current_max)?,
            min_d_current,
            mtpa_table: Lookup::default(),
            limit_table: Lookup::default(),
            torque_limit_table: Lookup::default(),
        };
        if min_d_current >= loci.current_max {
            log::error!("Minimum d-axis current exceeds the current limit");
            return Err(ConfigError::MinimumCurrentAboveLimit);
        }

        // Torque increases along the MTPA locus
        let start = loci.min_d_current;
        let mtpa: Vec<(f32, f32)> = (0..=SAMPLES)
            .map(|k| {
                let current = start + (loci.current_max - start) * k as f32 / SAMPLES as f32;
                let i = loci.mtpa(current);
                (loci.torque(i), i.d)
            })
            .collect();
        loci.mtpa_table = Lookup::from_points(mtpa);

        // Torque and flux both decrease along the boundary
        let boundary = loci.limit_boundary();
        loci.limit_table =
            Lookup::from_points(boundary.iter().rev().map(|i| (loci.torque(*i), i.d)));
        loci.torque_limit_table = Lookup::from_points(
            boundary
                .iter()
                .rev()
                .map(|i| (loci.flux(*i).magnitude(), loci.torque(*i))),
        );

        log::debug!("Loci tables built, maximum torque: {}", loci.max_torque());
        Ok(loci)
    }

    pub fn is_reluctance(&self) -> bool {
        self.magnet_flux == 0.
    }

    /// Stator flux linkage of the current vector, in rotor coordinates
    pub fn flux(&self, current: Vector) -> Vector {
        Vector::new(
            self.d_inductance * current.d + self.magnet_flux,
            self.q_inductance * current.q,
        )
    }

    /// Electromagnetic torque, Newton meters
    pub fn torque(&self, current: Vector) -> f32 {
        1.5 * self.pole_pairs * self.flux(current).cross(current)
    }

    /// MTPA current vector of the given magnitude
    pub fn mtpa(&self, current: f32) -> Vector {
        if self.is_reluctance() {
            let diagonal = FRAC_1_SQRT_2 * current;
            if diagonal >= self.min_d_current {
                Vector::new(diagonal, diagonal)
            } else {
                let d = self.min_d_current;
                Vector::new(d, sqrtf((current * current - d * d).max(0.)))
            }
        } else {
            let saliency = self.q_inductance - self.d_inductance;
            let d = if saliency == 0. {
                0.
            } else {
                (self.magnet_flux
                    - sqrtf(
                        self.magnet_flux * self.magnet_flux
                            + 8. * saliency * saliency * current * current,
                    ))
                    / (4. * saliency)
            };
            Vector::new(d, sqrtf((current * current - d * d).max(0.)))
        }
    }

    /// MTPV current vector at the given flux linkage magnitude.
    ///
    /// `None` for a permanent magnet machine whose characteristic current
    /// lies beyond the current limit, as it never reaches the locus.
    pub fn mtpv(&self, flux: f32) -> Option<Vector> {
        if self.is_reluctance() {
            let angle = atanf(self.d_inductance / self.q_inductance);
            let direction = Vector::from_angle(angle);
            // Flux magnitude of a unit current along the ray
            let unit_flux = self.flux(direction).magnitude();
            Some(direction * (flux / unit_flux))
        } else if self.magnet_flux / self.d_inductance >= self.current_max {
            None
        } else {
            let a = (self.d_inductance - self.q_inductance)
                / (self.d_inductance * self.q_inductance);
            let b = self.magnet_flux / self.d_inductance;
            // Positive root of 2a x^2 + b x - a flux^2 = 0, x being the d-axis flux
            let flux_d = 2. * a * flux * flux / (b + sqrtf(b * b + 8. * a * a * flux * flux));
            let flux_q = sqrtf((flux * flux - flux_d * flux_d).max(0.));
            Some(Vector::new(
                (flux_d - self.magnet_flux) / self.d_inductance,
                flux_q / self.q_inductance,
            ))
        }
    }

    /// MTPA direct current producing `torque`
    pub fn mtpa_d_current(&self, torque: f32) -> f32 {
        self.mtpa_table.eval(torque)
    }

    /// Direct current on the MTPV / current limit boundary producing `torque`
    pub fn limit_d_current(&self, torque: f32) -> f32 {
        self.limit_table.eval(torque)
    }

    /// Maximum torque with flux linkage at most `flux`, within the current limit
    pub fn torque_limit(&self, flux: f32) -> f32 {
        self.torque_limit_table.eval(flux)
    }

    /// Maximum torque within the current limit
    pub fn max_torque(&self) -> f32 {
        self.torque_limit_table.last().map_or(0., |(_, torque)| torque)
    }

    // Points from the MTPA point at the current limit along the limit circle,
    // then down the MTPV locus towards zero torque where it lies inside
    fn limit_boundary(&self) -> Vec<Vector> {
        let mut points = Vec::with_capacity(2 * SAMPLES + 2);
        let start = self.mtpa(self.current_max).phase();

        let mtpv_corner = self.mtpv_at_current_limit();
        let end = match mtpv_corner {
            Some((_, corner)) => corner.phase(),
            None => PI,
        };
        for k in 0..=SAMPLES {
            let angle = start + (end - start) * k as f32 / SAMPLES as f32;
            points.push(Vector::from_polar(self.current_max, angle));
        }

        if let Some((corner_flux, _)) = mtpv_corner {
            for k in (0..SAMPLES).rev() {
                let flux = corner_flux * k as f32 / SAMPLES as f32;
                if let Some(i) = self.mtpv(flux) {
                    points.push(i);
                }
            }
        }
        points
    }

    // Flux and current where the MTPV locus meets the current limit, by bisection
    fn mtpv_at_current_limit(&self) -> Option<(f32, Vector)> {
        let mut high = self.flux(self.mtpa(self.current_max)).magnitude();
        if self.mtpv(high)?.magnitude() < self.current_max {
            // The MTPA point is already past the locus
            return None;
        }
        let mut low = 0.;
        for _ in 0..48 {
            let mid = 0.5 * (low + high);
            match self.mtpv(mid) {
                Some(i) if i.magnitude() < self.current_max => low = mid,
                _ => high = mid,
            }
        }
        Some((low, self.mtpv(low)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2.2 kW interior permanent magnet machine
    fn ipm() -> LociConfig {
        LociConfig {
            pole_pairs: 3,
            d_inductance: 0.036,
            q_inductance: 0.051,
            magnet_flux: 0.545,
            current_max: 1.5 * 1.414 * 5.,
            min_d_current: None,
        }
    }

    // Same machine with enough current to reach the MTPV locus
    fn ipm_wide() -> LociConfig {
        LociConfig {
            current_max: 20.,
            ..ipm()
        }
    }

    // 6.7 kW synchronous reluctance machine
    fn syrm() -> LociConfig {
        LociConfig {
            pole_pairs: 2,
            d_inductance: 0.28,
            q_inductance: 0.044,
            magnet_flux: 0.,
            current_max: 2. * 1.414 * 15.5,
            min_d_current: Some(0.2 * 1.414 * 15.5),
        }
    }

    fn close(a: f32, b: f32, tolerance: f32) -> bool {
        libm::fabsf(a - b) <= tolerance
    }

    #[test]
    fn reluctance_mtpa_is_diagonal() {
        let loci = OptimalLoci::new(syrm()).unwrap();
        let min_d = 0.2 * 1.414 * 15.5;
        for k in 0..=100 {
            let current = 2. * 1.414 * 15.5 * k as f32 / 100.;
            let i = loci.mtpa(current);
            if FRAC_1_SQRT_2 * current >= min_d {
                assert_eq!(i.d, i.q);
            } else {
                assert_eq!(i.d, min_d);
            }
        }
    }

    #[test]
    fn ipm_mtpa_maximizes_torque() {
        let loci = OptimalLoci::new(ipm()).unwrap();
        let current = 8.;
        let i = loci.mtpa(current);
        assert!(i.d < 0.);
        assert!(close(i.magnitude(), current, 1E-4));
        let best = loci.torque(i);
        for offset in [-0.05, 0.05] {
            let other = Vector::from_polar(current, i.phase() + offset);
            assert!(loci.torque(other) < best);
        }
    }

    #[test]
    fn mtpv_maximizes_torque_per_flux() {
        let loci = OptimalLoci::new(ipm_wide()).unwrap();
        let flux = 0.3;
        let i = loci.mtpv(flux).unwrap();
        assert!(close(loci.flux(i).magnitude(), flux, 1E-4));
        // Neighbouring points of equal flux produce less torque
        let best = loci.torque(i);
        let flux_vector = loci.flux(i);
        for offset in [-0.02, 0.02] {
            let psi = Vector::from_polar(flux, flux_vector.phase() + offset);
            let other = Vector::new((psi.d - 0.545) / 0.036, psi.q / 0.051);
            assert!(loci.torque(other) < best);
        }
        // Zero flux lies at the characteristic current
        let origin = loci.mtpv(0.).unwrap();
        assert!(close(origin.d, -0.545 / 0.036, 1E-3) && close(origin.q, 0., 1E-6));
    }

    #[test]
    fn reluctance_mtpv_is_a_ray() {
        let loci = OptimalLoci::new(syrm()).unwrap();
        let i = loci.mtpv(0.5).unwrap();
        assert!(close(i.phase(), atanf(0.28 / 0.044), 1E-5));
        assert!(close(loci.flux(i).magnitude(), 0.5, 1E-5));
    }

    #[test]
    fn mtpv_needs_characteristic_current_inside_limit() {
        let config = LociConfig {
            current_max: 10.,
            magnet_flux: 0.545,
            d_inductance: 0.036,
            ..ipm()
        };
        assert!(OptimalLoci::new(config).unwrap().mtpv(0.1).is_none());
    }

    #[test]
    fn lookups_are_consistent() {
        let loci = OptimalLoci::new(ipm()).unwrap();
        let max_torque = loci.max_torque();
        let at_limit = loci.torque(loci.mtpa(1.5 * 1.414 * 5.));
        assert!(close(max_torque, at_limit, 1E-3 * at_limit));

        assert_eq!(loci.mtpa_d_current(0.), 0.);
        let i = loci.mtpa(5.);
        assert!(close(loci.mtpa_d_current(loci.torque(i)), i.d, 1E-2));

        // No voltage ceiling at standstill
        assert_eq!(loci.torque_limit(f32::INFINITY), max_torque);
        // Field weakening can only lower the ceiling
        assert!(loci.torque_limit(0.3) < max_torque);
        assert!(loci.torque_limit(0.2) < loci.torque_limit(0.3));

        // The boundary lies left of the MTPA locus
        for torque in [1., 5., 10.] {
            assert!(loci.limit_d_current(torque) < loci.mtpa_d_current(torque));
        }
    }

    #[test]
    fn limit_lookups_follow_mtpv() {
        let loci = OptimalLoci::new(ipm_wide()).unwrap();
        let (corner_flux, corner) = loci.mtpv_at_current_limit().unwrap();
        assert!(close(corner.magnitude(), 20., 1E-3), "{:?}", corner);
        assert!(close(loci.flux(corner).magnitude(), corner_flux, 1E-4));

        for flux in [0.1, 0.2, 0.5 * corner_flux, 0.9 * corner_flux] {
            let i = loci.mtpv(flux).unwrap();
            assert!(i.magnitude() < 20.);
            let torque = loci.torque(i);
            assert!(
                close(loci.torque_limit(flux), torque, 1E-3 * torque),
                "{} {}",
                loci.torque_limit(flux),
                torque
            );
            assert!(close(loci.limit_d_current(torque), i.d, 1E-2));
        }

        // Past the corner the current circle limits the torque
        let beyond = loci.flux(corner).magnitude() * 1.1;
        assert!(loci.torque_limit(beyond) > loci.torque(corner));
        assert!(loci.torque_limit(beyond) <= loci.max_torque());
    }

    #[test]
    fn rejects_reluctance_without_minimum_current() {
        let config = LociConfig {
            min_d_current: None,
            ..syrm()
        };
        assert_eq!(
            OptimalLoci::new(config).unwrap_err(),
            ConfigError::MissingMinimumCurrent
        );
    }
}
