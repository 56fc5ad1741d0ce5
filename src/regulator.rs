//! Implements speed regulation by vector control, with a rotor sensor or
//! sensorless through a flux observer.
use core::f32::consts::PI;

use crate::current::{CurrentConfig, CurrentController};
use crate::datalog::{Datalog, SampleRecord};
use crate::error::{self, ConfigError};
use crate::loci::LociConfig;
use crate::modulation::{PhaseDuties, Pwm};
use crate::observer::{Observer, ObserverConfig};
use crate::reference::{CurrentReference, ReferenceConfig};
use crate::speed::{SpeedConfig, SpeedController};
use crate::util::{to_vector, wrap_angle, Vector};

#[derive(Debug, Clone, Copy)]
pub struct MotorProperties {
    /// Kilogram meters-squared
    pub inertia: f32,
    pub pole_pairs: usize,
    /// Ohms
    pub phase_resistance: f32,
    /// Henries
    pub d_inductance: f32,
    /// Henries
    pub q_inductance: f32,
    /// Permanent magnet flux linkage, Weber-turns.
    /// Zero for a synchronous reluctance machine.
    pub magnet_flux: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// Amps, peak value
    pub current_max: f32,
    /// Newton meters
    pub torque_max: f32,
    /// Fraction of the maximum phase voltage `u_dc / sqrt(3)` that may be used
    pub voltage_margin: f32,
    /// Amps. Keeps a reluctance machine magnetized at no load, required
    /// (and only read) when the machine has no magnets.
    pub min_d_current: Option<f32>,
}

impl Limits {
    pub fn new(current_max: f32, torque_max: f32) -> Self {
        Limits {
            current_max,
            torque_max,
            voltage_margin: 0.9,
            min_d_current: None,
        }
    }
}

/// Where the rotor angle and speed come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sensing {
    /// Measured speed and position are given with every sample
    Sensored,
    /// Estimated by the flux observer
    Sensorless,
}

/// Amps
#[derive(Debug, Clone, Copy)]
pub struct PhaseCurrents {
    pub u: f32,
    pub v: f32,
    pub w: f32,
}

impl Default for PhaseCurrents {
    fn default() -> Self {
        PhaseCurrents {
            u: 0.,
            v: 0.,
            w: 0.,
        }
    }
}

impl From<PhaseCurrents> for Vector {
    fn from(currents: PhaseCurrents) -> Self {
        to_vector(currents.u, currents.v, currents.w)
    }
}

/// Measurements at one sampling instant
#[derive(Debug, Clone, Copy)]
pub struct State {
    pub currents: PhaseCurrents,
    /// Volts
    pub dc_voltage: f32,
    /// Mechanical radians per second, only read when sensored
    pub velocity: Option<f32>,
    /// Mechanical radians, only read when sensored
    pub position: Option<f32>,
}

#[derive(Debug, Clone)]
enum Tracking {
    Sensored,
    Sensorless(Observer),
}

#[derive(Debug, Clone)]
pub struct Regulator {
    pole_pairs: f32,
    sampling_period: f32,
    tracking: Tracking,
    speed_ctrl: SpeedController,
    current_ref: CurrentReference,
    current_ctrl: CurrentController,
    pwm: Pwm,
    samples: u64,
    datalog: Datalog,
}

impl Regulator {
    /// Regulates one sample, returns the duty ratios to apply next and the
    /// time until the following call.
    ///
    /// `speed_ref` is in electrical radians per second.
    pub fn update(&mut self, state: State, speed_ref: f32) -> (PhaseDuties, f32) {
        // Applied during the sampling period that ends now
        let voltage = self.pwm.realized_voltage();

        let (flux, speed, angle) = match &self.tracking {
            Tracking::Sensorless(observer) => {
                (Some(observer.flux()), observer.speed(), observer.angle())
            }
            Tracking::Sensored => {
                if state.velocity.is_none() || state.position.is_none() {
                    log::warn!("Sensored regulation without rotor measurements");
                }
                let velocity = state.velocity.unwrap_or(0.);
                let position = state.position.unwrap_or(0.);
                (
                    None,
                    self.pole_pairs * velocity,
                    wrap_angle(self.pole_pairs * position),
                )
            }
        };
        // Stator frame to control frame
        let current = Vector::from(state.currents).rotated(-angle);
        log::trace!("Regulating for: {:?}, to: {}", state, speed_ref);

        let (torque_ref, load_torque) = self
            .speed_ctrl
            .output(speed_ref / self.pole_pairs, speed / self.pole_pairs);
        let (current_reference, torque) =
            self.current_ref.output(torque_ref, speed, state.dc_voltage);
        let (voltage_ref, flux_error) = self.current_ctrl.output(current_reference, current);
        let (duties, limited) = self.pwm.output(voltage_ref, state.dc_voltage, angle, speed);

        // Every update only reads values computed above
        if let Tracking::Sensorless(observer) = &mut self.tracking {
            observer.update(voltage, current);
        }
        self.speed_ctrl.update(torque, load_torque);
        self.current_ref.update(torque, voltage_ref, state.dc_voltage);
        self.current_ctrl.update(flux_error, voltage_ref, limited, speed);
        self.pwm.update(limited);

        self.datalog.push(SampleRecord {
            time: self.time(),
            current_reference,
            current,
            realized_voltage: voltage,
            flux,
            speed_reference: speed_ref,
            speed,
            angle,
            dc_voltage: state.dc_voltage,
            torque,
            sampling_period: self.sampling_period,
        });
        self.samples += 1;

        log::debug!("Output is: {:?}", duties);
        (duties, self.sampling_period)
    }

    pub fn sensing(&self) -> Sensing {
        match self.tracking {
            Tracking::Sensored => Sensing::Sensored,
            Tracking::Sensorless(_) => Sensing::Sensorless,
        }
    }

    /// The flux observer, when running sensorless
    pub fn observer(&self) -> Option<&Observer> {
        match &self.tracking {
            Tracking::Sensored => None,
            Tracking::Sensorless(observer) => Some(observer),
        }
    }

    pub fn current_reference(&self) -> &CurrentReference {
        &self.current_ref
    }

    pub fn datalog(&self) -> &Datalog {
        &self.datalog
    }

    /// Seconds since the regulator was realized
    pub fn time(&self) -> f32 {
        self.samples as f32 * self.sampling_period
    }

    pub fn sampling_period(&self) -> f32 {
        self.sampling_period
    }
}

#[derive(Debug, Clone)]
pub struct RegulatorConfig {
    motor: MotorProperties,
    limits: Limits,
    sensing: Sensing,
    sampling_period: f32,
    current_bandwidth: f32,
    speed_bandwidth: f32,
    observer_bandwidth: f32,
    field_weakening_gain: f32,
}

impl RegulatorConfig {
    pub fn new(motor: MotorProperties, limits: Limits) -> Self {
        // Field weakening bandwidth at the nominal electrical speed
        let field_weakening_bandwidth = 2. * PI * 20.;
        let nominal_speed = 2. * PI * 50.;
        RegulatorConfig {
            motor,
            limits,
            sensing: Sensing::Sensorless,
            sampling_period: 250E-6,
            current_bandwidth: 2. * PI * 200.,
            speed_bandwidth: 2. * PI * 4.,
            observer_bandwidth: 2. * PI * 40.,
            field_weakening_gain: field_weakening_bandwidth
                / (nominal_speed * motor.d_inductance),
        }
    }
    /// Realize a `Regulator` from the configuration
    pub fn realize(&self) -> Result<Regulator, ConfigError> {
        let motor = &self.motor;
        let limits = &self.limits;
        if motor.pole_pairs == 0 {
            log::error!("Invalid pole pair count");
            return Err(ConfigError::InvalidPolePairs);
        }
        error::non_negative("phase resistance", motor.phase_resistance)?;

        let tracking = match self.sensing {
            Sensing::Sensored => Tracking::Sensored,
            Sensing::Sensorless => Tracking::Sensorless(Observer::new(ObserverConfig {
                sampling_period: self.sampling_period,
                phase_resistance: motor.phase_resistance,
                d_inductance: motor.d_inductance,
                q_inductance: motor.q_inductance,
                magnet_flux: motor.magnet_flux,
                bandwidth: self.observer_bandwidth,
            })?),
        };
        let current_ref = CurrentReference::new(ReferenceConfig {
            sampling_period: self.sampling_period,
            loci: LociConfig {
                pole_pairs: motor.pole_pairs,
                d_inductance: motor.d_inductance,
                q_inductance: motor.q_inductance,
                magnet_flux: motor.magnet_flux,
                current_max: limits.current_max,
                min_d_current: limits.min_d_current,
            },
            voltage_margin: limits.voltage_margin,
            field_weakening_gain: self.field_weakening_gain,
        })?;
        let regulator = Regulator {
            pole_pairs: motor.pole_pairs as f32,
            sampling_period: error::positive("sampling period", self.sampling_period)?,
            tracking,
            speed_ctrl: SpeedController::new(SpeedConfig {
                sampling_period: self.sampling_period,
                bandwidth: self.speed_bandwidth,
                inertia: motor.inertia,
                torque_max: limits.torque_max,
            })?,
            current_ref,
            current_ctrl: CurrentController::new(CurrentConfig {
                sampling_period: self.sampling_period,
                d_inductance: motor.d_inductance,
                q_inductance: motor.q_inductance,
                bandwidth: self.current_bandwidth,
            })?,
            pwm: Pwm::new(self.sampling_period)?,
            samples: 0,
            datalog: Datalog::new(),
        };
        log::info!(
            "Realized {:?} regulator, maximum torque within current limit: {}",
            self.sensing,
            regulator.current_ref.loci().max_torque()
        );
        Ok(regulator)
    }
    pub fn set_sensing(&mut self, sensing: Sensing) -> &mut Self {
        self.sensing = sensing;
        self
    }
    pub fn set_sampling_period(&mut self, sampling_period: f32) -> &mut Self {
        self.sampling_period = sampling_period;
        self
    }
    pub fn set_current_bandwidth(&mut self, current_bandwidth: f32) -> &mut Self {
        self.current_bandwidth = current_bandwidth;
        self
    }
    pub fn set_speed_bandwidth(&mut self, speed_bandwidth: f32) -> &mut Self {
        self.speed_bandwidth = speed_bandwidth;
        self
    }
    pub fn set_observer_bandwidth(&mut self, observer_bandwidth: f32) -> &mut Self {
        self.observer_bandwidth = observer_bandwidth;
        self
    }
    pub fn set_field_weakening_gain(&mut self, field_weakening_gain: f32) -> &mut Self {
        self.field_weakening_gain = field_weakening_gain;
        self
    }
}
