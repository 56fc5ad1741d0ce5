//! Three-phase PWM with computational delay compensation.
use crate::error::{self, ConfigError};
use crate::util::{to_phases, to_vector, Vector};

/// Duty cycles per phase, [0..1]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PhaseDuties {
    pub u: f32,
    pub v: f32,
    pub w: f32,
}

impl PhaseDuties {
    pub fn new(u: f32, v: f32, w: f32) -> Self {
        PhaseDuties { u, v, w }
    }
}

impl From<&PhaseDuties> for Vector {
    fn from(duties: &PhaseDuties) -> Self {
        to_vector(duties.u, duties.v, duties.w)
    }
}

/// Symmetrical suboscillation, equivalent to space vector modulation.
///
/// `u_s_ref` is in stator coordinates. References beyond the hexagon are
/// shrunk towards the origin, which keeps their phase angle (minimum phase
/// error overmodulation).
pub fn duty_ratios(u_s_ref: Vector, dc_voltage: f32) -> PhaseDuties {
    let [a, b, c] = to_phases(u_s_ref);

    // Add the zero-sequence voltage
    let zero_sequence = 0.5 * (a.max(b).max(c) + a.min(b).min(c));
    let (mut a, mut b, mut c) = (a - zero_sequence, b - zero_sequence, c - zero_sequence);

    let modulation_index = 2. / dc_voltage * a.max(b).max(c);
    if modulation_index > 1. {
        log::debug!("Overmodulation, index: {}", modulation_index);
        a /= modulation_index;
        b /= modulation_index;
        c /= modulation_index;
    }

    PhaseDuties {
        u: 0.5 + a / dc_voltage,
        v: 0.5 + b / dc_voltage,
        w: 0.5 + c / dc_voltage,
    }
}

#[derive(Debug, Clone)]
pub struct Pwm {
    sampling_period: f32,
    // Average voltage over the previous sampling period
    realized_voltage: Vector,
    previous_limited: Vector,
}

impl Pwm {
    pub fn new(sampling_period: f32) -> Result<Self, ConfigError> {
        Ok(Pwm {
            sampling_period: error::positive("sampling period", sampling_period)?,
            realized_voltage: Vector::ZERO,
            previous_limited: Vector::ZERO,
        })
    }

    /// Duty ratios and the realizable voltage reference.
    ///
    /// `voltage_ref` is given in the frame at angle `theta` that rotates at `w`
    /// (electrical rad/s), the returned voltage is in the same frame.
    pub fn output(
        &self,
        voltage_ref: Vector,
        dc_voltage: f32,
        theta: f32,
        w: f32,
    ) -> (PhaseDuties, Vector) {
        // One sample of computational delay plus half a sample of hold
        let theta_comp = theta + 1.5 * self.sampling_period * w;

        let u_s_ref = voltage_ref.rotated(theta_comp);
        let duties = duty_ratios(u_s_ref, dc_voltage);

        let u_s_lim = Vector::from(&duties) * dc_voltage;
        let limited = u_s_lim.rotated(-theta_comp);
        log::trace!("Duties: {:?}, limited voltage: {:?}", duties, limited);

        (duties, limited)
    }

    pub fn update(&mut self, limited: Vector) {
        self.realized_voltage = 0.5 * (self.previous_limited + limited);
        self.previous_limited = limited;
    }

    /// Estimate of the voltage applied during the previous sampling period
    pub fn realized_voltage(&self) -> Vector {
        self.realized_voltage
    }
}
