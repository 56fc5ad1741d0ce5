//! Per-sample telemetry of the regulator.
use alloc::vec::Vec;

use crate::util::Vector;

/// Signals of one sampling instant, quantities in control coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleRecord {
    /// Seconds since the regulator was realized
    pub time: f32,
    pub current_reference: Vector,
    /// Measured current, rotated into the control frame
    pub current: Vector,
    /// Voltage realized over the previous sampling period
    pub realized_voltage: Vector,
    /// `None` when the regulator runs with a rotor sensor
    pub flux: Option<Vector>,
    /// Electrical radians per second
    pub speed_reference: f32,
    /// Electrical radians per second, measured or estimated
    pub speed: f32,
    /// Electrical radians, in [0..2PI)
    pub angle: f32,
    pub dc_voltage: f32,
    /// Newton meters, the torque the current reference produces
    pub torque: f32,
    pub sampling_period: f32,
}

/// Append-only record of every regulated sample
#[derive(Debug, Clone, Default)]
pub struct Datalog {
    records: Vec<SampleRecord>,
}

impl Datalog {
    pub fn new() -> Self {
        Datalog::default()
    }

    pub(crate) fn push(&mut self, record: SampleRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[SampleRecord] {
        &self.records
    }

    pub fn last(&self) -> Option<&SampleRecord> {
        self.records.last()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
