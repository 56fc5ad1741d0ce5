#![no_std]
extern crate alloc;

pub mod current;
pub mod datalog;
pub mod error;
pub mod loci;
pub mod modulation;
pub mod observer;
pub mod reference;
pub mod regulator;
pub mod speed;
mod util;

pub use error::ConfigError;
pub use util::{to_phases, to_vector, Vector};
