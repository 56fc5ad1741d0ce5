use core::fmt;

/// Rejected controller configuration.
///
/// Only construction can fail, a realized controller never returns errors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigError {
    /// A parameter that must be strictly positive was not
    NonPositive { name: &'static str },
    /// A parameter was NaN or infinite
    NonFinite { name: &'static str },
    /// A negative value where only zero or positive values are meaningful
    Negative { name: &'static str },
    InvalidPolePairs,
    /// Reluctance machines (no magnet flux) need a minimum direct current
    /// to magnetize at zero torque
    MissingMinimumCurrent,
    /// The minimum direct current leaves no room within the current limit
    MinimumCurrentAboveLimit,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NonPositive { name } => write!(f, "{} must be positive", name),
            ConfigError::NonFinite { name } => write!(f, "{} must be finite", name),
            ConfigError::Negative { name } => write!(f, "{} must not be negative", name),
            ConfigError::InvalidPolePairs => write!(f, "pole pair count must be at least one"),
            ConfigError::MissingMinimumCurrent => {
                write!(f, "a reluctance machine needs a minimum direct current")
            }
            ConfigError::MinimumCurrentAboveLimit => {
                write!(f, "minimum direct current must be below the current limit")
            }
        }
    }
}

/// Checks that `value` is finite and strictly positive
pub(crate) fn positive(name: &'static str, value: f32) -> Result<f32, ConfigError> {
    if !value.is_finite() {
        log::error!("Invalid {}: {}", name, value);
        Err(ConfigError::NonFinite { name })
    } else if !(value > 0.) {
        log::error!("Invalid {}: {}", name, value);
        Err(ConfigError::NonPositive { name })
    } else {
        Ok(value)
    }
}

/// Checks that `value` is finite and not negative
pub(crate) fn non_negative(name: &'static str, value: f32) -> Result<f32, ConfigError> {
    if !value.is_finite() {
        log::error!("Invalid {}: {}", name, value);
        Err(ConfigError::NonFinite { name })
    } else if value < 0. {
        log::error!("Invalid {}: {}", name, value);
        Err(ConfigError::Negative { name })
    } else {
        Ok(value)
    }
}
