//! Non-fatal conditions reported back to the caller.

use std::fmt;

use log::warn;

use crate::profile::Field;

/// Something noteworthy that did not stop processing.
#[derive(Debug, Clone, PartialEq)]
pub enum Warning {
    /// An optional field was omitted and filled with its default
    DefaultedField {
        /// The defaulted field
        field: Field,
        /// The value every cell was set to
        value: f64,
    },
    /// No timestamp was given, so the current time was used
    TimestampDefaulted {
        /// Unix time that was used
        unixtime: i64,
    },
    /// The profile has more layers than the engine can handle
    TooManyLayers {
        /// Number of layers in the tallest column
        max_nlyrs: usize,
    },
    /// An engine setting that is not part of the known configuration
    UnknownSetting {
        /// Settings group
        group: String,
        /// Key inside the group
        key: String,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::DefaultedField { field, value } => {
                write!(f, "{field} set to {value} {}", field.units())
            }
            Warning::TimestampDefaulted { unixtime } => {
                write!(f, "timestamp set to now ({unixtime})")
            }
            Warning::TooManyLayers { max_nlyrs } => write!(
                f,
                "too many layers for the engine (max: {}): {max_nlyrs}",
                crate::profile::MAX_LAYERS
            ),
            Warning::UnknownSetting { group, key } => {
                write!(f, "unknown engine setting {group}.{key}")
            }
        }
    }
}

/// Ordered list of warnings. Each warning is also logged when recorded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Warnings(Vec<Warning>);

impl Warnings {
    /// Record a warning.
    pub fn push(&mut self, warning: Warning) {
        warn!("{warning}");
        self.0.push(warning);
    }

    /// All warnings recorded so far, oldest first.
    pub fn as_slice(&self) -> &[Warning] {
        &self.0
    }

    /// Remove and return everything recorded so far.
    pub fn drain(&mut self) -> Vec<Warning> {
        std::mem::take(&mut self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::Hydrometeor;

    #[test]
    fn defaulted_fields_name_their_units() {
        let lat = Warning::DefaultedField {
            field: Field::Lat,
            value: 50.938056,
        };
        assert_eq!(lat.to_string(), "lat set to 50.938056 deg.dec");

        let rain = Warning::DefaultedField {
            field: Field::MixingRatio(Hydrometeor::Rain),
            value: 0.,
        };
        assert_eq!(rain.to_string(), "rwc_q set to 0 kg/kg");
    }

    #[test]
    fn recorded_warnings_can_be_drained() {
        let mut warnings = Warnings::default();
        warnings.push(Warning::TooManyLayers { max_nlyrs: 250 });
        assert_eq!(warnings.as_slice().len(), 1);
        assert_eq!(warnings.drain(), vec![Warning::TooManyLayers { max_nlyrs: 250 }]);
        assert!(warnings.as_slice().is_empty());
    }
}
