//! Named engine configuration.
//!
//! The engine reads its options as groups of keyed values. Writing them to
//! (or reading them from) the engine's own file format is left to adapters;
//! this only keeps track of the values and their defaults.

use std::fmt;

use crate::warning::{Warning, Warnings};

/// A single configuration value.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    /// Logical flag
    Bool(bool),
    /// Integer
    Int(i64),
    /// Real number
    Float(f64),
    /// Text
    Text(String),
}

impl From<bool> for SettingValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for SettingValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for SettingValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for SettingValue {
    fn from(value: &str) -> Self {
        Self::Text(value.into())
    }
}

impl From<String> for SettingValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Bool(b) => write!(f, "{b}"),
            SettingValue::Int(i) => write!(f, "{i}"),
            SettingValue::Float(x) => write!(f, "{x}"),
            SettingValue::Text(s) => write!(f, "{s:?}"),
        }
    }
}

/// A named group of settings, in the order the engine expects them.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingGroup {
    /// Group name
    pub name: String,
    /// Keys and their values
    pub entries: Vec<(String, SettingValue)>,
}

/// The engine configuration, starting from the engine's defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    groups: Vec<SettingGroup>,
    warnings: Warnings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            groups: default_groups(),
            warnings: Warnings::default(),
        }
    }
}

impl EngineSettings {
    /// All groups, in order.
    pub fn groups(&self) -> &[SettingGroup] {
        &self.groups
    }

    /// Look up a value.
    pub fn get(&self, group: &str, key: &str) -> Option<&SettingValue> {
        self.groups
            .iter()
            .find(|g| g.name == group)?
            .entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Set a value. A group or key the engine doesn't know about is still
    /// stored, but an [`Warning::UnknownSetting`] is recorded.
    pub fn set(&mut self, group: &str, key: &str, value: impl Into<SettingValue>) -> &mut Self {
        let value = value.into();
        if !is_known(group, key) {
            self.warnings.push(Warning::UnknownSetting {
                group: group.into(),
                key: key.into(),
            });
        }

        let group_index = match self.groups.iter().position(|g| g.name == group) {
            Some(index) => index,
            None => {
                self.groups.push(SettingGroup {
                    name: group.into(),
                    entries: Vec::new(),
                });
                self.groups.len() - 1
            }
        };
        let entries = &mut self.groups[group_index].entries;
        match entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value,
            None => entries.push((key.into(), value)),
        }
        self
    }

    /// Restore the engine default for a key. Returns `false` if the key has
    /// no default.
    pub fn reset(&mut self, group: &str, key: &str) -> bool {
        let default = default_groups()
            .into_iter()
            .find(|g| g.name == group)
            .and_then(|g| g.entries.into_iter().find(|(k, _)| k == key));
        match default {
            Some((key, value)) => {
                self.set(group, &key, value);
                true
            }
            None => false,
        }
    }

    /// Warnings recorded while changing settings.
    pub fn warnings(&self) -> &[Warning] {
        self.warnings.as_slice()
    }
}

fn is_known(group: &str, key: &str) -> bool {
    DEFAULTS
        .iter()
        .any(|(g, entries)| *g == group && entries.iter().any(|(k, _)| *k == key))
}

/// Compile-time form of a default value.
enum Preset {
    B(bool),
    I(i64),
    F(f64),
    T(&'static str),
}

use Preset::{B, F, I, T};

const DEFAULTS: &[(&str, &[(&str, Preset)])] = &[
    ("verbose_mode", &[("verbose", I(0))]),
    (
        "inoutput_mode",
        &[
            ("dump_to_file", B(false)),
            ("tmp_path", T("/tmp/")),
            ("data_path", T("data/")),
            ("crm_case", T("")),
            ("crm_data", T("")),
            ("crm_data2", T("")),
            ("crm_constants", T("")),
            ("jacobian_mode", B(false)),
        ],
    ),
    (
        "output",
        &[
            ("obs_height", F(833000.)),
            ("units", T("T")),
            ("outpol", T("VH")),
            ("creator", T("rt_profile")),
            ("zeSplitUp", B(true)),
            ("activeLogScale", B(true)),
        ],
    ),
    (
        "run_mode",
        &[
            ("active", B(true)),
            ("passive", B(true)),
            ("rt_mode", T("rt4")),
        ],
    ),
    (
        "surface_params",
        &[
            ("ground_type", T("S")),
            ("salinity", F(33.)),
            ("emissivity", F(0.6)),
        ],
    ),
    (
        "gas_abs_mod",
        &[("lgas_extinction", B(true)), ("gas_mod", T("R98"))],
    ),
    (
        "hyd_opts",
        &[("lhyd_extinction", B(true)), ("lphase_flag", B(true))],
    ),
    ("cloud_params", &[("SD_cloud", T("C"))]),
    ("ice_params", &[("SD_ice", T("C")), ("EM_ice", T("mieic"))]),
    (
        "rain_params",
        &[
            ("SD_rain", T("C")),
            ("N_0rainD", F(8.)),
            ("use_rain_db", B(false)),
        ],
    ),
    (
        "snow_params",
        &[
            ("SD_snow", T("C")),
            ("use_snow_db", B(false)),
            ("as_ratio", F(0.5)),
            ("N_0snowDsnow", F(7.628)),
            ("EM_snow", T("densi")),
            ("snow_density", F(200.)),
            ("SP", F(0.2)),
            ("isnow_n0", I(1)),
            ("liu_type", I(8)),
        ],
    ),
    (
        "graupel_params",
        &[
            ("SD_grau", T("C")),
            ("N_0grauDgrau", F(4.)),
            ("EM_grau", T("densi")),
            ("graupel_density", F(400.)),
        ],
    ),
    (
        "hail_params",
        &[
            ("SD_hail", T("C")),
            ("N_0hailDhail", F(4.)),
            ("EM_hail", T("densi")),
            ("hail_density", F(917.)),
        ],
    ),
    (
        "moments",
        &[("n_moments", I(1)), ("moments_file", T("snowCRYSTAL"))],
    ),
];

fn default_groups() -> Vec<SettingGroup> {
    DEFAULTS
        .iter()
        .map(|(name, entries)| SettingGroup {
            name: (*name).into(),
            entries: entries
                .iter()
                .map(|(key, value)| {
                    let value = match value {
                        B(b) => SettingValue::Bool(*b),
                        I(i) => SettingValue::Int(*i),
                        F(x) => SettingValue::Float(*x),
                        T(s) => SettingValue::Text((*s).into()),
                    };
                    ((*key).into(), value)
                })
                .collect(),
        })
        .collect()
}
