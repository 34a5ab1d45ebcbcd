//! Names, shapes and defaults of every profile field.

use std::fmt;

use super::MISSING;
use crate::error::ProfileError;

/// Hydrometeor species carried by the profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Hydrometeor {
    /// Cloud liquid water
    Cloud,
    /// Cloud ice
    Ice,
    /// Rain
    Rain,
    /// Snow
    Snow,
    /// Graupel
    Graupel,
    /// Hail
    Hail,
}

impl Hydrometeor {
    /// Every species, in the order the engine expects them.
    pub const ALL: [Hydrometeor; 6] = [
        Hydrometeor::Cloud,
        Hydrometeor::Ice,
        Hydrometeor::Rain,
        Hydrometeor::Snow,
        Hydrometeor::Graupel,
        Hydrometeor::Hail,
    ];

    /// Single letter used in the profile field names (`cwc_q`, `iwp`, ...).
    pub fn prefix(self) -> char {
        match self {
            Hydrometeor::Cloud => 'c',
            Hydrometeor::Ice => 'i',
            Hydrometeor::Rain => 'r',
            Hydrometeor::Snow => 's',
            Hydrometeor::Graupel => 'g',
            Hydrometeor::Hail => 'h',
        }
    }

    fn from_prefix(c: char) -> Option<Self> {
        Self::ALL.into_iter().find(|h| h.prefix() == c)
    }
}

/// Which canonical shape a field has.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeClass {
    /// (ngridx, ngridy)
    Column,
    /// (ngridx, ngridy, max_nlyrs)
    Layer,
    /// (ngridx, ngridy, max_nlyrs + 1)
    Level,
}

/// What happens to a field the caller didn't supply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldDefault {
    /// Must be given (or derived from another mandatory input)
    Required,
    /// Filled with this value everywhere, with a warning
    Value(f64),
    /// Filled with the current time, with a warning
    Now,
    /// Left out of the profile
    Absent,
}

/// A recognised profile field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    /// Unix time of the profile, s
    Timestamp,
    /// Latitude, degrees
    Lat,
    /// Longitude, degrees
    Lon,
    /// Land fraction
    Lfrac,
    /// 10 m zonal wind, m/s
    Wind10u,
    /// 10 m meridional wind, m/s
    Wind10v,
    /// Integrated water vapor, kg/m²
    Iwv,
    /// Integrated hydrometeor water path, kg/m²
    WaterPath(Hydrometeor),
    /// Height of the lowest cloud base, m
    CloudBase,
    /// Height of the highest cloud top, m
    CloudTop,
    /// Level height, m
    HgtLev,
    /// Level temperature, K
    TempLev,
    /// Level pressure, Pa
    PressLev,
    /// Level relative humidity, 0-1
    RelhumLev,
    /// Layer specific humidity, kg/kg
    Q,
    /// Layer hydrometeor mixing ratio, kg/kg
    MixingRatio(Hydrometeor),
    /// Layer hydrometeor number concentration, 1/kg
    Number(Hydrometeor),
}

impl Field {
    /// All recognised fields.
    pub fn all() -> Vec<Field> {
        let mut fields = vec![
            Field::Timestamp,
            Field::Lat,
            Field::Lon,
            Field::Lfrac,
            Field::Wind10u,
            Field::Wind10v,
            Field::Iwv,
        ];
        fields.extend(Hydrometeor::ALL.map(Field::WaterPath));
        fields.extend([
            Field::CloudBase,
            Field::CloudTop,
            Field::HgtLev,
            Field::TempLev,
            Field::PressLev,
            Field::RelhumLev,
            Field::Q,
        ]);
        fields.extend(Hydrometeor::ALL.map(Field::MixingRatio));
        fields.extend(Hydrometeor::ALL.map(Field::Number));
        fields
    }

    /// Parse a field name such as `press_lev` or `rwc_q`.
    pub fn from_name(name: &str) -> Result<Field, ProfileError> {
        let field = match name {
            "timestamp" => Field::Timestamp,
            "lat" => Field::Lat,
            "lon" => Field::Lon,
            "lfrac" => Field::Lfrac,
            "wind10u" => Field::Wind10u,
            "wind10v" => Field::Wind10v,
            "iwv" => Field::Iwv,
            "cloud_base" => Field::CloudBase,
            "cloud_top" => Field::CloudTop,
            "hgt_lev" => Field::HgtLev,
            "temp_lev" => Field::TempLev,
            "press_lev" => Field::PressLev,
            "relhum_lev" => Field::RelhumLev,
            "q" => Field::Q,
            _ => {
                return Self::parse_species(name)
                    .ok_or_else(|| ProfileError::UnknownField(name.into()))
            }
        };
        Ok(field)
    }

    fn parse_species(name: &str) -> Option<Field> {
        let mut chars = name.chars();
        let species = Hydrometeor::from_prefix(chars.next()?)?;
        match chars.as_str() {
            "wp" => Some(Field::WaterPath(species)),
            "wc_q" => Some(Field::MixingRatio(species)),
            "wc_n" => Some(Field::Number(species)),
            _ => None,
        }
    }

    /// The field's canonical shape.
    pub fn shape_class(self) -> ShapeClass {
        match self {
            Field::HgtLev | Field::TempLev | Field::PressLev | Field::RelhumLev => {
                ShapeClass::Level
            }
            Field::Q | Field::MixingRatio(_) | Field::Number(_) => ShapeClass::Layer,
            _ => ShapeClass::Column,
        }
    }

    /// What the profile builder does when the field is omitted.
    pub fn default_policy(self) -> FieldDefault {
        match self {
            Field::HgtLev | Field::TempLev | Field::PressLev | Field::RelhumLev => {
                FieldDefault::Required
            }
            Field::Timestamp => FieldDefault::Now,
            Field::Lat => FieldDefault::Value(50.938056),
            Field::Lon => FieldDefault::Value(6.956944),
            Field::Lfrac => FieldDefault::Value(1.),
            Field::Wind10u | Field::Wind10v => FieldDefault::Value(0.),
            Field::MixingRatio(_) => FieldDefault::Value(0.),
            Field::Number(_) => FieldDefault::Value(MISSING),
            Field::Iwv | Field::WaterPath(_) | Field::CloudBase | Field::CloudTop | Field::Q => {
                FieldDefault::Absent
            }
        }
    }

    /// Physical units.
    pub fn units(self) -> &'static str {
        match self {
            Field::Timestamp => "seconds since 1970-01-01 00:00",
            Field::Lat | Field::Lon => "deg.dec",
            Field::Lfrac | Field::RelhumLev => "1",
            Field::Wind10u | Field::Wind10v => "m/s",
            Field::Iwv | Field::WaterPath(_) => "kg/m^2",
            Field::CloudBase | Field::CloudTop | Field::HgtLev => "m",
            Field::TempLev => "K",
            Field::PressLev => "Pa",
            Field::Q | Field::MixingRatio(_) => "kg/kg",
            Field::Number(_) => "#/kg",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Timestamp => f.write_str("timestamp"),
            Field::Lat => f.write_str("lat"),
            Field::Lon => f.write_str("lon"),
            Field::Lfrac => f.write_str("lfrac"),
            Field::Wind10u => f.write_str("wind10u"),
            Field::Wind10v => f.write_str("wind10v"),
            Field::Iwv => f.write_str("iwv"),
            Field::WaterPath(h) => write!(f, "{}wp", h.prefix()),
            Field::CloudBase => f.write_str("cloud_base"),
            Field::CloudTop => f.write_str("cloud_top"),
            Field::HgtLev => f.write_str("hgt_lev"),
            Field::TempLev => f.write_str("temp_lev"),
            Field::PressLev => f.write_str("press_lev"),
            Field::RelhumLev => f.write_str("relhum_lev"),
            Field::Q => f.write_str("q"),
            Field::MixingRatio(h) => write!(f, "{}wc_q", h.prefix()),
            Field::Number(h) => write!(f, "{}wc_n", h.prefix()),
        }
    }
}
