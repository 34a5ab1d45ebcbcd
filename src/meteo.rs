//! Meteorological conversions used by the derivations.
//!
//! Everything here is in SI units: temperatures in K, pressures in Pa, humidity
//! ratios in kg/kg. None of these functions know about the missing-value
//! sentinel, so callers must filter it out first.

#![allow(clippy::excessive_precision)]

/// Ideal gas constant (J/mol/K)
const R: f64 = 8.3144598;
/// Mean molar mass of dry air (kg/mol)
const M_DRY: f64 = 28.9644e-3;
/// Mean molar mass of water (kg/mol)
const M_H2O: f64 = 18.01528e-3;
/// Specific gas constant for dry air (J/kg/K)
pub const R_DRY: f64 = R / M_DRY;
/// Specific gas constant for water vapor (J/kg/K)
pub const R_VAPOR: f64 = R / M_H2O;
/// Coefficient for ratio between molar masses
const EPSILON: f64 = M_H2O / M_DRY;

/// Gravitational acceleration (m/s²)
const G: f64 = 9.80665;
/// Specific heat of dry air at constant pressure (J/kg/K)
const CP: f64 = 1005.7;
/// Latent heat of vaporization (J/kg)
const L_V: f64 = 2.501e6;

/// The Buck equation.
///
/// Convert `temp`, the temperature in K, into water vapor saturation pressure
/// over liquid water in Pa.
///
/// [1]: https://en.wikipedia.org/wiki/Arden_Buck_equation
pub fn saturation_vapor_pressure(temp: f64) -> f64 {
    // Temperature in degrees Celsius
    let temp_c = temp - 273.15;
    611.21 * f64::exp((18.678 - temp_c / 234.5) * (temp_c / (257.14 + temp_c)))
}

/// Convert relative humidity (0-1) to specific humidity.
pub fn rh_to_q(rh: f64, temp: f64, press: f64) -> f64 {
    let e = rh * saturation_vapor_pressure(temp);
    EPSILON * e / (press - (1. - EPSILON) * e)
}

/// Convert specific humidity to relative humidity (0-1). This is the inverse
/// of [`rh_to_q`].
pub fn q_to_rh(q: f64, temp: f64, press: f64) -> f64 {
    let e = press * q / (EPSILON + (1. - EPSILON) * q);
    e / saturation_vapor_pressure(temp)
}

/// Density of moist air in kg/m³.
///
/// `q` is the specific humidity, `q_hydrometeors` the summed mixing ratio of
/// all condensed species. Condensate adds mass without adding pressure, which
/// is why it is subtracted in the virtual temperature factor.
pub fn moist_density(press: f64, temp: f64, q: f64, q_hydrometeors: f64) -> f64 {
    press / (R_DRY * temp * (1. + (R_VAPOR / R_DRY - 1.) * q - q_hydrometeors))
}

/// Adiabatic liquid water content of a cloud.
///
/// `temp`, `press` and `height` are the level values from cloud base to cloud
/// top. For each of the `n - 1` sub-layers, the moist adiabatic lapse rate
/// gives the rate of condensation with height, which is scaled by the depth of
/// the cloud below the sub-layer's top. Returns the liquid water mixing ratio
/// in kg/kg per sub-layer.
pub fn adiabatic_lwc(temp: &[f64], press: &[f64], height: &[f64]) -> Vec<f64> {
    debug_assert!(temp.len() == press.len() && temp.len() == height.len());

    let mut thickness = 0.;
    (1..temp.len())
        .map(|i| {
            thickness += height[i] - height[i - 1];
            let t = 0.5 * (temp[i - 1] + temp[i]);
            let p = 0.5 * (press[i - 1] + press[i]);

            let es = saturation_vapor_pressure(t);
            // saturation mixing ratio
            let rs = EPSILON * es / (p - es);
            let rho_air = p / (R_DRY * t);

            // pseudo-adiabatic lapse rate, K/m
            let gamma_s = G * (1. + L_V * rs / (R_DRY * t))
                / (CP + L_V.powi(2) * rs * EPSILON / (R_DRY * t.powi(2)));
            // condensation rate, kg/m³/m
            let dlwc_dz = rho_air * CP / L_V * (G / CP - gamma_s);

            (dlwc_dz * thickness / rho_air).max(0.)
        })
        .collect()
}
