//! Canonical unit vocabulary and linear/log conversion with first-order error propagation.

use serde::{Deserialize, Serialize};
use std::f64::consts::LN_10;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum UnitError {
    #[error("'{0}' is not a number")]
    NotNumeric(String),

    #[error("cannot take the logarithm of non-positive value '{0}'")]
    NonPositive(String),

    #[error("error bound '{0}' is negative")]
    NegativeError(String),

    #[error("unit '{0}' is already logarithmic")]
    AlreadyLogarithmic(Unit),

    #[error("unit '{0}' is not logarithmic")]
    NotLogarithmic(Unit),

    #[error("unit '{0}' has no linear/log counterpart")]
    NoCounterpart(Unit),

    #[error("unknown unit '{0}'")]
    Unknown(String),

    #[error("converting '{0}' leaves the representable range")]
    OutOfRange(String),
}

/// Unit strings facts may carry. Linear and log scales are distinct variants so they can never
/// share a unit string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    #[serde(rename = "Msol")]
    SolarMass,
    #[serde(rename = "log(M/Msol)")]
    LogSolarMass,
    #[serde(rename = "Lsol")]
    SolarLuminosity,
    #[serde(rename = "log(L/Lsol)")]
    LogSolarLuminosity,
    #[serde(rename = "erg/s")]
    ErgPerSec,
    #[serde(rename = "log(L/[erg/s])")]
    LogErgPerSec,
    #[serde(rename = "km/s")]
    KmPerSec,
    #[serde(rename = "Mpc")]
    Megaparsec,
    #[serde(rename = "arcsec")]
    Arcsec,
    #[serde(rename = "floatdegrees")]
    Degrees,
    #[serde(rename = "hh:mm:ss")]
    Sexagesimal,
    #[serde(rename = "Magnitude")]
    Magnitude,
    #[serde(rename = "Absolute Magnitude")]
    AbsoluteMagnitude,
    #[serde(rename = "Msol/Lsol")]
    MassToLight,
    #[serde(rename = "Angstrom")]
    Angstrom,
    #[serde(rename = "micron")]
    Micron,
    #[serde(rename = "MJD")]
    Mjd,
}

impl Unit {
    pub const ALL: [Unit; 17] = [
        Unit::SolarMass,
        Unit::LogSolarMass,
        Unit::SolarLuminosity,
        Unit::LogSolarLuminosity,
        Unit::ErgPerSec,
        Unit::LogErgPerSec,
        Unit::KmPerSec,
        Unit::Megaparsec,
        Unit::Arcsec,
        Unit::Degrees,
        Unit::Sexagesimal,
        Unit::Magnitude,
        Unit::AbsoluteMagnitude,
        Unit::MassToLight,
        Unit::Angstrom,
        Unit::Micron,
        Unit::Mjd,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::SolarMass => "Msol",
            Unit::LogSolarMass => "log(M/Msol)",
            Unit::SolarLuminosity => "Lsol",
            Unit::LogSolarLuminosity => "log(L/Lsol)",
            Unit::ErgPerSec => "erg/s",
            Unit::LogErgPerSec => "log(L/[erg/s])",
            Unit::KmPerSec => "km/s",
            Unit::Megaparsec => "Mpc",
            Unit::Arcsec => "arcsec",
            Unit::Degrees => "floatdegrees",
            Unit::Sexagesimal => "hh:mm:ss",
            Unit::Magnitude => "Magnitude",
            Unit::AbsoluteMagnitude => "Absolute Magnitude",
            Unit::MassToLight => "Msol/Lsol",
            Unit::Angstrom => "Angstrom",
            Unit::Micron => "micron",
            Unit::Mjd => "MJD",
        }
    }

    pub fn is_log(&self) -> bool {
        matches!(
            self,
            Unit::LogSolarMass | Unit::LogSolarLuminosity | Unit::LogErgPerSec
        )
    }

    pub fn log_counterpart(&self) -> Result<Unit, UnitError> {
        match self {
            Unit::SolarMass => Ok(Unit::LogSolarMass),
            Unit::SolarLuminosity => Ok(Unit::LogSolarLuminosity),
            Unit::ErgPerSec => Ok(Unit::LogErgPerSec),
            u if u.is_log() => Err(UnitError::AlreadyLogarithmic(*u)),
            u => Err(UnitError::NoCounterpart(*u)),
        }
    }

    pub fn linear_counterpart(&self) -> Result<Unit, UnitError> {
        match self {
            Unit::LogSolarMass => Ok(Unit::SolarMass),
            Unit::LogSolarLuminosity => Ok(Unit::SolarLuminosity),
            Unit::LogErgPerSec => Ok(Unit::ErgPerSec),
            u => Err(UnitError::NotLogarithmic(*u)),
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Unit {
    type Err = UnitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Unit::ALL
            .iter()
            .copied()
            .find(|u| u.as_str() == s.trim())
            .ok_or_else(|| UnitError::Unknown(s.to_string()))
    }
}

/// A converted value with its error bounds, in the order they were given.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaledQuantity {
    pub value: String,
    pub errors: Vec<String>,
}

/// `log10(value)` with each linear error bound propagated independently as `Δx / (x·ln10)`.
pub fn convert_lin_to_log(value: &str, errors: &[&str]) -> Result<ScaledQuantity, UnitError> {
    let x = parse_number(value)?;
    if x <= 0.0 {
        return Err(UnitError::NonPositive(value.to_string()));
    }
    let log_value = x.log10();
    let value_out = format_decimals(log_value, significant_figures(value));

    let errors_out = errors
        .iter()
        .map(|err| {
            let dx = parse_error(err)?;
            Ok(format_significant(
                finite(dx / (x * LN_10), err)?,
                significant_figures(err).max(2),
            ))
        })
        .collect::<Result<Vec<_>, UnitError>>()?;

    Ok(ScaledQuantity {
        value: value_out,
        errors: errors_out,
    })
}

/// Inverse of [`convert_lin_to_log`]: `10^v` with `Δx = x·ln10·Δv`.
pub fn convert_log_to_lin(value: &str, errors: &[&str]) -> Result<ScaledQuantity, UnitError> {
    let v = parse_number(value)?;
    let x = finite(10f64.powf(v), value)?;
    let value_out = format_significant(x, decimal_places(value).max(1));

    let errors_out = errors
        .iter()
        .map(|err| {
            let dv = parse_error(err)?;
            Ok(format_significant(
                finite(x * LN_10 * dv, err)?,
                significant_figures(err).max(2),
            ))
        })
        .collect::<Result<Vec<_>, UnitError>>()?;

    Ok(ScaledQuantity {
        value: value_out,
        errors: errors_out,
    })
}

/// Convert a linear quantity to log scale, returning the log counterpart of its unit.
pub fn convert_quantity_to_log(
    value: &str,
    errors: &[&str],
    unit: Unit,
) -> Result<(ScaledQuantity, Unit), UnitError> {
    let log_unit = unit.log_counterpart()?;
    Ok((convert_lin_to_log(value, errors)?, log_unit))
}

fn parse_number(text: &str) -> Result<f64, UnitError> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|x| x.is_finite())
        .ok_or_else(|| UnitError::NotNumeric(text.to_string()))
}

fn finite(x: f64, input: &str) -> Result<f64, UnitError> {
    if x.is_finite() {
        Ok(x)
    } else {
        Err(UnitError::OutOfRange(input.to_string()))
    }
}

fn parse_error(text: &str) -> Result<f64, UnitError> {
    let dx = parse_number(text)?;
    if dx < 0.0 {
        return Err(UnitError::NegativeError(text.to_string()));
    }
    Ok(dx)
}

/// Significant figures printed in a decimal string; trailing integer zeros count.
pub fn significant_figures(text: &str) -> usize {
    let mantissa = text
        .trim()
        .trim_start_matches(['+', '-'])
        .split(['e', 'E'])
        .next()
        .unwrap_or("");
    let digits: String = mantissa.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.trim_start_matches('0').len().max(1)
}

fn decimal_places(text: &str) -> usize {
    let mantissa = text.trim().split(['e', 'E']).next().unwrap_or("");
    mantissa
        .split_once('.')
        .map(|(_, frac)| frac.len())
        .unwrap_or(0)
}

fn format_decimals(x: f64, decimals: usize) -> String {
    trim_zeros(format!("{:.*}", decimals, x))
}

fn format_significant(x: f64, sig: usize) -> String {
    if x == 0.0 {
        return "0".to_string();
    }
    let magnitude = x.abs().log10().floor() as i32;
    let decimals = sig as i32 - 1 - magnitude;
    if decimals >= 0 {
        format_decimals(x, decimals as usize)
    } else {
        let scale = 10f64.powi(-decimals);
        format!("{:.0}", (x / scale).round() * scale)
    }
}

fn trim_zeros(s: String) -> String {
    if !s.contains('.') {
        return s;
    }
    let trimmed = s.trim_end_matches('0').trim_end_matches('.');
    if trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(s: &str, expected: f64, tol: f64) {
        let x: f64 = s.parse().unwrap();
        assert!((x - expected).abs() < tol, "{} !~ {}", s, expected);
    }

    #[test]
    fn test_lin_to_log_propagates_asymmetric_errors() {
        let out = convert_lin_to_log("100", &["10", "20"]).unwrap();
        assert_eq!(out.value, "2");
        assert_eq!(out.errors.len(), 2);
        approx(&out.errors[0], 10.0 / (100.0 * LN_10), 1e-3);
        approx(&out.errors[1], 20.0 / (100.0 * LN_10), 1e-3);
        let lo: f64 = out.errors[0].parse().unwrap();
        let hi: f64 = out.errors[1].parse().unwrap();
        assert!(lo < hi);
    }

    #[test]
    fn test_lin_to_log_keeps_printed_precision() {
        let out = convert_lin_to_log("3.9e9", &[]).unwrap();
        assert_eq!(out.value, "9.59");
    }

    #[test]
    fn test_rejects_non_positive_and_non_numeric() {
        assert_eq!(
            convert_lin_to_log("0", &[]),
            Err(UnitError::NonPositive("0".to_string()))
        );
        assert!(matches!(
            convert_lin_to_log("-5", &[]),
            Err(UnitError::NonPositive(_))
        ));
        assert!(matches!(
            convert_lin_to_log("abc", &[]),
            Err(UnitError::NotNumeric(_))
        ));
        assert!(matches!(
            convert_lin_to_log("10", &["-1"]),
            Err(UnitError::NegativeError(_))
        ));
    }

    #[test]
    fn test_already_log_unit_is_rejected() {
        assert_eq!(
            convert_quantity_to_log("8.1", &[], Unit::LogSolarMass),
            Err(UnitError::AlreadyLogarithmic(Unit::LogSolarMass))
        );
        let (out, unit) = convert_quantity_to_log("1e8", &["2e7"], Unit::SolarMass).unwrap();
        assert_eq!(unit, Unit::LogSolarMass);
        assert_eq!(out.value, "8");
    }

    #[test]
    fn test_log_to_lin_round_trip_is_close() {
        let out = convert_log_to_lin("8.00", &["0.10"]).unwrap();
        approx(&out.value, 1e8, 1.0);
        approx(&out.errors[0], 1e8 * LN_10 * 0.1, 1e5);
    }

    #[test]
    fn test_log_to_lin_overflow_is_an_error() {
        assert_eq!(
            convert_log_to_lin("400", &[]),
            Err(UnitError::OutOfRange("400".to_string()))
        );
        assert!(matches!(
            convert_log_to_lin("300", &["1e10"]),
            Err(UnitError::OutOfRange(_))
        ));
        assert!(matches!(
            convert_lin_to_log("1e-320", &["1e308"]),
            Err(UnitError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_unit_strings_distinguish_scales() {
        assert_ne!(Unit::SolarMass.as_str(), Unit::LogSolarMass.as_str());
        for unit in Unit::ALL {
            let json = serde_json::to_string(&unit).unwrap();
            assert_eq!(json, format!("\"{}\"", unit.as_str().replace('"', "\\\"")));
            assert_eq!(unit.as_str().parse::<Unit>().unwrap(), unit);
        }
    }

    #[test]
    fn test_significant_figures() {
        assert_eq!(significant_figures("0.042"), 2);
        assert_eq!(significant_figures("1.80e6"), 3);
        assert_eq!(significant_figures("100"), 3);
        assert_eq!(significant_figures("0"), 1);
    }
}
