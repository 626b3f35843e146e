//! Unit factors for volumes and masses, and human-readable volume strings.

use crate::error::{LabError, Result};

const PREFIXES: [(&str, f64); 4] = [("", 1.0), ("m", 1e-3), ("u", 1e-6), ("n", 1e-9)];
const BASE_UNITS: [&str; 3] = ["g", "l", "L"];

/// Volume units from smallest to largest, used to pick a display unit.
const VOLUME_UNITS: [(&str, f64); 4] = [("nL", 1e-9), ("uL", 1e-6), ("mL", 1e-3), ("L", 1.0)];

/// Multiplier converting a value in `unit` to its base unit (g, l or L).
///
/// Recognized units are the SI prefixes "", "m", "u", "n" on g, l and L.
pub fn unit_factor(unit: &str) -> Result<f64> {
    for base in BASE_UNITS {
        if let Some(prefix) = unit.strip_suffix(base) {
            if let Some((_, factor)) = PREFIXES.iter().find(|(p, _)| *p == prefix) {
                return Ok(*factor);
            }
        }
    }
    Err(LabError::UnrecognizedUnit(unit.to_string()))
}

/// Like [`unit_factor`], restricted to volume units (l or L).
pub fn volume_factor(unit: &str) -> Result<f64> {
    if unit.ends_with('g') {
        return Err(LabError::UnrecognizedUnit(format!(
            "{unit} is a mass unit, expected a volume unit"
        )));
    }
    unit_factor(unit)
}

/// Smallest volume unit in which `volume` (liters) stays below 1000.
pub fn best_volume_unit(volume: f64) -> &'static str {
    VOLUME_UNITS
        .iter()
        .find(|(_, factor)| volume <= 999.0 * factor)
        .map(|(unit, _)| *unit)
        .unwrap_or("L")
}

/// Render a volume in liters as e.g. "20 uL" or "1.5 mL".
///
/// With `unit = None` the unit is chosen by [`best_volume_unit`].
pub fn human_volume(volume: f64, unit: Option<&str>) -> Result<String> {
    let unit = match unit {
        Some(u) => u,
        None => best_volume_unit(volume),
    };
    let value = (volume / volume_factor(unit)? * 100.0).round() / 100.0;
    if value.fract() == 0.0 {
        Ok(format!("{} {unit}", value as i64))
    } else {
        let text = format!("{value:.2}");
        Ok(format!("{} {unit}", text.trim_end_matches('0')))
    }
}

/// Scientific notation with two decimals and a signed, two-digit exponent,
/// e.g. `2.50E-05`.
pub fn format_scientific(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string().to_uppercase();
    }
    let raw = format!("{value:.2E}");
    match raw.split_once('E') {
        Some((mantissa, exponent)) => {
            let exponent: i32 = exponent.parse().unwrap_or(0);
            let sign = if exponent < 0 { '-' } else { '+' };
            format!("{mantissa}E{sign}{:02}", exponent.abs())
        }
        None => raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factors() {
        assert_eq!(unit_factor("L").unwrap(), 1.0);
        assert_eq!(unit_factor("mL").unwrap(), 1e-3);
        assert_eq!(unit_factor("uL").unwrap(), 1e-6);
        assert_eq!(unit_factor("nL").unwrap(), 1e-9);
        assert_eq!(unit_factor("ul").unwrap(), 1e-6);
        assert_eq!(unit_factor("mg").unwrap(), 1e-3);
        assert!(matches!(unit_factor("kL"), Err(LabError::UnrecognizedUnit(_))));
        assert!(matches!(unit_factor("gallon"), Err(LabError::UnrecognizedUnit(_))));
        assert!(volume_factor("ug").is_err());
    }

    #[test]
    fn human_volumes() {
        assert_eq!(human_volume(20e-6, None).unwrap(), "20 uL");
        assert_eq!(human_volume(1.5e-3, None).unwrap(), "1.5 mL");
        assert_eq!(human_volume(2.0, None).unwrap(), "2 L");
        assert_eq!(human_volume(1.25e-6, Some("nL")).unwrap(), "1250 nL");
    }

    #[test]
    fn scientific_rendering() {
        assert_eq!(format_scientific(2.5e-5), "2.50E-05");
        assert_eq!(format_scientific(5e-6), "5.00E-06");
        assert_eq!(format_scientific(0.0), "0.00E+00");
        assert_eq!(format_scientific(1234.0), "1.23E+03");
        assert_eq!(format_scientific(1e-120), "1.00E-120");
    }
}
