//! Spoken-unit canonicalization and quantity conversion
//!
//! Candidate commands carry the unit exactly as spoken ("pounds", "gal");
//! canonicalization and conversion happen only when a mutation is applied
//! against an item's stored unit.

use crate::{Error, Result};

/// Measurement family a unit belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitFamily {
    Mass,
    Volume,
    Count,
}

/// A canonical unit definition
#[derive(Debug, Clone, Copy)]
pub struct Unit {
    /// Canonical short name stored in the database
    pub canonical: &'static str,
    /// Measurement family
    pub family: UnitFamily,
    /// Scale factor to the family base unit (grams, milliliters, or items)
    factor: f64,
    /// Generic counters ("each", "dozen") interconvert; containers do not
    generic: bool,
}

/// Canonical unit definitions, factors relative to the family base
const UNITS: &[Unit] = &[
    Unit { canonical: "g", family: UnitFamily::Mass, factor: 1.0, generic: false },
    Unit { canonical: "kg", family: UnitFamily::Mass, factor: 1000.0, generic: false },
    Unit { canonical: "oz", family: UnitFamily::Mass, factor: 28.349_5, generic: false },
    Unit { canonical: "lb", family: UnitFamily::Mass, factor: 453.592, generic: false },
    Unit { canonical: "ml", family: UnitFamily::Volume, factor: 1.0, generic: false },
    Unit { canonical: "l", family: UnitFamily::Volume, factor: 1000.0, generic: false },
    Unit { canonical: "tsp", family: UnitFamily::Volume, factor: 4.929, generic: false },
    Unit { canonical: "tbsp", family: UnitFamily::Volume, factor: 14.787, generic: false },
    Unit { canonical: "cup", family: UnitFamily::Volume, factor: 236.588, generic: false },
    Unit { canonical: "pint", family: UnitFamily::Volume, factor: 473.176, generic: false },
    Unit { canonical: "quart", family: UnitFamily::Volume, factor: 946.353, generic: false },
    Unit { canonical: "gal", family: UnitFamily::Volume, factor: 3785.41, generic: false },
    Unit { canonical: "each", family: UnitFamily::Count, factor: 1.0, generic: true },
    Unit { canonical: "dozen", family: UnitFamily::Count, factor: 12.0, generic: true },
    Unit { canonical: "can", family: UnitFamily::Count, factor: 1.0, generic: false },
    Unit { canonical: "bottle", family: UnitFamily::Count, factor: 1.0, generic: false },
    Unit { canonical: "bag", family: UnitFamily::Count, factor: 1.0, generic: false },
    Unit { canonical: "box", family: UnitFamily::Count, factor: 1.0, generic: false },
    Unit { canonical: "jar", family: UnitFamily::Count, factor: 1.0, generic: false },
    Unit { canonical: "case", family: UnitFamily::Count, factor: 1.0, generic: false },
];

/// Spoken synonym -> canonical name
const SYNONYMS: &[(&str, &str)] = &[
    ("g", "g"), ("gram", "g"), ("grams", "g"),
    ("kg", "kg"), ("kilo", "kg"), ("kilos", "kg"), ("kilogram", "kg"), ("kilograms", "kg"),
    ("oz", "oz"), ("ounce", "oz"), ("ounces", "oz"),
    ("lb", "lb"), ("lbs", "lb"), ("pound", "lb"), ("pounds", "lb"),
    ("ml", "ml"), ("milliliter", "ml"), ("milliliters", "ml"),
    ("l", "l"), ("liter", "l"), ("liters", "l"), ("litre", "l"), ("litres", "l"),
    ("tsp", "tsp"), ("teaspoon", "tsp"), ("teaspoons", "tsp"),
    ("tbsp", "tbsp"), ("tablespoon", "tbsp"), ("tablespoons", "tbsp"),
    ("cup", "cup"), ("cups", "cup"),
    ("pint", "pint"), ("pints", "pint"),
    ("quart", "quart"), ("quarts", "quart"),
    ("gal", "gal"), ("gallon", "gal"), ("gallons", "gal"),
    ("each", "each"), ("ea", "each"), ("unit", "each"), ("units", "each"),
    ("piece", "each"), ("pieces", "each"), ("count", "each"),
    ("dozen", "dozen"), ("dozens", "dozen"),
    ("can", "can"), ("cans", "can"),
    ("bottle", "bottle"), ("bottles", "bottle"),
    ("bag", "bag"), ("bags", "bag"),
    ("box", "box"), ("boxes", "box"),
    ("jar", "jar"), ("jars", "jar"),
    ("case", "case"), ("cases", "case"),
];

/// Look up a spoken unit, tolerating case and trailing punctuation
#[must_use]
pub fn lookup(spoken: &str) -> Option<&'static Unit> {
    let normalized = spoken
        .trim()
        .trim_end_matches(['.', ','])
        .to_lowercase();

    let canonical = SYNONYMS
        .iter()
        .find(|(syn, _)| *syn == normalized)
        .map(|(_, canon)| *canon)?;

    UNITS.iter().find(|u| u.canonical == canonical)
}

/// True if the token reads as a unit of measure
#[must_use]
pub fn is_unit(token: &str) -> bool {
    lookup(token).is_some()
}

/// Convert a quantity between two spoken units
///
/// Identical canonical units pass through unchanged. Mass and volume units
/// convert within their family; count units convert only between generic
/// counters (a case is not a can).
///
/// # Errors
///
/// Returns [`Error::Validation`] if either unit is unknown or the pair is
/// incompatible.
pub fn convert(quantity: f64, from_spoken: &str, to_spoken: &str) -> Result<f64> {
    let from = lookup(from_spoken)
        .ok_or_else(|| Error::Validation(format!("unknown unit: {from_spoken}")))?;
    let to = lookup(to_spoken)
        .ok_or_else(|| Error::Validation(format!("unknown unit: {to_spoken}")))?;

    if from.canonical == to.canonical {
        return Ok(quantity);
    }

    if from.family != to.family {
        return Err(Error::Validation(format!(
            "incompatible units: {} and {}",
            from.canonical, to.canonical
        )));
    }

    // Count conversions only make sense between generic counters
    if from.family == UnitFamily::Count && !(from.generic && to.generic) {
        return Err(Error::Validation(format!(
            "incompatible units: {} and {}",
            from.canonical, to.canonical
        )));
    }

    Ok(quantity * from.factor / to.factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_tolerates_case_and_punctuation() {
        assert_eq!(lookup("Pounds").unwrap().canonical, "lb");
        assert_eq!(lookup("gallons.").unwrap().canonical, "gal");
        assert_eq!(lookup(" lbs ").unwrap().canonical, "lb");
        assert!(lookup("furlongs").is_none());
    }

    #[test]
    fn same_canonical_passes_through() {
        let converted = convert(5.0, "pounds", "lb").unwrap();
        assert!((converted - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn mass_conversion() {
        let converted = convert(2.0, "lb", "oz").unwrap();
        assert!((converted - 32.0).abs() < 0.01);
    }

    #[test]
    fn volume_conversion() {
        let converted = convert(1.0, "gallon", "quarts").unwrap();
        assert!((converted - 4.0).abs() < 0.01);
    }

    #[test]
    fn cross_family_rejected() {
        assert!(convert(1.0, "lb", "gallon").is_err());
    }

    #[test]
    fn containers_do_not_interconvert() {
        assert!(convert(1.0, "case", "can").is_err());
        // Generic counters still do
        let converted = convert(2.0, "dozen", "each").unwrap();
        assert!((converted - 24.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unknown_unit_is_validation_error() {
        let err = convert(1.0, "smidgen", "lb").unwrap_err();
        assert_eq!(err.code(), "validation_error");
    }
}
