use std::fmt;

use serde::Serialize;
use ts_rs::TS;

/// Value kinds tracked on the assembler's operand stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Type {
    Any,
    Boolean,
    Number,
    String,
    Void,
}

impl Type {
    pub fn name(self) -> &'static str {
        match self {
            Type::Any => "any",
            Type::Boolean => "boolean",
            Type::Number => "number",
            Type::String => "string",
            Type::Void => "void",
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Units whose SimVars carry a number. Matched case-sensitively.
static NUMBER_UNITS: &[&str] = &[
    // ── Distance ──
    "meters",
    "centimeters",
    "kilometers",
    "millimeters",
    "miles",
    "decimiles",
    "nautical miles",
    "feet",
    "inches",
    "yards",
    // ── Area ──
    "square inches",
    "square feet",
    "square yards",
    "square meters",
    "square centimeters",
    "square kilometers",
    "square millimeters",
    "square miles",
    // ── Volume ──
    "cubic inches",
    "cubic feet",
    "cubic yards",
    "cubic miles",
    "cubic milimeters",
    "cubic centimeters",
    "cubic meters",
    "cubic kilometers",
    "liters",
    "gallons",
    "quarts",
    // ── Temperature ──
    "kelvin",
    "rankine",
    "fahrenheit",
    "celsius",
    // ── Angle ──
    "radians",
    "rounds",
    "degrees",
    "degree latitude",
    "degree longitude",
    "grads",
    // ── Global position ──
    "degrees latitude",
    "degrees longitude",
    "meters latitude",
    // ── Angular velocity ──
    "radians per second",
    "revolutions per minute",
    "minutes per round",
    "nice minutes per round",
    "degrees per second",
    // ── Speed ──
    "meters per second",
    "meters per minute",
    "feet per second",
    "feet per minute",
    "kph",
    "knots",
    "mph",
    "machs",
    // ── Acceleration ──
    "meters per second squared",
    "g force",
    "feet per second squared",
    // ── Time ──
    "seconds",
    "minutes",
    "hours",
    "days",
    "hours over 10",
    // ── Power ──
    "watts",
    "ft lb per second",
    "horsepower",
    // ── Volume rate ──
    "meters cubed per second",
    "gallons per hour",
    "liters per hour",
    // ── Weight ──
    "kilograms",
    "geepounds",
    "pounds",
    // ── Weight rate ──
    "kilograms per second",
    "pounds per hour",
    "pounds per second",
    // ── Electrical ──
    "amps",
    "volts",
    // ── Frequency ──
    "hz",
    "khz",
    "mhz",
    // ── Density ──
    "kilograms per cubic meter",
    "slugs per cubic foot",
    "pounds per gallon",
    // ── Pressure ──
    "pascals",
    "newtons per square meter",
    "kpa",
    "kilogram force per square centimeter",
    "mmHg",
    "cmHg",
    "inHg",
    "atm",
    "psi",
    "millimeters of water",
    "bars",
    // ── Torque ──
    "newton meter",
    "foot-pounds",
    // ── Misc ──
    "part",
    "half",
    "third",
    "percent",
    "percent over 100",
    "decibels",
    "position 16k",
    "position 32k",
    "enum",
    "number",
];

/// Value type of a SimVar unit, or `None` if the unit is not recognised.
pub fn unit_type(unit: &str) -> Option<Type> {
    match unit {
        "bool" | "boolean" => Some(Type::Boolean),
        "string" => Some(Type::String),
        _ if NUMBER_UNITS.contains(&unit) => Some(Type::Number),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn display_is_lowercase() {
        assert_eq!(Type::Number.to_string(), "number");
        assert_eq!(Type::Void.to_string(), "void");
        assert_eq!(Type::Any.to_string(), "any");
    }

    #[test]
    fn unit_lookup() {
        assert_eq!(unit_type("feet"), Some(Type::Number));
        assert_eq!(unit_type("percent over 100"), Some(Type::Number));
        assert_eq!(unit_type("mmHg"), Some(Type::Number));
        assert_eq!(unit_type("bool"), Some(Type::Boolean));
        assert_eq!(unit_type("boolean"), Some(Type::Boolean));
        assert_eq!(unit_type("string"), Some(Type::String));
        assert_eq!(unit_type("number"), Some(Type::Number));
    }

    #[test]
    fn unknown_units_are_rejected() {
        assert_eq!(unit_type("furlongs"), None);
        assert_eq!(unit_type("MMHG"), None);
        assert_eq!(unit_type(""), None);
    }
}
