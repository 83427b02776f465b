use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

use serde_json::{json, Value as Json};

// Dimensions form a closed set; arithmetic and conversion require both sides
// to agree. Temperature is affine and never goes through the factor path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    None,
    Length,
    Mass,
    Time,
    Temperature,
    Volume,
    Area,
    Data,
    DataRate,
    Speed,
    Pressure,
    Force,
    Angle,
    Frequency,
}

impl Dimension {
    pub fn is_linear(self) -> bool {
        !matches!(self, Dimension::Temperature)
    }

    // The canonical unit every factor in this dimension is stored against.
    pub fn base_unit(self) -> &'static str {
        match self {
            Dimension::None => "",
            Dimension::Length => "m",
            Dimension::Mass => "kg",
            Dimension::Time => "s",
            Dimension::Temperature => "c",
            Dimension::Volume => "l",
            Dimension::Area => "m2",
            Dimension::Data => "b",
            Dimension::DataRate => "bps",
            Dimension::Speed => "mps",
            Dimension::Pressure => "pa",
            Dimension::Force => "n",
            Dimension::Angle => "rad",
            Dimension::Frequency => "hz",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Dimension::None => "none",
            Dimension::Length => "length",
            Dimension::Mass => "mass",
            Dimension::Time => "time",
            Dimension::Temperature => "temperature",
            Dimension::Volume => "volume",
            Dimension::Area => "area",
            Dimension::Data => "data",
            Dimension::DataRate => "data rate",
            Dimension::Speed => "speed",
            Dimension::Pressure => "pressure",
            Dimension::Force => "force",
            Dimension::Angle => "angle",
            Dimension::Frequency => "frequency",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Unit {
    pub name: String,
    pub dimension: Dimension,
    pub to_base: f64,
    pub base_unit: String,
    pub is_custom: bool,
}

#[derive(Debug, Clone)]
pub struct CompoundUnit {
    pub numerator: Unit,
    pub denominator: Unit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UnitError {
    Unknown(String),
    Incompatible(String, String),
    BadDefinition(String),
}

impl fmt::Display for UnitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitError::Unknown(u) => write!(f, "Unknown unit: {}", u),
            UnitError::Incompatible(a, b) => write!(f, "Incompatible units: {} and {}", a, b),
            UnitError::BadDefinition(msg) => write!(f, "Bad unit definition: {}", msg),
        }
    }
}

struct SeedUnit {
    // First spelling is the canonical name, the rest alias the same factor.
    names: &'static [&'static str],
    dimension: Dimension,
    to_base: f64,
}

#[rustfmt::skip]
static BUILTIN_UNITS: &[SeedUnit] = &[
    // Length (base: meter)
    SeedUnit { names: &["mm", "millimeter", "millimeters", "millimetre", "millimetres"], dimension: Dimension::Length, to_base: 0.001 },
    SeedUnit { names: &["cm", "centimeter", "centimeters", "centimetre", "centimetres"], dimension: Dimension::Length, to_base: 0.01 },
    SeedUnit { names: &["m", "meter", "meters", "metre", "metres"], dimension: Dimension::Length, to_base: 1.0 },
    SeedUnit { names: &["km", "kilometer", "kilometers", "kilometre", "kilometres"], dimension: Dimension::Length, to_base: 1000.0 },
    SeedUnit { names: &["inch", "in", "inches"], dimension: Dimension::Length, to_base: 0.0254 },
    SeedUnit { names: &["ft", "foot", "feet"], dimension: Dimension::Length, to_base: 0.3048 },
    SeedUnit { names: &["yd", "yard", "yards"], dimension: Dimension::Length, to_base: 0.9144 },
    SeedUnit { names: &["mi", "mile", "miles"], dimension: Dimension::Length, to_base: 1609.344 },
    SeedUnit { names: &["nmi"], dimension: Dimension::Length, to_base: 1852.0 },
    // Mass (base: kilogram)
    SeedUnit { names: &["mg", "milligram", "milligrams"], dimension: Dimension::Mass, to_base: 1e-6 },
    SeedUnit { names: &["g", "gram", "grams"], dimension: Dimension::Mass, to_base: 0.001 },
    SeedUnit { names: &["kg", "kilogram", "kilograms", "kgs", "kilo", "kilos"], dimension: Dimension::Mass, to_base: 1.0 },
    SeedUnit { names: &["ton", "tons", "tonne", "tonnes"], dimension: Dimension::Mass, to_base: 1000.0 },
    // "pound" stays a mass unit; the currency is only reachable as gbp or the pound sign.
    SeedUnit { names: &["lb", "lbs", "pound", "pounds"], dimension: Dimension::Mass, to_base: 0.45359237 },
    SeedUnit { names: &["oz", "ounce", "ounces"], dimension: Dimension::Mass, to_base: 0.028349523125 },
    SeedUnit { names: &["st", "stone", "stones"], dimension: Dimension::Mass, to_base: 6.35029318 },
    // Time (base: second)
    SeedUnit { names: &["ns", "nanosecond", "nanoseconds"], dimension: Dimension::Time, to_base: 1e-9 },
    SeedUnit { names: &["us", "microsecond", "microseconds"], dimension: Dimension::Time, to_base: 1e-6 },
    SeedUnit { names: &["ms", "millisecond", "milliseconds"], dimension: Dimension::Time, to_base: 0.001 },
    SeedUnit { names: &["s", "second", "seconds", "sec", "secs"], dimension: Dimension::Time, to_base: 1.0 },
    SeedUnit { names: &["min", "minute", "minutes", "mins"], dimension: Dimension::Time, to_base: 60.0 },
    SeedUnit { names: &["h", "hour", "hours", "hr", "hrs"], dimension: Dimension::Time, to_base: 3600.0 },
    SeedUnit { names: &["day", "days"], dimension: Dimension::Time, to_base: 86400.0 },
    SeedUnit { names: &["week", "weeks", "wk"], dimension: Dimension::Time, to_base: 604800.0 },
    // An average month is 365/12 days.
    SeedUnit { names: &["month", "months"], dimension: Dimension::Time, to_base: 2628000.0 },
    SeedUnit { names: &["year", "years", "yr", "yrs"], dimension: Dimension::Time, to_base: 31536000.0 },
    SeedUnit { names: &["decade", "decades"], dimension: Dimension::Time, to_base: 315360000.0 },
    SeedUnit { names: &["century", "centuries"], dimension: Dimension::Time, to_base: 3153600000.0 },
    // Marker for HH:MM clock literals, stored as fractional hours.
    SeedUnit { names: &["time"], dimension: Dimension::Time, to_base: 3600.0 },
    // Temperature (affine, converted through Celsius; the factor is unused)
    SeedUnit { names: &["c", "celsius", "centigrade"], dimension: Dimension::Temperature, to_base: 1.0 },
    SeedUnit { names: &["f", "fahrenheit"], dimension: Dimension::Temperature, to_base: 1.0 },
    SeedUnit { names: &["k", "kelvin"], dimension: Dimension::Temperature, to_base: 1.0 },
    SeedUnit { names: &["r", "rankine"], dimension: Dimension::Temperature, to_base: 1.0 },
    // Volume (base: liter)
    SeedUnit { names: &["ml", "milliliter", "milliliters", "millilitre", "millilitres"], dimension: Dimension::Volume, to_base: 0.001 },
    SeedUnit { names: &["cl"], dimension: Dimension::Volume, to_base: 0.01 },
    SeedUnit { names: &["l", "liter", "liters", "litre", "litres"], dimension: Dimension::Volume, to_base: 1.0 },
    SeedUnit { names: &["m3"], dimension: Dimension::Volume, to_base: 1000.0 },
    SeedUnit { names: &["cm3"], dimension: Dimension::Volume, to_base: 0.001 },
    SeedUnit { names: &["ft3"], dimension: Dimension::Volume, to_base: 28.316846592 },
    SeedUnit { names: &["tsp", "teaspoon", "teaspoons"], dimension: Dimension::Volume, to_base: 0.00492892159375 },
    SeedUnit { names: &["tbsp", "tablespoon", "tablespoons"], dimension: Dimension::Volume, to_base: 0.01478676478125 },
    SeedUnit { names: &["cup", "cups"], dimension: Dimension::Volume, to_base: 0.2365882365 },
    SeedUnit { names: &["pt", "pint", "pints"], dimension: Dimension::Volume, to_base: 0.473176473 },
    SeedUnit { names: &["qt", "quart", "quarts"], dimension: Dimension::Volume, to_base: 0.946352946 },
    SeedUnit { names: &["gal", "gallon", "gallons"], dimension: Dimension::Volume, to_base: 3.785411784 },
    SeedUnit { names: &["floz"], dimension: Dimension::Volume, to_base: 0.0295735295625 },
    // Area (base: square meter)
    SeedUnit { names: &["cm2"], dimension: Dimension::Area, to_base: 0.0001 },
    SeedUnit { names: &["m2"], dimension: Dimension::Area, to_base: 1.0 },
    SeedUnit { names: &["km2"], dimension: Dimension::Area, to_base: 1e6 },
    SeedUnit { names: &["ha", "hectare", "hectares"], dimension: Dimension::Area, to_base: 1e4 },
    SeedUnit { names: &["acre", "acres"], dimension: Dimension::Area, to_base: 4046.8564224 },
    SeedUnit { names: &["mi2"], dimension: Dimension::Area, to_base: 2589988.110336 },
    SeedUnit { names: &["ft2"], dimension: Dimension::Area, to_base: 0.09290304 },
    SeedUnit { names: &["in2"], dimension: Dimension::Area, to_base: 0.00064516 },
    // Data (base: byte, 1024 steps)
    SeedUnit { names: &["bit", "bits"], dimension: Dimension::Data, to_base: 0.125 },
    SeedUnit { names: &["b", "byte", "bytes"], dimension: Dimension::Data, to_base: 1.0 },
    SeedUnit { names: &["kb", "kilobyte", "kilobytes"], dimension: Dimension::Data, to_base: 1024.0 },
    SeedUnit { names: &["mb", "megabyte", "megabytes"], dimension: Dimension::Data, to_base: 1048576.0 },
    SeedUnit { names: &["gb", "gigabyte", "gigabytes"], dimension: Dimension::Data, to_base: 1073741824.0 },
    SeedUnit { names: &["tb", "terabyte", "terabytes"], dimension: Dimension::Data, to_base: 1099511627776.0 },
    SeedUnit { names: &["pb", "petabyte", "petabytes"], dimension: Dimension::Data, to_base: 1125899906842624.0 },
    // Data rate (base: bits per second, decimal steps)
    SeedUnit { names: &["bps"], dimension: Dimension::DataRate, to_base: 1.0 },
    SeedUnit { names: &["kbps"], dimension: Dimension::DataRate, to_base: 1000.0 },
    SeedUnit { names: &["mbps"], dimension: Dimension::DataRate, to_base: 1e6 },
    SeedUnit { names: &["gbps"], dimension: Dimension::DataRate, to_base: 1e9 },
    // Speed (base: meters per second)
    SeedUnit { names: &["mps"], dimension: Dimension::Speed, to_base: 1.0 },
    SeedUnit { names: &["kmph", "kph"], dimension: Dimension::Speed, to_base: 0.2777777777777778 },
    SeedUnit { names: &["mph"], dimension: Dimension::Speed, to_base: 0.44704 },
    // "kn" is knots; kilonewton must be spelled out.
    SeedUnit { names: &["knot", "knots", "kn"], dimension: Dimension::Speed, to_base: 0.5144444444444445 },
    SeedUnit { names: &["fps"], dimension: Dimension::Speed, to_base: 0.3048 },
    // Pressure (base: pascal)
    SeedUnit { names: &["pa", "pascal", "pascals"], dimension: Dimension::Pressure, to_base: 1.0 },
    SeedUnit { names: &["kpa"], dimension: Dimension::Pressure, to_base: 1000.0 },
    SeedUnit { names: &["bar", "bars"], dimension: Dimension::Pressure, to_base: 1e5 },
    SeedUnit { names: &["psi"], dimension: Dimension::Pressure, to_base: 6894.757293168 },
    SeedUnit { names: &["atm"], dimension: Dimension::Pressure, to_base: 101325.0 },
    // Force (base: newton)
    SeedUnit { names: &["n", "newton", "newtons"], dimension: Dimension::Force, to_base: 1.0 },
    SeedUnit { names: &["kilonewton", "kilonewtons"], dimension: Dimension::Force, to_base: 1000.0 },
    SeedUnit { names: &["lbf"], dimension: Dimension::Force, to_base: 4.4482216152605 },
    // Angle (base: radian)
    SeedUnit { names: &["rad", "radian", "radians"], dimension: Dimension::Angle, to_base: 1.0 },
    SeedUnit { names: &["deg", "degree", "degrees"], dimension: Dimension::Angle, to_base: 0.017453292519943295 },
    SeedUnit { names: &["grad", "gradian", "gradians"], dimension: Dimension::Angle, to_base: 0.015707963267948967 },
    SeedUnit { names: &["turn", "turns"], dimension: Dimension::Angle, to_base: 6.283185307179586 },
    // Frequency (base: hertz)
    SeedUnit { names: &["hz", "hertz"], dimension: Dimension::Frequency, to_base: 1.0 },
    SeedUnit { names: &["khz"], dimension: Dimension::Frequency, to_base: 1000.0 },
    SeedUnit { names: &["mhz"], dimension: Dimension::Frequency, to_base: 1e6 },
    SeedUnit { names: &["ghz"], dimension: Dimension::Frequency, to_base: 1e9 },
];

// All lookups go through lowercase keys, so spelling and case never matter
// past this table.
pub struct UnitTable {
    units: HashMap<String, Unit>,
}

impl UnitTable {
    pub fn new() -> Self {
        let mut units = HashMap::new();
        for seed in BUILTIN_UNITS {
            let canonical = seed.names[0];
            for name in seed.names {
                units.insert(
                    name.to_string(),
                    Unit {
                        name: canonical.to_string(),
                        dimension: seed.dimension,
                        to_base: seed.to_base,
                        base_unit: seed.dimension.base_unit().to_string(),
                        is_custom: false,
                    },
                );
            }
        }
        UnitTable { units }
    }

    pub fn is_unit(&self, name: &str) -> bool {
        self.units.contains_key(&name.to_lowercase())
    }

    pub fn get(&self, name: &str) -> Option<&Unit> {
        self.units.get(&name.to_lowercase())
    }

    fn lookup(&self, name: &str) -> Result<&Unit, UnitError> {
        self.get(name).ok_or_else(|| UnitError::Unknown(name.to_string()))
    }

    // Simple-unit conversion. Temperature goes through the Celsius pivot,
    // everything else through the stored factors.
    pub fn convert(&self, value: f64, from: &str, to: &str) -> Result<f64, UnitError> {
        let from_unit = self.lookup(from)?;
        let to_unit = self.lookup(to)?;
        if from_unit.dimension != to_unit.dimension {
            return Err(UnitError::Incompatible(from.to_string(), to.to_string()));
        }
        if !from_unit.dimension.is_linear() {
            let celsius = to_celsius(value, &from_unit.name);
            return Ok(from_celsius(celsius, &to_unit.name));
        }
        Ok(value * from_unit.to_base / to_unit.to_base)
    }

    // Conversion between any mix of compound units and simple speed units.
    // A length/time compound bridges to simple speed units through mps.
    pub fn convert_compound(&self, value: f64, from: &str, to: &str) -> Result<f64, UnitError> {
        match (from.contains('/'), to.contains('/')) {
            (false, false) => self.convert(value, from, to),
            (true, true) => {
                let f = self.parse_compound(from)?;
                let t = self.parse_compound(to)?;
                if f.numerator.dimension != t.numerator.dimension
                    || f.denominator.dimension != t.denominator.dimension
                {
                    return Err(UnitError::Incompatible(from.to_string(), to.to_string()));
                }
                Ok(value * (f.numerator.to_base / f.denominator.to_base)
                    * (t.denominator.to_base / t.numerator.to_base))
            }
            (true, false) => {
                let f = self.parse_compound(from)?;
                let t = self.lookup(to)?;
                if t.dimension != Dimension::Speed
                    || f.numerator.dimension != Dimension::Length
                    || f.denominator.dimension != Dimension::Time
                {
                    return Err(UnitError::Incompatible(from.to_string(), to.to_string()));
                }
                let mps = value * f.numerator.to_base / f.denominator.to_base;
                Ok(mps / t.to_base)
            }
            (false, true) => {
                let f = self.lookup(from)?;
                let t = self.parse_compound(to)?;
                if f.dimension != Dimension::Speed
                    || t.numerator.dimension != Dimension::Length
                    || t.denominator.dimension != Dimension::Time
                {
                    return Err(UnitError::Incompatible(from.to_string(), to.to_string()));
                }
                let mps = value * f.to_base;
                Ok(mps * t.denominator.to_base / t.numerator.to_base)
            }
        }
    }

    // A compound unit is a single A/B pair; both sides must be known.
    pub fn parse_compound(&self, s: &str) -> Result<CompoundUnit, UnitError> {
        let mut parts = s.splitn(3, '/');
        let (num, den, extra) = (parts.next(), parts.next(), parts.next());
        match (num, den, extra) {
            (Some(num), Some(den), None) => Ok(CompoundUnit {
                numerator: self.lookup(num.trim())?.clone(),
                denominator: self.lookup(den.trim())?.clone(),
            }),
            _ => Err(UnitError::Unknown(s.to_string())),
        }
    }

    // Registers a user-defined unit. The factor is resolved against the base
    // unit here, so later lookups never chase definition chains.
    pub fn add_custom(&mut self, name: &str, value: f64, base: &str) -> Result<(), UnitError> {
        let key = name.to_lowercase();
        if key == base.to_lowercase() {
            return Err(UnitError::BadDefinition(format!(
                "{} cannot be defined in terms of itself",
                name
            )));
        }
        if !value.is_finite() || value <= 0.0 {
            return Err(UnitError::BadDefinition(format!(
                "factor for {} must be a positive number",
                name
            )));
        }
        if self.units.get(&key).is_some_and(|u| !u.is_custom) {
            return Err(UnitError::BadDefinition(format!(
                "cannot redefine built-in unit {}",
                name
            )));
        }
        let base_unit = self
            .get(base)
            .cloned()
            .ok_or_else(|| UnitError::BadDefinition(format!("unknown base unit {}", base)))?;
        if base_unit.dimension == Dimension::Temperature {
            return Err(UnitError::BadDefinition(format!(
                "temperature units cannot anchor {}",
                name
            )));
        }
        self.units.insert(
            key.clone(),
            Unit {
                name: key,
                dimension: base_unit.dimension,
                to_base: value * base_unit.to_base,
                base_unit: base_unit.base_unit,
                is_custom: true,
            },
        );
        Ok(())
    }

    pub fn remove_custom(&mut self, name: &str) -> Result<(), UnitError> {
        let key = name.to_lowercase();
        match self.units.get(&key) {
            None => Err(UnitError::Unknown(name.to_string())),
            Some(u) if !u.is_custom => Err(UnitError::BadDefinition(format!(
                "cannot delete built-in unit {}",
                name
            ))),
            Some(_) => {
                self.units.remove(&key);
                Ok(())
            }
        }
    }

    pub fn builtin_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .units
            .values()
            .filter(|u| !u.is_custom)
            .map(|u| u.name.clone())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn custom_units(&self) -> Vec<&Unit> {
        let mut customs: Vec<&Unit> = self.units.values().filter(|u| u.is_custom).collect();
        customs.sort_by(|a, b| a.name.cmp(&b.name));
        customs
    }

    // Custom units persist as a flat JSON list of resolved factors. Loading
    // the same file twice replaces entries by name instead of duplicating.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let entries: Vec<Json> = self
            .custom_units()
            .iter()
            .map(|u| {
                json!({
                    "name": u.name,
                    "factor": u.to_base,
                    "base_unit": u.base_unit,
                })
            })
            .collect();
        fs::write(path, serde_json::to_string_pretty(&Json::Array(entries))?)
    }

    pub fn load(&mut self, path: &Path) -> std::io::Result<usize> {
        let text = fs::read_to_string(path)?;
        let parsed: Json = serde_json::from_str(&text)?;
        let mut loaded = 0;
        if let Some(entries) = parsed.as_array() {
            for entry in entries {
                let name = entry["name"].as_str();
                let factor = entry["factor"].as_f64();
                let base_unit = entry["base_unit"].as_str();
                if let (Some(name), Some(factor), Some(base_unit)) = (name, factor, base_unit) {
                    let dimension = match self.get(base_unit) {
                        Some(b) => b.dimension,
                        None => continue,
                    };
                    self.units.insert(
                        name.to_lowercase(),
                        Unit {
                            name: name.to_lowercase(),
                            dimension,
                            to_base: factor,
                            base_unit: base_unit.to_string(),
                            is_custom: true,
                        },
                    );
                    loaded += 1;
                }
            }
        }
        Ok(loaded)
    }
}

fn to_celsius(value: f64, canonical: &str) -> f64 {
    match canonical {
        "f" => (value - 32.0) * 5.0 / 9.0,
        "k" => value - 273.15,
        "r" => (value - 491.67) * 5.0 / 9.0,
        _ => value,
    }
}

fn from_celsius(value: f64, canonical: &str) -> f64 {
    match canonical {
        "f" => value * 9.0 / 5.0 + 32.0,
        "k" => value + 273.15,
        "r" => (value + 273.15) * 9.0 / 5.0,
        _ => value,
    }
}
