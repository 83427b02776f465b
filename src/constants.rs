use std::collections::HashMap;

use crate::units::Dimension;

// Named constants the lexer can promote identifiers to. A constant with an
// empty unit evaluates as a plain number.
#[derive(Debug, Clone)]
pub struct Constant {
    pub name: &'static str,
    pub value: f64,
    pub unit: &'static str,
    pub dimension: Dimension,
}

static CONSTANTS: &[Constant] = &[
    Constant { name: "pi", value: std::f64::consts::PI, unit: "", dimension: Dimension::None },
    Constant { name: "tau", value: std::f64::consts::TAU, unit: "", dimension: Dimension::None },
    Constant { name: "e", value: std::f64::consts::E, unit: "", dimension: Dimension::None },
    Constant { name: "phi", value: 1.618033988749895, unit: "", dimension: Dimension::None },
    Constant { name: "avogadro", value: 6.02214076e23, unit: "", dimension: Dimension::None },
    // "c" and "g" belong to the unit table, so these get spelled-out names.
    Constant { name: "lightspeed", value: 299792458.0, unit: "mps", dimension: Dimension::Speed },
    Constant { name: "soundspeed", value: 343.0, unit: "mps", dimension: Dimension::Speed },
    Constant { name: "gravity", value: 9.80665, unit: "", dimension: Dimension::None },
];

pub struct ConstantTable {
    constants: HashMap<String, Constant>,
}

impl ConstantTable {
    pub fn new() -> Self {
        let mut constants = HashMap::new();
        for c in CONSTANTS {
            constants.insert(c.name.to_string(), c.clone());
        }
        ConstantTable { constants }
    }

    pub fn is_constant(&self, name: &str) -> bool {
        self.constants.contains_key(&name.to_lowercase())
    }

    pub fn get(&self, name: &str) -> Option<&Constant> {
        self.constants.get(&name.to_lowercase())
    }
}
