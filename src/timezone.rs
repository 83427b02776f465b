use std::collections::HashMap;
use std::fmt;

// Fixed whole-hour offsets from UTC, no DST. Keys are lowercase and may be
// multi-word ("new york").
static ZONES: &[(&str, i32)] = &[
    ("utc", 0),
    ("london", 0),
    ("dublin", 0),
    ("lisbon", 0),
    ("paris", 1),
    ("berlin", 1),
    ("madrid", 1),
    ("rome", 1),
    ("amsterdam", 1),
    ("stockholm", 1),
    ("vienna", 1),
    ("warsaw", 1),
    ("athens", 2),
    ("helsinki", 2),
    ("cairo", 2),
    ("johannesburg", 2),
    ("istanbul", 3),
    ("moscow", 3),
    ("riyadh", 3),
    ("nairobi", 3),
    ("dubai", 4),
    ("karachi", 5),
    ("mumbai", 5),
    ("delhi", 5),
    ("dhaka", 6),
    ("bangkok", 7),
    ("jakarta", 7),
    ("singapore", 8),
    ("hong kong", 8),
    ("beijing", 8),
    ("shanghai", 8),
    ("perth", 8),
    ("tokyo", 9),
    ("seoul", 9),
    ("brisbane", 10),
    ("sydney", 10),
    ("melbourne", 10),
    ("auckland", 12),
    ("honolulu", -10),
    ("anchorage", -9),
    ("los angeles", -8),
    ("san francisco", -8),
    ("seattle", -8),
    ("vancouver", -8),
    ("denver", -7),
    ("phoenix", -7),
    ("chicago", -6),
    ("mexico city", -6),
    ("new york", -5),
    ("toronto", -5),
    ("boston", -5),
    ("miami", -5),
    ("sao paulo", -3),
    ("buenos aires", -3),
];

#[derive(Debug, Clone, PartialEq)]
pub enum TimezoneError {
    Unknown(String),
}

impl fmt::Display for TimezoneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimezoneError::Unknown(z) => write!(f, "Unknown timezone: {}", z),
        }
    }
}

pub struct TimezoneTable {
    zones: HashMap<String, i32>,
}

impl TimezoneTable {
    pub fn new() -> Self {
        let mut zones = HashMap::new();
        for (name, offset) in ZONES {
            zones.insert(name.to_string(), *offset);
        }
        TimezoneTable { zones }
    }

    pub fn is_timezone(&self, name: &str) -> bool {
        self.zones.contains_key(&name.to_lowercase())
    }

    pub fn offset(&self, name: &str) -> Result<i32, TimezoneError> {
        self.zones
            .get(&name.to_lowercase())
            .copied()
            .ok_or_else(|| TimezoneError::Unknown(name.to_string()))
    }
}

// Title-cases a lowercase zone key for display ("new york" -> "New York").
pub fn display_name(name: &str) -> String {
    name.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    if word == "utc" {
                        word.to_uppercase()
                    } else {
                        first.to_uppercase().collect::<String>() + chars.as_str()
                    }
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
