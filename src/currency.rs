use std::collections::HashMap;
use std::fmt;

// Every rate is stored against the reference currency (USD), as USD per one
// unit of the currency. A pairwise conversion is two hops through the anchor.
const REFERENCE: &str = "USD";

static SEED_RATES: &[(&str, f64)] = &[
    ("USD", 1.0),
    ("EUR", 1.08),
    ("GBP", 1.27),
    ("JPY", 0.0067),
    ("CAD", 0.74),
    ("AUD", 0.66),
    ("CHF", 1.13),
    ("CNY", 0.14),
    ("INR", 0.012),
    ("NZD", 0.61),
];

#[derive(Debug, Clone, PartialEq)]
pub enum CurrencyError {
    Unknown(String),
    BadRate(f64),
}

impl fmt::Display for CurrencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CurrencyError::Unknown(c) => write!(f, "Unknown currency: {}", c),
            CurrencyError::BadRate(r) => write!(f, "Invalid exchange rate: {}", r),
        }
    }
}

// The one place symbols, codes and informal names are unified.
// "pound"/"pounds" are deliberately absent: they resolve as mass units.
pub fn normalize(s: &str) -> Option<&'static str> {
    match s.to_lowercase().as_str() {
        "$" | "usd" | "dollar" | "dollars" | "buck" | "bucks" => Some("USD"),
        "€" | "eur" | "euro" | "euros" => Some("EUR"),
        "£" | "gbp" => Some("GBP"),
        "¥" | "jpy" | "yen" => Some("JPY"),
        "c$" | "cad" => Some("CAD"),
        "a$" | "aud" => Some("AUD"),
        "chf" | "franc" | "francs" => Some("CHF"),
        "cn¥" | "cny" | "yuan" => Some("CNY"),
        "₹" | "inr" | "rupee" | "rupees" => Some("INR"),
        "nz$" | "nzd" => Some("NZD"),
        _ => None,
    }
}

pub fn symbol(code: &str) -> &'static str {
    match code {
        "USD" => "$",
        "EUR" => "€",
        "GBP" => "£",
        "JPY" => "¥",
        "CAD" => "C$",
        "AUD" => "A$",
        "CHF" => "CHF",
        "CNY" => "CN¥",
        "INR" => "₹",
        "NZD" => "NZ$",
        _ => "$",
    }
}

pub struct CurrencyTable {
    rates: HashMap<String, f64>,
}

impl CurrencyTable {
    pub fn new() -> Self {
        let mut rates = HashMap::new();
        for (code, rate) in SEED_RATES {
            rates.insert(code.to_string(), *rate);
        }
        CurrencyTable { rates }
    }

    pub fn is_currency(&self, s: &str) -> bool {
        normalize(s).is_some_and(|code| self.rates.contains_key(code))
    }

    fn rate(&self, s: &str) -> Result<f64, CurrencyError> {
        let code = normalize(s).ok_or_else(|| CurrencyError::Unknown(s.to_string()))?;
        self.rates
            .get(code)
            .copied()
            .ok_or_else(|| CurrencyError::Unknown(s.to_string()))
    }

    pub fn convert(&self, amount: f64, from: &str, to: &str) -> Result<f64, CurrencyError> {
        Ok(amount * self.rate(from)? / self.rate(to)?)
    }

    // Rewrites the target's anchor rate so that 1 from = rate to afterwards.
    // The reference currency itself is never re-anchored.
    pub fn set_rate(&mut self, from: &str, to: &str, rate: f64) -> Result<(), CurrencyError> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(CurrencyError::BadRate(rate));
        }
        let from_code = normalize(from).ok_or_else(|| CurrencyError::Unknown(from.to_string()))?;
        let to_code = normalize(to).ok_or_else(|| CurrencyError::Unknown(to.to_string()))?;
        if to_code == REFERENCE {
            // Adjust the other side instead so the anchor keeps rate 1.
            let to_rate = self.rate(to_code)?;
            self.rates.insert(from_code.to_string(), rate * to_rate);
            return Ok(());
        }
        let from_rate = self.rate(from_code)?;
        self.rates.insert(to_code.to_string(), from_rate / rate);
        Ok(())
    }
}
