use chrono::{NaiveDateTime, Timelike};

use crate::evaluator::Value;
use crate::parser::Locale;

// Renders a value with the locale's separators. Numbers round to the session
// precision and drop trailing zeros.
pub fn format_value(value: &Value, locale: Locale, precision: usize) -> String {
    match value {
        Value::Number(n) => format_number(*n, locale, precision),
        // The clock marker unit renders back as HH:MM.
        Value::Unit(v, u) if u == "time" => format_clock(*v),
        Value::Unit(v, u) => format!("{} {}", format_number(*v, locale, precision), u),
        Value::Currency(v, sym) => {
            let (head, window) = match sym.split_once('/') {
                Some((head, window)) => (head, Some(window)),
                None => (sym.as_str(), None),
            };
            let sign = if *v < 0.0 { "-" } else { "" };
            let amount = format_number(v.abs(), locale, precision);
            match window {
                Some(window) => format!("{}{}{}/{}", sign, head, amount, window),
                None => format!("{}{}{}", sign, head, amount),
            }
        }
        Value::Percent(p) => format!("{}%", format_number(*p, locale, precision)),
        Value::Date(dt, zone) => format_date(dt, zone.as_deref()),
        Value::Str(text) => text.clone(),
        Value::Error(msg) => format!("Error: {}", msg),
    }
}

pub fn format_number(n: f64, locale: Locale, precision: usize) -> String {
    if !n.is_finite() {
        return format!("{}", n);
    }
    let rounded = format!("{:.*}", precision, n.abs());
    let (int_part, frac_part) = match rounded.split_once('.') {
        Some((int_part, frac_part)) => (int_part, frac_part),
        None => (rounded.as_str(), ""),
    };
    let frac_trimmed = frac_part.trim_end_matches('0');
    let grouped = group_thousands(int_part, locale.thousands_separator());
    let mut out = String::new();
    if n < 0.0 && (int_part != "0" || !frac_trimmed.is_empty()) {
        out.push('-');
    }
    out.push_str(&grouped);
    if !frac_trimmed.is_empty() {
        out.push(locale.decimal_separator());
        out.push_str(frac_trimmed);
    }
    out
}

// Backward walk inserting a separator every third digit.
fn group_thousands(digits: &str, separator: char) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    let mut count = 0;
    for ch in digits.chars().rev() {
        if count > 0 && count % 3 == 0 {
            out.push(separator);
        }
        out.push(ch);
        count += 1;
    }
    out.chars().rev().collect()
}

fn format_clock(hours: f64) -> String {
    let total_minutes = (hours * 60.0).round() as i64;
    format!("{}:{:02}", total_minutes / 60, total_minutes.rem_euclid(60))
}

// "D Mon YYYY" for midnight instants, otherwise with the clock and zone.
fn format_date(dt: &NaiveDateTime, zone: Option<&str>) -> String {
    let midnight = dt.hour() == 0 && dt.minute() == 0 && dt.second() == 0;
    if midnight && zone.is_none() {
        return dt.format("%-d %b %Y").to_string();
    }
    let mut out = dt.format("%-d %b %Y %H:%M:%S").to_string();
    if let Some(zone) = zone {
        out.push(' ');
        out.push_str(zone);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_number_precision_and_trimming() {
        assert_eq!(format_number(30.0, Locale::EnUs, 2), "30");
        assert_eq!(format_number(23.333333, Locale::EnUs, 2), "23.33");
        assert_eq!(format_number(-0.004, Locale::EnUs, 2), "0");
        assert_eq!(format_number(2.6, Locale::EnUs, 0), "3");
    }

    #[test]
    fn test_thousands_separators() {
        assert_eq!(format_number(1234567.891, Locale::EnUs, 2), "1,234,567.89");
        assert_eq!(format_number(1234567.891, Locale::DeDe, 2), "1.234.567,89");
    }

    #[test]
    fn test_currency_rendering() {
        let v = Value::Currency(766.4, "£/month".to_string());
        assert_eq!(format_value(&v, Locale::EnUs, 2), "£766.4/month");
        let v = Value::Currency(-5.25, "$".to_string());
        assert_eq!(format_value(&v, Locale::EnUs, 2), "-$5.25");
    }

    #[test]
    fn test_date_rendering() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 21).unwrap();
        let v = Value::Date(date.and_hms_opt(0, 0, 0).unwrap(), None);
        assert_eq!(format_value(&v, Locale::EnUs, 2), "21 Jan 2025");
        let v = Value::Date(date.and_hms_opt(9, 5, 0).unwrap(), Some("Sydney".to_string()));
        assert_eq!(format_value(&v, Locale::EnUs, 2), "21 Jan 2025 09:05:00 Sydney");
    }

    #[test]
    fn test_clock_unit() {
        let v = Value::Unit(14.5, "time".to_string());
        assert_eq!(format_value(&v, Locale::EnUs, 2), "14:30");
    }

    #[test]
    fn test_error_rendering() {
        let v = Value::Error("Division by zero".to_string());
        assert_eq!(format_value(&v, Locale::EnUs, 2), "Error: Division by zero");
    }
}
