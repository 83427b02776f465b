use std::collections::HashMap;
use std::rc::Rc;

use chrono::{Datelike, Duration, Local, Months, NaiveDate, NaiveDateTime, Utc, Weekday};

use crate::constants::ConstantTable;
use crate::currency::{self, CurrencyTable};
use crate::formatter;
use crate::parser::{DateWord, Expr, HistoryRef, Locale, Op, WeekShift};
use crate::timezone::{self, TimezoneTable};
use crate::units::{Dimension, UnitTable};

// The tagged result of evaluating one line. Unit and currency payloads keep
// the spelling they arrived with so conversions can echo it back.
#[derive(Debug, Clone)]
pub enum Value {
    Number(f64),
    Unit(f64, String),
    // The symbol slot may carry a rate window, e.g. "£/month".
    Currency(f64, String),
    Percent(f64),
    Date(NaiveDateTime, Option<String>),
    Str(String),
    Error(String),
}

pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Number(_) => "a number",
        Value::Unit(_, _) => "a unit value",
        Value::Currency(_, _) => "a currency amount",
        Value::Percent(_) => "a percentage",
        Value::Date(_, _) => "a date",
        Value::Str(_) => "a string",
        Value::Error(_) => "an error",
    }
}

pub type HistoryHook = Rc<dyn Fn(usize) -> Value>;

// Owned per session; the evaluator is the only writer. History access goes
// through optional hooks so the reduction never reaches into the session.
pub struct Environment {
    pub variables: HashMap<String, Value>,
    pub units: UnitTable,
    pub currencies: CurrencyTable,
    pub timezones: TimezoneTable,
    pub constants: ConstantTable,
    pub locale: Locale,
    pub precision: usize,
    pub history_rel: Option<HistoryHook>,
    pub history_abs: Option<HistoryHook>,
}

impl Environment {
    pub fn new() -> Self {
        Environment {
            variables: HashMap::new(),
            units: UnitTable::new(),
            currencies: CurrencyTable::new(),
            timezones: TimezoneTable::new(),
            constants: ConstantTable::new(),
            locale: Locale::default(),
            precision: 2,
            history_rel: None,
            history_abs: None,
        }
    }
}

pub fn evaluate(expr: &Expr, env: &mut Environment) -> Value {
    match expr {
        Expr::Number(n) => Value::Number(*n),
        Expr::Str(text) => Value::Str(text.clone()),
        Expr::Percent(inner) => match evaluate(inner, env) {
            Value::Number(n) => Value::Percent(n),
            Value::Percent(p) => Value::Percent(p),
            Value::Error(e) => Value::Error(e),
            other => Value::Error(format!("Cannot use {} as a percentage", type_name(&other))),
        },
        Expr::Variable(name) => match env.variables.get(name) {
            Some(value) => value.clone(),
            None => Value::Error(format!("Unknown variable: {}", name)),
        },
        Expr::ConstantRef(name) => match env.constants.get(name) {
            Some(c) if c.unit.is_empty() => Value::Number(c.value),
            Some(c) => Value::Unit(c.value, c.unit.to_string()),
            None => Value::Error(format!("Unknown constant: {}", name)),
        },
        Expr::Assignment(name, inner) => {
            let value = evaluate(inner, env);
            if !matches!(value, Value::Error(_)) {
                env.variables.insert(name.clone(), value.clone());
            }
            value
        }
        Expr::Binary(left, op, right) => {
            let left_val = evaluate(left, env);
            let right_val = evaluate(right, env);
            binary_op(left_val, *op, right_val, env)
        }
        Expr::Negate(inner) => match evaluate(inner, env) {
            Value::Number(n) => Value::Number(-n),
            Value::Unit(v, u) => Value::Unit(-v, u),
            Value::Currency(v, s) => Value::Currency(-v, s),
            Value::Percent(p) => Value::Percent(-p),
            Value::Error(e) => Value::Error(e),
            other => Value::Error(format!("Cannot negate {}", type_name(&other))),
        },
        Expr::WithUnit(inner, unit) => match evaluate(inner, env) {
            Value::Number(n) => Value::Unit(n, unit.clone()),
            Value::Error(e) => Value::Error(e),
            other => Value::Error(format!(
                "Cannot attach unit {} to {}",
                unit,
                type_name(&other)
            )),
        },
        Expr::CurrencyAmount(amount, code) => Value::Currency(*amount, currency::symbol(code).to_string()),
        Expr::PercentOf(percent, value) => {
            let percent_val = evaluate(percent, env);
            let value_val = evaluate(value, env);
            percent_of(percent_val, value_val)
        }
        Expr::PercentChange {
            increase,
            base,
            percent,
        } => {
            let base_val = evaluate(base, env);
            let percent_val = evaluate(percent, env);
            percent_change(*increase, base_val, percent_val)
        }
        Expr::WhatPercent(left, right) => {
            let left_val = evaluate(left, env);
            let right_val = evaluate(right, env);
            what_percent(left_val, right_val, env)
        }
        Expr::Scale(factor, inner) => match evaluate(inner, env) {
            Value::Number(n) => Value::Number(factor * n),
            Value::Unit(v, u) => Value::Unit(factor * v, u),
            Value::Currency(v, s) => Value::Currency(factor * v, s),
            Value::Percent(p) => Value::Percent(factor * p),
            Value::Error(e) => Value::Error(e),
            other => Value::Error(format!("Cannot scale {}", type_name(&other))),
        },
        Expr::Convert(inner, target) => {
            let value = evaluate(inner, env);
            convert_value(value, target, env)
        }
        Expr::DateLiteral(date) => Value::Date(at_midnight(*date), None),
        Expr::TimeOfDay(hours) => Value::Unit(*hours, "time".to_string()),
        Expr::DateKeyword(word) => {
            let today = Local::now().date_naive();
            match word {
                DateWord::Today => Value::Date(at_midnight(today), None),
                DateWord::Tomorrow => Value::Date(at_midnight(today + Duration::days(1)), None),
                DateWord::Yesterday => Value::Date(at_midnight(today - Duration::days(1)), None),
                DateWord::Now => Value::Date(Local::now().naive_local(), None),
            }
        }
        Expr::WeekdayExpr { weekday, shift } => weekday_date(*weekday, *shift),
        Expr::DateOffset {
            amount,
            base,
            forward,
        } => {
            let amount_val = evaluate(amount, env);
            let base_val = evaluate(base, env);
            match (amount_val, base_val) {
                (Value::Error(e), _) | (_, Value::Error(e)) => Value::Error(e),
                (Value::Unit(v, u), Value::Date(dt, zone)) => {
                    shift_date(dt, zone, v, &u, *forward, env)
                }
                (amount, base) => Value::Error(format!(
                    "Cannot offset {} by {}",
                    type_name(&base),
                    type_name(&amount)
                )),
            }
        }
        Expr::HistoryRef(reference) => history_lookup(reference, env),
        Expr::Call(name, args) => call_function(name, args, env),
        Expr::TimeIn(words) => time_in(words, env),
        Expr::TimeShift {
            zone,
            offset,
            negate,
            target,
        } => {
            let offset_val = evaluate(offset, env);
            time_shift(zone, offset_val, *negate, target.as_deref(), env)
        }
        Expr::TimeDifference { words, unit } => time_difference(words, unit.as_deref(), env),
        Expr::Error(msg) => Value::Error(msg.clone()),
        // Directives are dispatched by the session before evaluation.
        Expr::DefineUnit { .. }
        | Expr::UnitCommand(_)
        | Expr::ArgDirective { .. }
        | Expr::Command { .. } => Value::Error("Directives are not expressions".to_string()),
    }
}

fn at_midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_hms_opt(0, 0, 0).expect("midnight is a valid time")
}

// The numeric payload aggregation functions reduce on.
fn number_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => Some(*n),
        Value::Unit(v, _) => Some(*v),
        Value::Currency(v, _) => Some(*v),
        Value::Percent(p) => Some(*p),
        _ => None,
    }
}

fn binary_op(left: Value, op: Op, right: Value, env: &Environment) -> Value {
    match (left, op, right) {
        // Errors short-circuit through every operation.
        (Value::Error(e), _, _) => Value::Error(e),
        (_, _, Value::Error(e)) => Value::Error(e),

        // Date arithmetic: only time-dimensioned units shift a date.
        (Value::Date(dt, zone), Op::Add, Value::Unit(v, u)) => {
            shift_date(dt, zone, v, &u, true, env)
        }
        (Value::Date(dt, zone), Op::Subtract, Value::Unit(v, u)) => {
            shift_date(dt, zone, v, &u, false, env)
        }
        (Value::Unit(v, u), Op::Add, Value::Date(dt, zone)) => {
            shift_date(dt, zone, v, &u, true, env)
        }
        (Value::Date(a, _), Op::Subtract, Value::Date(b, _)) => {
            let days = (a - b).num_seconds() as f64 / 86400.0;
            Value::Unit(days, "days".to_string())
        }
        (Value::Date(_, _), _, other) => Value::Error(format!(
            "Cannot combine a date with {} here",
            type_name(&other)
        )),
        (other, _, Value::Date(_, _)) => Value::Error(format!(
            "Cannot combine {} with a date here",
            type_name(&other)
        )),

        // Percent arithmetic sticks to the other operand's magnitude.
        (Value::Number(a), op @ (Op::Add | Op::Subtract), Value::Percent(p)) => {
            let sign = if op == Op::Add { 1.0 } else { -1.0 };
            Value::Number(a + sign * a * p / 100.0)
        }
        (Value::Unit(a, u), op @ (Op::Add | Op::Subtract), Value::Percent(p)) => {
            let sign = if op == Op::Add { 1.0 } else { -1.0 };
            Value::Unit(a + sign * a * p / 100.0, u)
        }
        (Value::Currency(a, s), op @ (Op::Add | Op::Subtract), Value::Percent(p)) => {
            let sign = if op == Op::Add { 1.0 } else { -1.0 };
            Value::Currency(a + sign * a * p / 100.0, s)
        }
        (Value::Number(a), Op::Multiply, Value::Percent(p)) => Value::Number(a * p / 100.0),
        (Value::Percent(p), Op::Multiply, Value::Number(a)) => Value::Number(a * p / 100.0),
        (Value::Unit(a, u), Op::Multiply, Value::Percent(p)) => Value::Unit(a * p / 100.0, u),
        (Value::Percent(p), Op::Multiply, Value::Unit(a, u)) => Value::Unit(a * p / 100.0, u),
        (Value::Currency(a, s), Op::Multiply, Value::Percent(p)) => {
            Value::Currency(a * p / 100.0, s)
        }
        (Value::Percent(p), Op::Multiply, Value::Currency(a, s)) => {
            Value::Currency(a * p / 100.0, s)
        }
        (Value::Percent(p), op @ (Op::Add | Op::Subtract), Value::Percent(q)) => {
            let sign = if op == Op::Add { 1.0 } else { -1.0 };
            Value::Percent(p + sign * q)
        }

        // Currency arithmetic converts the right side into the left currency.
        (Value::Currency(a, sa), op @ (Op::Add | Op::Subtract), Value::Currency(b, sb)) => {
            let sign = if op == Op::Add { 1.0 } else { -1.0 };
            if sa == sb {
                return Value::Currency(a + sign * b, sa);
            }
            let (head_a, window_a) = split_symbol(&sa);
            let (head_b, window_b) = split_symbol(&sb);
            if window_a != window_b {
                return Value::Error(format!("Incompatible units: {} and {}", sa, sb));
            }
            match env.currencies.convert(b, head_b, head_a) {
                Ok(converted) => Value::Currency(a + sign * converted, sa),
                Err(e) => Value::Error(e.to_string()),
            }
        }
        (Value::Currency(_, _), Op::Multiply, Value::Currency(_, _)) => {
            Value::Error("Cannot multiply two currency amounts".to_string())
        }
        (Value::Currency(a, sa), Op::Divide, Value::Currency(b, sb)) => {
            let (head_a, _) = split_symbol(&sa);
            let (head_b, _) = split_symbol(&sb);
            match env.currencies.convert(b, head_b, head_a) {
                Ok(converted) if converted == 0.0 => Value::Error("Division by zero".to_string()),
                Ok(converted) => Value::Number(a / converted),
                Err(e) => Value::Error(e.to_string()),
            }
        }
        (Value::Currency(a, s), Op::Multiply, Value::Number(n)) => Value::Currency(a * n, s),
        (Value::Number(n), Op::Multiply, Value::Currency(a, s)) => Value::Currency(a * n, s),
        (Value::Currency(a, s), Op::Divide, Value::Number(n)) => {
            if n == 0.0 {
                Value::Error("Division by zero".to_string())
            } else {
                Value::Currency(a / n, s)
            }
        }
        (Value::Currency(a, s), op @ (Op::Add | Op::Subtract), Value::Number(n)) => {
            let sign = if op == Op::Add { 1.0 } else { -1.0 };
            Value::Currency(a + sign * n, s)
        }
        (Value::Number(n), op @ (Op::Add | Op::Subtract), Value::Currency(b, s)) => {
            let sign = if op == Op::Add { 1.0 } else { -1.0 };
            Value::Currency(n + sign * b, s)
        }
        // A currency divided by a time span becomes a rate, "$/day".
        (Value::Currency(a, s), Op::Divide, Value::Unit(n, u)) => {
            match env.units.get(&u).map(|unit| unit.dimension) {
                Some(Dimension::Time) => {
                    if n == 0.0 {
                        Value::Error("Division by zero".to_string())
                    } else {
                        Value::Currency(a / n, format!("{}/{}", s, u))
                    }
                }
                Some(_) => Value::Error(format!("Cannot divide a currency amount by {}", u)),
                None => Value::Error(format!("Unknown unit: {}", u)),
            }
        }

        // Unit arithmetic: convert the right side to the left unit when the
        // dimensions agree; division of unrelated units forms a rate.
        (Value::Unit(a, ua), op @ (Op::Add | Op::Subtract), Value::Unit(b, ub)) => {
            let sign = if op == Op::Add { 1.0 } else { -1.0 };
            if ua == ub {
                return Value::Unit(a + sign * b, ua);
            }
            match env.units.convert_compound(b, &ub, &ua) {
                Ok(converted) => Value::Unit(a + sign * converted, ua),
                Err(e) => Value::Error(e.to_string()),
            }
        }
        (Value::Unit(a, u), Op::Multiply, Value::Number(n)) => Value::Unit(a * n, u),
        (Value::Number(n), Op::Multiply, Value::Unit(a, u)) => Value::Unit(a * n, u),
        (Value::Unit(a, u), Op::Divide, Value::Number(n)) => {
            if n == 0.0 {
                Value::Error("Division by zero".to_string())
            } else {
                Value::Unit(a / n, u)
            }
        }
        (Value::Number(n), op @ (Op::Add | Op::Subtract), Value::Unit(b, u)) => {
            let sign = if op == Op::Add { 1.0 } else { -1.0 };
            Value::Unit(n + sign * b, u)
        }
        (Value::Unit(a, ua), Op::Multiply, Value::Unit(b, ub)) => {
            Value::Unit(a * b, format!("{}*{}", ua, ub))
        }
        (Value::Unit(a, ua), Op::Divide, Value::Unit(b, ub)) => {
            if b == 0.0 {
                return Value::Error("Division by zero".to_string());
            }
            // Same dimension divides out to a plain ratio.
            if let Ok(converted) = env.units.convert_compound(b, &ub, &ua) {
                if converted == 0.0 {
                    return Value::Error("Division by zero".to_string());
                }
                return Value::Number(a / converted);
            }
            if ua.contains('/') || ub.contains('/') {
                return Value::Error(format!("Cannot divide {} by {}", ua, ub));
            }
            Value::Unit(a / b, format!("{}/{}", ua, ub))
        }

        (Value::Number(a), Op::Add, Value::Number(b)) => Value::Number(a + b),
        (Value::Number(a), Op::Subtract, Value::Number(b)) => Value::Number(a - b),
        (Value::Number(a), Op::Multiply, Value::Number(b)) => Value::Number(a * b),
        (Value::Number(a), Op::Divide, Value::Number(b)) => {
            if b == 0.0 {
                Value::Error("Division by zero".to_string())
            } else {
                Value::Number(a / b)
            }
        }

        (a, op, b) => Value::Error(format!(
            "Cannot {} {} and {}",
            op_verb(op),
            type_name(&a),
            type_name(&b)
        )),
    }
}

fn op_verb(op: Op) -> &'static str {
    match op {
        Op::Add => "add",
        Op::Subtract => "subtract",
        Op::Multiply => "multiply",
        Op::Divide => "divide",
    }
}

fn split_symbol(sym: &str) -> (&str, Option<&str>) {
    match sym.split_once('/') {
        Some((head, window)) => (head, Some(window)),
        None => (sym, None),
    }
}

// "p% of X" keeps X's variant: currency in, currency out.
fn percent_of(percent: Value, value: Value) -> Value {
    let p = match percent {
        Value::Percent(p) | Value::Number(p) => p,
        Value::Error(e) => return Value::Error(e),
        other => {
            return Value::Error(format!("Cannot use {} as a percentage", type_name(&other)))
        }
    };
    match value {
        Value::Number(v) => Value::Number(p / 100.0 * v),
        Value::Unit(v, u) => Value::Unit(p / 100.0 * v, u),
        Value::Currency(v, s) => Value::Currency(p / 100.0 * v, s),
        Value::Percent(v) => Value::Percent(p / 100.0 * v),
        Value::Error(e) => Value::Error(e),
        other => Value::Error(format!(
            "Cannot take a percentage of {}",
            type_name(&other)
        )),
    }
}

fn percent_change(increase: bool, base: Value, percent: Value) -> Value {
    let p = match percent {
        Value::Percent(p) | Value::Number(p) => p,
        Value::Error(e) => return Value::Error(e),
        other => {
            return Value::Error(format!("Cannot use {} as a percentage", type_name(&other)))
        }
    };
    let factor = if increase {
        1.0 + p / 100.0
    } else {
        1.0 - p / 100.0
    };
    match base {
        Value::Number(v) => Value::Number(v * factor),
        Value::Unit(v, u) => Value::Unit(v * factor, u),
        Value::Currency(v, s) => Value::Currency(v * factor, s),
        Value::Error(e) => Value::Error(e),
        other => Value::Error(format!("Cannot change {} by a percentage", type_name(&other))),
    }
}

// "X is what % of Y": converts to a common footing first when both sides are
// currencies or compatible units.
fn what_percent(left: Value, right: Value, env: &Environment) -> Value {
    if let Value::Error(e) = &left {
        return Value::Error(e.clone());
    }
    if let Value::Error(e) = &right {
        return Value::Error(e.clone());
    }
    let pair = match (&left, &right) {
        (Value::Currency(a, sa), Value::Currency(b, sb)) => {
            let (head_a, _) = split_symbol(sa);
            let (head_b, _) = split_symbol(sb);
            match env.currencies.convert(*b, head_b, head_a) {
                Ok(converted) => Some((*a, converted)),
                Err(e) => return Value::Error(e.to_string()),
            }
        }
        (Value::Unit(a, ua), Value::Unit(b, ub)) => {
            if ua == ub {
                Some((*a, *b))
            } else {
                match env.units.convert_compound(*b, ub, ua) {
                    Ok(converted) => Some((*a, converted)),
                    Err(e) => return Value::Error(e.to_string()),
                }
            }
        }
        _ => match (number_of(&left), number_of(&right)) {
            (Some(a), Some(b)) => Some((a, b)),
            _ => None,
        },
    };
    match pair {
        Some((_, b)) if b == 0.0 => Value::Error("Division by zero".to_string()),
        Some((a, b)) => Value::Percent(a / b * 100.0),
        None => Value::Error(format!(
            "Cannot compare {} with {}",
            type_name(&left),
            type_name(&right)
        )),
    }
}

// Conversion node. The interesting path is a currency-per-time rate moving to
// another currency and time window.
fn convert_value(value: Value, target: &str, env: &Environment) -> Value {
    match value {
        Value::Error(e) => Value::Error(e),
        Value::Currency(amount, sym) => {
            let (head, window) = split_symbol(&sym);
            let head_code = match currency::normalize(head) {
                Some(code) => code,
                None => return Value::Error(format!("Unknown currency: {}", head)),
            };
            match (window, target.split_once('/')) {
                // $/day in gbp/month: rescale the window, then the currency.
                (Some(window), Some((t_cur, t_window))) => {
                    let t_code = match currency::normalize(t_cur) {
                        Some(code) => code,
                        None => {
                            return Value::Error(format!("Unknown currency: {}", t_cur))
                        }
                    };
                    if !is_time_unit(t_window, env) {
                        return Value::Error(format!("Incompatible units: {} and {}", sym, target));
                    }
                    let window_scale = match env.units.convert(1.0, t_window, window) {
                        Ok(scale) => scale,
                        Err(e) => return Value::Error(e.to_string()),
                    };
                    match env.currencies.convert(amount * window_scale, head_code, t_code) {
                        Ok(converted) => Value::Currency(
                            converted,
                            format!("{}/{}", currency::symbol(t_code), t_window),
                        ),
                        Err(e) => Value::Error(e.to_string()),
                    }
                }
                // $/day in gbp: convert the currency, keep the window.
                (Some(window), None) => match currency::normalize(target) {
                    Some(t_code) => match env.currencies.convert(amount, head_code, t_code) {
                        Ok(converted) => Value::Currency(
                            converted,
                            format!("{}/{}", currency::symbol(t_code), window),
                        ),
                        Err(e) => Value::Error(e.to_string()),
                    },
                    None => Value::Error(format!("Unknown currency: {}", target)),
                },
                (None, None) => match currency::normalize(target) {
                    Some(t_code) => match env.currencies.convert(amount, head_code, t_code) {
                        Ok(converted) => {
                            Value::Currency(converted, currency::symbol(t_code).to_string())
                        }
                        Err(e) => Value::Error(e.to_string()),
                    },
                    None => Value::Error(format!(
                        "Cannot convert a currency amount to {}",
                        target
                    )),
                },
                (None, Some(_)) => Value::Error(format!(
                    "Cannot convert a currency amount to {}",
                    target
                )),
            }
        }
        Value::Unit(v, unit) => {
            if currency::normalize(target).is_some() {
                return Value::Error(format!("Cannot convert {} to a currency", unit));
            }
            match env.units.convert_compound(v, &unit, target) {
                Ok(converted) => Value::Unit(converted, target.to_string()),
                Err(e) => Value::Error(e.to_string()),
            }
        }
        // A bare number upcasts into the target unit or currency.
        Value::Number(n) => {
            if let Some(code) = currency::normalize(target) {
                return Value::Currency(n, currency::symbol(code).to_string());
            }
            let known = if target.contains('/') {
                env.units.parse_compound(target).is_ok()
            } else {
                env.units.is_unit(target)
            };
            if known {
                Value::Unit(n, target.to_string())
            } else {
                Value::Error(format!("Unknown unit: {}", target))
            }
        }
        other => Value::Error(format!("Cannot convert {} to {}", type_name(&other), target)),
    }
}

fn is_time_unit(name: &str, env: &Environment) -> bool {
    env.units
        .get(name)
        .is_some_and(|u| u.dimension == Dimension::Time)
}

// Dates shift by calendar months and years when the amount is whole; all the
// other granularities are exact second spans.
fn shift_date(
    dt: NaiveDateTime,
    zone: Option<String>,
    amount: f64,
    unit_name: &str,
    forward: bool,
    env: &Environment,
) -> Value {
    let unit = match env.units.get(unit_name) {
        Some(u) => u.clone(),
        None => return Value::Error(format!("Unknown unit: {}", unit_name)),
    };
    if unit.dimension != Dimension::Time {
        return Value::Error(format!("Cannot shift a date by {}", unit_name));
    }
    let signed = if forward { amount } else { -amount };
    let months = match unit.name.as_str() {
        "month" if signed.fract() == 0.0 => Some(signed),
        "year" if signed.fract() == 0.0 => Some(signed * 12.0),
        _ => None,
    };
    if let Some(months) = months {
        let shifted = if months >= 0.0 {
            dt.checked_add_months(Months::new(months as u32))
        } else {
            dt.checked_sub_months(Months::new((-months) as u32))
        };
        return match shifted {
            Some(date) => Value::Date(date, zone),
            None => Value::Error("Date out of range".to_string()),
        };
    }
    let seconds = signed * unit.to_base;
    Value::Date(dt + Duration::milliseconds((seconds * 1000.0).round() as i64), zone)
}

fn weekday_date(weekday: Weekday, shift: WeekShift) -> Value {
    let today = Local::now().date_naive();
    let today_from_monday = today.weekday().num_days_from_monday();
    let target_from_monday = weekday.num_days_from_monday();
    let date = match shift {
        WeekShift::NextNonStrict => {
            let ahead = (target_from_monday + 7 - today_from_monday) % 7;
            today + Duration::days(ahead as i64)
        }
        WeekShift::NextStrict => {
            let ahead = (target_from_monday + 7 - today_from_monday) % 7;
            let ahead = if ahead == 0 { 7 } else { ahead };
            today + Duration::days(ahead as i64)
        }
        WeekShift::LastStrict => {
            let back = (today_from_monday + 7 - target_from_monday) % 7;
            let back = if back == 0 { 7 } else { back };
            today - Duration::days(back as i64)
        }
    };
    Value::Date(at_midnight(date), None)
}

fn history_lookup(reference: &HistoryRef, env: &Environment) -> Value {
    match reference {
        HistoryRef::Rel(offset) => match &env.history_rel {
            Some(hook) => hook(*offset),
            None => Value::Error("prev is only available in REPL mode".to_string()),
        },
        HistoryRef::Abs(line_id) => match &env.history_abs {
            Some(hook) => hook(*line_id),
            None => Value::Error("prev is only available in REPL mode".to_string()),
        },
    }
}

fn call_function(name: &str, args: &[Expr], env: &mut Environment) -> Value {
    if name == "print" {
        return call_print(args, env);
    }
    let mut numbers = Vec::with_capacity(args.len());
    for arg in args {
        let value = evaluate(arg, env);
        if let Value::Error(e) = value {
            return Value::Error(e);
        }
        match number_of(&value) {
            Some(n) => numbers.push(n),
            None => {
                return Value::Error(format!(
                    "{}() cannot aggregate {}",
                    name,
                    type_name(&value)
                ))
            }
        }
    }
    match name {
        "sum" | "total" => Value::Number(numbers.iter().sum()),
        "average" | "mean" => {
            if numbers.is_empty() {
                Value::Error("average() requires at least one argument".to_string())
            } else {
                Value::Number(numbers.iter().sum::<f64>() / numbers.len() as f64)
            }
        }
        "min" => match numbers.iter().copied().reduce(f64::min) {
            Some(n) => Value::Number(n),
            None => Value::Error("min() requires at least one argument".to_string()),
        },
        "max" => match numbers.iter().copied().reduce(f64::max) {
            Some(n) => Value::Number(n),
            None => Value::Error("max() requires at least one argument".to_string()),
        },
        _ => Value::Error(format!("Unknown function: {}", name)),
    }
}

// print("{x} and {y}") substitutes formatted variable values.
fn call_print(args: &[Expr], env: &mut Environment) -> Value {
    let text = match args {
        [single] => match evaluate(single, env) {
            Value::Str(text) => text,
            Value::Error(e) => return Value::Error(e),
            other => {
                return Value::Error(format!(
                    "print() expects a string, got {}",
                    type_name(&other)
                ))
            }
        },
        _ => return Value::Error("print() expects exactly one string".to_string()),
    };
    let mut out = String::with_capacity(text.len());
    let mut rest = text.as_str();
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let name = &after[..close];
                match env.variables.get(name) {
                    Some(value) => {
                        out.push_str(&formatter::format_value(value, env.locale, env.precision))
                    }
                    None => return Value::Error(format!("Unknown variable: {}", name)),
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    Value::Str(out)
}

fn time_in(words: &[String], env: &Environment) -> Value {
    let zone = words.join(" ");
    match env.timezones.offset(&zone) {
        Ok(offset) => Value::Date(
            Utc::now().naive_utc() + Duration::hours(offset as i64),
            Some(timezone::display_name(&zone)),
        ),
        Err(e) => Value::Error(e.to_string()),
    }
}

// "time in A + 3 hours in B": clock time in A, shifted, re-expressed in B.
fn time_shift(
    zone: &[String],
    offset: Value,
    negate: bool,
    target: Option<&[String]>,
    env: &Environment,
) -> Value {
    let zone_name = zone.join(" ");
    let offset_a = match env.timezones.offset(&zone_name) {
        Ok(offset) => offset,
        Err(e) => return Value::Error(e.to_string()),
    };
    let seconds = match &offset {
        Value::Unit(v, u) => match env.units.get(u) {
            Some(unit) if unit.dimension == Dimension::Time => v * unit.to_base,
            Some(_) => return Value::Error(format!("Cannot shift a time by {}", u)),
            None => return Value::Error(format!("Unknown unit: {}", u)),
        },
        Value::Error(e) => return Value::Error(e.clone()),
        other => {
            return Value::Error(format!("Cannot shift a time by {}", type_name(other)))
        }
    };
    let signed = if negate { -seconds } else { seconds };
    let mut result = Utc::now().naive_utc()
        + Duration::hours(offset_a as i64)
        + Duration::milliseconds((signed * 1000.0).round() as i64);
    let label = match target {
        Some(words) => {
            let target_name = words.join(" ");
            let offset_b = match env.timezones.offset(&target_name) {
                Ok(offset) => offset,
                Err(e) => return Value::Error(e.to_string()),
            };
            result = result + Duration::hours((offset_b - offset_a) as i64);
            timezone::display_name(&target_name)
        }
        None => timezone::display_name(&zone_name),
    };
    Value::Date(result, Some(label))
}

// Splits the word list into two known zone names; the signed difference is
// offset(B) - offset(A) in whole hours.
fn time_difference(words: &[String], unit: Option<&str>, env: &Environment) -> Value {
    for split in 1..words.len() {
        let a = words[..split].join(" ");
        let b = words[split..].join(" ");
        if env.timezones.is_timezone(&a) && env.timezones.is_timezone(&b) {
            let offset_a = match env.timezones.offset(&a) {
                Ok(offset) => offset,
                Err(e) => return Value::Error(e.to_string()),
            };
            let offset_b = match env.timezones.offset(&b) {
                Ok(offset) => offset,
                Err(e) => return Value::Error(e.to_string()),
            };
            let hours = (offset_b - offset_a) as f64;
            return match unit {
                None => Value::Unit(hours, "hours".to_string()),
                Some(unit) => match env.units.convert(hours, "h", unit) {
                    Ok(converted) => Value::Unit(converted, unit.to_string()),
                    Err(e) => Value::Error(e.to_string()),
                },
            };
        }
    }
    Value::Error(format!("Unknown timezone: {}", words.join(" ")))
}
