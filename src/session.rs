use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;

use crate::evaluator::{self, Environment, Value};
use crate::formatter;
use crate::lexer::{self, Predicates};
use crate::parser::{self, Expr, Locale, UnitCmd};

// One line in, at most one line out.
#[derive(Debug, PartialEq)]
pub enum LineOutcome {
    Output(String),
    Silent,
    Quit,
}

impl LineOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self, LineOutcome::Output(text) if text.starts_with("Error:"))
    }
}

// Drives the lex -> parse -> evaluate -> format pipeline and owns the ordered
// history. Line ids are 1-based and never reused.
pub struct Session {
    pub env: Environment,
    history: Option<Rc<RefCell<Vec<Value>>>>,
    args: HashMap<String, String>,
    units_path: PathBuf,
}

impl Session {
    // A session without history: prev* lookups report REPL-only.
    pub fn new(locale: Locale) -> Self {
        let mut env = Environment::new();
        env.locale = locale;
        Session {
            env,
            history: None,
            args: HashMap::new(),
            units_path: default_units_path(),
        }
    }

    // REPL and script sessions carry history; the hooks share it with the
    // evaluator so reduction never borrows the session.
    pub fn with_history(locale: Locale) -> Self {
        let mut session = Session::new(locale);
        let history = Rc::new(RefCell::new(Vec::<Value>::new()));

        let rel = history.clone();
        session.env.history_rel = Some(Rc::new(move |offset| {
            let hist = rel.borrow();
            if offset < hist.len() {
                hist[hist.len() - 1 - offset].clone()
            } else {
                Value::Error(format!("History index out of range: prev~{}", offset))
            }
        }));

        let abs = history.clone();
        session.env.history_abs = Some(Rc::new(move |line_id| {
            let hist = abs.borrow();
            if line_id >= 1 && line_id <= hist.len() {
                hist[line_id - 1].clone()
            } else {
                Value::Error(format!("History index out of range: prev#{}", line_id))
            }
        }));

        session.history = Some(history);
        session
    }

    pub fn set_args(&mut self, args: HashMap<String, String>) {
        self.args = args;
    }

    // Loads previously saved custom units, if any.
    pub fn load_units(&mut self) {
        if self.units_path.exists() {
            let path = self.units_path.clone();
            self.env.units.load(&path).ok();
        }
    }

    pub fn eval_line(&mut self, line: &str) -> LineOutcome {
        let tokens = {
            let units = &self.env.units;
            let constants = &self.env.constants;
            let is_unit = |s: &str| units.is_unit(s);
            let is_constant = |s: &str| constants.is_constant(s);
            lexer::tokenize(
                line,
                &Predicates {
                    is_unit: &is_unit,
                    is_constant: &is_constant,
                },
            )
        };
        // Blank lines and comment-only lines produce no response.
        if tokens.len() == 1 {
            return LineOutcome::Silent;
        }
        let expr = parser::parse_line(&tokens, self.env.locale);
        match expr {
            Expr::DefineUnit { name, value } => self.define_unit(&name, &value),
            Expr::UnitCommand(cmd) => self.unit_command(&cmd),
            Expr::ArgDirective { name, .. } => self.arg_directive(&name),
            Expr::Command { name, args } => self.command(&name, &args),
            expr => {
                let value = evaluator::evaluate(&expr, &mut self.env);
                if let Some(history) = &self.history {
                    history.borrow_mut().push(value.clone());
                }
                LineOutcome::Output(formatter::format_value(
                    &value,
                    self.env.locale,
                    self.env.precision,
                ))
            }
        }
    }

    // Evaluates a bare expression outside the line protocol (script args).
    fn eval_text(&mut self, text: &str) -> Value {
        let tokens = {
            let units = &self.env.units;
            let constants = &self.env.constants;
            let is_unit = |s: &str| units.is_unit(s);
            let is_constant = |s: &str| constants.is_constant(s);
            lexer::tokenize(
                text,
                &Predicates {
                    is_unit: &is_unit,
                    is_constant: &is_constant,
                },
            )
        };
        let expr = parser::parse_line(&tokens, self.env.locale);
        evaluator::evaluate(&expr, &mut self.env)
    }

    // ":unit NAME = EXPR" requires the expression to reduce to a unit value;
    // the factor and reference unit come out of the evaluated result.
    fn define_unit(&mut self, name: &str, value: &Expr) -> LineOutcome {
        match evaluator::evaluate(value, &mut self.env) {
            Value::Unit(amount, base) => match self.env.units.add_custom(name, amount, &base) {
                Ok(()) => LineOutcome::Silent,
                Err(e) => LineOutcome::Output(format!("Error: {}", e)),
            },
            Value::Error(e) => LineOutcome::Output(format!("Error: {}", e)),
            other => LineOutcome::Output(format!(
                "Error: Bad unit definition: {} must reduce to a unit value, got {}",
                name,
                evaluator::type_name(&other)
            )),
        }
    }

    fn unit_command(&mut self, cmd: &UnitCmd) -> LineOutcome {
        match cmd {
            UnitCmd::List(filter) => {
                let mut parts = Vec::new();
                if filter.as_deref() != Some("custom") {
                    parts.extend(self.env.units.builtin_names());
                }
                if filter.as_deref() != Some("builtin") {
                    for unit in self.env.units.custom_units() {
                        parts.push(format!("{} (custom)", unit.name));
                    }
                }
                if parts.is_empty() {
                    return LineOutcome::Output("no custom units defined".to_string());
                }
                LineOutcome::Output(parts.join(", "))
            }
            UnitCmd::Show(name) => match self.env.units.get(name) {
                Some(unit) => {
                    let kind = if unit.is_custom { "custom" } else { "builtin" };
                    LineOutcome::Output(format!(
                        "{}: {} ({}), 1 {} = {} {}",
                        unit.name,
                        unit.dimension.label(),
                        kind,
                        unit.name,
                        unit.to_base,
                        unit.base_unit
                    ))
                }
                None => LineOutcome::Output(format!("Error: Unknown unit: {}", name)),
            },
            UnitCmd::Delete(name) => match self.env.units.remove_custom(name) {
                Ok(()) => LineOutcome::Silent,
                Err(e) => LineOutcome::Output(format!("Error: {}", e)),
            },
        }
    }

    // ":arg name" binds a script argument into the variable environment.
    fn arg_directive(&mut self, name: &str) -> LineOutcome {
        match self.args.get(name).cloned() {
            Some(text) => match self.eval_text(&text) {
                Value::Error(e) => LineOutcome::Output(format!("Error: {}", e)),
                value => {
                    self.env.variables.insert(name.to_string(), value);
                    LineOutcome::Silent
                }
            },
            None => LineOutcome::Output(format!("Error: Argument not supplied: {}", name)),
        }
    }

    fn command(&mut self, name: &str, args: &[String]) -> LineOutcome {
        match name {
            "set" => self.set_option(args),
            "save" => {
                let path = match args.first() {
                    Some(path) => PathBuf::from(path),
                    None => self.units_path.clone(),
                };
                match self.env.units.save(&path) {
                    Ok(()) => LineOutcome::Silent,
                    Err(e) => LineOutcome::Output(format!("Error: {}", e)),
                }
            }
            "help" => LineOutcome::Output(
                "expressions: 2 km in mi, 32 dollars per day in gbp per month, 20% of 50, \
                 next monday + 2 weeks, time in london; commands: :unit, :arg, :set, :save, :quit"
                    .to_string(),
            ),
            "quit" | "q" => LineOutcome::Quit,
            other => LineOutcome::Output(format!("Error: Unknown command: :{}", other)),
        }
    }

    fn set_option(&mut self, args: &[String]) -> LineOutcome {
        match args.first().map(String::as_str) {
            Some("locale") => match args.get(1).and_then(|tag| Locale::from_tag(tag)) {
                Some(locale) => {
                    self.env.locale = locale;
                    LineOutcome::Silent
                }
                None => LineOutcome::Output(format!(
                    "Error: Unknown locale: {}",
                    args.get(1).map(String::as_str).unwrap_or("")
                )),
            },
            Some("precision") => match args.get(1).and_then(|n| n.parse::<usize>().ok()) {
                Some(precision) => {
                    self.env.precision = precision;
                    LineOutcome::Silent
                }
                None => LineOutcome::Output("Error: precision expects a number".to_string()),
            },
            // ":set rate usd gbp 0.8" pins 1 usd = 0.8 gbp.
            Some("rate") => match (args.get(1), args.get(2), args.get(3)) {
                (Some(from), Some(to), Some(rate)) => match rate.parse::<f64>() {
                    Ok(rate) => match self.env.currencies.set_rate(from, to, rate) {
                        Ok(()) => LineOutcome::Silent,
                        Err(e) => LineOutcome::Output(format!("Error: {}", e)),
                    },
                    Err(_) => LineOutcome::Output(format!("Error: Invalid rate: {}", rate)),
                },
                _ => LineOutcome::Output(
                    "Error: usage: :set rate <from> <to> <rate>".to_string(),
                ),
            },
            Some(other) => LineOutcome::Output(format!("Error: Unknown option: {}", other)),
            None => LineOutcome::Output("Error: usage: :set <option> <value>".to_string()),
        }
    }
}

fn default_units_path() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".calc_units.json"),
        None => PathBuf::from("calc_units.json"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(session: &mut Session, line: &str) -> String {
        match session.eval_line(line) {
            LineOutcome::Output(text) => text,
            other => panic!("Expected output for {:?}, got {:?}", line, other),
        }
    }

    #[test]
    fn test_history_ordering() {
        let mut session = Session::with_history(Locale::EnUs);
        assert_eq!(output(&mut session, "10"), "10");
        assert_eq!(output(&mut session, "20"), "20");
        assert_eq!(output(&mut session, "30"), "30");
        assert_eq!(output(&mut session, "prev~1"), "20");
        // The prev~1 line itself landed in history as line 4.
        assert_eq!(output(&mut session, "prev#1"), "10");
        assert_eq!(output(&mut session, "prev#4"), "20");
    }

    #[test]
    fn test_history_out_of_range() {
        let mut session = Session::with_history(Locale::EnUs);
        assert_eq!(output(&mut session, "1"), "1");
        assert!(output(&mut session, "prev~5").starts_with("Error: History index out of range"));
        assert!(output(&mut session, "prev#9").starts_with("Error: History index out of range"));
    }

    #[test]
    fn test_prev_outside_repl() {
        let mut session = Session::new(Locale::EnUs);
        assert_eq!(
            output(&mut session, "prev"),
            "Error: prev is only available in REPL mode"
        );
    }

    #[test]
    fn test_define_and_use_custom_unit() {
        let mut session = Session::with_history(Locale::EnUs);
        assert_eq!(session.eval_line(":unit spoon = 15 ml"), LineOutcome::Silent);
        assert_eq!(output(&mut session, "2 spoon in ml"), "30 ml");
        assert_eq!(session.eval_line(":unit bowl = 350 ml"), LineOutcome::Silent);
        assert_eq!(output(&mut session, "1 bowl in spoon"), "23.33 spoon");
        assert_eq!(session.eval_line(":unit delete spoon"), LineOutcome::Silent);
        assert!(output(&mut session, "2 spoon in ml").starts_with("Error:"));
    }

    #[test]
    fn test_set_locale_switches_parsing_and_formatting() {
        let mut session = Session::with_history(Locale::EnUs);
        assert_eq!(output(&mut session, "2.115"), "2.11");
        assert_eq!(session.eval_line(":set locale de_DE"), LineOutcome::Silent);
        assert_eq!(output(&mut session, "2,115"), "2,11");
        assert_eq!(output(&mut session, "1.234,5 + 0,5"), "1.235");
    }

    #[test]
    fn test_arg_directive() {
        let mut session = Session::with_history(Locale::EnUs);
        let mut args = HashMap::new();
        args.insert("rate".to_string(), "25 usd".to_string());
        session.set_args(args);
        assert_eq!(session.eval_line(":arg rate \"hourly rate\""), LineOutcome::Silent);
        assert_eq!(output(&mut session, "rate * 8"), "$200");
        assert!(output(&mut session, ":arg missing").starts_with("Error: Argument not supplied"));
    }

    #[test]
    fn test_quit_and_unknown_command() {
        let mut session = Session::with_history(Locale::EnUs);
        assert_eq!(session.eval_line(":q"), LineOutcome::Quit);
        assert!(output(&mut session, ":frobnicate").starts_with("Error: Unknown command"));
    }

    #[test]
    fn test_blank_and_comment_lines_are_silent() {
        let mut session = Session::with_history(Locale::EnUs);
        assert_eq!(session.eval_line(""), LineOutcome::Silent);
        assert_eq!(session.eval_line("   "), LineOutcome::Silent);
        assert_eq!(session.eval_line("// just a note"), LineOutcome::Silent);
    }
}
