use chrono::{NaiveDate, Weekday};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::currency;
use crate::lexer::{Keyword, Token};

// The locale only decides separator conventions; evaluation is untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locale {
    EnUs,
    EnGb,
    DeDe,
    FrFr,
    EsEs,
}

impl Locale {
    pub fn from_tag(tag: &str) -> Option<Locale> {
        match tag.to_lowercase().replace('-', "_").as_str() {
            "en_us" | "en" | "us" => Some(Locale::EnUs),
            "en_gb" | "gb" | "uk" => Some(Locale::EnGb),
            "de_de" | "de" => Some(Locale::DeDe),
            "fr_fr" | "fr" => Some(Locale::FrFr),
            "es_es" | "es" => Some(Locale::EsEs),
            _ => None,
        }
    }

    pub fn decimal_separator(self) -> char {
        match self {
            Locale::EnUs | Locale::EnGb => '.',
            _ => ',',
        }
    }

    pub fn thousands_separator(self) -> char {
        match self {
            Locale::EnUs | Locale::EnGb => ',',
            _ => '.',
        }
    }
}

impl Default for Locale {
    fn default() -> Self {
        Locale::EnUs
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Subtract,
    Multiply,
    Divide,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateWord {
    Today,
    Tomorrow,
    Yesterday,
    Now,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeekShift {
    NextNonStrict,
    NextStrict,
    LastStrict,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HistoryRef {
    Rel(usize),
    Abs(usize),
}

#[derive(Debug, Clone)]
pub enum UnitCmd {
    List(Option<String>),
    Show(String),
    Delete(String),
}

#[derive(Debug, Clone)]
pub enum Expr {
    Number(f64),
    Str(String),
    Variable(String),
    ConstantRef(String),
    Assignment(String, Box<Expr>),
    Binary(Box<Expr>, Op, Box<Expr>),
    Negate(Box<Expr>),
    // A value expression carrying a unit suffix; the unit may be compound.
    WithUnit(Box<Expr>, String),
    CurrencyAmount(f64, String),
    Percent(Box<Expr>),
    PercentOf(Box<Expr>, Box<Expr>),
    PercentChange {
        increase: bool,
        base: Box<Expr>,
        percent: Box<Expr>,
    },
    WhatPercent(Box<Expr>, Box<Expr>),
    // Fuzzy prefixes scale without changing the argument's type.
    Scale(f64, Box<Expr>),
    Convert(Box<Expr>, String),
    DateLiteral(NaiveDate),
    // HH:MM as fractional hours.
    TimeOfDay(f64),
    DateKeyword(DateWord),
    WeekdayExpr {
        weekday: Weekday,
        shift: WeekShift,
    },
    DateOffset {
        amount: Box<Expr>,
        base: Box<Expr>,
        forward: bool,
    },
    HistoryRef(HistoryRef),
    Call(String, Vec<Expr>),
    TimeIn(Vec<String>),
    TimeShift {
        zone: Vec<String>,
        offset: Box<Expr>,
        negate: bool,
        target: Option<Vec<String>>,
    },
    TimeDifference {
        words: Vec<String>,
        unit: Option<String>,
    },
    DefineUnit {
        name: String,
        value: Box<Expr>,
    },
    UnitCommand(UnitCmd),
    ArgDirective {
        name: String,
        prompt: Option<String>,
    },
    Command {
        name: String,
        args: Vec<String>,
    },
    Error(String),
}

pub fn parse_line(tokens: &[Token], locale: Locale) -> Expr {
    for token in tokens {
        if let Token::Error(msg) = token {
            return Expr::Error(msg.clone());
        }
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        locale,
    };
    match parser.parse_root() {
        Ok(expr) => expr,
        Err(msg) => Expr::Error(msg),
    }
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    locale: Locale,
}

type ParseResult<T> = Result<T, String>;

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens.get(self.pos + offset).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn eat_keyword(&mut self, kw: Keyword) -> bool {
        if self.peek() == &Token::Keyword(kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, kw: Keyword) -> ParseResult<()> {
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            Err(format!(
                "Expected '{}', found {}",
                kw.as_str(),
                describe(self.peek())
            ))
        }
    }

    fn parse_root(&mut self) -> ParseResult<Expr> {
        if self.peek() == &Token::Colon {
            self.pos += 1;
            return self.parse_directive();
        }
        let expr = self.parse_statement()?;
        match self.peek() {
            Token::Eof => Ok(expr),
            other => Err(format!(
                "Unexpected token after expression: {}",
                describe(other)
            )),
        }
    }

    fn parse_statement(&mut self) -> ParseResult<Expr> {
        if let (Token::Ident(name), Token::Equals) = (self.peek(), self.peek_at(1)) {
            let name = name.clone();
            self.pos += 2;
            let value = self.parse_expression()?;
            return Ok(Expr::Assignment(name, Box::new(value)));
        }
        self.parse_expression()
    }

    // Top expression layer: additive chain plus the phrase-level tails
    // ("in", "per", "is what % of", "ago", "from", "after", "before").
    fn parse_expression(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_addsub()?;
        loop {
            match self.peek().clone() {
                Token::Keyword(Keyword::In) => {
                    self.pos += 1;
                    let target = self.parse_unit_phrase()?;
                    expr = Expr::Convert(Box::new(expr), target);
                }
                Token::Keyword(Keyword::Per) => {
                    self.pos += 1;
                    let unit = self.parse_unit_component()?;
                    // "X per u" is sugar for "X / 1u".
                    expr = Expr::Binary(
                        Box::new(expr),
                        Op::Divide,
                        Box::new(Expr::WithUnit(Box::new(Expr::Number(1.0)), unit)),
                    );
                }
                Token::Keyword(Keyword::Is) => {
                    self.pos += 1;
                    self.expect_keyword(Keyword::What)?;
                    if self.advance() != Token::Percent {
                        return Err("Expected '%' after 'what'".to_string());
                    }
                    self.expect_keyword(Keyword::Of)?;
                    let right = self.parse_addsub()?;
                    expr = Expr::WhatPercent(Box::new(expr), Box::new(right));
                }
                Token::Keyword(Keyword::Ago) => {
                    self.pos += 1;
                    expr = Expr::DateOffset {
                        amount: Box::new(expr),
                        base: Box::new(Expr::DateKeyword(DateWord::Today)),
                        forward: false,
                    };
                }
                Token::Keyword(Keyword::From) | Token::Keyword(Keyword::After) => {
                    self.pos += 1;
                    let base = self.parse_addsub()?;
                    expr = Expr::DateOffset {
                        amount: Box::new(expr),
                        base: Box::new(base),
                        forward: true,
                    };
                }
                Token::Keyword(Keyword::Before) => {
                    self.pos += 1;
                    let base = self.parse_addsub()?;
                    expr = Expr::DateOffset {
                        amount: Box::new(expr),
                        base: Box::new(base),
                        forward: false,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_addsub(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_muldiv()?;
        loop {
            let op = match self.peek() {
                Token::Plus => Op::Add,
                Token::Minus => Op::Subtract,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_muldiv()?;
            expr = Expr::Binary(Box::new(expr), op, Box::new(right));
        }
        Ok(expr)
    }

    fn parse_muldiv(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => Op::Multiply,
                Token::Slash => Op::Divide,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_unary()?;
            expr = Expr::Binary(Box::new(expr), op, Box::new(right));
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        if self.peek() == &Token::Minus {
            self.pos += 1;
            let inner = self.parse_unary()?;
            return Ok(Expr::Negate(Box::new(inner)));
        }
        self.parse_power()
    }

    // power := atom ['%']; a trailing "of" turns the percent into percent-of.
    fn parse_power(&mut self) -> ParseResult<Expr> {
        let atom = self.parse_atom()?;
        if self.peek() == &Token::Percent {
            self.pos += 1;
            if self.eat_keyword(Keyword::Of) {
                let right = self.parse_muldiv()?;
                return Ok(Expr::PercentOf(Box::new(atom), Box::new(right)));
            }
            return Ok(Expr::Percent(Box::new(atom)));
        }
        Ok(atom)
    }

    fn parse_atom(&mut self) -> ParseResult<Expr> {
        match self.peek().clone() {
            Token::Number(raw) => {
                self.pos += 1;
                let mut value = normalize_number(&raw, self.locale)?;
                // Mixed "<numeric> <scale word>" forms: 5 million, 1.5 billion.
                while let Token::Ident(word) = self.peek() {
                    match scale_word(&word.to_lowercase()) {
                        Some(scale) => {
                            value *= scale;
                            self.pos += 1;
                        }
                        None => break,
                    }
                }
                // "<numeric> and <word>" is ambiguous and always rejected.
                if let Token::Ident(word) = self.peek() {
                    if word.to_lowercase() == "and" && self.next_is_number_word(1) {
                        return Err("Numbers cannot mix digits and number words".to_string());
                    }
                }
                self.attach_suffix(value)
            }
            Token::Date(day, month, year) => {
                self.pos += 1;
                match NaiveDate::from_ymd_opt(year, month, day) {
                    Some(date) => Ok(Expr::DateLiteral(date)),
                    None => Err(format!("Invalid date: {}/{}/{}", day, month, year)),
                }
            }
            Token::Time(hours, minutes) => {
                self.pos += 1;
                if hours > 23 || minutes > 59 {
                    return Err(format!("Invalid time: {}:{:02}", hours, minutes));
                }
                Ok(Expr::TimeOfDay(hours as f64 + minutes as f64 / 60.0))
            }
            Token::CurrencySymbol(sym) => {
                self.pos += 1;
                let code = currency::normalize(&sym)
                    .ok_or_else(|| format!("Unknown currency: {}", sym))?;
                match self.advance() {
                    Token::Number(raw) => {
                        let value = normalize_number(&raw, self.locale)?;
                        Ok(Expr::CurrencyAmount(value, code.to_string()))
                    }
                    other => Err(format!(
                        "Expected an amount after '{}', found {}",
                        sym,
                        describe(&other)
                    )),
                }
            }
            Token::Str(text) => {
                self.pos += 1;
                Ok(Expr::Str(text))
            }
            Token::Constant(name) => {
                self.pos += 1;
                Ok(Expr::ConstantRef(name.to_lowercase()))
            }
            Token::LParen => {
                self.pos += 1;
                let inner = self.parse_expression()?;
                if self.advance() != Token::RParen {
                    return Err("Unmatched parenthesis".to_string());
                }
                self.attach_unit_to(inner)
            }
            Token::Unit(unit) => {
                // "min" doubles as the aggregation function.
                if unit.to_lowercase() == "min" && self.peek_at(1) == &Token::LParen {
                    self.pos += 1;
                    return self.parse_call("min");
                }
                Err(format!("Unexpected unit '{}'", unit))
            }
            Token::Ident(name) => self.parse_ident_atom(name),
            Token::Keyword(kw) => self.parse_keyword_atom(kw),
            other => Err(format!("Unexpected token: {}", describe(&other))),
        }
    }

    fn parse_ident_atom(&mut self, name: String) -> ParseResult<Expr> {
        let lower = name.to_lowercase();
        if basic_word(&lower).is_some() || scale_word(&lower).is_some() {
            let value = self.parse_number_words()?;
            return self.attach_suffix(value);
        }
        if lower == "quarter" {
            self.pos += 1;
            self.eat_keyword(Keyword::Of);
            let inner = self.parse_unary()?;
            return Ok(Expr::Scale(0.25, Box::new(inner)));
        }
        if (lower == "max" || lower == "print") && self.peek_at(1) == &Token::LParen {
            self.pos += 1;
            return self.parse_call(&lower);
        }
        self.pos += 1;
        Ok(Expr::Variable(name))
    }

    fn parse_keyword_atom(&mut self, kw: Keyword) -> ParseResult<Expr> {
        match kw {
            Keyword::Today => {
                self.pos += 1;
                Ok(Expr::DateKeyword(DateWord::Today))
            }
            Keyword::Tomorrow => {
                self.pos += 1;
                Ok(Expr::DateKeyword(DateWord::Tomorrow))
            }
            Keyword::Yesterday => {
                self.pos += 1;
                Ok(Expr::DateKeyword(DateWord::Yesterday))
            }
            Keyword::Now => {
                self.pos += 1;
                Ok(Expr::DateKeyword(DateWord::Now))
            }
            Keyword::Next => {
                self.pos += 1;
                let weekday = self.expect_weekday()?;
                Ok(Expr::WeekdayExpr {
                    weekday,
                    shift: WeekShift::NextStrict,
                })
            }
            Keyword::Last => {
                self.pos += 1;
                let weekday = self.expect_weekday()?;
                Ok(Expr::WeekdayExpr {
                    weekday,
                    shift: WeekShift::LastStrict,
                })
            }
            Keyword::Monday
            | Keyword::Tuesday
            | Keyword::Wednesday
            | Keyword::Thursday
            | Keyword::Friday
            | Keyword::Saturday
            | Keyword::Sunday => {
                self.pos += 1;
                Ok(Expr::WeekdayExpr {
                    weekday: weekday_of(kw),
                    shift: WeekShift::NextNonStrict,
                })
            }
            Keyword::Half => {
                self.pos += 1;
                self.eat_keyword(Keyword::Of);
                let inner = self.parse_unary()?;
                Ok(Expr::Scale(0.5, Box::new(inner)))
            }
            Keyword::Double | Keyword::Twice => {
                self.pos += 1;
                self.eat_keyword(Keyword::Of);
                let inner = self.parse_unary()?;
                Ok(Expr::Scale(2.0, Box::new(inner)))
            }
            Keyword::Three => {
                if self.peek_at(1) == &Token::Keyword(Keyword::Quarters) {
                    self.pos += 2;
                    self.eat_keyword(Keyword::Of);
                    let inner = self.parse_unary()?;
                    return Ok(Expr::Scale(0.75, Box::new(inner)));
                }
                let value = self.parse_number_words()?;
                self.attach_suffix(value)
            }
            Keyword::Increase | Keyword::Decrease => {
                self.pos += 1;
                let base = self.parse_addsub()?;
                self.expect_keyword(Keyword::By)?;
                let percent = self.parse_addsub()?;
                Ok(Expr::PercentChange {
                    increase: kw == Keyword::Increase,
                    base: Box::new(base),
                    percent: Box::new(percent),
                })
            }
            Keyword::Prev => {
                self.pos += 1;
                match self.peek() {
                    Token::Tilde => {
                        self.pos += 1;
                        let n = self.expect_index()?;
                        Ok(Expr::HistoryRef(HistoryRef::Rel(n)))
                    }
                    Token::Hash => {
                        self.pos += 1;
                        let n = self.expect_index()?;
                        Ok(Expr::HistoryRef(HistoryRef::Abs(n)))
                    }
                    _ => Ok(Expr::HistoryRef(HistoryRef::Rel(0))),
                }
            }
            Keyword::Sum | Keyword::Average | Keyword::Mean | Keyword::Total => {
                self.pos += 1;
                self.parse_call(kw.as_str())
            }
            Keyword::Time => {
                self.pos += 1;
                self.parse_time_expression()
            }
            other => Err(format!("Unexpected keyword '{}'", other.as_str())),
        }
    }

    fn parse_call(&mut self, name: &str) -> ParseResult<Expr> {
        if self.advance() != Token::LParen {
            return Err(format!("Expected '(' after {}", name));
        }
        let mut args = Vec::new();
        if self.peek() != &Token::RParen {
            loop {
                args.push(self.parse_expression()?);
                if self.peek() == &Token::Comma {
                    self.pos += 1;
                    continue;
                }
                break;
            }
        }
        if self.advance() != Token::RParen {
            return Err("Unmatched parenthesis".to_string());
        }
        Ok(Expr::Call(name.to_string(), args))
    }

    fn parse_time_expression(&mut self) -> ParseResult<Expr> {
        if let Token::Ident(word) = self.peek() {
            if word.to_lowercase() == "difference" {
                self.pos += 1;
                let words = self.collect_location_words();
                if words.len() < 2 {
                    return Err("Expected two locations after 'time difference'".to_string());
                }
                let unit = if self.eat_keyword(Keyword::In) {
                    Some(self.parse_unit_component()?)
                } else {
                    None
                };
                return Ok(Expr::TimeDifference { words, unit });
            }
        }
        self.expect_keyword(Keyword::In)?;
        let zone = self.collect_location_words();
        if zone.is_empty() {
            return Err("Expected a location after 'time in'".to_string());
        }
        let negate = match self.peek() {
            Token::Plus => {
                self.pos += 1;
                false
            }
            Token::Minus => {
                self.pos += 1;
                true
            }
            _ => return Ok(Expr::TimeIn(zone)),
        };
        let offset = self.parse_muldiv()?;
        let target = if self.eat_keyword(Keyword::In) {
            let words = self.collect_location_words();
            if words.is_empty() {
                return Err("Expected a location after 'in'".to_string());
            }
            Some(words)
        } else {
            None
        };
        Ok(Expr::TimeShift {
            zone,
            offset: Box::new(offset),
            negate,
            target,
        })
    }

    fn collect_location_words(&mut self) -> Vec<String> {
        let mut words = Vec::new();
        while let Token::Ident(word) = self.peek() {
            words.push(word.to_lowercase());
            self.pos += 1;
        }
        words
    }

    // Consumes English number words into one value. The connector "and" is
    // permitted between words only.
    fn parse_number_words(&mut self) -> ParseResult<f64> {
        let mut words = Vec::new();
        loop {
            match self.peek() {
                Token::Keyword(Keyword::Three) => {
                    words.push("three".to_string());
                    self.pos += 1;
                }
                Token::Ident(word) => {
                    let lower = word.to_lowercase();
                    if basic_word(&lower).is_some() || scale_word(&lower).is_some() {
                        words.push(lower);
                        self.pos += 1;
                    } else if lower == "and" && self.next_is_number_word(1) {
                        words.push(lower);
                        self.pos += 1;
                    } else {
                        break;
                    }
                }
                _ => break,
            }
        }
        fold_number_words(&words)
    }

    fn next_is_number_word(&self, offset: usize) -> bool {
        match self.peek_at(offset) {
            Token::Keyword(Keyword::Three) => true,
            Token::Ident(word) => {
                let lower = word.to_lowercase();
                basic_word(&lower).is_some() || scale_word(&lower).is_some()
            }
            _ => false,
        }
    }

    // A number may be followed by a unit (optionally compound) or a currency
    // word; either absorbs the literal into a typed atom.
    fn attach_suffix(&mut self, value: f64) -> ParseResult<Expr> {
        match self.peek().clone() {
            Token::Unit(_) => self.attach_unit_to(Expr::Number(value)),
            Token::Ident(word) => {
                if let Some(code) = currency::normalize(&word) {
                    self.pos += 1;
                    return Ok(Expr::CurrencyAmount(value, code.to_string()));
                }
                Ok(Expr::Number(value))
            }
            _ => Ok(Expr::Number(value)),
        }
    }

    fn attach_unit_to(&mut self, expr: Expr) -> ParseResult<Expr> {
        if let Token::Unit(unit) = self.peek().clone() {
            self.pos += 1;
            // unit '/' unit and unit 'per' unit are compound suffixes.
            if self.peek() == &Token::Slash {
                if let Token::Unit(denominator) = self.peek_at(1).clone() {
                    self.pos += 2;
                    return Ok(Expr::WithUnit(
                        Box::new(expr),
                        format!("{}/{}", unit, denominator),
                    ));
                }
            }
            if self.peek() == &Token::Keyword(Keyword::Per) {
                if let Token::Unit(denominator) = self.peek_at(1).clone() {
                    self.pos += 2;
                    return Ok(Expr::WithUnit(
                        Box::new(expr),
                        format!("{}/{}", unit, denominator),
                    ));
                }
            }
            return Ok(Expr::WithUnit(Box::new(expr), unit));
        }
        Ok(expr)
    }

    // One side of a conversion target or rate denominator. Unknown spellings
    // are carried through so the evaluator reports them as unknown units.
    fn parse_unit_component(&mut self) -> ParseResult<String> {
        match self.advance() {
            Token::Unit(unit) => Ok(unit),
            Token::Ident(word) => Ok(word),
            Token::CurrencySymbol(sym) => Ok(sym),
            // Bare "in" doubles as the inch in target position.
            Token::Keyword(Keyword::In) => Ok("in".to_string()),
            other => Err(format!("Expected a unit, found {}", describe(&other))),
        }
    }

    fn parse_unit_phrase(&mut self) -> ParseResult<String> {
        let first = self.parse_unit_component()?;
        if self.peek() == &Token::Slash {
            self.pos += 1;
            let second = self.parse_unit_component()?;
            return Ok(format!("{}/{}", first, second));
        }
        if self.peek() == &Token::Keyword(Keyword::Per) {
            self.pos += 1;
            let second = self.parse_unit_component()?;
            return Ok(format!("{}/{}", first, second));
        }
        Ok(first)
    }

    fn expect_weekday(&mut self) -> ParseResult<Weekday> {
        match self.advance() {
            Token::Keyword(kw)
                if matches!(
                    kw,
                    Keyword::Monday
                        | Keyword::Tuesday
                        | Keyword::Wednesday
                        | Keyword::Thursday
                        | Keyword::Friday
                        | Keyword::Saturday
                        | Keyword::Sunday
                ) =>
            {
                Ok(weekday_of(kw))
            }
            other => Err(format!("Expected a weekday, found {}", describe(&other))),
        }
    }

    fn expect_index(&mut self) -> ParseResult<usize> {
        match self.advance() {
            Token::Number(raw) => raw
                .parse::<usize>()
                .map_err(|_| format!("Invalid history index: {}", raw)),
            other => Err(format!(
                "Expected a history index, found {}",
                describe(&other)
            )),
        }
    }

    // Directives start with ':'. ":unit" splits into the command form when the
    // next word is a recognised subcommand, otherwise it defines a unit.
    fn parse_directive(&mut self) -> ParseResult<Expr> {
        let head = match self.advance() {
            Token::Ident(word) => word.to_lowercase(),
            Token::Keyword(kw) => kw.as_str().to_string(),
            Token::Unit(unit) => unit.to_lowercase(),
            other => {
                return Err(format!(
                    "Expected a command after ':', found {}",
                    describe(&other)
                ))
            }
        };
        match head.as_str() {
            "arg" => {
                let name = match self.advance() {
                    Token::Ident(name) => name,
                    other => {
                        return Err(format!(
                            "Expected an argument name after ':arg', found {}",
                            describe(&other)
                        ))
                    }
                };
                let prompt = match self.peek().clone() {
                    Token::Str(text) => {
                        self.pos += 1;
                        Some(text)
                    }
                    _ => None,
                };
                Ok(Expr::ArgDirective { name, prompt })
            }
            "unit" => self.parse_unit_directive(),
            _ => {
                let mut args = Vec::new();
                loop {
                    let token = self.advance();
                    if token == Token::Eof {
                        break;
                    }
                    args.push(token_text(&token));
                }
                Ok(Expr::Command { name: head, args })
            }
        }
    }

    fn parse_unit_directive(&mut self) -> ParseResult<Expr> {
        let subcommand = match self.peek() {
            Token::Ident(word) => Some(word.to_lowercase()),
            Token::Unit(word) => Some(word.to_lowercase()),
            _ => None,
        };
        match subcommand.as_deref() {
            Some("list") => {
                self.pos += 1;
                let filter = match self.peek().clone() {
                    Token::Ident(word) => {
                        let lower = word.to_lowercase();
                        if lower == "builtin" || lower == "custom" {
                            self.pos += 1;
                            Some(lower)
                        } else {
                            return Err(format!("Unknown unit list filter: {}", word));
                        }
                    }
                    _ => None,
                };
                Ok(Expr::UnitCommand(UnitCmd::List(filter)))
            }
            Some("show") => {
                self.pos += 1;
                let name = self.expect_unit_name()?;
                Ok(Expr::UnitCommand(UnitCmd::Show(name)))
            }
            Some("delete") => {
                self.pos += 1;
                let name = self.expect_unit_name()?;
                Ok(Expr::UnitCommand(UnitCmd::Delete(name)))
            }
            Some("define") => {
                self.pos += 1;
                self.parse_unit_definition()
            }
            _ => self.parse_unit_definition(),
        }
    }

    fn parse_unit_definition(&mut self) -> ParseResult<Expr> {
        let name = self.expect_unit_name()?;
        if self.advance() != Token::Equals {
            return Err(format!("Expected '=' after ':unit {}'", name));
        }
        let value = self.parse_expression()?;
        Ok(Expr::DefineUnit {
            name,
            value: Box::new(value),
        })
    }

    fn expect_unit_name(&mut self) -> ParseResult<String> {
        match self.advance() {
            Token::Ident(name) => Ok(name),
            Token::Unit(name) => Ok(name),
            other => Err(format!("Expected a unit name, found {}", describe(&other))),
        }
    }
}

fn weekday_of(kw: Keyword) -> Weekday {
    match kw {
        Keyword::Monday => Weekday::Mon,
        Keyword::Tuesday => Weekday::Tue,
        Keyword::Wednesday => Weekday::Wed,
        Keyword::Thursday => Weekday::Thu,
        Keyword::Friday => Weekday::Fri,
        Keyword::Saturday => Weekday::Sat,
        _ => Weekday::Sun,
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Number(raw) => format!("number '{}'", raw),
        Token::Date(d, m, y) => format!("date '{}/{}/{}'", d, m, y),
        Token::Time(h, m) => format!("time '{}:{:02}'", h, m),
        Token::Ident(name) => format!("'{}'", name),
        Token::Keyword(kw) => format!("'{}'", kw.as_str()),
        Token::Unit(unit) => format!("unit '{}'", unit),
        Token::Constant(name) => format!("constant '{}'", name),
        Token::CurrencySymbol(sym) => format!("'{}'", sym),
        Token::Str(_) => "string".to_string(),
        Token::Plus => "'+'".to_string(),
        Token::Minus => "'-'".to_string(),
        Token::Star => "'*'".to_string(),
        Token::Slash => "'/'".to_string(),
        Token::Percent => "'%'".to_string(),
        Token::Equals => "'='".to_string(),
        Token::LParen => "'('".to_string(),
        Token::RParen => "')'".to_string(),
        Token::Comma => "','".to_string(),
        Token::Colon => "':'".to_string(),
        Token::Tilde => "'~'".to_string(),
        Token::Hash => "'#'".to_string(),
        Token::Error(msg) => msg.clone(),
        Token::Eof => "end of input".to_string(),
    }
}

fn token_text(token: &Token) -> String {
    match token {
        Token::Number(raw) => raw.clone(),
        Token::Ident(name) => name.clone(),
        Token::Unit(unit) => unit.clone(),
        Token::Constant(name) => name.clone(),
        Token::Keyword(kw) => kw.as_str().to_string(),
        Token::Str(text) => text.clone(),
        Token::CurrencySymbol(sym) => sym.clone(),
        Token::Date(d, m, y) => format!("{}/{}/{}", d, m, y),
        Token::Time(h, m) => format!("{}:{:02}", h, m),
        Token::Slash => "/".to_string(),
        Token::Plus => "+".to_string(),
        Token::Minus => "-".to_string(),
        Token::Star => "*".to_string(),
        Token::Percent => "%".to_string(),
        Token::Equals => "=".to_string(),
        _ => String::new(),
    }
}

static GROUPED_COMMA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,3}(,\d{3})+$").expect("static pattern"));
static GROUPED_DOT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,3}(\.\d{3})+$").expect("static pattern"));

// Applies the locale's separator convention to a raw literal. Thousands
// separators must delimit exact groups of three; the decimal separator may
// appear once. "2.115" is 2.115 under en_US and "2,115" is 2.115 under de_DE.
pub fn normalize_number(raw: &str, locale: Locale) -> Result<f64, String> {
    let dec = locale.decimal_separator();
    let thou = locale.thousands_separator();
    let parts: Vec<&str> = raw.split(dec).collect();
    if parts.len() > 2 {
        return Err(format!("Malformed number literal: {}", raw));
    }
    let int_part = parts[0];
    let frac_part = parts.get(1).copied();
    if let Some(frac) = frac_part {
        if frac.is_empty() || frac.contains(thou) {
            return Err(format!("Malformed number literal: {}", raw));
        }
    }
    let int_clean = if int_part.contains(thou) {
        let grouped = if thou == ',' {
            &GROUPED_COMMA
        } else {
            &GROUPED_DOT
        };
        if !grouped.is_match(int_part) {
            return Err(format!("Malformed number literal: {}", raw));
        }
        int_part.replace(thou, "")
    } else {
        int_part.to_string()
    };
    let text = match frac_part {
        Some(frac) => format!("{}.{}", int_clean, frac),
        None => int_clean,
    };
    text.parse::<f64>()
        .map_err(|_| format!("Malformed number literal: {}", raw))
}

fn basic_word(word: &str) -> Option<f64> {
    let value = match word {
        "zero" => 0.0,
        "one" => 1.0,
        "two" => 2.0,
        "three" => 3.0,
        "four" => 4.0,
        "five" => 5.0,
        "six" => 6.0,
        "seven" => 7.0,
        "eight" => 8.0,
        "nine" => 9.0,
        "ten" => 10.0,
        "eleven" => 11.0,
        "twelve" => 12.0,
        "thirteen" => 13.0,
        "fourteen" => 14.0,
        "fifteen" => 15.0,
        "sixteen" => 16.0,
        "seventeen" => 17.0,
        "eighteen" => 18.0,
        "nineteen" => 19.0,
        "twenty" => 20.0,
        "thirty" => 30.0,
        "forty" => 40.0,
        "fifty" => 50.0,
        "sixty" => 60.0,
        "seventy" => 70.0,
        "eighty" => 80.0,
        "ninety" => 90.0,
        _ => return None,
    };
    Some(value)
}

fn scale_word(word: &str) -> Option<f64> {
    let value = match word {
        "hundred" => 100.0,
        "thousand" => 1000.0,
        "million" => 1e6,
        "billion" => 1e9,
        "trillion" => 1e12,
        _ => return None,
    };
    Some(value)
}

// The usual accumulator: basics add into the current group, "hundred"
// multiplies it, larger scales close the group into the total.
fn fold_number_words(words: &[String]) -> Result<f64, String> {
    if words.is_empty() {
        return Err("Expected a number".to_string());
    }
    let mut total = 0.0;
    let mut current = 0.0;
    for word in words {
        if word == "and" {
            continue;
        }
        if let Some(value) = basic_word(word) {
            current += value;
        } else if word == "hundred" {
            current = if current == 0.0 { 100.0 } else { current * 100.0 };
        } else if let Some(scale) = scale_word(word) {
            let group = if current == 0.0 { 1.0 } else { current };
            total += group * scale;
            current = 0.0;
        } else {
            return Err(format!("Unknown number word: {}", word));
        }
    }
    Ok(total + current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::{self, Predicates};

    fn parse(input: &str) -> Expr {
        let is_unit = |s: &str| {
            matches!(
                s,
                "km" | "h" | "hours" | "ml" | "day" | "month" | "min" | "cm" | "mi" | "m3"
                    | "liters" | "minute" | "hour" | "mph" | "days" | "months" | "spoon"
            )
        };
        let is_constant = |s: &str| s == "pi";
        let tokens = lexer::tokenize(
            input,
            &Predicates {
                is_unit: &is_unit,
                is_constant: &is_constant,
            },
        );
        parse_line(&tokens, Locale::EnUs)
    }

    #[test]
    fn test_parse_number() {
        match parse("42") {
            Expr::Number(n) => assert_eq!(n, 42.0),
            other => panic!("Expected Number expression, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_assignment() {
        match parse("x = 42") {
            Expr::Assignment(name, value) => {
                assert_eq!(name, "x");
                match *value {
                    Expr::Number(n) => assert_eq!(n, 42.0),
                    other => panic!("Expected Number in assignment, got {:?}", other),
                }
            }
            other => panic!("Expected Assignment expression, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_unit_value_and_conversion() {
        match parse("10 km in mi") {
            Expr::Convert(inner, target) => {
                assert_eq!(target, "mi");
                match *inner {
                    Expr::WithUnit(value, unit) => {
                        assert_eq!(unit, "km");
                        match *value {
                            Expr::Number(n) => assert_eq!(n, 10.0),
                            other => panic!("Expected Number, got {:?}", other),
                        }
                    }
                    other => panic!("Expected WithUnit, got {:?}", other),
                }
            }
            other => panic!("Expected Convert expression, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_rate_phrase() {
        // "per" desugars into a division by one denominator unit.
        match parse("32 dollars per day") {
            Expr::Binary(left, Op::Divide, right) => {
                match *left {
                    Expr::CurrencyAmount(n, code) => {
                        assert_eq!(n, 32.0);
                        assert_eq!(code, "USD");
                    }
                    other => panic!("Expected CurrencyAmount, got {:?}", other),
                }
                match *right {
                    Expr::WithUnit(one, unit) => {
                        assert_eq!(unit, "day");
                        match *one {
                            Expr::Number(n) => assert_eq!(n, 1.0),
                            other => panic!("Expected Number, got {:?}", other),
                        }
                    }
                    other => panic!("Expected WithUnit, got {:?}", other),
                }
            }
            other => panic!("Expected Binary expression, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_compound_target() {
        match parse("32 dollars per day in gbp per month") {
            Expr::Convert(_, target) => assert_eq!(target, "gbp/month"),
            other => panic!("Expected Convert expression, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_number_words() {
        match parse("three hundred and forty two") {
            Expr::Number(n) => assert_eq!(n, 342.0),
            other => panic!("Expected Number expression, got {:?}", other),
        }
        match parse("five million") {
            Expr::Number(n) => assert_eq!(n, 5e6),
            other => panic!("Expected Number expression, got {:?}", other),
        }
    }

    #[test]
    fn test_mixed_numeric_scale_is_allowed() {
        match parse("1.5 billion") {
            Expr::Number(n) => assert_eq!(n, 1.5e9),
            other => panic!("Expected Number expression, got {:?}", other),
        }
        match parse("10 hundred thousand") {
            Expr::Number(n) => assert_eq!(n, 1e6),
            other => panic!("Expected Number expression, got {:?}", other),
        }
    }

    #[test]
    fn test_mixed_numeric_basic_is_rejected() {
        match parse("100000 and three") {
            Expr::Error(msg) => assert!(msg.contains("mix"), "unexpected message: {}", msg),
            other => panic!("Expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_locale_number_literals() {
        assert_eq!(normalize_number("2.115", Locale::EnUs).unwrap(), 2.115);
        assert_eq!(normalize_number("2,115", Locale::EnUs).unwrap(), 2115.0);
        assert_eq!(normalize_number("2,115", Locale::DeDe).unwrap(), 2.115);
        assert_eq!(normalize_number("2.115", Locale::DeDe).unwrap(), 2115.0);
        assert_eq!(normalize_number("1,234.56", Locale::EnUs).unwrap(), 1234.56);
        assert_eq!(normalize_number("1.234,56", Locale::DeDe).unwrap(), 1234.56);
        assert!(normalize_number("1,23", Locale::EnUs).is_err());
        assert!(normalize_number("1.2.3", Locale::EnUs).is_err());
    }

    #[test]
    fn test_parse_date_literal() {
        match parse("21/10/2024") {
            Expr::DateLiteral(date) => {
                assert_eq!(date, NaiveDate::from_ymd_opt(2024, 10, 21).unwrap());
            }
            other => panic!("Expected DateLiteral, got {:?}", other),
        }
        match parse("32/13/2024") {
            Expr::Error(msg) => assert!(msg.contains("Invalid date")),
            other => panic!("Expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_weekdays() {
        match parse("next monday") {
            Expr::WeekdayExpr { weekday, shift } => {
                assert_eq!(weekday, Weekday::Mon);
                assert_eq!(shift, WeekShift::NextStrict);
            }
            other => panic!("Expected WeekdayExpr, got {:?}", other),
        }
        match parse("friday") {
            Expr::WeekdayExpr { weekday, shift } => {
                assert_eq!(weekday, Weekday::Fri);
                assert_eq!(shift, WeekShift::NextNonStrict);
            }
            other => panic!("Expected WeekdayExpr, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_percent_shapes() {
        match parse("20% of 50") {
            Expr::PercentOf(_, _) => {}
            other => panic!("Expected PercentOf, got {:?}", other),
        }
        match parse("increase 100 by 20%") {
            Expr::PercentChange { increase: true, .. } => {}
            other => panic!("Expected PercentChange, got {:?}", other),
        }
        match parse("5 is what % of 20") {
            Expr::WhatPercent(_, _) => {}
            other => panic!("Expected WhatPercent, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_fuzzy_prefixes() {
        match parse("half of 10 km") {
            Expr::Scale(factor, _) => assert_eq!(factor, 0.5),
            other => panic!("Expected Scale, got {:?}", other),
        }
        match parse("three quarters of 100") {
            Expr::Scale(factor, _) => assert_eq!(factor, 0.75),
            other => panic!("Expected Scale, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_history_refs() {
        match parse("prev") {
            Expr::HistoryRef(HistoryRef::Rel(0)) => {}
            other => panic!("Expected prev, got {:?}", other),
        }
        match parse("prev~2") {
            Expr::HistoryRef(HistoryRef::Rel(2)) => {}
            other => panic!("Expected prev~2, got {:?}", other),
        }
        match parse("prev#3") {
            Expr::HistoryRef(HistoryRef::Abs(3)) => {}
            other => panic!("Expected prev#3, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_time_expressions() {
        match parse("time in london") {
            Expr::TimeIn(words) => assert_eq!(words, vec!["london".to_string()]),
            other => panic!("Expected TimeIn, got {:?}", other),
        }
        match parse("time difference london sydney") {
            Expr::TimeDifference { words, unit: None } => {
                assert_eq!(words, vec!["london".to_string(), "sydney".to_string()]);
            }
            other => panic!("Expected TimeDifference, got {:?}", other),
        }
        match parse("time in london plus 3 hours in sydney") {
            Expr::TimeShift {
                zone,
                negate: false,
                target: Some(target),
                ..
            } => {
                assert_eq!(zone, vec!["london".to_string()]);
                assert_eq!(target, vec!["sydney".to_string()]);
            }
            other => panic!("Expected TimeShift, got {:?}", other),
        }
    }

    #[test]
    fn test_unit_directive_vs_command() {
        match parse(":unit spoon = 15 ml") {
            Expr::DefineUnit { name, .. } => assert_eq!(name, "spoon"),
            other => panic!("Expected DefineUnit, got {:?}", other),
        }
        match parse(":unit list custom") {
            Expr::UnitCommand(UnitCmd::List(Some(filter))) => assert_eq!(filter, "custom"),
            other => panic!("Expected UnitCommand, got {:?}", other),
        }
        match parse(":unit delete spoon") {
            Expr::UnitCommand(UnitCmd::Delete(name)) => assert_eq!(name, "spoon"),
            other => panic!("Expected UnitCommand, got {:?}", other),
        }
        match parse(":unit define spoon = 15 ml") {
            Expr::DefineUnit { name, .. } => assert_eq!(name, "spoon"),
            other => panic!("Expected DefineUnit, got {:?}", other),
        }
    }

    #[test]
    fn test_arg_directive() {
        match parse(":arg rate \"hourly rate\"") {
            Expr::ArgDirective { name, prompt } => {
                assert_eq!(name, "rate");
                assert_eq!(prompt.as_deref(), Some("hourly rate"));
            }
            other => panic!("Expected ArgDirective, got {:?}", other),
        }
    }

    #[test]
    fn test_trailing_tokens_are_errors() {
        match parse("1 + ") {
            Expr::Error(_) => {}
            other => panic!("Expected parse error, got {:?}", other),
        }
        match parse("(1 + 2") {
            Expr::Error(msg) => assert!(msg.contains("parenthesis")),
            other => panic!("Expected parse error, got {:?}", other),
        }
    }
}
