// Tokenisation happens per line. Identifier classification consults the
// injected predicates so units defined earlier in the session become lexically
// visible on the next line; the units table wins over the constants table.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    In,
    Of,
    Per,
    By,
    What,
    Is,
    Increase,
    Decrease,
    Sum,
    Average,
    Mean,
    Total,
    Half,
    Double,
    Twice,
    Quarters,
    Three,
    After,
    Before,
    From,
    Ago,
    Now,
    Today,
    Tomorrow,
    Yesterday,
    Next,
    Last,
    Time,
    Prev,
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Keyword {
    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::In => "in",
            Keyword::Of => "of",
            Keyword::Per => "per",
            Keyword::By => "by",
            Keyword::What => "what",
            Keyword::Is => "is",
            Keyword::Increase => "increase",
            Keyword::Decrease => "decrease",
            Keyword::Sum => "sum",
            Keyword::Average => "average",
            Keyword::Mean => "mean",
            Keyword::Total => "total",
            Keyword::Half => "half",
            Keyword::Double => "double",
            Keyword::Twice => "twice",
            Keyword::Quarters => "quarters",
            Keyword::Three => "three",
            Keyword::After => "after",
            Keyword::Before => "before",
            Keyword::From => "from",
            Keyword::Ago => "ago",
            Keyword::Now => "now",
            Keyword::Today => "today",
            Keyword::Tomorrow => "tomorrow",
            Keyword::Yesterday => "yesterday",
            Keyword::Next => "next",
            Keyword::Last => "last",
            Keyword::Time => "time",
            Keyword::Prev => "prev",
            Keyword::Monday => "monday",
            Keyword::Tuesday => "tuesday",
            Keyword::Wednesday => "wednesday",
            Keyword::Thursday => "thursday",
            Keyword::Friday => "friday",
            Keyword::Saturday => "saturday",
            Keyword::Sunday => "sunday",
        }
    }
}

fn keyword_for(word: &str) -> Option<Keyword> {
    let kw = match word {
        "in" => Keyword::In,
        "of" => Keyword::Of,
        "per" => Keyword::Per,
        "by" => Keyword::By,
        "what" => Keyword::What,
        "is" => Keyword::Is,
        "increase" => Keyword::Increase,
        "decrease" => Keyword::Decrease,
        "sum" => Keyword::Sum,
        "average" => Keyword::Average,
        "mean" => Keyword::Mean,
        "total" => Keyword::Total,
        "half" => Keyword::Half,
        "double" => Keyword::Double,
        "twice" => Keyword::Twice,
        "quarters" => Keyword::Quarters,
        "three" => Keyword::Three,
        "after" => Keyword::After,
        "before" => Keyword::Before,
        "from" => Keyword::From,
        "ago" => Keyword::Ago,
        "now" => Keyword::Now,
        "today" => Keyword::Today,
        "tomorrow" => Keyword::Tomorrow,
        "yesterday" => Keyword::Yesterday,
        "next" => Keyword::Next,
        "last" => Keyword::Last,
        "time" => Keyword::Time,
        "prev" => Keyword::Prev,
        "monday" => Keyword::Monday,
        "tuesday" => Keyword::Tuesday,
        "wednesday" => Keyword::Wednesday,
        "thursday" => Keyword::Thursday,
        "friday" => Keyword::Friday,
        "saturday" => Keyword::Saturday,
        "sunday" => Keyword::Sunday,
        _ => return None,
    };
    Some(kw)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Raw literal text; locale normalisation happens in the parser.
    Number(String),
    // DD/MM/YYYY and HH:MM are lexical forms, not arithmetic.
    Date(u32, u32, i32),
    Time(u32, u32),
    Ident(String),
    Keyword(Keyword),
    Unit(String),
    Constant(String),
    CurrencySymbol(String),
    Str(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Equals,
    LParen,
    RParen,
    Comma,
    Colon,
    Tilde,
    Hash,
    Error(String),
    Eof,
}

pub struct Predicates<'a> {
    pub is_unit: &'a dyn Fn(&str) -> bool,
    pub is_constant: &'a dyn Fn(&str) -> bool,
}

pub fn tokenize(input: &str, preds: &Predicates) -> Vec<Token> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        // Line comments run to the end of the input.
        if c == '/' && chars.get(i + 1) == Some(&'/') {
            break;
        }
        if c.is_ascii_digit() {
            let (token, next) = scan_numeric(&chars, i);
            tokens.push(token);
            i = next;
            continue;
        }
        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            tokens.push(classify_word(word, preds));
            continue;
        }
        match c {
            '$' | '£' | '€' | '¥' => tokens.push(Token::CurrencySymbol(c.to_string())),
            '"' => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && chars[end] != '"' {
                    end += 1;
                }
                if end >= chars.len() {
                    tokens.push(Token::Error(format!(
                        "Unterminated string starting at column {}",
                        i + 1
                    )));
                } else {
                    tokens.push(Token::Str(chars[start..end].iter().collect()));
                    i = end;
                }
            }
            '+' => tokens.push(Token::Plus),
            '-' => tokens.push(Token::Minus),
            '*' => tokens.push(Token::Star),
            '/' => tokens.push(Token::Slash),
            '%' => tokens.push(Token::Percent),
            '=' => tokens.push(Token::Equals),
            '(' => tokens.push(Token::LParen),
            ')' => tokens.push(Token::RParen),
            ',' => tokens.push(Token::Comma),
            ':' => tokens.push(Token::Colon),
            '~' => tokens.push(Token::Tilde),
            '#' => tokens.push(Token::Hash),
            _ => tokens.push(Token::Error(format!(
                "Unexpected character '{}' at column {}",
                c,
                i + 1
            ))),
        }
        i += 1;
    }

    tokens.push(Token::Eof);
    tokens
}

// A digit run can turn into a date (21/10/2024), a clock time (14:30) or a
// plain number with embedded separators. Dates and times bind only when the
// full shape is present; otherwise the slash or colon is left for the parser.
fn scan_numeric(chars: &[char], start: usize) -> (Token, usize) {
    let mut i = start;
    while i < chars.len() && chars[i].is_ascii_digit() {
        i += 1;
    }
    let first: String = chars[start..i].iter().collect();

    if i < chars.len() && chars[i] == '/' {
        if let Some((day, month, year, next)) = scan_date(chars, &first, i) {
            return (Token::Date(day, month, year), next);
        }
    }
    if i < chars.len() && chars[i] == ':' && chars.get(i + 1).is_some_and(|c| c.is_ascii_digit()) {
        let mut j = i + 1;
        while j < chars.len() && chars[j].is_ascii_digit() {
            j += 1;
        }
        let minutes: String = chars[i + 1..j].iter().collect();
        if minutes.len() == 2 {
            if let (Ok(h), Ok(m)) = (first.parse::<u32>(), minutes.parse::<u32>()) {
                return (Token::Time(h, m), j);
            }
        }
    }

    // Keep consuming digits plus embedded separators that are followed by a
    // digit; "2.115" and "1,234.56" arrive as single tokens.
    while i < chars.len() {
        let c = chars[i];
        if c.is_ascii_digit() {
            i += 1;
        } else if (c == ',' || c == '.') && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit()) {
            i += 1;
        } else {
            break;
        }
    }
    (Token::Number(chars[start..i].iter().collect()), i)
}

fn scan_date(chars: &[char], day_text: &str, slash: usize) -> Option<(u32, u32, i32, usize)> {
    if day_text.len() > 2 {
        return None;
    }
    let mut i = slash + 1;
    let month_start = i;
    while i < chars.len() && chars[i].is_ascii_digit() {
        i += 1;
    }
    let month_text: String = chars[month_start..i].iter().collect();
    if month_text.is_empty() || month_text.len() > 2 {
        return None;
    }
    if i >= chars.len() || chars[i] != '/' {
        return None;
    }
    i += 1;
    let year_start = i;
    while i < chars.len() && chars[i].is_ascii_digit() {
        i += 1;
    }
    let year_text: String = chars[year_start..i].iter().collect();
    if year_text.is_empty() || year_text.len() > 4 {
        return None;
    }
    let day = day_text.parse::<u32>().ok()?;
    let month = month_text.parse::<u32>().ok()?;
    let year = year_text.parse::<i32>().ok()?;
    Some((day, month, year, i))
}

fn classify_word(word: String, preds: &Predicates) -> Token {
    let lower = word.to_lowercase();
    // "plus"/"minus" read as operators in phrases like "time in london plus 3
    // hours in sydney".
    if lower == "plus" {
        return Token::Plus;
    }
    if lower == "minus" {
        return Token::Minus;
    }
    if let Some(kw) = keyword_for(&lower) {
        return Token::Keyword(kw);
    }
    if (preds.is_unit)(&lower) {
        return Token::Unit(word);
    }
    if (preds.is_constant)(&lower) {
        return Token::Constant(word);
    }
    Token::Ident(word)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(input: &str) -> Vec<Token> {
        let is_unit = |s: &str| matches!(s, "km" | "h" | "ml" | "day" | "month" | "min" | "cm");
        let is_constant = |s: &str| s == "pi";
        tokenize(
            input,
            &Predicates {
                is_unit: &is_unit,
                is_constant: &is_constant,
            },
        )
    }

    #[test]
    fn test_numbers_and_operators() {
        let tokens = lex("1,234.56 + 2 * (3 - 4)");
        assert_eq!(
            tokens,
            vec![
                Token::Number("1,234.56".to_string()),
                Token::Plus,
                Token::Number("2".to_string()),
                Token::Star,
                Token::LParen,
                Token::Number("3".to_string()),
                Token::Minus,
                Token::Number("4".to_string()),
                Token::RParen,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_unit_promotion() {
        let tokens = lex("100 km in cm");
        assert_eq!(
            tokens,
            vec![
                Token::Number("100".to_string()),
                Token::Unit("km".to_string()),
                Token::Keyword(Keyword::In),
                Token::Unit("cm".to_string()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_constant_promotion_loses_to_units() {
        let tokens = lex("pi");
        assert_eq!(tokens, vec![Token::Constant("pi".to_string()), Token::Eof]);
    }

    #[test]
    fn test_date_and_time_literals() {
        assert_eq!(
            lex("21/10/2024"),
            vec![Token::Date(21, 10, 2024), Token::Eof]
        );
        assert_eq!(lex("14:30"), vec![Token::Time(14, 30), Token::Eof]);
        // A bare fraction stays a division.
        assert_eq!(
            lex("3/4"),
            vec![
                Token::Number("3".to_string()),
                Token::Slash,
                Token::Number("4".to_string()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_currency_symbols() {
        assert_eq!(
            lex("$32 + £5"),
            vec![
                Token::CurrencySymbol("$".to_string()),
                Token::Number("32".to_string()),
                Token::Plus,
                Token::CurrencySymbol("£".to_string()),
                Token::Number("5".to_string()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_and_keywords() {
        let tokens = lex("next monday // shipping day");
        assert_eq!(
            tokens,
            vec![
                Token::Keyword(Keyword::Next),
                Token::Keyword(Keyword::Monday),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_word_operators() {
        assert_eq!(
            lex("2 plus 2"),
            vec![
                Token::Number("2".to_string()),
                Token::Plus,
                Token::Number("2".to_string()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_prev_references() {
        assert_eq!(
            lex("prev~2"),
            vec![
                Token::Keyword(Keyword::Prev),
                Token::Tilde,
                Token::Number("2".to_string()),
                Token::Eof,
            ]
        );
        assert_eq!(
            lex("prev#3"),
            vec![
                Token::Keyword(Keyword::Prev),
                Token::Hash,
                Token::Number("3".to_string()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_string_literal() {
        assert_eq!(
            lex("\"total: {x}\""),
            vec![Token::Str("total: {x}".to_string()), Token::Eof]
        );
        match &lex("\"oops")[0] {
            Token::Error(msg) => assert!(msg.contains("Unterminated")),
            other => panic!("Expected error token, got {:?}", other),
        }
    }
}
