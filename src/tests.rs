use crate::parser::Locale;
use crate::session::{LineOutcome, Session};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Duration, Local};

    fn repl() -> Session {
        Session::with_history(Locale::EnUs)
    }

    fn eval(session: &mut Session, line: &str) -> String {
        match session.eval_line(line) {
            LineOutcome::Output(text) => text,
            other => panic!("Expected output for {:?}, got {:?}", line, other),
        }
    }

    #[test]
    fn test_currency_rate_conversion_across_time_windows() {
        let mut session = repl();
        let result = eval(&mut session, "32 dollars per day in gbp per month");
        assert!(result.starts_with('£'), "expected pounds, got {}", result);
        assert!(result.ends_with("/month"), "expected monthly rate, got {}", result);
        let amount: f64 = result
            .trim_start_matches('£')
            .trim_end_matches("/month")
            .replace(',', "")
            .parse()
            .unwrap();
        // 32 * (365/12 days per month) / 1.27
        assert!(
            (700.0..=850.0).contains(&amount),
            "amount out of range: {}",
            amount
        );
        assert!((amount - 32.0 * (365.0 / 12.0) / 1.27).abs() < 0.5);
    }

    #[test]
    fn test_compound_unit_rate_conversion() {
        let mut session = repl();
        assert_eq!(
            eval(&mut session, "500 liters per minute in m3 per hour"),
            "30 m3/hour"
        );
    }

    #[test]
    fn test_division_of_units_forms_a_rate() {
        let mut session = repl();
        assert_eq!(eval(&mut session, "100 km / 2 hours in mph"), "31.07 mph");
        assert_eq!(eval(&mut session, "90 km/h in m/s"), "25 m/s");
    }

    #[test]
    fn test_prev_relative() {
        let mut session = repl();
        assert_eq!(eval(&mut session, "5 * 5"), "25");
        assert_eq!(eval(&mut session, "10 + prev"), "35");
    }

    #[test]
    fn test_prev_offsets() {
        let mut session = repl();
        eval(&mut session, "10");
        eval(&mut session, "20");
        eval(&mut session, "30");
        assert_eq!(eval(&mut session, "prev~1"), "20");
        assert_eq!(eval(&mut session, "prev#2"), "20");
        assert_eq!(eval(&mut session, "prev#1"), "10");
    }

    #[test]
    fn test_date_plus_calendar_months() {
        let mut session = repl();
        assert_eq!(eval(&mut session, "21/10/2024 + 3 months"), "21 Jan 2025");
        // Day-of-month clamps at the end of the target month.
        assert_eq!(eval(&mut session, "31/1/2025 + 1 month"), "28 Feb 2025");
    }

    #[test]
    fn test_date_difference_in_days() {
        let mut session = repl();
        assert_eq!(eval(&mut session, "25/12/2025 - 4/11/2025"), "51 days");
    }

    #[test]
    fn test_time_difference() {
        let mut session = repl();
        assert_eq!(eval(&mut session, "time difference London Sydney"), "10 hours");
        assert_eq!(eval(&mut session, "time difference Sydney London"), "-10 hours");
        assert_eq!(
            eval(&mut session, "time difference london sydney in minutes"),
            "600 minutes"
        );
        assert_eq!(
            eval(&mut session, "time difference new york london"),
            "5 hours"
        );
    }

    #[test]
    fn test_custom_unit_lifecycle() {
        let mut session = repl();
        assert_eq!(session.eval_line(":unit spoon = 15 ml"), LineOutcome::Silent);
        assert_eq!(eval(&mut session, "2 spoon in ml"), "30 ml");
        assert_eq!(session.eval_line(":unit bowl = 350 ml"), LineOutcome::Silent);
        assert_eq!(eval(&mut session, "1 bowl in spoon"), "23.33 spoon");
    }

    #[test]
    fn test_forbidden_digit_word_mix() {
        let mut session = repl();
        assert!(eval(&mut session, "100000 and three").starts_with("Error:"));
    }

    #[test]
    fn test_number_words() {
        let mut session = repl();
        assert_eq!(eval(&mut session, "three hundred and forty two"), "342");
        assert_eq!(eval(&mut session, "5 million"), "5,000,000");
        assert_eq!(eval(&mut session, "1.5 billion"), "1,500,000,000");
        assert_eq!(eval(&mut session, "seventy two + 8"), "80");
    }

    #[test]
    fn test_locale_switch() {
        let mut session = repl();
        assert_eq!(eval(&mut session, "2.115 * 1000"), "2,115");
        assert_eq!(session.eval_line(":set locale de_DE"), LineOutcome::Silent);
        assert_eq!(eval(&mut session, "2,115 * 1000"), "2.115");
    }

    #[test]
    fn test_percent_type_preservation() {
        let mut session = repl();
        assert_eq!(eval(&mut session, "20% of 50"), "10");
        assert_eq!(eval(&mut session, "20% of 50 usd"), "$10");
        assert_eq!(eval(&mut session, "20% of 50 km"), "10 km");
        assert_eq!(eval(&mut session, "increase 50 km by 10%"), "55 km");
        assert_eq!(eval(&mut session, "decrease 200 usd by 25%"), "$150");
        assert_eq!(eval(&mut session, "increase 80 by 50%"), "120");
    }

    #[test]
    fn test_percent_arithmetic() {
        let mut session = repl();
        assert_eq!(eval(&mut session, "100 - 20%"), "80");
        assert_eq!(eval(&mut session, "100 + 10%"), "110");
        assert_eq!(eval(&mut session, "50 usd - 5%"), "$47.5");
        assert_eq!(eval(&mut session, "5 is what % of 20"), "25%");
        assert!(eval(&mut session, "5 is what % of 0").starts_with("Error: Division by zero"));
    }

    #[test]
    fn test_fuzzy_phrases_preserve_type() {
        let mut session = repl();
        assert_eq!(eval(&mut session, "half of 3 hours"), "1.5 hours");
        assert_eq!(eval(&mut session, "double 21 usd"), "$42");
        assert_eq!(eval(&mut session, "twice 8"), "16");
        assert_eq!(eval(&mut session, "three quarters of 100"), "75");
        assert_eq!(eval(&mut session, "quarter of 100 km"), "25 km");
    }

    #[test]
    fn test_currency_coercion() {
        let mut session = repl();
        // The right side converts into the left currency.
        assert_eq!(eval(&mut session, "$100 + £10"), "$112.7");
        assert_eq!(eval(&mut session, "100 usd in gbp"), "£78.74");
        assert!(eval(&mut session, "$5 * $4").starts_with("Error:"));
        assert_eq!(eval(&mut session, "$10 / $5"), "2");
    }

    #[test]
    fn test_rate_scaling_within_one_currency() {
        let mut session = repl();
        assert_eq!(eval(&mut session, "10 usd per day in usd per week"), "$70/week");
    }

    #[test]
    fn test_unit_addition_with_coercion() {
        let mut session = repl();
        assert_eq!(eval(&mut session, "1 km + 500 m"), "1.5 km");
        assert_eq!(eval(&mut session, "10 cm in inch"), "3.94 inch");
        assert!(eval(&mut session, "1 km + 1 kg").starts_with("Error: Incompatible units"));
    }

    #[test]
    fn test_temperature_pipeline() {
        let mut session = repl();
        assert_eq!(eval(&mut session, "100 celsius in fahrenheit"), "212 fahrenheit");
        assert_eq!(eval(&mut session, "0 c in k"), "273.15 k");
    }

    #[test]
    fn test_aggregation_functions() {
        let mut session = repl();
        assert_eq!(eval(&mut session, "sum(1, 2, 3)"), "6");
        assert_eq!(eval(&mut session, "sum()"), "0");
        assert_eq!(eval(&mut session, "average(2, 4, 6)"), "4");
        assert!(eval(&mut session, "average()").starts_with("Error:"));
        assert_eq!(eval(&mut session, "min(3, 1, 2)"), "1");
        assert_eq!(eval(&mut session, "max(3, 1, 2)"), "3");
        // Aggregation reduces on the numeric payload, dropping types.
        assert_eq!(eval(&mut session, "sum(1 km, 500)"), "501");
    }

    #[test]
    fn test_print_interpolation() {
        let mut session = repl();
        eval(&mut session, "x = 10 km");
        assert_eq!(eval(&mut session, "print(\"x is {x}\")"), "x is 10 km");
        assert!(eval(&mut session, "print(\"{missing}\")").starts_with("Error: Unknown variable"));
    }

    #[test]
    fn test_variables_and_assignment_echo() {
        let mut session = repl();
        assert_eq!(eval(&mut session, "x = 42"), "42");
        assert_eq!(eval(&mut session, "x + 8"), "50");
        assert_eq!(eval(&mut session, "y = x * 2 km"), "84 km");
        assert_eq!(eval(&mut session, "y in m"), "84,000 m");
        assert!(eval(&mut session, "zz + 1").starts_with("Error: Unknown variable"));
    }

    #[test]
    fn test_clock_literals() {
        let mut session = repl();
        assert_eq!(eval(&mut session, "14:30"), "14:30");
        assert_eq!(eval(&mut session, "14:30 + 1:15"), "15:45");
        assert_eq!(eval(&mut session, "2:30 in minutes"), "150 minutes");
    }

    #[test]
    fn test_weekday_expressions() {
        let mut session = repl();
        let today = Local::now().date_naive();
        let today_from_monday = today.weekday().num_days_from_monday();

        let ahead = (7 - today_from_monday) % 7;
        let ahead = if ahead == 0 { 7 } else { ahead };
        let expected = (today + Duration::days(ahead as i64))
            .format("%-d %b %Y")
            .to_string();
        assert_eq!(eval(&mut session, "next monday"), expected);

        let back = (today_from_monday + 7 - 4) % 7;
        let back = if back == 0 { 7 } else { back };
        let expected = (today - Duration::days(back as i64))
            .format("%-d %b %Y")
            .to_string();
        assert_eq!(eval(&mut session, "last friday"), expected);
    }

    #[test]
    fn test_relative_date_phrases() {
        let mut session = repl();
        let today = Local::now().date_naive();
        let expected = (today - Duration::days(3)).format("%-d %b %Y").to_string();
        assert_eq!(eval(&mut session, "3 days ago"), expected);
        let expected = (today + Duration::days(15)).format("%-d %b %Y").to_string();
        assert_eq!(eval(&mut session, "2 weeks from tomorrow"), expected);
        assert_eq!(eval(&mut session, "tomorrow - today"), "1 days");
    }

    #[test]
    fn test_time_in_location() {
        let mut session = repl();
        let result = eval(&mut session, "time in london");
        assert!(!result.starts_with("Error:"), "got {}", result);
        assert!(result.ends_with("London"), "got {}", result);
        let result = eval(&mut session, "time in new york plus 3 hours in sydney");
        assert!(!result.starts_with("Error:"), "got {}", result);
        assert!(result.ends_with("Sydney"), "got {}", result);
        assert!(eval(&mut session, "time in atlantis").starts_with("Error: Unknown timezone"));
    }

    #[test]
    fn test_errors_short_circuit() {
        let mut session = repl();
        assert_eq!(eval(&mut session, "5 / 0"), "Error: Division by zero");
        // The error value lands in history and propagates through prev.
        assert_eq!(eval(&mut session, "prev + 1"), "Error: Division by zero");
    }

    #[test]
    fn test_number_upcast_through_conversion() {
        let mut session = repl();
        assert_eq!(eval(&mut session, "7 in km"), "7 km");
        assert_eq!(eval(&mut session, "7 in usd"), "$7");
        assert!(eval(&mut session, "7 in nosuchunit").starts_with("Error: Unknown unit"));
    }

    #[test]
    fn test_set_rate_command() {
        let mut session = repl();
        assert_eq!(session.eval_line(":set rate usd gbp 0.65"), LineOutcome::Silent);
        assert_eq!(eval(&mut session, "10 usd in gbp"), "£6.5");
    }

    #[test]
    fn test_comments_are_stripped() {
        let mut session = repl();
        assert_eq!(eval(&mut session, "1 + 2 // plus a note"), "3");
    }

    #[test]
    fn test_data_units() {
        let mut session = repl();
        assert_eq!(eval(&mut session, "2048 kb in mb"), "2 mb");
        assert_eq!(eval(&mut session, "16 b in bits"), "128 bits");
    }

    #[test]
    fn test_constants() {
        let mut session = repl();
        assert_eq!(eval(&mut session, "pi * 2"), "6.28");
        assert_eq!(eval(&mut session, "lightspeed in kmph"), "1,079,252,848.8 kmph");
    }
}
