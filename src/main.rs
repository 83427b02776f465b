mod constants;
mod currency;
mod evaluator;
mod formatter;
mod lexer;
mod parser;
mod session;
mod timezone;
mod units;
#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::env;
use std::fs;
use std::io::{self, BufRead, IsTerminal, Write};
use std::process;

use once_cell::sync::Lazy;
use regex::Regex;

use parser::Locale;
use session::{LineOutcome, Session};

fn main() -> io::Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();

    let mut expression: Option<String> = None;
    let mut script: Option<String> = None;
    let mut arg_files: Vec<String> = Vec::new();
    let mut cli_args: Vec<(String, String)> = Vec::new();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-v" | "--version" => {
                println!("calc {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "-c" => {
                i += 1;
                expression = Some(required_value(&args, i, "-c"));
            }
            "-f" => {
                i += 1;
                script = Some(required_value(&args, i, "-f"));
            }
            "-a" | "--arg" => {
                i += 1;
                let pair = required_value(&args, i, "--arg");
                match pair.split_once('=') {
                    Some((name, value)) => {
                        cli_args.push((name.trim().to_string(), value.to_string()))
                    }
                    None => usage(&format!("--arg expects name=value, got '{}'", pair)),
                }
            }
            "--arg-file" => {
                i += 1;
                arg_files.push(required_value(&args, i, "--arg-file"));
            }
            other => usage(&format!("unknown option '{}'", other)),
        }
        i += 1;
    }

    // File-provided args first; command-line --arg wins for the same name.
    let mut script_args = HashMap::new();
    for path in &arg_files {
        load_arg_file(path, &mut script_args)?;
    }
    for (name, value) in cli_args {
        script_args.insert(name, value);
    }

    match (expression, script) {
        (Some(expr), _) => run_single_shot(&expr),
        (None, Some(path)) => run_script(&path, script_args),
        (None, None) => run_repl(),
    }
}

fn required_value(args: &[String], index: usize, flag: &str) -> String {
    match args.get(index) {
        Some(value) => value.clone(),
        None => usage(&format!("{} expects a value", flag)),
    }
}

fn usage(problem: &str) -> ! {
    eprintln!("calc: {}", problem);
    eprintln!("usage: calc [-c \"<expression>\"] [-f <script>] [--arg name=value] [--arg-file <path>]");
    process::exit(1);
}

static ARG_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*=\s*(.*)$").expect("static pattern"));

fn load_arg_file(path: &str, into: &mut HashMap<String, String>) -> io::Result<()> {
    let text = fs::read_to_string(path)?;
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("//") {
            continue;
        }
        match ARG_LINE.captures(trimmed) {
            Some(caps) => {
                into.insert(caps[1].to_string(), caps[2].trim().to_string());
            }
            None => usage(&format!("bad line in {}: '{}'", path, trimmed)),
        }
    }
    Ok(())
}

// Single-shot evaluation; the exit code reports parse/eval failures.
fn run_single_shot(expression: &str) -> io::Result<()> {
    let mut session = Session::new(Locale::default());
    session.load_units();
    let outcome = session.eval_line(expression);
    if let LineOutcome::Output(text) = &outcome {
        println!("{}", text);
    }
    if outcome.is_error() {
        process::exit(1);
    }
    Ok(())
}

fn run_script(path: &str, args: HashMap<String, String>) -> io::Result<()> {
    let text = fs::read_to_string(path)?;
    let mut session = Session::with_history(Locale::default());
    session.load_units();
    session.set_args(args);
    let mut failed = false;
    for line in text.lines() {
        match session.eval_line(line) {
            LineOutcome::Output(result) => {
                if result.starts_with("Error:") {
                    failed = true;
                }
                println!("{}", result);
            }
            LineOutcome::Silent => {}
            LineOutcome::Quit => break,
        }
    }
    if failed {
        process::exit(1);
    }
    Ok(())
}

fn run_repl() -> io::Result<()> {
    let mut session = Session::with_history(Locale::default());
    session.load_units();
    let stdin = io::stdin();
    let interactive = stdin.is_terminal();
    let mut stdout = io::stdout();
    if interactive {
        println!("calc {} (:help for commands, :q to quit)", env!("CARGO_PKG_VERSION"));
    }
    loop {
        if interactive {
            print!("> ");
            stdout.flush()?;
        }
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        match session.eval_line(line.trim_end()) {
            LineOutcome::Output(result) => println!("{}", result),
            LineOutcome::Silent => {}
            LineOutcome::Quit => break,
        }
    }
    Ok(())
}
