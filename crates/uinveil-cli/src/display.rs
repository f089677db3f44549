//! Output formatting for CLI results and errors.

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;

/// Prints a value as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Prints decoded plaintext, pretty-printed when it is JSON.
pub fn print_plaintext(plaintext: &str) {
    match serde_json::from_str::<serde_json::Value>(plaintext) {
        Ok(value) => match serde_json::to_string_pretty(&value) {
            Ok(pretty) => println!("{pretty}"),
            Err(_) => println!("{plaintext}"),
        },
        Err(_) => println!("{plaintext}"),
    }
}

/// Prints an error chain on stderr.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {err}", "Error:".bright_red());
    for cause in err.chain().skip(1) {
        eprintln!("  {} {cause}", "caused by:".dimmed());
    }
}
