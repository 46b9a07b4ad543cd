//! UI utilities for tvlink CLI.

use std::io::{self, Write};

use tokio::io::{AsyncBufReadExt, BufReader};

/// Print the banner shown by interactive commands.
pub fn header() {
    println!();
    println!("tvlink v{}", tvlink_core::VERSION);
    println!("{}", "-".repeat(37));
    println!();
}

/// Ask for one line on stdin. Returns it trimmed; empty on EOF.
pub async fn prompt(question: &str) -> io::Result<String> {
    print!("{}", question);
    io::stdout().flush()?;

    let mut input = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut input)
        .await?;
    Ok(input.trim().to_string())
}

/// Print the suggestion attached to a core error, if any.
pub fn print_hint(error: &anyhow::Error) {
    let hint = error
        .chain()
        .find_map(|cause| cause.downcast_ref::<tvlink_core::Error>())
        .and_then(tvlink_core::Error::suggestion);

    if let Some(hint) = hint {
        eprintln!();
        eprintln!("  {}", indent(hint, "  "));
        eprintln!();
    }
}

fn indent(text: &str, prefix: &str) -> String {
    text.lines().collect::<Vec<_>>().join(&format!("\n{prefix}"))
}
