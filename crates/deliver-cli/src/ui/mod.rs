//! Terminal output

pub mod list;
pub mod manifest;
pub mod reporter;

pub use reporter::TerminalReporter;

use std::io::Write;
use std::path::Path;

use crossterm::style::{Color, Stylize};
use deliver_core::{DeployMode, EntryId, Status};

/// Column widths shared by the tables.
pub const NAME_WIDTH: usize = 32;
pub const STATUS_WIDTH: usize = 10;

/// Color for a manifest status.
pub fn status_color(status: Status) -> Color {
    match status {
        Status::Ready => Color::Cyan,
        Status::Installed => Color::Green,
        Status::External => Color::DarkGrey,
        Status::ResolveFailed | Status::PackageNotFound => Color::Red,
    }
}

pub fn info(message: &str) {
    println!("  {message}");
}

/// Ask a yes/no question; an empty answer is yes.
pub fn confirm(prompt: &str) -> std::io::Result<bool> {
    println!();
    print!("  {prompt} (Y/n): ");
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    let answer = input.trim();
    Ok(answer.is_empty() || answer.eq_ignore_ascii_case("y"))
}

/// One line of `--dry-run` output.
pub fn planned(id: &EntryId, action: &str, cwd: Option<&Path>) {
    let name = format!("{:<width$}", id.to_string(), width = NAME_WIDTH);
    match cwd {
        Some(dir) => println!(
            "  {} {}  {}",
            name.bold(),
            action,
            format!("(in {})", dir.display()).dark_grey()
        ),
        None => println!("  {} {}", name.bold(), action),
    }
}

pub fn success(deployed: usize, mode: DeployMode, path: &Path) {
    let verb = match mode {
        DeployMode::Install => "installed",
        DeployMode::Release => "released",
    };
    println!();
    println!(
        "  {} {deployed} package(s) {verb} to {}",
        "SUCCESS".bold().green(),
        path.display()
    );
}
