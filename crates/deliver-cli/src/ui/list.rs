//! `deliver --list` output formatting

use crossterm::style::Stylize;

use super::NAME_WIDTH;
use crate::cmd::list::FamilyListing;

pub fn print_list_header() {
    println!();
    let header = format!("  {:<nw$} {}", "name", "versions", nw = NAME_WIDTH);
    println!("{}", header.dark_grey());
}

pub fn print_list_row(listing: &FamilyListing) {
    let name = format!("{:<width$}", listing.name.as_str(), width = NAME_WIDTH);
    let versions: Vec<String> = listing.versions.iter().rev().map(ToString::to_string).collect();
    let versions = if versions.is_empty() {
        "-".to_string()
    } else {
        versions.join(", ")
    };
    println!("  {} {}", name.cyan(), versions);
}

pub fn print_list_footer(count: usize) {
    println!();
    println!("{}", format!("  {count} package(s)").dark_grey());
}
