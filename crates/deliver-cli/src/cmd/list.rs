use anyhow::{Context, Result};
use deliver_core::Settings;
use deliver_schema::{PackageName, PackageOrigin, Version};
use serde::Serialize;

use crate::ui::list::{print_list_footer, print_list_header, print_list_row};

/// One family as printed by `deliver --list --json`.
#[derive(Debug, Serialize)]
pub struct FamilyListing {
    pub name: PackageName,
    /// Oldest first.
    pub versions: Vec<Version>,
    /// Origin of the newest version.
    pub source: Option<PackageOrigin>,
}

/// List developer packages, optionally only the named families
pub fn list(families: &[String], json: bool) -> Result<()> {
    let settings = Settings::load().context("Failed to load settings")?;
    let mut repository = super::repository(&settings);

    let names = if families.is_empty() {
        repository.family_names()?
    } else {
        families.iter().map(|f| PackageName::new(f)).collect()
    };

    let mut listings = Vec::with_capacity(names.len());
    for name in names {
        let packages = repository.packages(&name)?;
        listings.push(FamilyListing {
            versions: packages.iter().map(|p| p.version.clone()).collect(),
            source: packages.last().map(|p| p.origin.clone()),
            name,
        });
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&listings)?);
        return Ok(());
    }

    if listings.is_empty() {
        println!();
        println!("  No developer packages found.");
        println!("  Add directories to dev_repository_roots in the settings file.");
        return Ok(());
    }

    print_list_header();
    for listing in &listings {
        print_list_row(listing);
    }
    print_list_footer(listings.len());
    Ok(())
}
