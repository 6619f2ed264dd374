//! Remote tag listing for tag-driven developer packages.

use std::collections::HashMap;
use std::process::Command;

use anyhow::{Context, Result, bail};
use deliver_schema::Version;
use tracing::debug;

/// Lists the tags of a remote repository.
pub trait TagLister {
    /// Tag names of the repository at `url`, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote cannot be queried.
    fn list_tags(&self, url: &str) -> Result<Vec<String>>;
}

/// Queries remotes with `git ls-remote --tags`.
#[derive(Debug, Clone, Copy)]
pub struct GitTagLister {
    max_tags: usize,
}

impl GitTagLister {
    /// Keep at most `max_tags` tags per remote.
    pub fn new(max_tags: usize) -> Self {
        Self { max_tags }
    }
}

impl TagLister for GitTagLister {
    fn list_tags(&self, url: &str) -> Result<Vec<String>> {
        let git = which::which("git").context("git not found in PATH")?;
        debug!("Listing tags of {url}");

        let output = Command::new(git)
            .args(["ls-remote", "--tags", url])
            .output()
            .context("Failed to execute git ls-remote")?;
        if !output.status.success() {
            bail!(
                "git ls-remote --tags {url} exited with {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let mut tags = parse_ls_remote(&String::from_utf8_lossy(&output.stdout));
        tags.truncate(self.max_tags);
        Ok(tags)
    }
}

/// Extract tag names from `git ls-remote --tags` output, newest first.
///
/// Peeled entries (`^{}`) are folded into their tag. Tags that parse as
/// versions are ordered by version; the rest keep listing order after them.
fn parse_ls_remote(output: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for line in output.lines() {
        let Some((_, reference)) = line.split_once("refs/tags/") else {
            continue;
        };
        let tag = reference.trim_end_matches("^{}").trim();
        if !tag.is_empty() && !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }

    let (mut versioned, other): (Vec<_>, Vec<_>) = tags
        .into_iter()
        .partition(|t| Version::parse(t).is_ok());
    versioned.sort_by_cached_key(|t| std::cmp::Reverse(Version::parse(t).unwrap_or_default()));
    versioned.extend(other);
    versioned
}

/// Serves fixed tag lists. Unknown URLs fail like an unreachable remote.
#[derive(Debug, Clone, Default)]
pub struct StaticTagLister {
    tags: HashMap<String, Vec<String>>,
}

impl StaticTagLister {
    /// Create an empty lister.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `tags` for `url`.
    pub fn with(mut self, url: impl Into<String>, tags: &[&str]) -> Self {
        self.tags
            .insert(url.into(), tags.iter().map(ToString::to_string).collect());
        self
    }
}

impl TagLister for StaticTagLister {
    fn list_tags(&self, url: &str) -> Result<Vec<String>> {
        match self.tags.get(url) {
            Some(tags) => Ok(tags.clone()),
            None => bail!("no such remote: {url}"),
        }
    }
}
