//! Package requirements (`foo-1.2`, `!foo`, `~bar-2+`, `.ephemeral`).

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::types::PackageName;
use crate::version::{Version, VersionError, VersionRange};

static REQUIREMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<flag>[!~])?(?P<ephemeral>\.)?(?P<name>[A-Za-z_][A-Za-z0-9_]*)(?:-(?P<range>.+)|(?P<op>[<>=].*))?$",
    )
    .expect("requirement pattern is valid")
});

/// Errors raised while parsing a requirement string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequirementError {
    /// The string does not follow `[!|~][.]name[-range]`.
    #[error("invalid requirement: '{0}'")]
    Syntax(String),
    /// The name parsed but the range did not.
    #[error("invalid requirement '{request}': {source}")]
    Range {
        /// The full request string.
        request: String,
        /// The underlying range error.
        source: VersionError,
    },
}

/// How a requirement constrains a resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum RequirementKind {
    /// The package must be present within the range.
    #[default]
    Normal,
    /// `!foo`: no package within the range may be present.
    Conflict,
    /// `~foo`: if the package is present, it must be within the range.
    Weak,
}

/// A named version range with modifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    /// Package family being requested.
    pub name: PackageName,
    /// Acceptable versions.
    pub range: VersionRange,
    /// Normal, conflict or weak.
    pub kind: RequirementKind,
    /// Ephemerals are not packages and never resolve to one.
    pub ephemeral: bool,
}

impl Requirement {
    /// Parse request syntax.
    pub fn parse(text: &str) -> Result<Self, RequirementError> {
        let text = text.trim();
        let caps = REQUIREMENT
            .captures(text)
            .ok_or_else(|| RequirementError::Syntax(text.to_string()))?;

        let kind = match caps.name("flag").map(|m| m.as_str()) {
            Some("!") => RequirementKind::Conflict,
            Some("~") => RequirementKind::Weak,
            _ => RequirementKind::Normal,
        };
        let range_text = caps
            .name("range")
            .or_else(|| caps.name("op"))
            .map_or("", |m| m.as_str());
        let range = VersionRange::parse(range_text).map_err(|source| RequirementError::Range {
            request: text.to_string(),
            source,
        })?;

        Ok(Self {
            name: PackageName::new(&caps["name"]),
            range,
            kind,
            ephemeral: caps.name("ephemeral").is_some(),
        })
    }

    /// A plain requirement on any version of `name`.
    pub fn any(name: impl Into<PackageName>) -> Self {
        Self {
            name: name.into(),
            range: VersionRange::Any,
            kind: RequirementKind::Normal,
            ephemeral: false,
        }
    }

    /// A plain requirement pinned to exactly `version`.
    ///
    /// The empty version pins to the unversioned package.
    pub fn exact(name: impl Into<PackageName>, version: &Version) -> Self {
        Self {
            name: name.into(),
            range: VersionRange::Exact(version.clone()),
            kind: RequirementKind::Normal,
            ephemeral: false,
        }
    }

    /// Whether this is a `!` requirement.
    pub fn is_conflict(&self) -> bool {
        self.kind == RequirementKind::Conflict
    }

    /// Whether this is a `~` requirement.
    pub fn is_weak(&self) -> bool {
        self.kind == RequirementKind::Weak
    }

    /// Whether a resolve must produce a package for this requirement.
    pub fn is_package_request(&self) -> bool {
        self.kind == RequirementKind::Normal && !self.ephemeral
    }

    /// Whether `version` of this family satisfies the requirement.
    ///
    /// For conflicts this is inverted: a version inside the range violates it.
    pub fn accepts(&self, version: &Version) -> bool {
        match self.kind {
            RequirementKind::Conflict => !self.range.contains(version),
            RequirementKind::Normal | RequirementKind::Weak => self.range.contains(version),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            RequirementKind::Conflict => f.write_str("!")?,
            RequirementKind::Weak => f.write_str("~")?,
            RequirementKind::Normal => {}
        }
        if self.ephemeral {
            f.write_str(".")?;
        }
        f.write_str(&self.name)?;

        let range = self.range.to_string();
        if range.is_empty() {
            Ok(())
        } else if range.starts_with(['<', '>', '=']) {
            f.write_str(&range)
        } else {
            write!(f, "-{range}")
        }
    }
}

impl std::str::FromStr for Requirement {
    type Err = RequirementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
