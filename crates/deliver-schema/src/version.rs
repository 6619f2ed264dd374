//! Package versions and version ranges.
//!
//! A version is a sequence of tokens separated by `.` or `-`. Purely numeric
//! tokens compare numerically and sort above alphanumeric tokens, which compare
//! lexically. A version sorts below every version it is a prefix of, so
//! `1 < 1.0 < 1.0.1 < 1.1`. The empty version is the lowest of all.
//!
//! Ranges use the familiar request syntax:
//!
//! | syntax       | meaning                                   |
//! |--------------|-------------------------------------------|
//! | *(empty)*    | any version                               |
//! | `1.2`        | `1.2` and every version it prefixes       |
//! | `==1.2`      | exactly `1.2`                             |
//! | `1.2+`       | `1.2` or above (also `>=1.2`)             |
//! | `>1.2`       | strictly above `1.2`                      |
//! | `<2`, `<=2`  | below, or up to and including, `2`        |
//! | `1+<2`       | from `1` up to but excluding `2`          |
//! | `1..2`       | from `1` up to and including `2`          |
//! | `1.*`, `**`  | wildcard, expanded against known versions |
//! | `1\|3`       | union of ranges                           |

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while parsing versions and ranges.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    /// The text is not a valid version.
    #[error("invalid version: '{0}'")]
    InvalidVersion(String),
    /// The text is not a valid version range.
    #[error("invalid version range: '{0}'")]
    InvalidRange(String),
}

/// A single component of a [`Version`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Token {
    /// An alphanumeric token such as `beta` or `rc1`.
    Alpha(String),
    /// A purely numeric token.
    Number(u64),
}

impl Token {
    fn from_part(part: &str) -> Self {
        if part.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = part.parse() {
                return Self::Number(n);
            }
        }
        Self::Alpha(part.to_string())
    }

    fn is_valid_part(part: &str) -> bool {
        !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alpha(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

/// A package version.
///
/// Equality, ordering and hashing are defined on the tokens; the original
/// text is kept for display.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    text: String,
    tokens: Vec<Token>,
}

impl Version {
    /// The empty version. It sorts below every other version.
    pub fn empty() -> Self {
        Self {
            text: String::new(),
            tokens: Vec::new(),
        }
    }

    /// Parse a version string. The empty string yields [`Version::empty`].
    pub fn parse(text: &str) -> Result<Self, VersionError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Self::empty());
        }

        let mut tokens = Vec::new();
        for part in text.split(['.', '-']) {
            if !Token::is_valid_part(part) {
                return Err(VersionError::InvalidVersion(text.to_string()));
            }
            tokens.push(Token::from_part(part));
        }

        Ok(Self {
            text: text.to_string(),
            tokens,
        })
    }

    /// Build a version directly from tokens, joining them with `.` for display.
    pub fn from_tokens(tokens: Vec<Token>) -> Self {
        let text = tokens
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(".");
        Self { text, tokens }
    }

    /// The version's tokens.
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// The version as originally written.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Whether this is the empty version.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Whether `prefix` is a token-wise prefix of this version.
    pub fn starts_with(&self, prefix: &Version) -> bool {
        self.tokens.starts_with(&prefix.tokens)
    }

    /// The immediate successor in version order.
    ///
    /// No parseable version lies strictly between `self` and the result; the
    /// result itself is not parseable and only serves as an interval bound.
    pub fn successor(&self) -> Self {
        let mut tokens = self.tokens.clone();
        tokens.push(Token::Alpha(String::new()));
        Self::from_tokens(tokens)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.tokens == other.tokens
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.tokens.hash(state);
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.tokens.cmp(&other.tokens)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl TryFrom<String> for Version {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for Version {
    type Error = VersionError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Version> for String {
    fn from(v: Version) -> Self {
        v.text
    }
}

impl std::str::FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A set of acceptable versions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum VersionRange {
    /// Every version.
    #[default]
    Any,
    /// The version and every version it prefixes.
    Prefix(Version),
    /// Exactly one version.
    Exact(Version),
    /// The version or above.
    AtLeast(Version),
    /// Strictly above the version.
    Above(Version),
    /// Strictly below the version.
    Below(Version),
    /// The version or below.
    AtMost(Version),
    /// Lower bound inclusive, upper bound exclusive.
    Between(Version, Version),
    /// Both bounds inclusive.
    Inclusive(Version, Version),
    /// A wildcard pattern such as `1.*` or `**`.
    Wildcard(String),
    /// Any of the contained ranges.
    Union(Vec<VersionRange>),
}

impl VersionRange {
    /// Parse range syntax. The empty string is [`VersionRange::Any`].
    pub fn parse(text: &str) -> Result<Self, VersionError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Self::Any);
        }
        if text.contains('|') {
            let parts = text
                .split('|')
                .map(Self::parse_single)
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Self::Union(parts));
        }
        Self::parse_single(text)
    }

    fn parse_single(text: &str) -> Result<Self, VersionError> {
        let text = text.trim();
        let invalid = || VersionError::InvalidRange(text.to_string());
        let operand = |s: &str| -> Result<Version, VersionError> {
            let v = Version::parse(s).map_err(|_| invalid())?;
            if v.is_empty() { Err(invalid()) } else { Ok(v) }
        };

        if text.is_empty() {
            return Err(invalid());
        }

        if text.contains('*') {
            let parts: Vec<&str> = text.split(['.', '-']).collect();
            let last = parts.len() - 1;
            let valid = parts.iter().enumerate().all(|(i, part)| match *part {
                "*" => true,
                "**" => i == last,
                other => Token::is_valid_part(other),
            });
            return if valid {
                Ok(Self::Wildcard(text.to_string()))
            } else {
                Err(invalid())
            };
        }

        if let Some(rest) = text.strip_prefix("==") {
            return Ok(Self::Exact(operand(rest)?));
        }
        if let Some(rest) = text.strip_prefix(">=") {
            return Ok(Self::AtLeast(operand(rest)?));
        }
        if let Some(rest) = text.strip_prefix("<=") {
            return Ok(Self::AtMost(operand(rest)?));
        }
        if let Some(rest) = text.strip_prefix('>') {
            return Ok(Self::Above(operand(rest)?));
        }
        if let Some(rest) = text.strip_prefix('<') {
            return Ok(Self::Below(operand(rest)?));
        }
        if let Some((lo, hi)) = text.split_once("..") {
            return Ok(Self::Inclusive(operand(lo)?, operand(hi)?));
        }
        if let Some((lo, hi)) = text.split_once("+<") {
            return Ok(Self::Between(operand(lo)?, operand(hi)?));
        }
        if let Some(lo) = text.strip_suffix('+') {
            return Ok(Self::AtLeast(operand(lo)?));
        }
        Ok(Self::Prefix(operand(text)?))
    }

    /// Whether `version` falls inside this range.
    pub fn contains(&self, version: &Version) -> bool {
        match self {
            Self::Any => true,
            Self::Prefix(p) => version.starts_with(p),
            Self::Exact(v) => version == v,
            Self::AtLeast(v) => version >= v,
            Self::Above(v) => version > v,
            Self::Below(v) => version < v,
            Self::AtMost(v) => version <= v,
            Self::Between(lo, hi) => version >= lo && version < hi,
            Self::Inclusive(lo, hi) => version >= lo && version <= hi,
            Self::Wildcard(pattern) => wildcard_matches(pattern, version),
            Self::Union(ranges) => ranges.iter().any(|r| r.contains(version)),
        }
    }

    /// Whether any part of this range is an unexpanded wildcard.
    pub fn has_wildcard(&self) -> bool {
        match self {
            Self::Wildcard(_) => true,
            Self::Union(ranges) => ranges.iter().any(Self::has_wildcard),
            _ => false,
        }
    }

    /// Replace wildcards with the latest matching version in `available`.
    ///
    /// `*` takes the matching token of that version and `**` takes all of its
    /// remaining tokens; the expansion becomes a prefix range. Wildcards with
    /// no match are left as they are.
    pub fn expand_wildcards(&self, available: &[Version]) -> Self {
        match self {
            Self::Wildcard(pattern) => available
                .iter()
                .filter(|v| wildcard_matches(pattern, v))
                .max()
                .map_or_else(|| self.clone(), |latest| Self::Prefix(expand_pattern(pattern, latest))),
            Self::Union(ranges) => {
                Self::Union(ranges.iter().map(|r| r.expand_wildcards(available)).collect())
            }
            other => other.clone(),
        }
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => Ok(()),
            Self::Prefix(v) => write!(f, "{v}"),
            Self::Exact(v) => write!(f, "=={v}"),
            Self::AtLeast(v) => write!(f, "{v}+"),
            Self::Above(v) => write!(f, ">{v}"),
            Self::Below(v) => write!(f, "<{v}"),
            Self::AtMost(v) => write!(f, "<={v}"),
            Self::Between(lo, hi) => write!(f, "{lo}+<{hi}"),
            Self::Inclusive(lo, hi) => write!(f, "{lo}..{hi}"),
            Self::Wildcard(pattern) => f.write_str(pattern),
            Self::Union(ranges) => {
                for (i, range) in ranges.iter().enumerate() {
                    if i > 0 {
                        f.write_str("|")?;
                    }
                    write!(f, "{range}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::str::FromStr for VersionRange {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn wildcard_matches(pattern: &str, version: &Version) -> bool {
    let tokens = version.tokens();
    for (i, part) in pattern.split(['.', '-']).enumerate() {
        match part {
            "**" => return true,
            "*" => {
                if i >= tokens.len() {
                    return false;
                }
            }
            literal => {
                if tokens.get(i) != Some(&Token::from_part(literal)) {
                    return false;
                }
            }
        }
    }
    true
}

fn expand_pattern(pattern: &str, latest: &Version) -> Version {
    let tokens = latest.tokens();
    let mut expanded = Vec::new();
    for (i, part) in pattern.split(['.', '-']).enumerate() {
        match part {
            "**" => {
                expanded.extend(tokens.iter().skip(i).cloned());
                break;
            }
            "*" => expanded.extend(tokens.get(i).cloned()),
            literal => expanded.push(Token::from_part(literal)),
        }
    }
    Version::from_tokens(expanded)
}
