//! # Version Resolution
//!
//! This module turns a user supplied version specifier into one concrete git reference, given
//! the tags a repository advertises. It performs no I/O of its own: callers either hand it the
//! tag list directly via [`resolve`], or a [`TagSource`] via [`resolve_from`].
//!
//! ## Resolution Order
//!
//! 1. `latest` selects the highest tag that parses as a semantic version (a leading `v` is
//!    tolerated), returning the tag exactly as it was advertised.
//! 2. Anything that looks like a constraint (`^1.2`, `~1`, `>=1, <2`, `1.0 - 2.0`, `1.x || 3`,
//!    `*`) selects the highest satisfying tag.
//! 3. An exact tag is matched literally, then with its leading `v` toggled.
//! 4. Anything else (a branch or a commit) is passed through and left for checkout to verify.
//!
//! ## Comparing Versions
//!
//! [`compare`] orders two resolved references. Semantic versions compare by precedence;
//! identical non-semantic strings are equal; any other pairing is reported as
//! [`ResolveError::NotComparable`] so that the caller decides what "different" means.


use std::cmp::Ordering;
use std::fmt;
use std::path::Path;

use lazy_regex::{Lazy, Regex};
use semver::{Version, VersionReq};
use thiserror::Error;

use crate::BoxError;

//================================================================================================
// Statics
//================================================================================================

static SEMVER_REGEX: Lazy<Regex> = lazy_regex::lazy_regex!(
    r#"^v?(?P<major>0|[1-9]\d*)\.(?P<minor>0|[1-9]\d*)\.(?P<patch>0|[1-9]\d*)(?:-(?P<prerelease>(?:0|[1-9]\d*|\d*[a-zA-Z-][0-9a-zA-Z-]*)(?:\.(?:0|[1-9]\d*|\d*[a-zA-Z-][0-9a-zA-Z-]*))*))?(?:\+(?P<buildmetadata>[0-9a-zA-Z-]+(?:\.[0-9a-zA-Z-]+)*))?$"#
);

static OPERATOR: Lazy<Regex> = lazy_regex::lazy_regex!(r"^(?:\^|~|>=|<=|>|<|=)");

//================================================================================================
// Types
//================================================================================================

/// The keyword selecting the newest semantic version tag.
pub const LATEST: &str = "latest";

/// Errors that can occur while resolving a version specifier.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// The specifier was empty.
    #[error("version specifier cannot be empty")]
    EmptySpec,
    /// The repository advertised no tags at all.
    #[error("no tags found")]
    NoTags,
    /// None of the advertised tags parse as semantic versions.
    #[error("no semantic version tags found")]
    NoSemverTags,
    /// The specifier looked like a constraint but failed to parse as one.
    #[error("invalid version constraint '{spec}'")]
    InvalidConstraint {
        /// The offending specifier.
        spec: String,
        /// The underlying parse failure.
        #[source]
        source: semver::Error,
    },
    /// No tag satisfied the constraint.
    #[error("no version satisfies constraint '{0}'")]
    NoMatch(String),
    /// Two references could not be ordered against one another.
    #[error("versions '{0}' and '{1}' are not comparable")]
    NotComparable(String, String),
    /// The tag source failed to list tags.
    #[error("failed to list tags")]
    Tags(#[source] BoxError),
}

/// The outcome of resolving a specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedRef {
    /// A tag advertised by the repository.
    Tag(String),
    /// A branch or commit passed through without verification.
    Unverified(String),
}

/// A parsed version constraint, supporting `||` alternatives and `A - B` ranges on top of what
/// [`VersionReq`] understands natively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    alternatives: Vec<VersionReq>,
}

//================================================================================================
// Traits
//================================================================================================

/// Anything able to list the tags of a repository checkout.
pub trait TagSource {
    /// The error type returned when tags cannot be listed.
    type Error: std::error::Error + Send + Sync + 'static;

    /// List every tag of the repository at `repo_dir`.
    fn tags(&self, repo_dir: &Path) -> Result<Vec<String>, Self::Error>;
}

//================================================================================================
// Impls
//================================================================================================

impl ResolvedRef {
    /// The git reference to check out.
    pub fn as_str(&self) -> &str {
        match self {
            ResolvedRef::Tag(s) | ResolvedRef::Unverified(s) => s,
        }
    }

    /// Whether the reference was matched against an advertised tag.
    pub fn is_tag(&self) -> bool {
        matches!(self, ResolvedRef::Tag(_))
    }
}

impl fmt::Display for ResolvedRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Constraint {
    /// Parse a constraint, translating the `||` and hyphen-range syntax into [`VersionReq`]s.
    pub fn parse(spec: &str) -> Result<Self, semver::Error> {
        let alternatives = spec
            .split("||")
            .map(|alt| VersionReq::parse(&normalize_alternative(alt)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Constraint { alternatives })
    }

    /// Whether the version satisfies any alternative.
    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(version))
    }
}

//================================================================================================
// Functions
//================================================================================================

/// Resolve `spec` against the given tags.
pub fn resolve<S: AsRef<str>>(tags: &[S], spec: &str) -> Result<ResolvedRef, ResolveError> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Err(ResolveError::EmptySpec);
    }

    if spec == LATEST {
        return latest(tags).map(ResolvedRef::Tag);
    }

    if is_constraint(spec) {
        let constraint =
            Constraint::parse(spec).map_err(|source| ResolveError::InvalidConstraint {
                spec: spec.to_owned(),
                source,
            })?;
        return tags
            .iter()
            .map(AsRef::as_ref)
            .filter_map(|tag| parse_tag(tag).map(|v| (v, tag)))
            .filter(|(v, _)| constraint.matches(v))
            .max_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(_, tag)| ResolvedRef::Tag(tag.to_owned()))
            .ok_or_else(|| ResolveError::NoMatch(spec.to_owned()));
    }

    let toggled = match spec.strip_prefix('v') {
        Some(bare) => bare.to_owned(),
        None => format!("v{}", spec),
    };
    for candidate in [spec, toggled.as_str()] {
        if let Some(tag) = tags.iter().map(AsRef::as_ref).find(|t| *t == candidate) {
            return Ok(ResolvedRef::Tag(tag.to_owned()));
        }
    }

    tracing::debug!(
        version.spec = %spec,
        "specifier matched no tag, passing through as a branch or commit"
    );
    Ok(ResolvedRef::Unverified(spec.to_owned()))
}

/// Ask `source` for the tags of `repo_dir`, then [`resolve`] `spec` against them.
pub fn resolve_from<T: TagSource>(
    source: &T,
    repo_dir: &Path,
    spec: &str,
) -> Result<ResolvedRef, ResolveError> {
    if spec.trim().is_empty() {
        return Err(ResolveError::EmptySpec);
    }
    let tags = source
        .tags(repo_dir)
        .map_err(|e| ResolveError::Tags(Box::new(e)))?;
    tracing::trace!(tags.len = tags.len(), version.spec = %spec, "resolving against tags");
    resolve(&tags, spec)
}

/// The original string of the highest semantic version tag.
pub fn latest<S: AsRef<str>>(tags: &[S]) -> Result<String, ResolveError> {
    if tags.is_empty() {
        return Err(ResolveError::NoTags);
    }
    tags.iter()
        .map(AsRef::as_ref)
        .filter_map(|tag| parse_tag(tag).map(|v| (v, tag)))
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, tag)| tag.to_owned())
        .ok_or(ResolveError::NoSemverTags)
}

/// Order two resolved references.
pub fn compare(a: &str, b: &str) -> Result<Ordering, ResolveError> {
    match (parse_tag(a), parse_tag(b)) {
        (Some(a), Some(b)) => Ok(a.cmp_precedence(&b)),
        _ if a == b => Ok(Ordering::Equal),
        _ => Err(ResolveError::NotComparable(a.to_owned(), b.to_owned())),
    }
}

/// Parse a tag as a semantic version, tolerating a leading `v`.
pub fn parse_tag(tag: &str) -> Option<Version> {
    let captures = SEMVER_REGEX.captures(tag)?;

    let version_str = format!(
        "{}.{}.{}{}{}",
        &captures["major"],
        &captures["minor"],
        &captures["patch"],
        captures
            .name("prerelease")
            .map_or(String::new(), |m| format!("-{}", m.as_str())),
        captures
            .name("buildmetadata")
            .map_or(String::new(), |m| format!("+{}", m.as_str()))
    );

    Version::parse(&version_str).ok()
}

/// Whether the specifier should be treated as a semantic version constraint.
pub fn is_constraint(spec: &str) -> bool {
    let spec = spec.trim();
    if OPERATOR.is_match(spec) || spec.contains("||") || spec.contains(" - ") || spec.contains(',')
    {
        return true;
    }
    spec.split('.')
        .any(|part| matches!(part, "x" | "X" | "*"))
}

/// Rewrite one `||` alternative into the comma separated syntax [`VersionReq`] accepts.
fn normalize_alternative(alt: &str) -> String {
    let alt = alt.trim();
    if let Some((low, high)) = alt.split_once(" - ") {
        return format!(
            ">={}, <={}",
            strip_v(low.trim()),
            strip_v(high.trim())
        );
    }

    let mut comparators: Vec<String> = Vec::new();
    let mut pending_op: Option<&str> = None;
    for token in alt.split([' ', ',']).filter(|t| !t.is_empty()) {
        if let Some(op) = pending_op.take() {
            comparators.push(format!("{}{}", op, strip_v(token)));
        } else if OPERATOR.find(token).is_some_and(|m| m.end() == token.len()) {
            pending_op = Some(token);
        } else {
            let (op, version) = match OPERATOR.find(token) {
                Some(m) => token.split_at(m.end()),
                None => ("", token),
            };
            comparators.push(format!("{}{}", op, strip_v(version)));
        }
    }
    if let Some(op) = pending_op {
        comparators.push(op.to_owned());
    }
    comparators.join(", ")
}

fn strip_v(version: &str) -> &str {
    version.strip_prefix('v').unwrap_or(version)
}
