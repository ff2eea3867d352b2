//! Requirement specifier parsing and equivalence.
//!
//! A specifier is one requirement line of the form
//! `name[operator version][ --extra options]`, e.g.
//! `torch==2.1.2 --extra-index-url https://download.pytorch.org/whl/cpu`.

use crate::error::{IsoEnvError, Result};
use semver::Version;
use std::fmt;

/// Version constraint operator in a requirement specifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operator {
    /// `==`
    Eq,
    /// `>=`
    Ge,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `<`
    Lt,
    /// `!=`
    Ne,
    /// `~=`
    Compatible,
}

impl Operator {
    /// The literal token as it appears in requirement text.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "==",
            Operator::Ge => ">=",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Ne => "!=",
            Operator::Compatible => "~=",
        }
    }

    /// Match an operator token at the start of `text`.
    ///
    /// Two-character tokens are tried first so `>=` is never read as `>`.
    fn at_start(text: &str) -> Option<Operator> {
        const TWO_CHAR: [(&str, Operator); 5] = [
            ("==", Operator::Eq),
            (">=", Operator::Ge),
            ("<=", Operator::Le),
            ("!=", Operator::Ne),
            ("~=", Operator::Compatible),
        ];
        for (token, op) in TWO_CHAR {
            if text.starts_with(token) {
                return Some(op);
            }
        }
        if text.starts_with('>') {
            return Some(Operator::Gt);
        }
        if text.starts_with('<') {
            return Some(Operator::Lt);
        }
        None
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field-by-field result of comparing two specifiers.
///
/// Callers combine the three flags as needed; [`Specifier::matches`] requires
/// all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecifierMatch {
    /// Package names are equal.
    pub name: bool,
    /// Operator and version are equal by value (absent matches only absent).
    pub version: bool,
    /// Extra options are equal (absent matches only absent).
    pub extras: bool,
}

impl SpecifierMatch {
    /// True when every field matched.
    pub fn all(&self) -> bool {
        self.name && self.version && self.extras
    }
}

/// One parsed requirement line.
///
/// Invariant: `operator` and `version` are both present or both absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Specifier {
    /// Package name (non-empty, trimmed).
    pub name: String,
    /// Version constraint operator, if any.
    pub operator: Option<Operator>,
    /// Constrained version, present iff `operator` is.
    pub version: Option<Version>,
    /// Trailing installer flags (index URLs, build flags), opaque to
    /// comparison beyond string equality.
    pub extra_options: Option<String>,
}

/// Marker introducing trailing installer options.
const OPTIONS_MARKER: &str = "--";

impl Specifier {
    /// Parse one requirement line.
    ///
    /// The line is split at the first ` --` into a requirement core and the
    /// extra-options tail, then the core is scanned left to right for the
    /// leftmost operator token. Text without an operator is a bare package
    /// name.
    pub fn parse(raw: &str) -> Result<Specifier> {
        let (core, extra_options) = split_extra_options(raw);

        let core = core.trim();
        if core.is_empty() {
            return Err(IsoEnvError::MalformedSpecifier {
                raw: raw.to_string(),
                message: "empty package name".to_string(),
            });
        }

        let Some((index, operator)) = leftmost_operator(core) else {
            return Ok(Specifier {
                name: core.to_string(),
                operator: None,
                version: None,
                extra_options,
            });
        };

        let name = core[..index].trim();
        if name.is_empty() {
            return Err(IsoEnvError::MalformedSpecifier {
                raw: raw.to_string(),
                message: "empty package name".to_string(),
            });
        }

        let version_text = core[index + operator.as_str().len()..].trim();
        let version = Version::parse(version_text).map_err(|e| IsoEnvError::MalformedVersion {
            raw: raw.to_string(),
            message: e.to_string(),
        })?;

        Ok(Specifier {
            name: name.to_string(),
            operator: Some(operator),
            version: Some(version),
            extra_options,
        })
    }

    /// Field-by-field equivalence against another specifier.
    ///
    /// Version comparison is value equality of operator plus version, not
    /// range overlap: `pkg>=1.0.0` matches `pkg>=1.0.0` and nothing else.
    pub fn compare(&self, other: &Specifier) -> SpecifierMatch {
        SpecifierMatch {
            name: self.name == other.name,
            version: self.operator == other.operator && self.version == other.version,
            extras: self.extra_options == other.extra_options,
        }
    }

    /// True when every field of [`compare`](Self::compare) matches.
    pub fn matches(&self, other: &Specifier) -> bool {
        self.compare(other).all()
    }

    /// The canonical package argument handed to the installer:
    /// `name` or `name<op><version>`, without extra options.
    pub fn package_arg(&self) -> String {
        match (&self.operator, &self.version) {
            (Some(op), Some(version)) => format!("{}{}{}", self.name, op, version),
            _ => self.name.clone(),
        }
    }

    /// Extra options split into individual installer arguments.
    pub fn extra_args(&self) -> Vec<String> {
        self.extra_options
            .as_deref()
            .map(|opts| opts.split_whitespace().map(String::from).collect())
            .unwrap_or_default()
    }

    /// Stable key used for order-independent set comparison.
    pub(crate) fn canonical_key(&self) -> String {
        match &self.extra_options {
            Some(extras) => format!("{} {}", self.package_arg(), extras),
            None => self.package_arg(),
        }
    }
}

impl fmt::Display for Specifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_key())
    }
}

/// Split a raw line at the first trailing-options marker.
///
/// The marker must begin a whitespace-separated token, so a `--` embedded in
/// a name or URL does not start the tail.
fn split_extra_options(raw: &str) -> (&str, Option<String>) {
    let mut search_from = 0;
    while let Some(pos) = raw[search_from..].find(OPTIONS_MARKER) {
        let index = search_from + pos;
        let at_token_start = index > 0 && raw[..index].ends_with(|c: char| c.is_whitespace());
        if at_token_start {
            let tail = raw[index..].trim();
            return (&raw[..index], Some(tail.to_string()));
        }
        search_from = index + OPTIONS_MARKER.len();
    }
    (raw, None)
}

/// Find the leftmost operator token in the requirement core.
///
/// At a given position the longest token wins, so `>=1.0.0` yields `>=`
/// rather than `>`.
fn leftmost_operator(core: &str) -> Option<(usize, Operator)> {
    core.char_indices()
        .find_map(|(i, _)| Operator::at_start(&core[i..]).map(|op| (i, op)))
}
