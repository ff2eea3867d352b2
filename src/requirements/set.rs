//! Ordered requirement sets with equivalence queries.
//!
//! A [`Requirements`] value keeps both the raw requirement lines (insertion
//! order preserved) and their parsed form. The raw list is the single source
//! of truth: mutation re-parses the whole set.

use crate::error::Result;
use crate::requirements::Specifier;
use std::ops::Index;

/// An ordered collection of requirement specifiers.
///
/// Duplicates are not rejected structurally; they are semantically redundant.
#[derive(Debug, Clone, Default)]
pub struct Requirements {
    raw: Vec<String>,
    parsed: Vec<Specifier>,
}

impl Requirements {
    /// An empty requirement set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a requirement set from raw lines.
    pub fn parse<I, S>(lines: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let raw: Vec<String> = lines
            .into_iter()
            .map(|line| line.into().trim().to_string())
            .filter(|line| !line.is_empty())
            .collect();
        let parsed = raw
            .iter()
            .map(|line| Specifier::parse(line))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { raw, parsed })
    }

    /// Parse a newline-separated requirement block.
    pub fn parse_block(text: &str) -> Result<Self> {
        Self::parse(text.lines())
    }

    /// Append one raw requirement line and re-parse the whole set.
    ///
    /// On a parse error the set is left unchanged.
    pub fn add(&mut self, line: &str) -> Result<()> {
        let mut raw = self.raw.clone();
        raw.push(line.to_string());
        *self = Self::parse(raw)?;
        Ok(())
    }

    /// Number of requirement lines.
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// True when the set has no requirements.
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Raw requirement lines in insertion order.
    pub fn raw_lines(&self) -> &[String] {
        &self.raw
    }

    /// Parsed specifiers in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Specifier> {
        self.parsed.iter()
    }

    /// Pairs of raw line and parsed specifier, in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Specifier)> {
        self.raw.iter().map(String::as_str).zip(self.parsed.iter())
    }

    /// True iff some member is equivalent to `spec` (name, operator+version
    /// by value, and extra options all equal).
    pub fn contains_spec(&self, spec: &Specifier) -> bool {
        self.parsed.iter().any(|member| member.matches(spec))
    }

    /// True iff some member is equivalent to the parsed form of `line`.
    pub fn contains_str(&self, line: &str) -> Result<bool> {
        Ok(self.contains_spec(&Specifier::parse(line)?))
    }

    /// True iff every specifier of `other` is contained in `self`.
    ///
    /// Vacuously true for an empty `other`; an empty `self` therefore
    /// satisfies nothing but the empty query.
    pub fn contains_all(&self, other: &Requirements) -> bool {
        other.iter().all(|spec| self.contains_spec(spec))
    }

    /// Raw lines ordered by canonical specifier key.
    ///
    /// This is the stable form used for persistence and equality, so callers
    /// that reorder their requirement lists still compare equal.
    pub fn sorted_lines(&self) -> Vec<String> {
        let mut entries: Vec<(String, String)> = self
            .entries()
            .map(|(raw, spec)| (spec.canonical_key(), raw.to_string()))
            .collect();
        entries.sort();
        entries.into_iter().map(|(_, raw)| raw).collect()
    }
}

/// Order-independent value equality over parsed specifiers.
impl PartialEq for Requirements {
    fn eq(&self, other: &Self) -> bool {
        let mut left: Vec<String> = self.parsed.iter().map(|s| s.canonical_key()).collect();
        let mut right: Vec<String> = other.parsed.iter().map(|s| s.canonical_key()).collect();
        left.sort();
        right.sort();
        left == right
    }
}

impl Eq for Requirements {}

impl Index<usize> for Requirements {
    type Output = Specifier;

    fn index(&self, index: usize) -> &Specifier {
        &self.parsed[index]
    }
}

impl<'a> IntoIterator for &'a Requirements {
    type Item = &'a Specifier;
    type IntoIter = std::slice::Iter<'a, Specifier>;

    fn into_iter(self) -> Self::IntoIter {
        self.parsed.iter()
    }
}
