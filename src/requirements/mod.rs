//! Requirement specifier parsing and set semantics.
//!
//! This module turns raw requirement lines into structured specifiers and
//! provides the equivalence queries the reconciliation engine diffs against.
//!
//! # Modules
//!
//! - [`specifier`] - Single-line parsing, operators, and field comparison
//! - [`set`] - Ordered sets with membership and order-independent equality

pub mod set;
pub mod specifier;

pub use set::Requirements;
pub use specifier::{Operator, Specifier, SpecifierMatch};
