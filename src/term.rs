//! Identifiers of terms and items (genes)
//!
//! Terms are the classification labels of an ontology, e.g. `GO:0008150`.
//! Items are the annotated entities, most often genes identified by their symbol.
use core::fmt::Debug;
use std::collections::HashMap;
use std::fmt::Display;

use crate::{MgsaError, MgsaResult};

/// A unique identifier of an ontology term
///
/// The identifier is stored as its numerical part only. The textual
/// representation is `GO:` followed by the zero-padded, 7-digit number.
///
/// # Examples
///
/// ```
/// use mgsa::TermId;
///
/// let id = TermId::try_from("GO:0008150").unwrap();
/// assert_eq!(id.as_u32(), 8150);
/// assert_eq!(id.to_string(), "GO:0008150");
/// assert_eq!(id, TermId::from(8150u32));
/// ```
#[derive(Copy, Clone, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TermId {
    inner: u32,
}

impl TermId {
    /// Returns the integer representation of the term ID
    pub fn as_u32(&self) -> u32 {
        self.inner
    }
}

impl TryFrom<&str> for TermId {
    type Error = MgsaError;
    /// Parses `GO:0008150`-like identifiers or plain integers
    fn try_from(s: &str) -> MgsaResult<Self> {
        let digits = match s.split_once(':') {
            Some((_, digits)) => digits,
            None => s,
        };
        Ok(TermId {
            inner: digits.parse::<u32>()?,
        })
    }
}

impl From<u32> for TermId {
    fn from(inner: u32) -> Self {
        Self { inner }
    }
}

impl Debug for TermId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TermId({self})")
    }
}

impl Display for TermId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GO:{:07}", self.inner)
    }
}

/// A unique identifier of an annotated item, usually a gene symbol
#[derive(Clone, Default, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ItemId {
    inner: String,
}

impl ItemId {
    /// Returns the item identifier as string slice
    pub fn as_str(&self) -> &str {
        &self.inner
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self {
            inner: s.to_string(),
        }
    }
}

impl From<String> for ItemId {
    fn from(inner: String) -> Self {
        Self { inner }
    }
}

impl From<&ItemId> for ItemId {
    fn from(id: &ItemId) -> Self {
        id.clone()
    }
}

impl Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.inner)
    }
}

/// Resolves terms to human readable names
///
/// The term hierarchy itself is not part of this crate. Callers that own
/// an ontology implement this trait to have the best scoring terms
/// logged with their names.
pub trait TermLabels {
    /// Returns the name of the term, if known
    fn label(&self, term: TermId) -> Option<&str>;
}

impl TermLabels for HashMap<TermId, String> {
    fn label(&self, term: TermId) -> Option<&str> {
        self.get(&term).map(String::as_str)
    }
}

/// Used when no term names are available
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLabels;

impl TermLabels for NoLabels {
    fn label(&self, _term: TermId) -> Option<&str> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_term_ids() {
        assert_eq!(TermId::try_from("GO:0000001").unwrap(), TermId::from(1u32));
        assert_eq!(TermId::try_from("42").unwrap().as_u32(), 42);
        assert!(TermId::try_from("GO:abc").is_err());
        assert!(TermId::try_from("").is_err());
    }

    #[test]
    fn display() {
        assert_eq!(TermId::from(5u32).to_string(), "GO:0000005");
        assert_eq!(format!("{:?}", TermId::from(5u32)), "TermId(GO:0000005)");
        assert_eq!(ItemId::from("BRCA2").to_string(), "BRCA2");
    }

    #[test]
    fn labels() {
        let mut names = HashMap::new();
        names.insert(TermId::from(1u32), String::from("biological_process"));
        assert_eq!(names.label(1u32.into()), Some("biological_process"));
        assert_eq!(names.label(2u32.into()), None);
        assert_eq!(NoLabels.label(1u32.into()), None);
    }
}
