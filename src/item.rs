//! Pool items.
//!
//! An item is one row of an exposure pool: a mapping of attribute names to
//! string values. Attribute names are case-insensitive. Items are built once
//! by the external loader and never mutated by the engine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::candidate::Acid;

/// Attribute values that indicate the attribute is not specified.
///
/// Compared case-insensitively after trimming.
pub const INVALID_VALUES: &[&str] = &["", "null", "none", "--", "n/a", "n", "f", "false"];

/// Attribute holding the candidate membership list of an item.
pub const CANDIDATE_ATTR: &str = "asn_candidate";

/// Returns true if `value` counts as "not specified".
#[must_use]
pub fn is_invalid_value(value: &str) -> bool {
    let v = value.trim();
    INVALID_VALUES.iter().any(|invalid| v.eq_ignore_ascii_case(invalid))
}

/// A single pool entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pool_file: Option<String>,
}

impl Item {
    /// Creates an empty item.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an attribute, returning the item.
    #[must_use]
    pub fn with(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Records the pool file the item was read from.
    #[must_use]
    pub fn with_pool_file(mut self, pool_file: impl Into<String>) -> Self {
        self.pool_file = Some(pool_file.into());
        self
    }

    /// Sets an attribute. Names are stored lowercase.
    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.attributes
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    /// Raw attribute lookup, including values that count as unspecified.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Attribute lookup that treats invalid values as absent.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&str> {
        self.get(name).filter(|v| !is_invalid_value(v))
    }

    /// True if the attribute is present with a valid value.
    #[must_use]
    pub fn flag(&self, name: &str) -> bool {
        self.value(name).is_some()
    }

    /// The exposure file name of this item.
    #[must_use]
    pub fn filename(&self) -> Option<&str> {
        self.get("filename")
    }

    /// The pool file the item was read from, if known.
    #[must_use]
    pub fn pool_file(&self) -> Option<&str> {
        self.pool_file.as_deref()
    }

    /// Candidates this item belongs to, parsed from `asn_candidate`.
    #[must_use]
    pub fn candidates(&self) -> Vec<Acid> {
        self.get(CANDIDATE_ATTR)
            .map(Acid::parse_list)
            .unwrap_or_default()
    }

    /// Number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// True if the item has no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Item {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut item = Self::new();
        for (k, v) in iter {
            item.insert(k, v);
        }
        item
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::CandidateType;

    #[test]
    fn lookup_is_case_insensitive() {
        let item = Item::new().with("EXP_TYPE", "NRS_FIXEDSLIT");
        assert_eq!(item.get("exp_type"), Some("NRS_FIXEDSLIT"));
        assert_eq!(item.get("Exp_Type"), Some("NRS_FIXEDSLIT"));

        let item = item.with("exp_type", "NRS_IFU");
        assert_eq!(item.len(), 1);
        assert_eq!(item.get("EXP_TYPE"), Some("NRS_IFU"));
        assert!(Item::new().is_empty());
    }

    #[test]
    fn invalid_values_are_absent() {
        let item: Item = [("tsovisit", "F"), ("bkgdtarg", "null"), ("is_psf", "t")]
            .into_iter()
            .collect();
        assert_eq!(item.get("tsovisit"), Some("F"));
        assert_eq!(item.value("tsovisit"), None);
        assert!(!item.flag("bkgdtarg"));
        assert!(item.flag("is_psf"));
        assert!(!item.flag("missing"));
    }

    #[test]
    fn candidates_parse_from_pool_notation() {
        let item = Item::new().with(
            "asn_candidate",
            "[('o001', 'observation'), ('c1000', 'background')]",
        );
        let cands = item.candidates();
        assert_eq!(cands.len(), 2);
        assert_eq!(cands[0].id(), "o001");
        assert_eq!(cands[1].kind(), &CandidateType::Background);
    }

    #[test]
    fn no_candidate_attribute_means_no_candidates() {
        assert!(Item::new().with("filename", "a_uncal.fits").candidates().is_empty());
    }
}
