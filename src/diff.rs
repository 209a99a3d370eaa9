//! Structural comparison of association sets.
//!
//! Two sets are equivalent when, after splitting every association into
//! single-product associations, both sides produce the same product names
//! and each pair of like-named associations agrees on type, candidate level
//! and membership. Product names are compared as sets of `_`/`-` separated
//! tokens, so token order does not matter.
//!
//! Every mismatch is reported as a [`DiffError`]; mismatches found inside a
//! pair of associations carry both of them.

use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use tracing::debug;

use crate::association::Association;
use crate::error::{AsnResult, DiffError, Side};
use crate::member::Product;

/// Split an association into one single-product association per product.
#[must_use]
pub fn separate_products(asn: &Association) -> Vec<Association> {
    asn.products
        .iter()
        .map(|product| Association {
            products: vec![product.clone()],
            ..asn.clone()
        })
        .collect()
}

/// Names of the first product of each association, and the names that occur
/// more than once (in order of first repetition).
#[must_use]
pub fn product_names(asns: &[Association]) -> (BTreeSet<String>, Vec<String>) {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut dups = Vec::new();
    for name in asns.iter().filter_map(|a| a.products.first()).map(|p| p.name.as_str()) {
        let count = counts.entry(name).or_insert(0);
        *count += 1;
        if *count == 2 {
            dups.push(name.to_string());
        }
    }
    if !dups.is_empty() {
        debug!(?dups, "duplicate product names");
    }
    let names = counts.into_keys().map(str::to_string).collect();
    (names, dups)
}

/// Tokens of a product name, split on `_` and `-`.
#[must_use]
pub fn components(name: &str) -> BTreeSet<&str> {
    name.split(['_', '-']).collect()
}

/// Compare two sets of associations.
pub fn compare_asn_lists(left: &[Association], right: &[Association]) -> Result<(), DiffError> {
    let left: Vec<Association> = left.iter().flat_map(separate_products).collect();
    let right: Vec<Association> = right.iter().flat_map(separate_products).collect();

    let (left_names, left_dups) = product_names(&left);
    let (right_names, right_dups) = product_names(&right);
    if !left_dups.is_empty() {
        return Err(DiffError::DuplicateProducts {
            side: Side::Left,
            names: left_dups,
        });
    }
    if !right_dups.is_empty() {
        return Err(DiffError::DuplicateProducts {
            side: Side::Right,
            names: right_dups,
        });
    }

    let names: Vec<String> = left_names
        .symmetric_difference(&right_names)
        .cloned()
        .collect();
    if !names.is_empty() {
        return Err(DiffError::ProductNameMismatch { names });
    }

    let right_by_product: HashMap<&str, &Association> = right
        .iter()
        .map(|asn| (asn.products[0].name.as_str(), asn))
        .collect();
    for asn in &left {
        let name = asn.products[0].name.as_str();
        if let Some(other) = right_by_product.get(name) {
            compare_asns(asn, other)?;
        }
    }
    Ok(())
}

/// Compare two associations, attaching both to any mismatch.
pub fn compare_asns(left: &Association, right: &Association) -> Result<(), DiffError> {
    compare_contents(left, right).map_err(|reason| DiffError::AsnMismatch {
        reason: Box::new(reason),
        left: Box::new(left.clone()),
        right: Box::new(right.clone()),
    })
}

fn compare_contents(left: &Association, right: &Association) -> Result<(), DiffError> {
    if left.asn_type != right.asn_type {
        return Err(DiffError::TypeMismatch {
            left: left.asn_type.clone(),
            right: right.asn_type.clone(),
        });
    }

    // Only the candidate level ('a', 'c', 'o') is comparable, not the value.
    let level = |asn: &Association| asn.asn_id.chars().next().map(String::from).unwrap_or_default();
    let (left_level, right_level) = (level(left), level(right));
    if left_level != right_level {
        return Err(DiffError::CandidateLevelMismatch {
            left: left_level,
            right: right_level,
        });
    }

    compare_membership(left, right)
}

/// Compare the products and members of two associations.
///
/// Products are paired by name tokens; members are paired by exposure name
/// and must carry the same role. Nothing may be left over on either side.
pub fn compare_membership(left: &Association, right: &Association) -> Result<(), DiffError> {
    if left.products.len() != right.products.len() {
        return Err(DiffError::ProductCountMismatch {
            left: left.products.len(),
            right: right.products.len(),
        });
    }

    let mut products_right: Vec<&Product> = right.products.iter().collect();
    for left_product in &left.products {
        let tokens = components(&left_product.name);
        let Some(pos) = products_right
            .iter()
            .position(|p| components(&p.name) == tokens)
        else {
            return Err(DiffError::ProductMissing {
                name: left_product.name.clone(),
            });
        };
        let right_product = products_right.remove(pos);
        compare_members(left_product, right_product)?;
    }

    if !products_right.is_empty() {
        return Err(DiffError::UnmatchedProducts {
            count: products_right.len(),
        });
    }
    Ok(())
}

fn compare_members(left: &Product, right: &Product) -> Result<(), DiffError> {
    if left.members.len() != right.members.len() {
        return Err(DiffError::MemberCountMismatch {
            left_product: left.name.clone(),
            right_product: right.name.clone(),
            left: left.members.len(),
            right: right.members.len(),
        });
    }

    let mut members_right: Vec<_> = right.members.iter().collect();
    for member in &left.members {
        let Some(pos) = members_right.iter().position(|m| m.expname == member.expname) else {
            return Err(DiffError::MemberMissing {
                expname: member.expname.clone(),
                exptype: member.exptype.clone(),
            });
        };
        let other = members_right.remove(pos);
        if other.exptype != member.exptype {
            return Err(DiffError::RoleMismatch {
                expname: member.expname.clone(),
                left: member.exptype.clone(),
                right: other.exptype.clone(),
            });
        }
    }

    if let Some(first) = members_right.first() {
        return Err(DiffError::UnmatchedMembers {
            count: members_right.len(),
            expname: first.expname.clone(),
            exptype: first.exptype.clone(),
        });
    }
    Ok(())
}

/// Read one association from JSON.
pub fn load_asn<R: Read>(reader: R) -> AsnResult<Association> {
    Ok(serde_json::from_reader(reader)?)
}

fn load_asn_file(path: &Path) -> AsnResult<Association> {
    let file = File::open(path)?;
    load_asn(BufReader::new(file))
}

/// Compare two sets of association files.
pub fn compare_asn_files<L, R>(left_paths: &[L], right_paths: &[R]) -> AsnResult<()>
where
    L: AsRef<Path>,
    R: AsRef<Path>,
{
    let left = left_paths
        .iter()
        .map(|p| load_asn_file(p.as_ref()))
        .collect::<AsnResult<Vec<_>>>()?;
    let right = right_paths
        .iter()
        .map(|p| load_asn_file(p.as_ref()))
        .collect::<AsnResult<Vec<_>>>()?;
    compare_asn_lists(&left, &right)?;
    Ok(())
}
