//! Merging associations that share a type and candidate.
//!
//! Associations are grouped by `(asn_type, asn_id)` in first-seen order. The
//! first association of a group is the accumulator; the others fold into it
//! product by product. Products with the same name gain the members they do
//! not already have; other products are appended.

use std::collections::HashMap;
use std::convert::Infallible;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::association::Association;
use crate::error::MergeError;
use crate::member::{Member, Product};

/// Resolution when a member appears under two roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleConflictPolicy {
    /// The role seen first is kept.
    #[default]
    KeepFirst,
    /// The incoming role overwrites the existing one.
    KeepIncoming,
    /// Conflicts are errors.
    Reject,
}

/// Folds associations together under a role conflict policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct Merger {
    policy: RoleConflictPolicy,
}

impl Merger {
    /// Creates a merger with the given role conflict policy.
    #[must_use]
    pub const fn new(policy: RoleConflictPolicy) -> Self {
        Self { policy }
    }

    /// The role conflict policy in use.
    #[must_use]
    pub const fn policy(&self) -> RoleConflictPolicy {
        self.policy
    }

    /// Merge associations by type and candidate.
    ///
    /// The output holds one association per group, in the order the groups
    /// were first seen.
    pub fn merge(&self, asns: Vec<Association>) -> Result<Vec<Association>, MergeError> {
        fold_groups(asns, |product, current, incoming| match self.policy {
            RoleConflictPolicy::KeepFirst => Ok(()),
            RoleConflictPolicy::KeepIncoming => {
                current.exptype = incoming.exptype;
                Ok(())
            }
            RoleConflictPolicy::Reject => Err(MergeError::RoleConflict {
                product: product.to_string(),
                expname: incoming.expname,
                existing: current.exptype.clone(),
                incoming: incoming.exptype,
            }),
        })
    }
}

/// Merge with the default policy, where the first-seen role wins.
#[must_use]
pub fn merge_asns(asns: Vec<Association>) -> Vec<Association> {
    match fold_groups(asns, |_, _, _| Ok::<(), Infallible>(())) {
        Ok(merged) => merged,
        Err(never) => match never {},
    }
}

/// Group by `(asn_type, asn_id)` and fold each group into its first member.
///
/// `resolve` is called for a member present in both products under
/// different roles.
fn fold_groups<E>(
    asns: Vec<Association>,
    mut resolve: impl FnMut(&str, &mut Member, Member) -> Result<(), E>,
) -> Result<Vec<Association>, E> {
    let total = asns.len();
    let mut index: HashMap<(String, String), usize> = HashMap::new();
    let mut merged: Vec<Association> = Vec::new();

    for asn in asns {
        let key = (asn.asn_type.clone(), asn.asn_id.clone());
        match index.get(&key) {
            Some(&idx) => fold(&mut merged[idx], asn, &mut resolve)?,
            None => {
                index.insert(key, merged.len());
                merged.push(asn);
            }
        }
    }

    debug!(input = total, output = merged.len(), "merged associations");
    Ok(merged)
}

fn fold<E>(
    current: &mut Association,
    incoming: Association,
    resolve: &mut impl FnMut(&str, &mut Member, Member) -> Result<(), E>,
) -> Result<(), E> {
    for product in incoming.products {
        match current.products.iter_mut().find(|p| p.name == product.name) {
            Some(existing) => fold_product(existing, product, resolve)?,
            None => current.products.push(product),
        }
    }
    Ok(())
}

fn fold_product<E>(
    existing: &mut Product,
    incoming: Product,
    resolve: &mut impl FnMut(&str, &mut Member, Member) -> Result<(), E>,
) -> Result<(), E> {
    for member in incoming.members {
        match existing
            .members
            .iter_mut()
            .find(|m| m.expname == member.expname)
        {
            Some(current) if current.exptype == member.exptype => {}
            Some(current) => resolve(&existing.name, current, member)?,
            None => existing.members.push(member),
        }
    }
    Ok(())
}
