//! Association records.
//!
//! An [`Association`] is the materialized form of a grouping: the shape
//! handed to external serialization and consumed by merge, prune and diff.
//! Associations under construction live in [`crate::pending`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::candidate::CandidateType;
use crate::member::{Member, Product, Role};
use crate::naming::{product_name_from_expname, PRODUCT_NAME_DEFAULT};

/// A named grouping of exposures.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Association {
    /// Association type tag, e.g. `image2` or `spec2`.
    #[serde(alias = "type")]
    pub asn_type: String,
    /// Name of the rule that built the association.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub asn_rule: String,
    /// Candidate id.
    #[serde(alias = "candidateId")]
    pub asn_id: String,
    /// Pool the members came from.
    #[serde(default, alias = "pool")]
    pub asn_pool: String,
    /// Program number, zero padded to five digits.
    #[serde(default)]
    pub program: String,
    /// Target id.
    #[serde(default)]
    pub target: String,
    /// Description of the constraints that built the association.
    #[serde(default)]
    pub constraints: String,
    /// Sequence number within its type.
    #[serde(default)]
    pub sequence: u32,
    /// Output products.
    #[serde(default)]
    pub products: Vec<Product>,
}

impl Association {
    /// Creates an empty association of the given type and candidate.
    #[must_use]
    pub fn new(asn_type: impl Into<String>, asn_id: impl Into<String>) -> Self {
        Self {
            asn_type: asn_type.into(),
            asn_id: asn_id.into(),
            ..Self::default()
        }
    }

    /// Adds a product, returning the association.
    #[must_use]
    pub fn with_product(mut self, product: Product) -> Self {
        self.products.push(product);
        self
    }

    /// Candidate type following the id prefix convention.
    #[must_use]
    pub fn candidate_type(&self) -> CandidateType {
        CandidateType::from_id(&self.asn_id)
    }

    /// The product currently being filled (the last one).
    #[must_use]
    pub fn current_product(&self) -> Option<&Product> {
        self.products.last()
    }

    /// Mutable access to the current product.
    pub fn current_product_mut(&mut self) -> Option<&mut Product> {
        self.products.last_mut()
    }

    /// Starts a new, empty product and returns it.
    pub fn new_product(&mut self, name: impl Into<String>) -> &mut Product {
        self.products.push(Product::new(name));
        let idx = self.products.len() - 1;
        &mut self.products[idx]
    }

    /// Members of the current product with the given role.
    #[must_use]
    pub fn members_by_type(&self, role: &Role) -> Vec<&Member> {
        self.current_product()
            .map(|p| p.members_by_type(role))
            .unwrap_or_default()
    }

    /// True if the current product has a science member.
    #[must_use]
    pub fn has_science(&self) -> bool {
        self.current_product().is_some_and(Product::has_science)
    }

    /// Allow only observation and background candidates.
    ///
    /// Background candidates additionally need a background member.
    #[must_use]
    pub fn validate_candidates(&self) -> bool {
        match self.candidate_type() {
            CandidateType::Observation => true,
            CandidateType::Background => !self.members_by_type(&Role::Background).is_empty(),
            _ => false,
        }
    }

    /// Validity of a finished level-2 association.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.has_science() && self.validate_candidates()
    }

    /// Product name derived from the first science member of the current product.
    #[must_use]
    pub fn dms_product_name(&self) -> String {
        self.members_by_type(&Role::Science)
            .first()
            .map_or_else(
                || PRODUCT_NAME_DEFAULT.to_string(),
                |science| product_name_from_expname(&science.expname),
            )
    }

    /// Names of all products, in order.
    pub fn product_names(&self) -> impl Iterator<Item = &str> {
        self.products.iter().map(|p| p.name.as_str())
    }

    /// Split nodded exposures into one association per science member.
    ///
    /// Each science member becomes the sole science exposure of its own
    /// association; the other science members are relabeled background and
    /// every non-science member is carried along. Splits that are not valid
    /// are dropped.
    #[must_use]
    pub fn make_nod_asns(&self) -> Vec<Association> {
        let mut results = Vec::new();
        for product in &self.products {
            let (science, nonscience): (Vec<&Member>, Vec<&Member>) =
                product.members.iter().partition(|m| m.exptype.is_science());

            for science_exp in &science {
                let mut asn = Association {
                    products: Vec::new(),
                    ..self.clone()
                };
                let members = &mut asn
                    .new_product(product_name_from_expname(&science_exp.expname))
                    .members;
                members.push((*science_exp).clone());
                members.extend(
                    science
                        .iter()
                        .filter(|other| other.expname != science_exp.expname)
                        .map(|other| other.relabeled(Role::Background)),
                );
                members.extend(nonscience.iter().map(|m| (*m).clone()));

                if asn.is_valid() {
                    results.push(asn);
                }
            }
        }
        results
    }

    /// File-stem style name of the association.
    ///
    /// `jw{program}-{asn_id}[_{version}]_{asn_type}_{sequence:05}_asn`
    #[must_use]
    pub fn asn_name(&self, version_id: Option<&str>) -> String {
        let name = match version_id {
            Some(version) => format!(
                "jw{}-{}_{}_{}_{:05}_asn",
                self.program, self.asn_id, version, self.asn_type, self.sequence
            ),
            None => format!(
                "jw{}-{}_{}_{:05}_asn",
                self.program, self.asn_id, self.asn_type, self.sequence
            ),
        };
        name.to_lowercase()
    }
}

impl fmt::Display for Association {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Association {}/{} (rule: {}, program: {}, target: {}, pool: {}, sequence: {})",
            self.asn_type,
            self.asn_id,
            if self.asn_rule.is_empty() { "indetermined" } else { self.asn_rule.as_str() },
            self.program,
            self.target,
            self.asn_pool,
            self.sequence,
        )?;
        for product in &self.products {
            write!(f, " [{}:", product.name)?;
            for member in &product.members {
                write!(f, " {}:{}", member.expname, member.exptype)?;
            }
            write!(f, "]")?;
        }
        Ok(())
    }
}
