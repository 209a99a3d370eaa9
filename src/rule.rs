//! Association rules.
//!
//! A rule is a value: a constraint tree plus a few behaviour fields (how
//! member roles are assigned, whether the finished association is split
//! into nods). Rules are shared by every association they build.
//!
//! The constraint building blocks and the level-2b rule library live here as
//! well.

use std::sync::Arc;

use crate::constraint::{AttrConstraint, Constraint, ValuePattern};
use crate::dms::{
    RoleAssignment, ACQ_EXP_TYPES, IMAGE2_NONSCIENCE_EXP_TYPES, IMAGE2_SCIENCE_EXP_TYPES,
    SPEC2_SCIENCE_EXP_TYPES,
};
use crate::error::ConfigurationError;

/// An association rule.
#[derive(Debug, Clone)]
pub struct Rule {
    name: String,
    asn_type: String,
    constraint: Constraint,
    roles: RoleAssignment,
    nod_split: bool,
}

impl Rule {
    /// Starts building a rule.
    pub fn builder() -> RuleBuilder {
        RuleBuilder::default()
    }

    /// Rule name, recorded as `asn_rule`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Association type produced by the rule.
    #[must_use]
    pub fn asn_type(&self) -> &str {
        &self.asn_type
    }

    /// Constraint tree, with leaf slots assigned.
    #[must_use]
    pub const fn constraint(&self) -> &Constraint {
        &self.constraint
    }

    /// Role assignment strategy.
    #[must_use]
    pub const fn roles(&self) -> RoleAssignment {
        self.roles
    }

    /// Whether finished associations are split into nods.
    #[must_use]
    pub const fn nod_split(&self) -> bool {
        self.nod_split
    }
}

/// Builder for [`Rule`].
#[derive(Debug, Clone, Default)]
pub struct RuleBuilder {
    name: Option<String>,
    asn_type: Option<String>,
    constraints: Vec<Constraint>,
    roles: RoleAssignment,
    nod_split: bool,
}

impl RuleBuilder {
    /// Set the rule name (required).
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the association type (required).
    #[must_use]
    pub fn asn_type(mut self, asn_type: impl Into<String>) -> Self {
        self.asn_type = Some(asn_type.into());
        self
    }

    /// Append a top-level constraint. Top-level constraints are and-ed.
    #[must_use]
    pub fn constraint(mut self, constraint: impl Into<Constraint>) -> Self {
        self.constraints.push(constraint.into());
        self
    }

    /// Set the role assignment strategy (default: standard).
    #[must_use]
    pub fn roles(mut self, roles: RoleAssignment) -> Self {
        self.roles = roles;
        self
    }

    /// Split finished associations into nods.
    #[must_use]
    pub fn nod_split(mut self) -> Self {
        self.nod_split = true;
        self
    }

    /// Build the rule, assigning pin slots to every leaf.
    pub fn build(self) -> Result<Rule, ConfigurationError> {
        let name = non_blank("name", self.name)?;
        let asn_type = non_blank("asn_type", self.asn_type)?;
        if self.constraints.is_empty() {
            return Err(ConfigurationError::InvalidConfig {
                reason: format!("rule '{name}' has no constraints"),
            });
        }

        let mut constraint = Constraint::all(self.constraints);
        constraint.index_leaves();

        Ok(Rule {
            name,
            asn_type,
            constraint,
            roles: self.roles,
            nod_split: self.nod_split,
        })
    }
}

fn non_blank(field: &str, value: Option<String>) -> Result<String, ConfigurationError> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ConfigurationError::InvalidConfig {
            reason: format!("rule {field} is required"),
        }),
    }
}

/// An ordered collection of rules.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Arc<Rule>>,
}

impl RuleSet {
    /// Creates a rule set from rules, keeping their order.
    #[must_use]
    pub fn new(rules: impl IntoIterator<Item = Rule>) -> Self {
        Self {
            rules: rules.into_iter().map(Arc::new).collect(),
        }
    }

    /// Appends a rule.
    pub fn push(&mut self, rule: Rule) {
        self.rules.push(Arc::new(rule));
    }

    /// Rules in order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Rule>> {
        self.rules.iter()
    }

    /// Rule at `idx`.
    #[must_use]
    pub fn get(&self, idx: usize) -> Option<&Arc<Rule>> {
        self.rules.get(idx)
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// True if there are no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// The level-2b rule library.
    pub fn level2b() -> Result<Self, ConfigurationError> {
        Ok(Self::new([
            spec2_nod()?,
            image2()?,
            image2_nonscience()?,
            image2_special()?,
            spec2()?,
            spec2_special()?,
        ]))
    }
}

// -----------------
// Basic constraints
// -----------------

/// Select on program, keeping TSO and non-TSO visits apart.
#[must_use]
pub fn base() -> Constraint {
    Constraint::all([
        AttrConstraint::new(["program"]).named("program").into(),
        AttrConstraint::new(["tsovisit"])
            .named("is_tso")
            .optional()
            .into(),
    ])
}

/// Select on instrument and optical path.
pub fn mode() -> Result<Constraint, ConfigurationError> {
    Ok(Constraint::all([
        AttrConstraint::new(["instrume"]).named("instrument").into(),
        AttrConstraint::new(["detector"]).named("detector").into(),
        AttrConstraint::new(["filter", "band"]).named("opt_elem").into(),
        AttrConstraint::new(["pupil", "grating"])
            .named("opt_elem2")
            .optional()
            .into(),
        AttrConstraint::new(["fxd_slit"])
            .named("opt_elem3")
            .optional()
            .into(),
        AttrConstraint::new(["subarray"])
            .named("subarray")
            .optional()
            .into(),
        AttrConstraint::new(["channel"])
            .named("channel")
            .optional()
            .into(),
        Constraint::notany([Constraint::all([
            AttrConstraint::new(["instrume"]).equals("nirspec").into(),
            AttrConstraint::new(["filter"]).equals("opaque").into(),
        ])]),
        Constraint::notany([AttrConstraint::new(["visitype"])
            .pattern(ValuePattern::regex(".+wfsc.+")?)
            .into()]),
    ]))
}

/// Select on target id.
#[must_use]
pub fn target() -> Constraint {
    AttrConstraint::new(["targetid"]).named("target").into()
}

/// Select on science images.
#[must_use]
pub fn image_science() -> Constraint {
    AttrConstraint::new(["exp_type"])
        .named("exp_type")
        .one_of(IMAGE2_SCIENCE_EXP_TYPES.iter().copied())
        .into()
}

/// Select on non-science images, including NIRSpec MSA confirmation images.
#[must_use]
pub fn image_nonscience() -> Constraint {
    Constraint::any([
        AttrConstraint::new(["exp_type"])
            .named("non_science")
            .one_of(
                IMAGE2_NONSCIENCE_EXP_TYPES
                    .iter()
                    .chain(ACQ_EXP_TYPES.iter())
                    .copied(),
            )
            .into(),
        Constraint::all([
            AttrConstraint::new(["exp_type"])
                .named("exp_type")
                .equals("nrs_msaspec")
                .into(),
            AttrConstraint::new(["msastate"])
                .equals("primarypark_allopen")
                .into(),
            AttrConstraint::new(["grating"]).equals("mirror").into(),
        ]),
    ])
}

/// Select on spectral science, optionally leaving some exposure types out.
#[must_use]
pub fn spectral_science(exclude: &[&str]) -> Constraint {
    let types = SPEC2_SCIENCE_EXP_TYPES
        .iter()
        .copied()
        .filter(|t| !exclude.iter().any(|x| x.eq_ignore_ascii_case(t)));
    AttrConstraint::new(["exp_type"])
        .named("exp_type")
        .one_of(types)
        .into()
}

/// Select on backgrounds and other auxiliary exposures.
#[must_use]
pub fn special() -> Constraint {
    AttrConstraint::new(["bkgdtarg", "is_psf"])
        .named("is_special")
        .into()
}

/// Allow only a single science exposure.
#[must_use]
pub fn single_science() -> Constraint {
    Constraint::SingleScience
}

/// Exclude background and PSF exposures.
#[must_use]
pub fn not_special() -> Constraint {
    Constraint::notany([AttrConstraint::new(["bkgdtarg", "is_psf"]).into()])
}

// -----------------
// Level-2b rules
// -----------------

/// One association per science image.
pub fn image2() -> Result<Rule, ConfigurationError> {
    Rule::builder()
        .name("Asn_Lv2Image")
        .asn_type("image2")
        .constraint(base())
        .constraint(mode()?)
        .constraint(image_science())
        .constraint(not_special())
        .constraint(single_science())
        .build()
}

/// Non-science images, processed as science.
pub fn image2_nonscience() -> Result<Rule, ConfigurationError> {
    Rule::builder()
        .name("Asn_Lv2ImageNonScience")
        .asn_type("image2")
        .constraint(base())
        .constraint(mode()?)
        .constraint(image_nonscience())
        .constraint(single_science())
        .roles(RoleAssignment::ForceScience)
        .build()
}

/// Background and PSF images, processed as science.
pub fn image2_special() -> Result<Rule, ConfigurationError> {
    Rule::builder()
        .name("Asn_Lv2ImageSpecial")
        .asn_type("image2")
        .constraint(base())
        .constraint(mode()?)
        .constraint(image_science())
        .constraint(special())
        .constraint(single_science())
        .roles(RoleAssignment::ForceScience)
        .build()
}

/// One association per spectral science exposure, with the background
/// exposures of its candidate.
///
/// Background exposures may arrive before the science they belong to, so
/// they are reprocessed against the associations that exist after the pool
/// has been seen once.
pub fn spec2() -> Result<Rule, ConfigurationError> {
    let exp_type = || {
        AttrConstraint::new(["exp_type"])
            .named("exp_type")
            .one_of(SPEC2_SCIENCE_EXP_TYPES.iter().copied())
            .force_unique(false)
    };
    Rule::builder()
        .name("Asn_Lv2Spec")
        .asn_type("spec2")
        .constraint(base())
        .constraint(mode()?)
        .constraint(Constraint::any([
            Constraint::all([exp_type().into(), not_special(), single_science()]),
            Constraint::all([
                exp_type().into(),
                AttrConstraint::new(["bkgdtarg"])
                    .named("background")
                    .reprocess_on_match()
                    .into(),
            ]),
        ]))
        .build()
}

/// Background and PSF spectra, processed as science.
pub fn spec2_special() -> Result<Rule, ConfigurationError> {
    Rule::builder()
        .name("Asn_Lv2SpecSpecial")
        .asn_type("spec2")
        .constraint(base())
        .constraint(mode()?)
        .constraint(spectral_science(&[]))
        .constraint(special())
        .constraint(single_science())
        .roles(RoleAssignment::ForceScience)
        .build()
}

/// Nodded spectral sequences, split into one association per nod.
pub fn spec2_nod() -> Result<Rule, ConfigurationError> {
    Rule::builder()
        .name("Asn_Lv2NRSNod")
        .asn_type("spec2")
        .constraint(base())
        .constraint(mode()?)
        .constraint(target())
        .constraint(
            AttrConstraint::new(["exp_type"])
                .named("exp_type")
                .one_of(["nrs_msaspec", "nrs_fixedslit", "mir_lrs-fixedslit"]),
        )
        .constraint(AttrConstraint::new(["patttype"]).named("nod_pattern"))
        .constraint(not_special())
        .nod_split()
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::{EvalContext, Pins};
    use crate::item::Item;

    #[test]
    fn builder_requires_name_type_and_constraints() {
        assert!(Rule::builder().asn_type("image2").constraint(base()).build().is_err());
        assert!(Rule::builder().name("r").constraint(base()).build().is_err());
        assert!(Rule::builder().name("r").asn_type("  ").constraint(base()).build().is_err());
        assert!(Rule::builder().name("r").asn_type("image2").build().is_err());
    }

    #[test]
    fn build_assigns_distinct_slots() {
        let rule = Rule::builder()
            .name("r")
            .asn_type("image2")
            .constraint(base())
            .constraint(target())
            .build()
            .unwrap();
        let Constraint::Group { children, .. } = rule.constraint() else {
            panic!("expected a group");
        };
        let Constraint::Attr(target) = &children[1] else {
            panic!("expected a leaf");
        };
        assert_eq!(target.slot(), 2);
        assert_eq!(rule.constraint().leaf_count(), 3);
    }

    #[test]
    fn spectral_science_excludes_types() {
        let c = spectral_science(&["NRS_IFU"]);
        assert!(!c.to_string().contains("'nrs_ifu'"));
        assert!(c.to_string().contains("'nrs_msaspec'"));
    }

    #[test]
    fn level2b_library_builds() {
        let rules = RuleSet::level2b().unwrap();
        assert_eq!(rules.len(), 6);
        let names: Vec<&str> = rules.iter().map(|r| r.name()).collect();
        assert!(names.contains(&"Asn_Lv2Image"));
        assert!(rules.iter().any(|r| r.nod_split()));
        assert!(rules
            .iter()
            .any(|r| r.roles() == RoleAssignment::ForceScience));
    }

    #[test]
    fn rule_set_keeps_push_order() {
        let mut rules = RuleSet::default();
        assert!(rules.is_empty());
        rules.push(image2().unwrap());
        rules.push(spec2().unwrap());
        assert_eq!(rules.len(), 2);
        assert_eq!(rules.get(0).map(|r| r.name()), Some("Asn_Lv2Image"));
        assert_eq!(rules.get(1).map(|r| r.asn_type()), Some("spec2"));
        assert!(rules.get(2).is_none());
    }

    #[test]
    fn spec2_takes_backgrounds_of_its_candidate() {
        let rule = spec2().unwrap();
        let spec = |bkgdtarg: &str| -> Item {
            [
                ("program", "1"),
                ("instrume", "nirspec"),
                ("detector", "nrs1"),
                ("filter", "f170lp"),
                ("exp_type", "nrs_fixedslit"),
                ("bkgdtarg", bkgdtarg),
            ]
            .into_iter()
            .collect()
        };
        let pins = Pins::new();

        let science = rule
            .constraint()
            .evaluate(&spec("f"), &EvalContext::new(&pins, false));
        assert!(science.matched);
        assert!(!science.reprocess);

        let second = rule
            .constraint()
            .evaluate(&spec("f"), &EvalContext::new(&pins, true));
        assert!(!second.matched);

        let background = rule
            .constraint()
            .evaluate(&spec("t"), &EvalContext::new(&pins, true));
        assert!(background.matched);
        assert!(background.reprocess);
    }
}
