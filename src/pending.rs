//! Associations under construction.
//!
//! A [`PendingAssociation`] consumes items one at a time. Each item is
//! checked against the rule's constraint tree (with the values pinned by
//! earlier items); matching items become members of the current product and
//! the product name is re-derived from the science member.
//!
//! States: `Empty` (no item accepted yet), `Open` (members but not valid),
//! `Valid` (has science and an allowed candidate).

use std::error::Error as StdError;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::association::Association;
use crate::candidate::{Acid, CandidateType};
use crate::constraint::{EvalContext, Pins};
use crate::dms::{is_item_tso, CORON_EXP_TYPES};
use crate::error::ConfigurationError;
use crate::item::Item;
use crate::member::{Member, Role};
use crate::naming::{product_name_from_expname, rename_to_level2a, PRODUCT_NAME_DEFAULT};
use crate::rule::Rule;
use crate::sequence::SequenceCounter;

/// Lifecycle state of a pending association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssociationState {
    /// No item accepted yet.
    Empty,
    /// Has members but is not valid yet.
    Open,
    /// Meets the validity checks.
    Valid,
}

/// Result of offering an item to an association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MatchOutcome {
    /// The item satisfied the rule under this candidate.
    pub matched: bool,
    /// The item should be offered again once the pool has been seen.
    pub reprocess: bool,
}

impl MatchOutcome {
    const REJECTED: Self = Self {
        matched: false,
        reprocess: false,
    };
}

/// An association being built from a stream of items.
#[derive(Debug, Clone)]
pub struct PendingAssociation {
    rule: Arc<Rule>,
    acid: Acid,
    pins: Pins,
    data: Association,
    state: AssociationState,
}

impl PendingAssociation {
    /// Creates an empty association for `rule` under `acid`.
    #[must_use]
    pub fn new(rule: Arc<Rule>, acid: Acid) -> Self {
        let data = Association {
            asn_type: rule.asn_type().to_string(),
            asn_rule: rule.name().to_string(),
            asn_id: acid.id().to_string(),
            ..Association::default()
        };
        Self {
            rule,
            acid,
            pins: Pins::new(),
            data,
            state: AssociationState::Empty,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> AssociationState {
        self.state
    }

    /// The candidate this association is built under.
    #[must_use]
    pub const fn acid(&self) -> &Acid {
        &self.acid
    }

    /// The rule building this association.
    #[must_use]
    pub fn rule(&self) -> &Rule {
        &self.rule
    }

    /// The association record as built so far.
    #[must_use]
    pub const fn data(&self) -> &Association {
        &self.data
    }

    /// True if the association holds at least one science member.
    #[must_use]
    pub fn has_science(&self) -> bool {
        self.data.has_science()
    }

    /// Observation candidates always pass; background candidates need a
    /// background member.
    #[must_use]
    pub fn validate_candidates(&self) -> bool {
        match self.acid.kind() {
            CandidateType::Observation => true,
            CandidateType::Background => !self.data.members_by_type(&Role::Background).is_empty(),
            _ => false,
        }
    }

    /// True once the association may be finalized.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.has_science() && self.validate_candidates()
    }

    /// Check the item against the rule and pin its unique values on success.
    ///
    /// Only observation and background candidates can build level-2
    /// associations; anything else is rejected whatever the constraints say.
    pub fn check_and_set_constraints(&mut self, item: &Item) -> MatchOutcome {
        let ctx = EvalContext::new(&self.pins, self.has_science());
        let eval = self.rule.constraint().evaluate(item, &ctx);
        if !eval.matched || !self.acid.kind().allows_level2() {
            return MatchOutcome::REJECTED;
        }

        self.pins.commit(&eval.captures);
        MatchOutcome {
            matched: true,
            reprocess: eval.reprocess,
        }
    }

    /// Offer an item. Matching items are added as members.
    pub fn add(&mut self, item: &Item) -> MatchOutcome {
        let outcome = self.check_and_set_constraints(item);
        if outcome.matched {
            if self.state == AssociationState::Empty {
                self.init_hook(item);
            }
            self.add_member(item);
        }
        outcome
    }

    /// True if the member this item would become is already present.
    #[must_use]
    pub fn holds(&self, item: &Item) -> bool {
        let expname = self.make_member(item).expname;
        self.data
            .current_product()
            .is_some_and(|p| p.contains(&expname))
    }

    /// Build the member for an item.
    ///
    /// Coronagraphic data is named in its per-integration form even though
    /// it is not time series.
    #[must_use]
    pub fn make_member(&self, item: &Item) -> Member {
        let filename = item.filename().unwrap_or_default();
        Member {
            expname: rename_to_level2a(filename, is_item_tso(item, CORON_EXP_TYPES)),
            exptype: self.rule.roles().assign(item),
            exposerr: item.value("exposerr").map(str::to_string),
        }
    }

    fn init_hook(&mut self, item: &Item) {
        self.data.target = item.get("targetid").unwrap_or_default().to_string();
        self.data.program = format!("{:0>5}", item.get("program").unwrap_or_default());
        self.data.asn_pool = item.pool_file().map(pool_name).unwrap_or_default();
        self.data.constraints = self.rule.constraint().to_string();
        self.data.asn_id = self.acid.id().to_string();
        let name = self.data.dms_product_name();
        self.data.new_product(name);
    }

    fn add_member(&mut self, item: &Item) {
        let member = self.make_member(item);
        if let Some(product) = self.data.current_product_mut() {
            product.members.push(member);
        }
        self.update_asn();
    }

    fn update_asn(&mut self) {
        let name = self.data.dms_product_name();
        if let Some(product) = self.data.current_product_mut() {
            product.name = name;
        }
        self.state = if self.is_valid() {
            AssociationState::Valid
        } else {
            AssociationState::Open
        };
    }

    /// Finish the association.
    ///
    /// Invalid associations yield nothing. Rules that split nods yield one
    /// association per science member.
    #[must_use]
    pub fn finalize(self) -> Vec<Association> {
        if !self.is_valid() {
            return Vec::new();
        }
        if self.rule.nod_split() {
            self.data.make_nod_asns()
        } else {
            vec![self.data]
        }
    }
}

fn pool_name(pool_file: &str) -> String {
    Path::new(pool_file)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(pool_file)
        .split('.')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Metadata merged into associations built by [`add_items`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AsnMeta {
    /// Association type.
    pub asn_type: Option<String>,
    /// Rule name to record.
    pub asn_rule: Option<String>,
    /// Originating pool.
    pub asn_pool: Option<String>,
    /// Originating program.
    pub program: Option<String>,
}

/// Error type returned by custom product naming functions.
pub type NamingError = Box<dyn StdError + Send + Sync>;

/// Custom product naming: `(item, idx)` with `idx` counting from 1.
pub type ProductNamer<'a> = &'a dyn Fn(&str, usize) -> Result<String, NamingError>;

/// Force items into a new association, bypassing all constraints.
///
/// Every item becomes a product of its own with a single science member.
/// The candidate id must start with `o` (observation) or `c` (background).
/// If `namer` fails for an item the derived product name is kept.
pub fn add_items<S: AsRef<str>>(
    items: &[S],
    acid: &str,
    meta: Option<&AsnMeta>,
    namer: Option<ProductNamer<'_>>,
    sequence: &mut SequenceCounter,
) -> Result<Association, ConfigurationError> {
    let acid = Acid::for_bulk_add(acid)?;
    let mut asn = Association {
        asn_id: acid.id().to_string(),
        ..Association::default()
    };

    for (idx, item) in items.iter().enumerate() {
        let idx = idx + 1;
        let item = item.as_ref();
        asn.new_product(PRODUCT_NAME_DEFAULT)
            .members
            .push(Member::science(item));

        let derived = product_name_from_expname(item);
        let name = match namer.map(|f| f(item, idx)) {
            Some(Ok(name)) => name,
            Some(Err(e)) => {
                debug!(item, error = %e, "product name function failed, default product name used");
                derived
            }
            None => derived,
        };
        if let Some(product) = asn.current_product_mut() {
            product.name = name;
        }
    }

    if let Some(meta) = meta {
        if let Some(v) = &meta.asn_type {
            asn.asn_type.clone_from(v);
        }
        if let Some(v) = &meta.asn_rule {
            asn.asn_rule.clone_from(v);
        }
        if let Some(v) = &meta.asn_pool {
            asn.asn_pool.clone_from(v);
        }
        if let Some(v) = &meta.program {
            asn.program.clone_from(v);
        }
    }
    asn.sequence = sequence.next().unwrap_or_default();
    Ok(asn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{self, RuleSet};

    fn image(filename: &str) -> Item {
        Item::new()
            .with("filename", filename)
            .with("program", "1")
            .with("targetid", "2")
            .with("instrume", "nircam")
            .with("detector", "nrca1")
            .with("filter", "f200w")
            .with("exp_type", "nrc_image")
            .with_pool_file("data/jw00001_pool.csv")
    }

    fn image2() -> Arc<Rule> {
        Arc::new(rule::image2().unwrap())
    }

    #[test]
    fn first_item_opens_and_validates() {
        let mut asn = PendingAssociation::new(image2(), Acid::from_id("o001"));
        assert_eq!(asn.state(), AssociationState::Empty);

        let outcome = asn.add(&image("jw00001001001_01101_00001_nrca1_uncal.fits"));
        assert!(outcome.matched);
        assert_eq!(asn.state(), AssociationState::Valid);

        let data = asn.data();
        assert_eq!(data.program, "00001");
        assert_eq!(data.target, "2");
        assert_eq!(data.asn_pool, "jw00001_pool");
        assert_eq!(data.asn_rule, "Asn_Lv2Image");
        assert_eq!(data.products.len(), 1);
        assert_eq!(data.products[0].name, "jw00001001001_01101_00001_nrca1");
        assert_eq!(
            data.products[0].members[0].expname,
            "jw00001001001_01101_00001_nrca1_rate.fits"
        );
        assert!(data.constraints.starts_with("all("));
    }

    #[test]
    fn second_science_is_refused() {
        let mut asn = PendingAssociation::new(image2(), Acid::from_id("o001"));
        assert!(asn.add(&image("a_uncal.fits")).matched);
        assert!(!asn.add(&image("b_uncal.fits")).matched);
        assert_eq!(asn.data().products[0].members.len(), 1);
    }

    #[test]
    fn pinned_value_rejects_other_program() {
        let rule = Arc::new(
            Rule::builder()
                .name("r")
                .asn_type("image2")
                .constraint(rule::base())
                .build()
                .unwrap(),
        );
        let mut asn = PendingAssociation::new(rule, Acid::from_id("o001"));
        assert!(asn.add(&image("a_uncal.fits")).matched);
        assert!(asn.add(&image("b_uncal.fits")).matched);
        assert!(!asn.add(&image("c_uncal.fits").with("program", "7")).matched);
        assert_eq!(asn.data().products[0].members.len(), 2);
        // Product name follows the first science member.
        assert_eq!(asn.data().products[0].name, "a");
    }

    #[test]
    fn combined_candidate_is_rejected() {
        let mut asn = PendingAssociation::new(image2(), Acid::from_id("a3001"));
        let outcome = asn.add(&image("a_uncal.fits"));
        assert_eq!(outcome, MatchOutcome::default());
        assert_eq!(asn.state(), AssociationState::Empty);
        assert!(asn.finalize().is_empty());
    }

    #[test]
    fn background_candidate_needs_background_member() {
        let rule = Arc::new(rule::spec2().unwrap());
        let spec = |name: &str| {
            image(name)
                .with("instrume", "nirspec")
                .with("detector", "nrs1")
                .with("filter", "f170lp")
                .with("exp_type", "nrs_fixedslit")
        };
        let acid = Acid::new("c1000", CandidateType::Background);
        let mut asn = PendingAssociation::new(rule, acid);

        assert!(asn.add(&spec("s_uncal.fits")).matched);
        assert_eq!(asn.state(), AssociationState::Open);
        assert!(!asn.is_valid());

        let outcome = asn.add(&spec("b_uncal.fits").with("bkgdtarg", "t"));
        assert!(outcome.matched);
        assert!(outcome.reprocess);
        assert_eq!(asn.state(), AssociationState::Valid);
        assert!(asn.holds(&spec("b_uncal.fits")));

        let finalized = asn.finalize();
        assert_eq!(finalized.len(), 1);
        assert_eq!(finalized[0].products[0].name, "s");
    }

    #[test]
    fn tso_and_coronagraphic_items_use_integrations() {
        let asn = PendingAssociation::new(image2(), Acid::from_id("o001"));
        let tso = image("t_uncal.fits").with("tsovisit", "t");
        assert_eq!(asn.make_member(&tso).expname, "t_rateints.fits");
        let coron = image("c_uncal.fits").with("exp_type", "nrc_coron");
        assert_eq!(asn.make_member(&coron).expname, "c_rateints.fits");
        let plain = image("p_uncal.fits").with("exposerr", "1");
        let member = asn.make_member(&plain);
        assert_eq!(member.expname, "p_rate.fits");
        assert_eq!(member.exposerr.as_deref(), Some("1"));
    }

    #[test]
    fn special_rule_forces_science() {
        let rule = Arc::new(rule::image2_special().unwrap());
        let mut asn = PendingAssociation::new(rule, Acid::from_id("o001"));
        assert!(asn.add(&image("b_uncal.fits").with("bkgdtarg", "t")).matched);
        assert_eq!(asn.data().products[0].members[0].exptype, Role::Science);
    }

    #[test]
    fn nod_rule_splits_on_finalize() {
        let rules = RuleSet::level2b().unwrap();
        let rule = Arc::clone(rules.iter().find(|r| r.nod_split()).unwrap());
        let nod = |name: &str| {
            image(name)
                .with("instrume", "nirspec")
                .with("detector", "nrs1")
                .with("filter", "f170lp")
                .with("exp_type", "nrs_fixedslit")
                .with("patttype", "2-point-nod")
        };
        let mut asn = PendingAssociation::new(rule, Acid::from_id("o001"));
        for name in ["n1_uncal.fits", "n2_uncal.fits"] {
            assert!(asn.add(&nod(name)).matched);
        }
        let split = asn.finalize();
        assert_eq!(split.len(), 2);
        assert_eq!(split[0].products[0].name, "n1");
        assert_eq!(split[1].products[0].members[1].exptype, Role::Background);
    }

    #[test]
    fn add_items_builds_one_product_per_item() {
        let mut seq = SequenceCounter::new();
        let meta = AsnMeta {
            asn_type: Some("image2".to_string()),
            program: Some("00099".to_string()),
            ..AsnMeta::default()
        };
        let asn = add_items(
            &["a_rate.fits", "b_rate.fits"],
            "c1001",
            Some(&meta),
            None,
            &mut seq,
        )
        .unwrap();
        assert_eq!(asn.candidate_type(), CandidateType::Background);
        assert_eq!(asn.asn_type, "image2");
        assert_eq!(asn.program, "00099");
        assert_eq!(asn.sequence, 1);
        let names: Vec<&str> = asn.product_names().collect();
        assert_eq!(names, ["a", "b"]);
        assert!(asn.products.iter().all(|p| p.members[0].exptype == Role::Science));
    }

    #[test]
    fn add_items_rejects_bad_candidate() {
        let mut seq = SequenceCounter::new();
        let err = add_items(&["a_rate.fits"], "x001", None, None, &mut seq).unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidCandidateId { .. }));
        assert_eq!(seq.peek(), 1);
    }

    #[test]
    fn add_items_falls_back_when_namer_fails() {
        let mut seq = SequenceCounter::starting_at(5);
        let namer = |item: &str, idx: usize| -> Result<String, NamingError> {
            if idx == 2 {
                Err("no name for you".into())
            } else {
                Ok(format!("custom_{idx}_{}", item.len()))
            }
        };
        let asn = add_items(
            &["a_rate.fits", "b_rate.fits"],
            "o999",
            None,
            Some(&namer),
            &mut seq,
        )
        .unwrap();
        let names: Vec<&str> = asn.product_names().collect();
        assert_eq!(names, ["custom_1_11", "b"]);
        assert_eq!(asn.sequence, 5);
    }
}
