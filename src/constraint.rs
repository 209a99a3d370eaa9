//! Constraint trees for association rules.
//!
//! A constraint is a composable predicate over item attributes. Leaves look
//! up an attribute (first present source wins) and compare it against a
//! compiled [`ValuePattern`]; groups reduce their children with `all`, `any`
//! or `notany`. Evaluation is pure: it reports the values captured by the
//! leaves and the association decides whether to commit them.
//!
//! Leaves are `force_unique` by default: the first value an association
//! accepts is pinned, and later items must carry the same value.

use std::collections::HashMap;
use std::fmt;

use regex::{Regex, RegexBuilder};

use crate::error::ConfigurationError;
use crate::item::Item;

/// How a leaf compares the attribute value.
///
/// Patterns are compiled when the rule is defined, never per item.
#[derive(Debug, Clone, Default)]
pub enum ValuePattern {
    /// Any present value matches.
    #[default]
    Any,
    /// Case-insensitive equality with one of the literals.
    OneOf(Vec<String>),
    /// Anchored, case-insensitive regular expression.
    Regex(Regex),
}

impl ValuePattern {
    /// Single literal value.
    #[must_use]
    pub fn literal(value: impl Into<String>) -> Self {
        Self::OneOf(vec![value.into()])
    }

    /// Alternation of literal values. Literal text is never treated as regex syntax.
    #[must_use]
    pub fn one_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::OneOf(values.into_iter().map(Into::into).collect())
    }

    /// Compile an explicit regular expression. The whole value must match.
    pub fn regex(pattern: &str) -> Result<Self, ConfigurationError> {
        RegexBuilder::new(&format!("^(?:{pattern})$"))
            .case_insensitive(true)
            .build()
            .map(Self::Regex)
            .map_err(|e| ConfigurationError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })
    }

    /// True if `value` satisfies the pattern.
    #[must_use]
    pub fn matches(&self, value: &str) -> bool {
        let value = value.trim();
        match self {
            Self::Any => true,
            Self::OneOf(literals) => literals.iter().any(|l| l.eq_ignore_ascii_case(value)),
            Self::Regex(re) => re.is_match(value),
        }
    }
}

impl fmt::Display for ValuePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => Ok(()),
            Self::OneOf(literals) => {
                let quoted: Vec<String> = literals.iter().map(|l| format!("'{l}'")).collect();
                write!(f, "={}", quoted.join("|"))
            }
            Self::Regex(re) => write!(f, "~/{}/", re.as_str()),
        }
    }
}

/// How a group combines its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Reduce {
    /// Every child must match.
    #[default]
    All,
    /// At least one child must match.
    Any,
    /// No child may match.
    NotAny,
}

impl fmt::Display for Reduce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Any => write!(f, "any"),
            Self::NotAny => write!(f, "notany"),
        }
    }
}

/// A leaf constraint on one attribute.
#[derive(Debug, Clone)]
pub struct AttrConstraint {
    name: Option<String>,
    sources: Vec<String>,
    pattern: ValuePattern,
    required: bool,
    force_unique: bool,
    reprocess_on_match: bool,
    slot: usize,
}

impl AttrConstraint {
    /// Leaf reading the first present of `sources`.
    #[must_use]
    pub fn new<I, S>(sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            name: None,
            sources: sources
                .into_iter()
                .map(|s| s.as_ref().to_ascii_lowercase())
                .collect(),
            pattern: ValuePattern::Any,
            required: true,
            force_unique: true,
            reprocess_on_match: false,
            slot: 0,
        }
    }

    /// Names the leaf.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the match pattern.
    #[must_use]
    pub fn pattern(mut self, pattern: ValuePattern) -> Self {
        self.pattern = pattern;
        self
    }

    /// Shorthand for a single literal value.
    #[must_use]
    pub fn equals(self, value: impl Into<String>) -> Self {
        self.pattern(ValuePattern::literal(value))
    }

    /// Shorthand for an alternation of literal values.
    #[must_use]
    pub fn one_of<I, S>(self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pattern(ValuePattern::one_of(values))
    }

    /// Makes the attribute optional.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Sets whether the value is pinned by the first matching item.
    #[must_use]
    pub fn force_unique(mut self, force_unique: bool) -> Self {
        self.force_unique = force_unique;
        self
    }

    /// Requests reprocessing of items that match this leaf.
    #[must_use]
    pub fn reprocess_on_match(mut self) -> Self {
        self.reprocess_on_match = true;
        self
    }

    /// Leaf name, defaulting to the first source.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name
            .as_deref()
            .or_else(|| self.sources.first().map(String::as_str))
            .unwrap_or("")
    }

    /// Source attributes in lookup order.
    #[must_use]
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// True unless the leaf was made optional.
    #[must_use]
    pub const fn is_required(&self) -> bool {
        self.required
    }

    /// Slot of this leaf in the pin table of its rule.
    #[must_use]
    pub const fn slot(&self) -> usize {
        self.slot
    }

    fn evaluate(&self, item: &Item, ctx: &EvalContext<'_>) -> Evaluation {
        let found = self.sources.iter().find_map(|source| item.value(source));
        let Some(value) = found else {
            return if self.required {
                Evaluation::failed()
            } else {
                Evaluation::vacuous()
            };
        };

        if !self.pattern.matches(value) {
            return Evaluation::failed();
        }

        if self.force_unique {
            if let Some(pinned) = ctx.pins.get(self.slot) {
                if !pinned.eq_ignore_ascii_case(value.trim()) {
                    return Evaluation::failed();
                }
            }
        }

        Evaluation {
            matched: true,
            captures: vec![Capture {
                slot: self.slot,
                name: self.name().to_string(),
                value: value.trim().to_string(),
                unique: self.force_unique,
            }],
            reprocess: self.reprocess_on_match,
        }
    }
}

impl fmt::Display for AttrConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name(), self.pattern)?;
        if !self.required {
            write!(f, "?")?;
        }
        Ok(())
    }
}

/// A node of a constraint tree.
#[derive(Debug, Clone)]
pub enum Constraint {
    /// Attribute leaf.
    Attr(AttrConstraint),
    /// Matches only while the association holds no science member.
    SingleScience,
    /// Group of children reduced by a policy.
    Group {
        /// Children in evaluation order.
        children: Vec<Constraint>,
        /// Reduce policy.
        reduce: Reduce,
    },
}

impl From<AttrConstraint> for Constraint {
    fn from(attr: AttrConstraint) -> Self {
        Self::Attr(attr)
    }
}

impl Constraint {
    /// Group in which every child must match.
    #[must_use]
    pub fn all(children: impl IntoIterator<Item = Constraint>) -> Self {
        Self::group(children, Reduce::All)
    }

    /// Group in which at least one child must match.
    #[must_use]
    pub fn any(children: impl IntoIterator<Item = Constraint>) -> Self {
        Self::group(children, Reduce::Any)
    }

    /// Exclusion guard: matches only if no child matches.
    #[must_use]
    pub fn notany(children: impl IntoIterator<Item = Constraint>) -> Self {
        Self::group(children, Reduce::NotAny)
    }

    /// Group with an explicit reduce policy.
    #[must_use]
    pub fn group(children: impl IntoIterator<Item = Constraint>, reduce: Reduce) -> Self {
        Self::Group {
            children: children.into_iter().collect(),
            reduce,
        }
    }

    /// Assigns pin slots to every leaf, depth first. Returns the slot count.
    pub fn index_leaves(&mut self) -> usize {
        let mut next = 0;
        self.index_from(&mut next);
        next
    }

    fn index_from(&mut self, next: &mut usize) {
        match self {
            Self::Attr(attr) => {
                attr.slot = *next;
                *next += 1;
            }
            Self::SingleScience => {}
            Self::Group { children, .. } => {
                for child in children {
                    child.index_from(next);
                }
            }
        }
    }

    /// Number of attribute leaves in the tree.
    #[must_use]
    pub fn leaf_count(&self) -> usize {
        match self {
            Self::Attr(_) => 1,
            Self::SingleScience => 0,
            Self::Group { children, .. } => children.iter().map(Self::leaf_count).sum(),
        }
    }

    /// Evaluate the tree against an item.
    #[must_use]
    pub fn evaluate(&self, item: &Item, ctx: &EvalContext<'_>) -> Evaluation {
        match self {
            Self::Attr(attr) => attr.evaluate(item, ctx),
            Self::SingleScience => {
                if ctx.has_science {
                    Evaluation::failed()
                } else {
                    Evaluation::vacuous()
                }
            }
            Self::Group { children, reduce } => match reduce {
                Reduce::All => {
                    let mut result = Evaluation::vacuous();
                    for child in children {
                        let eval = child.evaluate(item, ctx);
                        if !eval.matched {
                            return Evaluation::failed();
                        }
                        result.absorb(eval);
                    }
                    result
                }
                Reduce::Any => {
                    let mut result = Evaluation::failed();
                    for child in children {
                        let eval = child.evaluate(item, ctx);
                        if eval.matched {
                            result.matched = true;
                            result.absorb(eval);
                        }
                    }
                    result
                }
                Reduce::NotAny => {
                    if children.iter().any(|c| c.evaluate(item, ctx).matched) {
                        Evaluation::failed()
                    } else {
                        Evaluation::vacuous()
                    }
                }
            },
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attr(attr) => write!(f, "{attr}"),
            Self::SingleScience => write!(f, "single_science"),
            Self::Group { children, reduce } => {
                write!(f, "{reduce}(")?;
                for (idx, child) in children.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{child}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// A value captured by a matching leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    /// Slot of the leaf.
    pub slot: usize,
    /// Name of the leaf.
    pub name: String,
    /// Captured attribute value.
    pub value: String,
    /// Whether the value should be pinned.
    pub unique: bool,
}

/// Outcome of evaluating a constraint tree against one item.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Evaluation {
    /// Whether the item satisfied the tree.
    pub matched: bool,
    /// Values captured by matching leaves.
    pub captures: Vec<Capture>,
    /// Whether a matching leaf asked for the item to be reprocessed.
    pub reprocess: bool,
}

impl Evaluation {
    fn failed() -> Self {
        Self::default()
    }

    fn vacuous() -> Self {
        Self {
            matched: true,
            ..Self::default()
        }
    }

    fn absorb(&mut self, other: Evaluation) {
        self.captures.extend(other.captures);
        self.reprocess |= other.reprocess;
    }
}

/// Values pinned by `force_unique` leaves for one association.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pins(HashMap<usize, String>);

impl Pins {
    /// Creates an empty pin table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pinned value for a slot.
    #[must_use]
    pub fn get(&self, slot: usize) -> Option<&str> {
        self.0.get(&slot).map(String::as_str)
    }

    /// Pins the unique captures that are not pinned yet.
    pub fn commit(&mut self, captures: &[Capture]) {
        for capture in captures.iter().filter(|c| c.unique) {
            self.0
                .entry(capture.slot)
                .or_insert_with(|| capture.value.clone());
        }
    }

    /// Number of pinned slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if nothing is pinned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Association state visible to constraint evaluation.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    /// Pinned values of the association under test.
    pub pins: &'a Pins,
    /// Whether the association already holds a science member.
    pub has_science: bool,
}

impl<'a> EvalContext<'a> {
    /// Context for an association with the given pins.
    #[must_use]
    pub const fn new(pins: &'a Pins, has_science: bool) -> Self {
        Self { pins, has_science }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(pairs: &[(&str, &str)]) -> Item {
        pairs.iter().copied().collect()
    }

    fn indexed(mut c: Constraint) -> Constraint {
        c.index_leaves();
        c
    }

    #[test]
    fn first_present_source_wins() {
        let c = indexed(AttrConstraint::new(["filter", "band"]).equals("short").into());
        let pins = Pins::new();
        let ctx = EvalContext::new(&pins, false);

        assert!(c.evaluate(&item(&[("band", "SHORT")]), &ctx).matched);
        assert!(!c.evaluate(&item(&[("filter", "clear"), ("band", "short")]), &ctx).matched);
        // Invalid values fall through to the next source.
        assert!(c.evaluate(&item(&[("filter", "null"), ("band", "short")]), &ctx).matched);
    }

    #[test]
    fn required_and_optional_absence() {
        let pins = Pins::new();
        let ctx = EvalContext::new(&pins, false);
        let required = indexed(AttrConstraint::new(["subarray"]).into());
        let optional = indexed(AttrConstraint::new(["subarray"]).optional().into());

        assert!(!required.evaluate(&Item::new(), &ctx).matched);
        let eval = optional.evaluate(&Item::new(), &ctx);
        assert!(eval.matched);
        assert!(eval.captures.is_empty());
    }

    #[test]
    fn literals_are_not_regex() {
        let pins = Pins::new();
        let ctx = EvalContext::new(&pins, false);
        let c = indexed(AttrConstraint::new(["exp_type"]).equals("mir_lrs-fixedslit").into());
        assert!(c.evaluate(&item(&[("exp_type", "MIR_LRS-FIXEDSLIT")]), &ctx).matched);
        let dotted = indexed(AttrConstraint::new(["x"]).equals("a.c").into());
        assert!(!dotted.evaluate(&item(&[("x", "abc")]), &ctx).matched);
    }

    #[test]
    fn explicit_regex_is_anchored() {
        let pins = Pins::new();
        let ctx = EvalContext::new(&pins, false);
        let c = indexed(
            AttrConstraint::new(["visitype"])
                .pattern(ValuePattern::regex(".+wfsc.+").unwrap())
                .into(),
        );
        assert!(c.evaluate(&item(&[("visitype", "PRIME_WFSC_ROUTINE")]), &ctx).matched);
        assert!(!c.evaluate(&item(&[("visitype", "wfsc")]), &ctx).matched);
    }

    #[test]
    fn invalid_regex_is_a_configuration_error() {
        let err = ValuePattern::regex("(unclosed").unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidPattern { .. }));
    }

    #[test]
    fn force_unique_rejects_differing_value() {
        let c = indexed(Constraint::all([
            AttrConstraint::new(["program"]).into(),
            AttrConstraint::new(["exp_type"]).force_unique(false).into(),
        ]));
        let mut pins = Pins::new();
        assert!(pins.is_empty());

        let first = c.evaluate(
            &item(&[("program", "00001"), ("exp_type", "nrs_ifu")]),
            &EvalContext::new(&pins, false),
        );
        assert!(first.matched);
        pins.commit(&first.captures);
        assert_eq!(pins.len(), 1);
        assert!(!pins.is_empty());

        let same = item(&[("program", "00001"), ("exp_type", "nrs_msaspec")]);
        assert!(c.evaluate(&same, &EvalContext::new(&pins, false)).matched);

        let other = item(&[("program", "00002"), ("exp_type", "nrs_ifu")]);
        assert!(!c.evaluate(&other, &EvalContext::new(&pins, false)).matched);
    }

    #[test]
    fn any_captures_only_matched_children() {
        let c = indexed(Constraint::any([
            AttrConstraint::new(["exp_type"]).equals("nrc_image").into(),
            AttrConstraint::new(["exp_type"]).equals("nrc_tacq").named("tacq").into(),
        ]));
        let pins = Pins::new();
        let eval = c.evaluate(&item(&[("exp_type", "nrc_tacq")]), &EvalContext::new(&pins, false));
        assert!(eval.matched);
        assert_eq!(eval.captures.len(), 1);
        assert_eq!(eval.captures[0].name, "tacq");
        assert_eq!(eval.captures[0].slot, 1);
    }

    #[test]
    fn notany_excludes_combination() {
        let guard = indexed(Constraint::notany([Constraint::all([
            AttrConstraint::new(["instrume"]).equals("nirspec").into(),
            AttrConstraint::new(["filter"]).equals("opaque").into(),
        ])]));
        let pins = Pins::new();
        let ctx = EvalContext::new(&pins, false);

        assert!(!guard
            .evaluate(&item(&[("instrume", "NIRSPEC"), ("filter", "OPAQUE")]), &ctx)
            .matched);
        assert!(guard
            .evaluate(&item(&[("instrume", "NIRSPEC"), ("filter", "F170LP")]), &ctx)
            .matched);
        assert!(guard
            .evaluate(&item(&[("instrume", "MIRI"), ("filter", "OPAQUE")]), &ctx)
            .matched);
        assert!(guard.evaluate(&item(&[("instrume", "nirspec")]), &ctx).captures.is_empty());
    }

    #[test]
    fn single_science_probe_follows_context() {
        let c = Constraint::SingleScience;
        let pins = Pins::new();
        assert!(c.evaluate(&Item::new(), &EvalContext::new(&pins, false)).matched);
        assert!(!c.evaluate(&Item::new(), &EvalContext::new(&pins, true)).matched);
    }

    #[test]
    fn reprocess_flag_propagates_from_matched_leaf() {
        let c = indexed(Constraint::all([
            AttrConstraint::new(["program"]).into(),
            AttrConstraint::new(["bkgdtarg"]).optional().reprocess_on_match().into(),
        ]));
        let pins = Pins::new();
        let ctx = EvalContext::new(&pins, false);
        assert!(c.evaluate(&item(&[("program", "1"), ("bkgdtarg", "t")]), &ctx).reprocess);
        assert!(!c.evaluate(&item(&[("program", "1")]), &ctx).reprocess);
    }

    #[test]
    fn display_describes_tree() {
        let c = indexed(Constraint::all([
            AttrConstraint::new(["program"]).into(),
            AttrConstraint::new(["subarray"]).optional().into(),
            Constraint::notany([AttrConstraint::new(["filter"]).equals("opaque").into()]),
        ]));
        assert_eq!(c.to_string(), "all(program, subarray?, notany(filter='opaque'))");
        assert_eq!(c.leaf_count(), 3);
    }
}
