//! # asnforge - Exposure Association Generation
//!
//! asnforge groups a pool of exposure records into named *associations*
//! according to a declarative rule set, reconciles the groupings produced by
//! independent rules, and verifies that two association sets are
//! structurally equivalent.
//!
//! ## Core Concepts
//!
//! - **Item**: One exposure record from a pool, a map of attribute to value
//! - **Candidate**: A scope (observation, background, combined) within which items may be grouped
//! - **Constraint**: A composable predicate over item attributes, with value pinning
//! - **Rule**: A constraint tree plus role assignment and nod splitting behaviour
//! - **Association**: A typed grouping of products, each holding role-tagged members
//!
//! ## Usage
//!
//! ```rust,ignore
//! use asnforge::{generate, compare_asn_lists, Item, PipelineConfig, RuleSet};
//!
//! let pool: Vec<Item> = load_pool()?;
//! let rules = RuleSet::level2b()?;
//! let asns = generate(&pool, &rules, &PipelineConfig::default())?;
//!
//! // Verify against a reference run
//! compare_asn_lists(&asns, &reference)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core records
pub mod association;
pub mod candidate;
pub mod error;
pub mod item;
pub mod member;
pub mod naming;
pub mod sequence;

// Rules and matching
pub mod constraint;
pub mod dms;
pub mod pending;
pub mod rule;

// Pipeline
pub mod config;
pub mod diff;
pub mod generate;
pub mod merge;
pub mod prune;

// Re-export primary types at crate root for convenience
pub use association::Association;
pub use candidate::{Acid, CandidateType};
pub use config::{PipelineConfig, VersionId};
pub use constraint::{AttrConstraint, Constraint, EvalContext, Evaluation, Pins, Reduce, ValuePattern};
pub use dms::RoleAssignment;
pub use error::{AsnError, AsnResult, ConfigurationError, DiffError, MergeError, Side};
pub use item::Item;
pub use member::{Member, Product, Role};
pub use pending::{add_items, AsnMeta, AssociationState, MatchOutcome, PendingAssociation};
pub use rule::{Rule, RuleBuilder, RuleSet};
pub use sequence::SequenceCounter;

// Pipeline re-exports
pub use diff::{compare_asn_files, compare_asn_lists, compare_asns, separate_products};
pub use generate::{generate, output_names};
pub use merge::{merge_asns, Merger, RoleConflictPolicy};
pub use prune::{prune_duplicate_products, resequence};
