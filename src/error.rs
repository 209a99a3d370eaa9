//! Error types for asnforge.
//!
//! Errors are strongly typed using thiserror. Only genuinely fatal
//! conditions are errors: an item failing a rule's constraints or an
//! association that never becomes valid is ordinary control flow and is
//! reported through return values instead.

use std::fmt;

use thiserror::Error;

use crate::association::Association;
use crate::member::Role;

/// Configuration errors. These are fatal and never silently recovered.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid association id specified: \"{acid}\". Must be of form \"oXXX\" or \"cXXX\"")]
    InvalidCandidateId {
        acid: String,
    },

    #[error("Invalid match pattern '{pattern}': {reason}")]
    InvalidPattern {
        pattern: String,
        reason: String,
    },

    #[error("Invalid pipeline configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

/// Which side of a comparison an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Left => write!(f, "Left"),
            Self::Right => write!(f, "Right"),
        }
    }
}

/// Structural mismatches found while comparing two association sets.
#[derive(Debug, Error)]
pub enum DiffError {
    #[error("{side} associations have duplicate products {names:?}")]
    DuplicateProducts {
        side: Side,
        names: Vec<String>,
    },

    #[error("Associations do not share a common set of products: {names:?}")]
    ProductNameMismatch {
        names: Vec<String>,
    },

    #[error("Type mismatch {left} != {right}")]
    TypeMismatch {
        left: String,
        right: String,
    },

    #[error("Candidate level mismatch left '{left}' != right '{right}'")]
    CandidateLevelMismatch {
        left: String,
        right: String,
    },

    #[error("# products differ: {left} != {right}")]
    ProductCountMismatch {
        left: usize,
        right: usize,
    },

    #[error("Left product '{name}' has no counterpart in right")]
    ProductMissing {
        name: String,
    },

    #[error("Product member length differs: left '{left_product}' len {left} != right '{right_product}' len {right}")]
    MemberCountMismatch {
        left_product: String,
        right_product: String,
        left: usize,
        right: usize,
    },

    #[error("Left {expname}:{left} != Right {expname}:{right}")]
    RoleMismatch {
        expname: String,
        left: Role,
        right: Role,
    },

    #[error("Left {expname}:{exptype} has no counterpart in right")]
    MemberMissing {
        expname: String,
        exptype: Role,
    },

    #[error("Right has {count} unaccounted for members starting with {expname}:{exptype}")]
    UnmatchedMembers {
        count: usize,
        expname: String,
        exptype: Role,
    },

    #[error("Right has {count} products left over")]
    UnmatchedProducts {
        count: usize,
    },

    #[error("Associations do not match. Mismatch because:\n{reason}\nLeft association = {left}\nRight association = {right}")]
    AsnMismatch {
        reason: Box<DiffError>,
        left: Box<Association>,
        right: Box<Association>,
    },
}

impl DiffError {
    /// Returns the innermost mismatch, unwrapping any association context.
    #[must_use]
    pub fn root_cause(&self) -> &DiffError {
        match self {
            Self::AsnMismatch { reason, .. } => reason.root_cause(),
            other => other,
        }
    }

    /// Returns the offending pair of associations, when attached.
    #[must_use]
    pub fn associations(&self) -> Option<(&Association, &Association)> {
        match self {
            Self::AsnMismatch { left, right, .. } => Some((left.as_ref(), right.as_ref())),
            _ => None,
        }
    }
}

/// Errors raised while merging associations.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("Member {expname} of product '{product}' has role {existing}, incoming association says {incoming}")]
    RoleConflict {
        product: String,
        expname: String,
        existing: Role,
        incoming: Role,
    },
}

/// Top-level error type for asnforge.
#[derive(Debug, Error)]
pub enum AsnError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("{0}")]
    Diff(#[from] DiffError),

    #[error("Merge error: {0}")]
    Merge(#[from] MergeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl AsnError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Returns true if this is a diff (structural mismatch) error.
    #[must_use]
    pub const fn is_diff(&self) -> bool {
        matches!(self, Self::Diff(_))
    }

    /// Returns true if this is a merge error.
    #[must_use]
    pub const fn is_merge(&self) -> bool {
        matches!(self, Self::Merge(_))
    }

    /// Returns true if this error came from reading input.
    #[must_use]
    pub const fn is_input(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Json(_))
    }
}

/// Result type alias for asnforge operations.
pub type AsnResult<T> = Result<T, AsnError>;
