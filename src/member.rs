//! Products and their members.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Processing role of a member exposure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    /// Primary science exposure.
    #[default]
    Science,
    /// Background exposure.
    Background,
    /// NIRSpec imprint (leakcal) exposure.
    Imprint,
    /// PSF reference exposure.
    Psf,
    /// Target acquisition exposure.
    TargetAcquisition,
    /// Any other declared role.
    Other(String),
}

impl Role {
    /// Lowercase role tag as written to association files.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Science => "science",
            Self::Background => "background",
            Self::Imprint => "imprint",
            Self::Psf => "psf",
            Self::TargetAcquisition => "target_acquisition",
            Self::Other(tag) => tag,
        }
    }

    /// True for the science role.
    #[must_use]
    pub const fn is_science(&self) -> bool {
        matches!(self, Self::Science)
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<&str> for Role {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "science" => Self::Science,
            "background" => Self::Background,
            "imprint" => Self::Imprint,
            "psf" => Self::Psf,
            "target_acquisition" => Self::TargetAcquisition,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An exposure attached to a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Exposure file name.
    pub expname: String,
    /// Processing role.
    pub exptype: Role,
    /// Exposure error flag copied from the pool, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exposerr: Option<String>,
}

impl Member {
    /// Creates a member without an error flag.
    #[must_use]
    pub fn new(expname: impl Into<String>, exptype: Role) -> Self {
        Self {
            expname: expname.into(),
            exptype,
            exposerr: None,
        }
    }

    /// Creates a science member.
    #[must_use]
    pub fn science(expname: impl Into<String>) -> Self {
        Self::new(expname, Role::Science)
    }

    /// Returns a copy of this member carrying a different role.
    #[must_use]
    pub fn relabeled(&self, exptype: Role) -> Self {
        Self {
            exptype,
            ..self.clone()
        }
    }
}

/// One output unit of an association.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Product {
    /// Product name, derived from the science member.
    pub name: String,
    /// Member exposures in insertion order.
    #[serde(default)]
    pub members: Vec<Member>,
}

impl Product {
    /// Creates an empty product.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
        }
    }

    /// Members with the given role.
    #[must_use]
    pub fn members_by_type(&self, role: &Role) -> Vec<&Member> {
        self.members.iter().filter(|m| &m.exptype == role).collect()
    }

    /// True if any member has the science role.
    #[must_use]
    pub fn has_science(&self) -> bool {
        self.members.iter().any(|m| m.exptype.is_science())
    }

    /// True if any member has the given exposure name.
    #[must_use]
    pub fn contains(&self, expname: &str) -> bool {
        self.members.iter().any(|m| m.expname == expname)
    }
}
