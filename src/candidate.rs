//! Association candidates (ACIDs).
//!
//! A candidate scopes which exposures may legally be grouped together. Its
//! type is carried explicitly in pools and otherwise follows the id prefix
//! convention: `o` observation, `c` background, `a` combined.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// The class of a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CandidateType {
    /// A single observation.
    Observation,
    /// A background candidate.
    Background,
    /// A combined (discovered) candidate.
    Combined,
    /// Any other class named by the pool.
    Other(String),
}

impl CandidateType {
    /// Derives the type from the leading character of a candidate id.
    #[must_use]
    pub fn from_id(id: &str) -> Self {
        match id.chars().next().map(|c| c.to_ascii_lowercase()) {
            Some('o') => Self::Observation,
            Some('c') => Self::Background,
            Some('a') => Self::Combined,
            _ => Self::Other(id.chars().take(1).collect()),
        }
    }

    /// True for the candidate classes level-2 associations may be built from.
    #[must_use]
    pub const fn allows_level2(&self) -> bool {
        matches!(self, Self::Observation | Self::Background)
    }

    /// Lowercase name of the type.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Observation => "observation",
            Self::Background => "background",
            Self::Combined => "combined",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for CandidateType {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "observation" => Self::Observation,
            "background" => Self::Background,
            "combined" | "discovered" => Self::Combined,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<CandidateType> for String {
    fn from(value: CandidateType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for CandidateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An association candidate identifier and its type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Acid {
    id: String,
    kind: CandidateType,
}

fn candidate_list_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\(\s*['"]([^'"]+)['"]\s*,\s*['"]([^'"]+)['"]\s*\)"#)
            .expect("candidate list regex is valid")
    })
}

impl Acid {
    /// Creates a candidate with an explicit type.
    #[must_use]
    pub fn new(id: impl Into<String>, kind: CandidateType) -> Self {
        Self {
            id: id.into().trim().to_ascii_lowercase(),
            kind,
        }
    }

    /// Creates a candidate whose type follows the id prefix convention.
    #[must_use]
    pub fn from_id(id: impl Into<String>) -> Self {
        let id = id.into().trim().to_ascii_lowercase();
        let kind = CandidateType::from_id(&id);
        Self { id, kind }
    }

    /// Candidate for the bulk-add path.
    ///
    /// Only observation (`o…`) and background (`c…`) ids are accepted.
    pub fn for_bulk_add(id: &str) -> Result<Self, ConfigurationError> {
        let acid = Self::from_id(id);
        match acid.kind {
            CandidateType::Observation | CandidateType::Background => Ok(acid),
            _ => Err(ConfigurationError::InvalidCandidateId { acid: id.to_string() }),
        }
    }

    /// Parses the pool notation `[('o001', 'observation'), ('c1000', 'background')]`.
    ///
    /// Malformed entries are skipped.
    #[must_use]
    pub fn parse_list(value: &str) -> Vec<Self> {
        candidate_list_regex()
            .captures_iter(value)
            .map(|caps| Self::new(&caps[1], CandidateType::from(caps[2].to_string())))
            .collect()
    }

    /// The candidate id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The candidate type.
    #[must_use]
    pub const fn kind(&self) -> &CandidateType {
        &self.kind
    }
}

impl fmt::Display for Acid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.id, self.kind)
    }
}
