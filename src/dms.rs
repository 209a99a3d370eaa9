//! Exposure type tables and member role assignment.

use serde::{Deserialize, Serialize};

use crate::item::Item;
use crate::member::Role;

/// Target acquisition exposure types.
pub const ACQ_EXP_TYPES: &[&str] = &[
    "mir_tacq",
    "mir_taconfirm",
    "nis_taconfirm",
    "nis_tacq",
    "nrc_taconfirm",
    "nrc_tacq",
    "nrs_confirm",
    "nrs_msata",
    "nrs_taconfirm",
    "nrs_tacq",
    "nrs_taslit",
    "nrs_verify",
    "nrs_wata",
];

/// Coronagraphic exposure types. Not time series, but kept per integration.
pub const CORON_EXP_TYPES: &[&str] = &["mir_4qpm", "mir_lyot", "nrc_coron"];

/// Time series exposure types.
pub const TSO_EXP_TYPES: &[&str] = &["nrc_tsimage", "nrc_tsgrism", "nrs_brightobj"];

/// Exposure types processed as level-2 image science.
pub const IMAGE2_SCIENCE_EXP_TYPES: &[&str] = &[
    "fgs_image",
    "mir_4qpm",
    "mir_image",
    "mir_lyot",
    "nis_ami",
    "nis_image",
    "nrc_coron",
    "nrc_image",
    "nrc_tsimage",
];

/// Image exposure types that are not science but still get level-2 processing.
pub const IMAGE2_NONSCIENCE_EXP_TYPES: &[&str] = &[
    "mir_coroncal",
    "nis_focus",
    "nrc_focus",
    "nrs_focus",
    "nrs_image",
    "nrs_mimf",
];

/// Exposure types processed as level-2 spectral science.
pub const SPEC2_SCIENCE_EXP_TYPES: &[&str] = &[
    "mir_lrs-fixedslit",
    "mir_lrs-slitless",
    "mir_mrs",
    "nis_soss",
    "nis_wfss",
    "nrc_tsgrism",
    "nrc_wfss",
    "nrs_brightobj",
    "nrs_fixedslit",
    "nrs_ifu",
    "nrs_msaspec",
];

fn exp_type_in(item: &Item, types: &[&str]) -> bool {
    item.value("exp_type")
        .is_some_and(|exp_type| types.iter().any(|t| t.eq_ignore_ascii_case(exp_type.trim())))
}

/// Whether the item should be named as per-integration data.
///
/// True for flagged TSO visits, TSO exposure types, and `other_exp_types`.
#[must_use]
pub fn is_item_tso(item: &Item, other_exp_types: &[&str]) -> bool {
    item.flag("tsovisit") || exp_type_in(item, TSO_EXP_TYPES) || exp_type_in(item, other_exp_types)
}

/// How a rule assigns roles to the members it creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleAssignment {
    /// Role from the exposure type and the background/PSF flags.
    #[default]
    Standard,
    /// Every member is science, whatever its exposure type.
    ForceScience,
}

impl RoleAssignment {
    /// Role of the member built from `item`.
    #[must_use]
    pub fn assign(&self, item: &Item) -> Role {
        match self {
            Self::ForceScience => Role::Science,
            Self::Standard => standard_role(item),
        }
    }
}

fn standard_role(item: &Item) -> Role {
    if exp_type_in(item, ACQ_EXP_TYPES) {
        return Role::TargetAcquisition;
    }
    match item.value("exp_type").map(|t| t.trim().to_ascii_lowercase()).as_deref() {
        Some("nrs_imprint") => return Role::Imprint,
        Some("nrs_autoflat") => return Role::Other("autoflat".to_string()),
        Some("nrs_autowave") => return Role::Other("autowave".to_string()),
        _ => {}
    }
    if item.flag("bkgdtarg") {
        Role::Background
    } else if item.flag("is_psf") {
        Role::Psf
    } else {
        Role::Science
    }
}
