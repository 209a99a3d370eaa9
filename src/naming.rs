//! Exposure and product naming.
//!
//! Level-1b exposure names (`…_uncal.fits`) are rewritten to their level-2a
//! counterparts (`…_rate.fits` or `…_rateints.fits`), and product names are
//! derived from the science exposure by dropping directory, extension and
//! any known processing suffix.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tracing::warn;

/// Product name used when no science member is available.
pub const PRODUCT_NAME_DEFAULT: &str = "undefined";

/// Processing suffixes recognized by [`remove_suffix`].
pub const KNOWN_SUFFIXES: &[&str] = &[
    "uncal",
    "dq_init",
    "saturation",
    "superbias",
    "refpix",
    "rscd",
    "firstframe",
    "lastframe",
    "linearity",
    "dark",
    "dark_current",
    "persistence",
    "jump",
    "ramp",
    "ramp_fit",
    "rate",
    "rateints",
    "trapsfilled",
    "assign_wcs",
    "bsub",
    "bsubints",
    "flat_field",
    "srctype",
    "wavecorr",
    "extract_2d",
    "photom",
    "resample",
    "cal",
    "calints",
    "crf",
    "crfints",
    "i2d",
    "s2d",
    "s3d",
    "x1d",
    "x1dints",
    "c1d",
    "cat",
    "segm",
    "median",
    "psfstack",
    "psfalign",
    "psfsub",
    "ami",
    "amiavg",
    "aminorm",
    "phot",
    "whtlt",
];

fn level1b_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<path>.+)(?P<type>_uncal)(?P<extension>\..+)$")
            .expect("level-1b name regex is valid")
    })
}

/// Rename a level-1b exposure to its level-2a name.
///
/// `use_integrations` selects the per-integration (`rateints`) form. Names
/// that are not level-1b names are returned unchanged.
#[must_use]
pub fn rename_to_level2a(level1b_name: &str, use_integrations: bool) -> String {
    let Some(caps) = level1b_regex().captures(level1b_name) else {
        warn!(
            filename = level1b_name,
            "item filename is not a level 1b name, cannot transform to level 2a"
        );
        return level1b_name.to_string();
    };

    let suffix = if use_integrations { "rateints" } else { "rate" };
    format!("{}_{suffix}{}", &caps["path"], &caps["extension"])
}

/// Strip one known processing suffix from `name`.
///
/// Returns the stripped name and the separator that preceded the suffix
/// (`_` when nothing was stripped). The longest matching suffix wins.
#[must_use]
pub fn remove_suffix(name: &str) -> (&str, char) {
    let mut best: Option<(usize, char)> = None;
    for suffix in KNOWN_SUFFIXES {
        let Some(root) = name.strip_suffix(suffix) else {
            continue;
        };
        let Some(sep) = root.chars().last().filter(|c| *c == '_' || *c == '-') else {
            continue;
        };
        let root_len = root.len() - sep.len_utf8();
        if root_len == 0 {
            continue;
        }
        if best.map_or(true, |(len, _)| root_len < len) {
            best = Some((root_len, sep));
        }
    }

    match best {
        Some((len, sep)) => (&name[..len], sep),
        None => (name, '_'),
    }
}

/// Derive a product name from an exposure path.
///
/// Directory and extension are removed, then one known suffix.
#[must_use]
pub fn product_name_from_expname(expname: &str) -> String {
    let stem = Path::new(expname)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(expname);
    remove_suffix(stem).0.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rename_uncal_to_rate() {
        assert_eq!(
            rename_to_level2a("jw00001001001_01101_00001_nrs1_uncal.fits", false),
            "jw00001001001_01101_00001_nrs1_rate.fits"
        );
    }

    #[test]
    fn rename_uncal_to_rateints() {
        assert_eq!(
            rename_to_level2a("jw00001001001_01101_00001_nrca1_uncal.fits", true),
            "jw00001001001_01101_00001_nrca1_rateints.fits"
        );
    }

    #[test]
    fn rename_leaves_other_names_alone() {
        assert_eq!(rename_to_level2a("exposure_cal.fits", false), "exposure_cal.fits");
        assert_eq!(rename_to_level2a("exposure_uncal", false), "exposure_uncal");
    }

    #[test]
    fn remove_known_suffix() {
        assert_eq!(remove_suffix("jw00001_nrs1_rate"), ("jw00001_nrs1", '_'));
        assert_eq!(remove_suffix("jw00001_nrs1-cal"), ("jw00001_nrs1", '-'));
        assert_eq!(remove_suffix("jw00001_nrs1_dq_init"), ("jw00001_nrs1", '_'));
        assert_eq!(remove_suffix("jw00001_nrs1"), ("jw00001_nrs1", '_'));
        assert_eq!(remove_suffix("_rate"), ("_rate", '_'));
    }

    #[test]
    fn rateints_suffix_is_removed() {
        assert_eq!(remove_suffix("exp_rateints"), ("exp", '_'));
    }

    #[test]
    fn product_name_drops_dir_extension_and_suffix() {
        assert_eq!(
            product_name_from_expname("data/jw00001001001_01101_00001_nrs1_rate.fits"),
            "jw00001001001_01101_00001_nrs1"
        );
        assert_eq!(product_name_from_expname("plain"), "plain");
    }
}
