use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;

/// Geographic region a province belongs to. Derived on demand from the
/// province code, never stored independently.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Region {
    North,
    Central,
    South,
}

/// Province code to region table. Codes follow the two/three-letter
/// abbreviations used on waybills and branch records.
static PROVINCE_REGIONS: Lazy<HashMap<&'static str, Region>> = Lazy::new(|| {
    let mut m = HashMap::new();

    // Northern provinces
    for code in [
        "HN", "HP", "QN", "BN", "HD", "HY", "VP", "PT", "TN", "BG", "ND", "TB", "NB", "HNA",
    ] {
        m.insert(code, Region::North);
    }

    // Central provinces
    for code in [
        "TH", "NA", "HT", "QB", "QT", "TTH", "DN", "QNA", "QNG", "BDH", "PY", "KH", "GL", "DL",
    ] {
        m.insert(code, Region::Central);
    }

    // Southern provinces
    for code in [
        "HCM", "DNA", "BD", "BRVT", "LA", "TG", "BT", "VL", "CT", "AG", "KG", "ST", "BL", "CM",
    ] {
        m.insert(code, Region::South);
    }

    m
});

/// Maps a province code to its region. Input is trimmed and uppercased before
/// lookup; unmapped codes return `None` and pricing callers must reject the
/// request rather than guess.
pub fn classify(province_code: &str) -> Option<Region> {
    let normalized = province_code.trim().to_ascii_uppercase();
    PROVINCE_REGIONS.get(normalized.as_str()).copied()
}

/// All codes the classifier knows about, for diagnostics and tests.
pub fn known_codes() -> impl Iterator<Item = (&'static str, Region)> {
    PROVINCE_REGIONS.iter().map(|(code, region)| (*code, *region))
}
