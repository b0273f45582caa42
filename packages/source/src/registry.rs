//! Jurisdiction registry: loads every definition from embedded TOML.
//!
//! Each `.toml` file in `packages/source/jurisdictions/` is baked into the
//! binary via [`include_str!`]. Adding a county means adding a TOML file
//! and listing it below.

use crate::jurisdiction::{JurisdictionDefinition, parse_jurisdiction_toml};

/// TOML configs embedded at compile time.
const JURISDICTION_TOMLS: &[(&str, &str)] = &[
    // ── PDF listings ─────────────────────────────────────────────────
    ("fulton_ga", include_str!("../jurisdictions/fulton_ga.toml")),
    ("cobb_ga", include_str!("../jurisdictions/cobb_ga.toml")),
    // ── HTML tables ──────────────────────────────────────────────────
    ("dekalb_ga", include_str!("../jurisdictions/dekalb_ga.toml")),
    ("chatham_ga", include_str!("../jurisdictions/chatham_ga.toml")),
    // ── HTML blocks ──────────────────────────────────────────────────
    ("clayton_ga", include_str!("../jurisdictions/clayton_ga.toml")),
];

#[cfg(test)]
const EXPECTED_JURISDICTION_COUNT: usize = 5;

/// Returns every configured jurisdiction, parsed from embedded TOML.
///
/// # Panics
///
/// Panics if an embedded TOML config is malformed.
#[must_use]
pub fn all_jurisdictions() -> Vec<JurisdictionDefinition> {
    JURISDICTION_TOMLS
        .iter()
        .map(|(name, toml)| {
            parse_jurisdiction_toml(toml)
                .unwrap_or_else(|e| panic!("Failed to parse {name}.toml: {e}"))
        })
        .collect()
}

/// Returns the jurisdictions whose ids appear in `ids`, in registry order.
/// An empty filter selects everything.
///
/// # Errors
///
/// Returns the unknown ids if any requested id is not configured.
pub fn select(ids: &[String]) -> Result<Vec<JurisdictionDefinition>, Vec<String>> {
    let all = all_jurisdictions();
    if ids.is_empty() {
        return Ok(all);
    }

    let unknown: Vec<String> = ids
        .iter()
        .filter(|id| !all.iter().any(|def| def.id == **id))
        .cloned()
        .collect();
    if !unknown.is_empty() {
        return Err(unknown);
    }

    Ok(all
        .into_iter()
        .filter(|def| ids.iter().any(|id| *id == def.id))
        .collect())
}
