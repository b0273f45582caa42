//! Field cleanup and the row validity filter.

use tax_lien_models::CandidateLienRecord;

use crate::RawRow;
use crate::address::{parse_address, split_leading_name};
use crate::layout::RowLayout;
use crate::normalize::{normalize_date, normalize_parcel_id, parse_currency};

/// Minimum length of a usable street address.
const MIN_ADDRESS_LEN: usize = 3;

/// Why a row was dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SkipReason {
    /// No parcel id, or one that normalized to nothing.
    #[error("missing parcel id")]
    MissingParcel,

    /// The parcel id does not have the jurisdiction's shape.
    #[error("malformed parcel id '{0}'")]
    MalformedParcel(String),

    /// The street address is missing or too short.
    #[error("missing address for parcel {0}")]
    MissingAddress(String),
}

/// Cleans a raw row into a candidate record, or says why it was dropped.
///
/// # Errors
///
/// Returns a [`SkipReason`] when the parcel id is missing or malformed
/// after normalization, or the street address is shorter than three
/// characters.
pub fn finish(row: RawRow, layout: &RowLayout) -> Result<CandidateLienRecord, SkipReason> {
    let parcel_id = row
        .parcel
        .as_deref()
        .map(normalize_parcel_id)
        .unwrap_or_default();
    if parcel_id.is_empty() {
        return Err(SkipReason::MissingParcel);
    }
    if !layout.parcel_has_shape(&parcel_id) {
        return Err(SkipReason::MalformedParcel(parcel_id));
    }

    let mut owner_name = row.owner.as_deref().and_then(clean);
    let (leaked_owner, address) = split_leading_name(row.address.as_deref().unwrap_or_default());
    if owner_name.is_none() {
        owner_name = leaked_owner;
    }

    let parsed = parse_address(&address, layout.default_state());
    if parsed.street.chars().count() < MIN_ADDRESS_LEN {
        return Err(SkipReason::MissingAddress(parcel_id));
    }

    let city = parsed
        .city
        .or_else(|| row.city.as_deref().and_then(clean))
        .or_else(|| layout.default_city().map(str::to_owned));
    let zip = parsed.zip.or_else(|| row.zip.as_deref().and_then(clean));

    Ok(CandidateLienRecord {
        parcel_id,
        owner_name,
        property_address: parsed.street,
        city,
        zip,
        tax_amount_due: row.amount.as_deref().map_or(0.0, parse_currency),
        sale_date: row
            .sale_date
            .as_deref()
            .map(normalize_date)
            .filter(|d| !d.is_empty()),
        legal_description: (!row.legal.is_empty()).then(|| row.legal.join("; ")),
    })
}

fn clean(value: &str) -> Option<String> {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}
