//! Pricing catalog loader
//!
//! Accepts the OpenRouter model listing (`{"data": [{"id", "pricing": {...}}]}`)
//! or a plain list of pricing entries. Rates may be JSON numbers or numeric
//! strings. Entries whose rates cannot be read are left out, which makes the
//! slug surface as unpriced downstream rather than as free.

use llm_leaderboard_common::io::read_json;
use llm_leaderboard_domain::{PricingEntry, PricingTable};
use serde::Deserialize;
use std::path::Path;
use tracing::{info, instrument, warn};

use crate::Result;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CatalogFile {
    Listing { data: Vec<ListingModel> },
    Entries(Vec<PricingEntry>),
}

#[derive(Debug, Deserialize)]
struct ListingModel {
    id: String,
    #[serde(default)]
    pricing: Option<ListingPricing>,
    #[serde(default)]
    free: bool,
}

#[derive(Debug, Deserialize)]
struct ListingPricing {
    #[serde(default)]
    prompt: Option<Rate>,
    #[serde(default)]
    completion: Option<Rate>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Rate {
    Number(f64),
    Text(String),
}

impl Rate {
    fn value(&self) -> Option<f64> {
        let value = match self {
            Self::Number(n) => *n,
            Self::Text(s) => s.trim().parse().ok()?,
        };
        // negative rates mean "variable pricing" in some listings
        (value.is_finite() && value >= 0.0).then_some(value)
    }
}

/// Load a pricing table from `path`
#[instrument]
pub fn load_pricing_catalog(path: &Path) -> Result<PricingTable> {
    let file: CatalogFile = read_json(path)?;
    let table = parse_catalog(file);
    info!(entries = table.len(), "Loaded pricing catalog");
    Ok(table)
}

/// Parse a pricing table from a JSON string
pub fn parse_pricing_catalog(json: &str) -> Result<PricingTable> {
    let file: CatalogFile = serde_json::from_str(json)?;
    Ok(parse_catalog(file))
}

fn parse_catalog(file: CatalogFile) -> PricingTable {
    match file {
        CatalogFile::Entries(entries) => entries.into_iter().collect(),
        CatalogFile::Listing { data } => data.into_iter().filter_map(listing_entry).collect(),
    }
}

fn listing_entry(model: ListingModel) -> Option<PricingEntry> {
    if model.free {
        return Some(PricingEntry::free(model.id));
    }

    let Some(pricing) = model.pricing else {
        warn!(slug = %model.id, "Catalog entry has no pricing; treating as unpriced");
        return None;
    };

    let prompt = pricing.prompt.as_ref().and_then(Rate::value);
    let completion = pricing.completion.as_ref().and_then(Rate::value);

    match (prompt, completion) {
        (Some(prompt), Some(completion)) => Some(PricingEntry::new(model.id, prompt, completion)),
        _ => {
            warn!(slug = %model.id, "Catalog entry has unreadable rates; treating as unpriced");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openrouter_listing() {
        let table = parse_pricing_catalog(
            r#"{"data": [
                {"id": "vendor/paid", "pricing": {"prompt": "0.000002", "completion": "0.000004"}},
                {"id": "vendor/numeric", "pricing": {"prompt": 0.000001, "completion": 0.000003}},
                {"id": "vendor/zero:free", "pricing": {"prompt": "0", "completion": "0"}},
                {"id": "vendor/flagged", "free": true},
                {"id": "vendor/variable", "pricing": {"prompt": "-1", "completion": "-1"}}
            ]}"#,
        )
        .unwrap();

        assert_eq!(table.len(), 4);
        assert_eq!(table.lookup("vendor/paid").unwrap().prompt_rate, 0.000002);
        assert_eq!(table.lookup("vendor/numeric").unwrap().completion_rate, 0.000003);
        assert!(table.lookup("vendor/zero:free").unwrap().is_free());
        assert!(table.lookup("vendor/flagged").unwrap().is_free());
        assert!(table.lookup("vendor/variable").is_none());
    }

    #[test]
    fn test_plain_entry_list() {
        let table = parse_pricing_catalog(
            r#"[{"slug": "a/b", "prompt_rate": 0.1, "completion_rate": 0.2}]"#,
        )
        .unwrap();
        assert!(!table.lookup("a/b").unwrap().free);
    }
}
