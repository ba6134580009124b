//! Cleaning/validation and merge/aggregation stages.
//!
//! Both cleaners are pure functions with a fixed step order: numeric
//! coercion → duplicate drop → completeness drop on critical columns →
//! domain filter → text trim. Coercion must come first so the domain
//! filter operates on typed numbers, not raw strings. Re-running a
//! cleaner on its own output changes nothing.

use crate::models::{
    CityProfile, CleanedPriceRecord, CleanedQualityRecord, RawPriceCsvRow, RawQualityCsvRow,
    NUM_INDICES, QUALITY_INDICES,
};
use crate::scraper::cleaner::{parse_indicator_value, parse_localized_number};
use crate::storage::ArtifactStore;
use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashSet};
use tracing::info;

// ── Cleaning ──────────────────────────────────────────────────────────────────

/// Clean the raw price table. Critical columns: Ville, Produit and all
/// three prices; the domain filter keeps strictly positive prices only.
pub fn clean_prices(rows: &[RawPriceCsvRow]) -> Vec<CleanedPriceRecord> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for row in rows {
        let prix_min = row.prix_min.as_deref().and_then(parse_localized_number);
        let prix_max = row.prix_max.as_deref().and_then(parse_localized_number);
        let prix_moyen = row.prix_moyen.as_deref().and_then(parse_localized_number);

        // Duplicates compare on trimmed text so a re-run over cleaned
        // output finds nothing new to drop.
        let key = (
            row.ville.as_deref().map(str::trim).map(String::from),
            row.produit.as_deref().map(str::trim).map(String::from),
            prix_min.map(f64::to_bits),
            prix_max.map(f64::to_bits),
            prix_moyen.map(f64::to_bits),
        );
        if !seen.insert(key) {
            continue;
        }

        let (Some(ville), Some(produit)) = (row.ville.as_deref(), row.produit.as_deref())
        else {
            continue;
        };
        let (Some(prix_min), Some(prix_max), Some(prix_moyen)) = (prix_min, prix_max, prix_moyen)
        else {
            continue;
        };

        if prix_min <= 0.0 || prix_max <= 0.0 || prix_moyen <= 0.0 {
            continue;
        }

        out.push(CleanedPriceRecord {
            ville: ville.trim().to_string(),
            produit: produit.trim().to_string(),
            prix_min,
            prix_max,
            prix_moyen,
        });
    }

    out
}

/// Clean the raw quality table. Critical columns: Ville, Indice, Valeur;
/// the domain filter restricts indicators to [`QUALITY_INDICES`].
pub fn clean_quality(rows: &[RawQualityCsvRow]) -> Vec<CleanedQualityRecord> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for row in rows {
        let valeur = row.valeur.as_deref().and_then(parse_indicator_value);

        let key = (
            row.ville.as_deref().map(str::trim).map(String::from),
            row.indice.as_deref().map(str::trim).map(String::from),
            valeur.map(f64::to_bits),
            row.niveau.as_deref().map(str::trim).map(String::from),
        );
        if !seen.insert(key) {
            continue;
        }

        let (Some(ville), Some(indice)) = (row.ville.as_deref(), row.indice.as_deref()) else {
            continue;
        };
        let Some(valeur) = valeur else {
            continue;
        };

        let indice = indice.trim();
        if indice.is_empty() || !QUALITY_INDICES.contains(&indice) {
            continue;
        }

        out.push(CleanedQualityRecord {
            ville: ville.trim().to_string(),
            indice: indice.to_string(),
            valeur,
            niveau: row.niveau.as_deref().unwrap_or("N/A").trim().to_string(),
        });
    }

    out
}

// ── Merge/aggregation ─────────────────────────────────────────────────────────

/// Mean of the per-product average price, per city → PrixMoyenGlobal.
pub fn aggregate_city_prices(records: &[CleanedPriceRecord]) -> BTreeMap<String, f64> {
    let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for r in records {
        let entry = sums.entry(r.ville.clone()).or_insert((0.0, 0));
        entry.0 += r.prix_moyen;
        entry.1 += 1;
    }
    sums.into_iter()
        .map(|(ville, (sum, n))| (ville, sum / n as f64))
        .collect()
}

/// Pivot (city, indicator, value) triples into one slot array per city,
/// averaging duplicate (city, indicator) pairs.
pub fn pivot_quality(
    records: &[CleanedQualityRecord],
) -> BTreeMap<String, [Option<f64>; NUM_INDICES]> {
    let mut acc: BTreeMap<String, [(f64, usize); NUM_INDICES]> = BTreeMap::new();

    for r in records {
        let Some(slot) = QUALITY_INDICES.iter().position(|n| *n == r.indice) else {
            continue;
        };
        let entry = acc.entry(r.ville.clone()).or_insert([(0.0, 0); NUM_INDICES]);
        entry[slot].0 += r.valeur;
        entry[slot].1 += 1;
    }

    acc.into_iter()
        .map(|(ville, slots)| {
            let mut indices = [None; NUM_INDICES];
            for (out, (sum, n)) in indices.iter_mut().zip(slots) {
                if n > 0 {
                    *out = Some(sum / n as f64);
                }
            }
            (ville, indices)
        })
        .collect()
}

/// Inner join on city: a city absent from either side is excluded.
/// BTreeMap iteration keeps the output sorted by city.
pub fn merge_profiles(
    prices: &BTreeMap<String, f64>,
    quality: &BTreeMap<String, [Option<f64>; NUM_INDICES]>,
) -> Vec<CityProfile> {
    prices
        .iter()
        .filter_map(|(ville, prix)| {
            quality.get(ville).map(|indices| CityProfile {
                ville: ville.clone(),
                prix_moyen_global: *prix,
                indices: *indices,
            })
        })
        .collect()
}

// ── Stage entry point ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct EtlSummary {
    pub raw_prices: usize,
    pub cleaned_prices: usize,
    pub raw_quality: usize,
    pub cleaned_quality: usize,
    pub profiles: usize,
}

/// Run cleaning + merge over the raw artifacts and persist the results.
pub fn run_etl(store: &ArtifactStore) -> Result<EtlSummary> {
    let raw_prices = store
        .read_raw_price_rows()
        .context("No raw price artifact — run `scrape` first")?;
    let cleaned_prices = clean_prices(&raw_prices);
    info!(
        "Prices: {} raw rows → {} cleaned",
        raw_prices.len(),
        cleaned_prices.len()
    );
    store.write_cleaned_prices(&cleaned_prices)?;

    let raw_quality = store
        .read_raw_quality_rows()
        .context("No raw quality artifact — run `scrape` first")?;
    let cleaned_quality = clean_quality(&raw_quality);
    info!(
        "Quality: {} raw rows → {} cleaned",
        raw_quality.len(),
        cleaned_quality.len()
    );
    store.write_cleaned_quality(&cleaned_quality)?;

    let profiles = merge_profiles(
        &aggregate_city_prices(&cleaned_prices),
        &pivot_quality(&cleaned_quality),
    );
    info!("Merged: {} city profiles", profiles.len());
    store.write_profiles(&profiles)?;

    Ok(EtlSummary {
        raw_prices: raw_prices.len(),
        cleaned_prices: cleaned_prices.len(),
        raw_quality: raw_quality.len(),
        cleaned_quality: cleaned_quality.len(),
        profiles: profiles.len(),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn price_row(ville: &str, produit: &str, min: &str, max: &str, avg: &str) -> RawPriceCsvRow {
        RawPriceCsvRow {
            ville: Some(ville.to_string()),
            produit: Some(produit.to_string()),
            prix_min: Some(min.to_string()),
            prix_max: Some(max.to_string()),
            prix_moyen: Some(avg.to_string()),
        }
    }

    fn quality_row(ville: &str, indice: &str, valeur: &str, niveau: &str) -> RawQualityCsvRow {
        RawQualityCsvRow {
            ville: Some(ville.to_string()),
            indice: Some(indice.to_string()),
            valeur: Some(valeur.to_string()),
            niveau: Some(niveau.to_string()),
        }
    }

    #[test]
    fn exact_duplicate_price_rows_collapse() {
        let rows = vec![
            price_row("Paris", "Bread", "1.0", "2.0", "1.5"),
            price_row("Paris", "Bread", "1.0", "2.0", "1.5"),
        ];
        let cleaned = clean_prices(&rows);
        assert_eq!(cleaned.len(), 1);
        assert_eq!(cleaned[0].prix_moyen, 1.5);
    }

    #[test]
    fn non_positive_and_unparseable_prices_drop() {
        let rows = vec![
            price_row("Paris", "Bread", "0", "2.0", "1.0"),
            price_row("Paris", "Milk", "abc", "2.0", "1.0"),
            price_row("Paris", "Rice", "1,00", "3,00", "2,00"),
        ];
        let cleaned = clean_prices(&rows);
        assert_eq!(cleaned.len(), 1);
        assert_eq!(cleaned[0].produit, "Rice");
        assert_eq!(cleaned[0].prix_min, 1.0);
    }

    #[test]
    fn missing_critical_price_columns_drop() {
        let mut row = price_row("Paris", "Bread", "1.0", "2.0", "1.5");
        row.produit = None;
        assert!(clean_prices(&[row]).is_empty());
    }

    #[test]
    fn allow_list_filters_quality_rows() {
        let rows = vec![
            quality_row("Paris", "Foo Index", "50", "Low"),
            quality_row("Paris", "Safety Index", "72,5", "High"),
        ];
        let cleaned = clean_quality(&rows);
        assert_eq!(cleaned.len(), 1);
        assert_eq!(cleaned[0].indice, "Safety Index");
        assert_eq!(cleaned[0].valeur, 72.5);
    }

    #[test]
    fn price_cleaning_is_idempotent() {
        let rows = vec![
            price_row(" Paris ", "Bread", "1,0", "2,0", "1,5"),
            price_row("Paris", "Bread", "1.0", "2.0", "1.5"),
            price_row("Lyon", "Milk", "0.9", "1.1", "1.0"),
        ];
        let first = clean_prices(&rows);

        // Feed the cleaned output back through as raw rows.
        let as_raw: Vec<RawPriceCsvRow> = first
            .iter()
            .map(|r| {
                price_row(
                    &r.ville,
                    &r.produit,
                    &r.prix_min.to_string(),
                    &r.prix_max.to_string(),
                    &r.prix_moyen.to_string(),
                )
            })
            .collect();
        let second = clean_prices(&as_raw);

        assert_eq!(first, second);
    }

    #[test]
    fn quality_cleaning_is_idempotent() {
        let rows = vec![
            quality_row("Lyon", "Safety Index:", "72,5", "High"),
            quality_row("Lyon", "Safety Index", "72.5", "High"),
            quality_row("Lyon", "Pollution Index", "44.1 (moderate)", "Moderate"),
        ];
        // The trailing-colon variant is not on the allow-list, so only
        // two distinct rows survive the first pass.
        let first = clean_quality(&rows);
        assert_eq!(first.len(), 2);

        let as_raw: Vec<RawQualityCsvRow> = first
            .iter()
            .map(|r| quality_row(&r.ville, &r.indice, &r.valeur.to_string(), &r.niveau))
            .collect();
        let second = clean_quality(&as_raw);

        assert_eq!(first, second);
    }

    #[test]
    fn merged_profiles_are_the_city_intersection() {
        let prices = clean_prices(&[
            price_row("Lyon", "Bread", "1.0", "2.0", "1.5"),
            price_row("Paris", "Bread", "2.0", "3.0", "2.5"),
        ]);
        // No quality rows for Lyon: it must be absent from the merge even
        // though price data exists.
        let quality = clean_quality(&[quality_row("Paris", "Safety Index", "70", "High")]);

        let profiles = merge_profiles(&aggregate_city_prices(&prices), &pivot_quality(&quality));

        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].ville, "Paris");
        assert_eq!(profiles[0].prix_moyen_global, 2.5);
    }

    #[test]
    fn pivot_averages_duplicate_indicator_pairs() {
        let quality = clean_quality(&[
            quality_row("Paris", "Safety Index", "70", "High"),
            quality_row("Paris", "Safety Index", "74", "High"),
        ]);
        let pivot = pivot_quality(&quality);

        let slot = QUALITY_INDICES
            .iter()
            .position(|n| *n == "Safety Index")
            .unwrap();
        assert_eq!(pivot["Paris"][slot], Some(72.0));
    }

    #[test]
    fn aggregation_averages_product_prices_per_city() {
        let prices = clean_prices(&[
            price_row("Paris", "Bread", "1.0", "2.0", "1.5"),
            price_row("Paris", "Milk", "2.0", "3.0", "2.5"),
        ]);
        let agg = aggregate_city_prices(&prices);
        assert_eq!(agg["Paris"], 2.0);
    }

    #[test]
    fn merge_output_is_sorted_by_city() {
        let prices = clean_prices(&[
            price_row("Nice", "Bread", "1.0", "2.0", "1.5"),
            price_row("Lyon", "Bread", "1.0", "2.0", "1.5"),
        ]);
        let quality = clean_quality(&[
            quality_row("Nice", "Safety Index", "70", "High"),
            quality_row("Lyon", "Safety Index", "60", "High"),
        ]);
        let profiles = merge_profiles(&aggregate_city_prices(&prices), &pivot_quality(&quality));
        let villes: Vec<&str> = profiles.iter().map(|p| p.ville.as_str()).collect();
        assert_eq!(villes, vec!["Lyon", "Nice"]);
    }
}
