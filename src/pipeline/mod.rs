//! Raw collection orchestrator: City Fetcher + Page Extractor over the
//! full city list, one page kind at a time.
//!
//! Resilience contract: one bad city never loses data for the rest. Any
//! fetch or extraction failure is logged and the city skipped; partial
//! output (some cities present, some missing) is valid. Cities are
//! visited in list order, one blocking fetch at a time, and records keep
//! insertion order (city list order, then row-discovery order).

use crate::config::AppConfig;
use crate::models::{RawPriceRecord, RawQualityRecord};
use crate::scraper::{CityDataSource, NumbeoScraper};
use crate::storage::ArtifactStore;
use anyhow::{Context, Result};
use tracing::{info, warn};

pub struct Pipeline {
    config: AppConfig,
}

#[derive(Debug)]
pub struct ScrapeStats {
    pub cities: usize,
    pub price_records: usize,
    pub price_skips: usize,
    pub quality_records: usize,
    pub quality_skips: usize,
}

impl Pipeline {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// Scrape both page kinds for every city and persist the two raw
    /// artifacts.
    pub async fn run_scrape(&self, cities: &[String]) -> Result<ScrapeStats> {
        let scraper =
            NumbeoScraper::new(&self.config.scraper).context("Failed to build scraper")?;
        let store = ArtifactStore::new(&self.config.storage.data_dir);

        info!("=== Pass 1: cost-of-living pages ({} cities) ===", cities.len());
        let (prices, price_skips) = collect_price_records(&scraper, cities).await;
        store.write_raw_prices(&prices)?;

        info!("=== Pass 2: quality-of-life pages ({} cities) ===", cities.len());
        let (quality, quality_skips) = collect_quality_records(&scraper, cities).await;
        store.write_raw_quality(&quality)?;

        let stats = ScrapeStats {
            cities: cities.len(),
            price_records: prices.len(),
            price_skips,
            quality_records: quality.len(),
            quality_skips,
        };

        info!(
            "=== Done: {} cities | {} price rows ({} skips) | {} quality rows ({} skips) ===",
            stats.cities,
            stats.price_records,
            stats.price_skips,
            stats.quality_records,
            stats.quality_skips,
        );

        Ok(stats)
    }
}

/// Collect price records for every city, skipping failures.
pub async fn collect_price_records<S: CityDataSource>(
    source: &S,
    cities: &[String],
) -> (Vec<RawPriceRecord>, usize) {
    let mut records = Vec::new();
    let mut skipped = 0usize;

    for city in cities {
        match source.fetch_price_records(city).await {
            Ok(rows) => {
                info!("{}: {} price rows", city, rows.len());
                records.extend(rows);
            }
            Err(e) => {
                warn!("{}: skipped ({:#})", city, e);
                skipped += 1;
            }
        }
    }

    (records, skipped)
}

/// Collect quality records for every city, skipping failures.
pub async fn collect_quality_records<S: CityDataSource>(
    source: &S,
    cities: &[String],
) -> (Vec<RawQualityRecord>, usize) {
    let mut records = Vec::new();
    let mut skipped = 0usize;

    for city in cities {
        match source.fetch_quality_records(city).await {
            Ok(rows) => {
                info!("{}: {} quality rows", city, rows.len());
                records.extend(rows);
            }
            Err(e) => {
                warn!("{}: skipped ({:#})", city, e);
                skipped += 1;
            }
        }
    }

    (records, skipped)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
