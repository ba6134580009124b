pub mod cleaner;
pub mod http_client;
pub mod parsers;

use crate::config::ScraperConfig;
use crate::models::{RawPriceRecord, RawQualityRecord};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tracing::{debug, warn};
use url::Url;

use self::http_client::HttpClient;
use self::parsers::{extract_records, PageKind, PageRecords};

// ── Source trait ──────────────────────────────────────────────────────────────

/// Swappable per-city data source abstraction.
#[async_trait]
pub trait CityDataSource: Send + Sync {
    async fn fetch_price_records(&self, city: &str) -> Result<Vec<RawPriceRecord>>;
    async fn fetch_quality_records(&self, city: &str) -> Result<Vec<RawQualityRecord>>;
}

// ── numbeo scraper ────────────────────────────────────────────────────────────

pub struct NumbeoScraper {
    client: HttpClient,
    base_url: String,
}

impl NumbeoScraper {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        Url::parse(&base_url).with_context(|| format!("Invalid base URL {}", base_url))?;

        Ok(Self {
            client: HttpClient::new(config)?,
            base_url,
        })
    }

    /// URL for a city page. Spaces become dashes: "Le Havre" → /in/Le-Havre
    pub fn page_url(&self, kind: PageKind, city: &str) -> String {
        let city_slug = city.trim().replace(' ', "-");
        format!("{}/{}/in/{}", self.base_url, kind.path(), city_slug)
    }

    /// Fetch one page and run the extractor for its kind.
    async fn fetch_page(&self, kind: PageKind, city: &str) -> Result<PageRecords> {
        let url = self.page_url(kind, city);
        debug!("Fetching {}", url);

        let html = self
            .client
            .get_html(&url)
            .await
            .with_context(|| format!("Failed to fetch {} page for {}", kind.path(), city))?;

        let records = extract_records(kind, &html, city)?;
        if records.is_empty() {
            warn!("{}: no usable rows on {} page", city, kind.path());
        }
        debug!("{}: {} rows extracted", city, records.len());
        Ok(records)
    }
}

#[async_trait]
impl CityDataSource for NumbeoScraper {
    async fn fetch_price_records(&self, city: &str) -> Result<Vec<RawPriceRecord>> {
        match self.fetch_page(PageKind::CostOfLiving, city).await? {
            PageRecords::Prices(records) => Ok(records),
            PageRecords::Quality(_) => bail!("cost-of-living page yielded quality records"),
        }
    }

    async fn fetch_quality_records(&self, city: &str) -> Result<Vec<RawQualityRecord>> {
        match self.fetch_page(PageKind::QualityOfLife, city).await? {
            PageRecords::Quality(records) => Ok(records),
            PageRecords::Prices(_) => bail!("quality-of-life page yielded price records"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn page_url_replaces_spaces() {
        let config = AppConfig::default();
        let scraper = NumbeoScraper::new(&config.scraper).unwrap();
        assert_eq!(
            scraper.page_url(PageKind::CostOfLiving, "Le Havre"),
            "https://www.numbeo.com/cost-of-living/in/Le-Havre"
        );
        assert_eq!(
            scraper.page_url(PageKind::QualityOfLife, " Paris "),
            "https://www.numbeo.com/quality-of-life/in/Paris"
        );
    }
}
