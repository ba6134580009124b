use serde::{Deserialize, Serialize};

/// The nine quality-of-life indicators retained for modeling.
/// Everything else scraped from a quality page is discarded during cleaning.
pub const QUALITY_INDICES: [&str; 9] = [
    "Quality of Life Index",
    "Purchasing Power Index",
    "Safety Index",
    "Health Care Index",
    "Climate Index",
    "Cost of Living Index",
    "Property Price to Income Ratio",
    "Traffic Commute Time Index",
    "Pollution Index",
];

pub const NUM_INDICES: usize = QUALITY_INDICES.len();

// ── Raw records (scraper output) ──────────────────────────────────────────────

/// One product row extracted from a cost-of-living page.
/// Rows with an unparseable price bound are dropped at extraction time,
/// so every field here is already typed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPriceRecord {
    #[serde(rename = "Ville")]
    pub ville: String,
    #[serde(rename = "Produit")]
    pub produit: String,
    #[serde(rename = "PrixMin")]
    pub prix_min: f64,
    #[serde(rename = "PrixMax")]
    pub prix_max: f64,
    /// round((min + max) / 2, 2) — fixed at extraction time.
    #[serde(rename = "PrixMoyen")]
    pub prix_moyen: f64,
}

/// One indicator row extracted from a quality-of-life page.
/// The value is kept as raw text; numeric coercion belongs to the ETL stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawQualityRecord {
    #[serde(rename = "Ville")]
    pub ville: String,
    #[serde(rename = "Indice")]
    pub indice: String,
    #[serde(rename = "Valeur")]
    pub valeur: String,
    #[serde(rename = "Niveau")]
    pub niveau: String,
}

// ── Raw CSV rows (ETL input) ──────────────────────────────────────────────────

/// Price artifact row as read back from disk, everything optional text.
/// The cleaning stage owns coercion and completeness checks.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPriceCsvRow {
    #[serde(rename = "Ville")]
    pub ville: Option<String>,
    #[serde(rename = "Produit")]
    pub produit: Option<String>,
    #[serde(rename = "PrixMin")]
    pub prix_min: Option<String>,
    #[serde(rename = "PrixMax")]
    pub prix_max: Option<String>,
    #[serde(rename = "PrixMoyen")]
    pub prix_moyen: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawQualityCsvRow {
    #[serde(rename = "Ville")]
    pub ville: Option<String>,
    #[serde(rename = "Indice")]
    pub indice: Option<String>,
    #[serde(rename = "Valeur")]
    pub valeur: Option<String>,
    #[serde(rename = "Niveau")]
    pub niveau: Option<String>,
}

// ── Cleaned records ───────────────────────────────────────────────────────────

/// Price record after cleaning: all three price fields present and > 0,
/// city/product trimmed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanedPriceRecord {
    #[serde(rename = "Ville")]
    pub ville: String,
    #[serde(rename = "Produit")]
    pub produit: String,
    #[serde(rename = "PrixMin")]
    pub prix_min: f64,
    #[serde(rename = "PrixMax")]
    pub prix_max: f64,
    #[serde(rename = "PrixMoyen")]
    pub prix_moyen: f64,
}

/// Quality record after cleaning: indicator is one of [`QUALITY_INDICES`],
/// value is a finite number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanedQualityRecord {
    #[serde(rename = "Ville")]
    pub ville: String,
    #[serde(rename = "Indice")]
    pub indice: String,
    #[serde(rename = "Valeur")]
    pub valeur: f64,
    #[serde(rename = "Niveau")]
    pub niveau: String,
}

// ── City profile (merge output, model input) ──────────────────────────────────

/// One row per city surviving the inner join of both cleaned sources.
/// `indices` slots follow [`QUALITY_INDICES`] order; a slot is `None` when
/// the city never reported that indicator (imputed at training time).
#[derive(Debug, Clone, PartialEq)]
pub struct CityProfile {
    pub ville: String,
    pub prix_moyen_global: f64,
    pub indices: [Option<f64>; NUM_INDICES],
}
