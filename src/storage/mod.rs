//! CSV artifact store. Each pipeline stage reads the previous stage's
//! artifact and writes its own; files carry a header row and a UTF-8 BOM
//! so accented city/product names survive spreadsheet round-trips.

use crate::models::{
    CityProfile, CleanedPriceRecord, CleanedQualityRecord, RawPriceCsvRow, RawPriceRecord,
    RawQualityCsvRow, RawQualityRecord, NUM_INDICES, QUALITY_INDICES,
};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

pub struct ArtifactStore {
    data_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    // ── Artifact paths ────────────────────────────────────────────────────────

    pub fn raw_prices_path(&self) -> PathBuf {
        self.data_dir.join("villes_produits_prix_raw.csv")
    }

    pub fn raw_quality_path(&self) -> PathBuf {
        self.data_dir.join("villes_qualite_vie_raw.csv")
    }

    pub fn cleaned_prices_path(&self) -> PathBuf {
        self.data_dir.join("cleaned/villes_produits_prix_clean.csv")
    }

    pub fn cleaned_quality_path(&self) -> PathBuf {
        self.data_dir.join("cleaned/villes_qualite_vie_clean.csv")
    }

    pub fn profiles_path(&self) -> PathBuf {
        self.data_dir.join("cleaned/villes_final_ml.csv")
    }

    // ── Raw artifacts ─────────────────────────────────────────────────────────

    pub fn write_raw_prices(&self, records: &[RawPriceRecord]) -> Result<()> {
        write_rows(&self.raw_prices_path(), records)
    }

    pub fn write_raw_quality(&self, records: &[RawQualityRecord]) -> Result<()> {
        write_rows(&self.raw_quality_path(), records)
    }

    pub fn read_raw_price_rows(&self) -> Result<Vec<RawPriceCsvRow>> {
        read_rows(&self.raw_prices_path())
    }

    pub fn read_raw_quality_rows(&self) -> Result<Vec<RawQualityCsvRow>> {
        read_rows(&self.raw_quality_path())
    }

    // ── Cleaned artifacts ─────────────────────────────────────────────────────

    pub fn write_cleaned_prices(&self, records: &[CleanedPriceRecord]) -> Result<()> {
        write_rows(&self.cleaned_prices_path(), records)
    }

    pub fn write_cleaned_quality(&self, records: &[CleanedQualityRecord]) -> Result<()> {
        write_rows(&self.cleaned_quality_path(), records)
    }

    pub fn read_cleaned_prices(&self) -> Result<Vec<CleanedPriceRecord>> {
        read_rows(&self.cleaned_prices_path())
    }

    pub fn read_cleaned_quality(&self) -> Result<Vec<CleanedQualityRecord>> {
        read_rows(&self.cleaned_quality_path())
    }

    // ── Merged profile table ──────────────────────────────────────────────────

    /// Profile columns are positional: Ville, PrixMoyenGlobal, then one
    /// column per allow-listed indicator. Missing indicator values are
    /// written as empty cells.
    pub fn write_profiles(&self, profiles: &[CityProfile]) -> Result<()> {
        let path = self.profiles_path();
        let mut wtr = writer_with_bom(&path)?;

        let mut header = vec!["Ville", "PrixMoyenGlobal"];
        header.extend(QUALITY_INDICES);
        wtr.write_record(&header)?;

        for p in profiles {
            let mut record = vec![p.ville.clone(), p.prix_moyen_global.to_string()];
            for slot in &p.indices {
                record.push(slot.map(|v| v.to_string()).unwrap_or_default());
            }
            wtr.write_record(&record)?;
        }

        wtr.flush()?;
        info!("Wrote {} profiles to {:?}", profiles.len(), path);
        Ok(())
    }

    pub fn read_profiles(&self) -> Result<Vec<CityProfile>> {
        let path = self.profiles_path();
        let mut rdr = reader_with_trimmed_headers(&path)?;

        let headers = rdr.headers()?.clone();
        let col = |name: &str| headers.iter().position(|h| h == name);

        let ville_idx = col("Ville")
            .with_context(|| format!("Missing Ville column in {:?}", path))?;
        let prix_idx = col("PrixMoyenGlobal")
            .with_context(|| format!("Missing PrixMoyenGlobal column in {:?}", path))?;
        let index_cols: Vec<Option<usize>> = QUALITY_INDICES.iter().map(|n| col(n)).collect();

        let mut profiles = Vec::new();
        for result in rdr.records() {
            let record = result?;
            let ville = record.get(ville_idx).unwrap_or_default().trim().to_string();
            let prix_moyen_global: f64 = record
                .get(prix_idx)
                .unwrap_or_default()
                .trim()
                .parse()
                .with_context(|| format!("Bad PrixMoyenGlobal for {}", ville))?;

            let mut indices = [None; NUM_INDICES];
            for (slot, idx) in indices.iter_mut().zip(index_cols.iter().copied()) {
                *slot = idx
                    .and_then(|i| record.get(i))
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .and_then(|s| s.parse().ok());
            }

            profiles.push(CityProfile {
                ville,
                prix_moyen_global,
                indices,
            });
        }

        Ok(profiles)
    }

    /// Record count of an artifact, `None` if the file does not exist.
    pub fn row_count(&self, path: &Path) -> Result<Option<usize>> {
        if !path.exists() {
            return Ok(None);
        }
        let mut rdr = reader_with_trimmed_headers(path)?;
        let mut n = 0usize;
        for result in rdr.records() {
            result?;
            n += 1;
        }
        Ok(Some(n))
    }
}

// ── CSV plumbing ──────────────────────────────────────────────────────────────

fn writer_with_bom(path: &Path) -> Result<csv::Writer<File>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Could not create dir {:?}", parent))?;
    }
    let mut file =
        File::create(path).with_context(|| format!("Could not create {:?}", path))?;
    file.write_all(UTF8_BOM)?;
    Ok(csv::Writer::from_writer(file))
}

/// Reader with column names trimmed (and any straggling BOM removed),
/// so artifacts edited by hand still map onto the row structs.
fn reader_with_trimmed_headers(path: &Path) -> Result<csv::Reader<File>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Could not open {:?}", path))?;

    let trimmed: csv::StringRecord = rdr
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim())
        .collect();
    rdr.set_headers(trimmed);

    Ok(rdr)
}

fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut wtr = writer_with_bom(path)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    info!("Wrote {} rows to {:?}", rows.len(), path);
    Ok(())
}

fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut rdr = reader_with_trimmed_headers(path)?;
    let mut rows = Vec::new();
    for result in rdr.deserialize() {
        rows.push(result?);
    }
    Ok(rows)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
