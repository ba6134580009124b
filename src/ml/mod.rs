//! Model training: a primary regressor over city-profile features plus
//! one-hot product identity, and a fallback regressor over the profile
//! features alone. Both are always trained together from the same rows so
//! their feature schemas stay consistent; the fallback serves products
//! never seen during training.

pub mod predict;

use crate::config::ModelConfig;
use crate::models::{CityProfile, CleanedPriceRecord, NUM_INDICES};
use anyhow::{bail, Context, Result};
use linfa::prelude::*;
use linfa_linear::{FittedLinearRegression, LinearRegression};
use ndarray::{s, Array1, Array2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;
use tracing::info;

/// PrixMoyenGlobal + the nine quality indicators.
pub const PROFILE_FEATURES: usize = 1 + NUM_INDICES;

// ── Product vocabulary ────────────────────────────────────────────────────────

/// Distinct product labels seen at training time, sorted. The first label
/// is the one-hot reference category: in vocabulary, but encoded as the
/// all-zero indicator row.
#[derive(Debug, Clone)]
pub struct ProductVocabulary {
    labels: Vec<String>,
}

impl ProductVocabulary {
    fn from_labels(mut labels: Vec<String>) -> Self {
        labels.sort();
        labels.dedup();
        Self { labels }
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.binary_search_by(|l| l.as_str().cmp(label)).is_ok()
    }

    /// Indicator column for a label; `None` for the reference category
    /// and for out-of-vocabulary labels.
    pub fn one_hot_column(&self, label: &str) -> Option<usize> {
        match self.labels.binary_search_by(|l| l.as_str().cmp(label)) {
            Ok(0) | Err(_) => None,
            Ok(i) => Some(i - 1),
        }
    }

    /// Number of one-hot columns (reference category dropped).
    pub fn n_columns(&self) -> usize {
        self.labels.len().saturating_sub(1)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

// ── Trained models ────────────────────────────────────────────────────────────

pub struct TrainedModels {
    primary: FittedLinearRegression<f64>,
    fallback: FittedLinearRegression<f64>,
    pub vocabulary: ProductVocabulary,
    feature_means: [f64; PROFILE_FEATURES],
}

impl TrainedModels {
    /// Profile feature vector for a city, mean-imputed exactly like the
    /// training matrix.
    pub fn profile_features(&self, profile: &CityProfile) -> Vec<f64> {
        profile_features(profile, &self.feature_means)
    }

    /// Predict with the full-feature model. `features` must hold the
    /// profile columns followed by the one-hot product columns.
    pub fn predict_primary(&self, features: &[f64]) -> f64 {
        predict_one(&self.primary, features)
    }

    /// Predict with the profile-only model.
    pub fn predict_fallback(&self, features: &[f64]) -> f64 {
        predict_one(&self.fallback, features)
    }
}

fn profile_features(
    profile: &CityProfile,
    means: &[f64; PROFILE_FEATURES],
) -> Vec<f64> {
    let mut v = Vec::with_capacity(PROFILE_FEATURES);
    v.push(profile.prix_moyen_global);
    for (i, slot) in profile.indices.iter().enumerate() {
        v.push(slot.unwrap_or(means[i + 1]));
    }
    v
}

fn predict_one(model: &FittedLinearRegression<f64>, features: &[f64]) -> f64 {
    let dot: f64 = model
        .params()
        .iter()
        .zip(features)
        .map(|(coef, x)| coef * x)
        .sum();
    model.intercept() + dot
}

// ── Training ──────────────────────────────────────────────────────────────────

/// Held-out evaluation, advisory only (logged, never a gate).
#[derive(Debug)]
pub struct TrainingReport {
    pub n_train: usize,
    pub n_test: usize,
    pub primary_mse: Option<f64>,
    pub primary_r2: Option<f64>,
    pub fallback_mse: Option<f64>,
    pub fallback_r2: Option<f64>,
}

/// Join cleaned prices to city profiles and fit both models.
pub fn train_models(
    prices: &[CleanedPriceRecord],
    profiles: &[CityProfile],
    config: &ModelConfig,
) -> Result<(TrainedModels, TrainingReport)> {
    if profiles.is_empty() {
        bail!("No city profiles — run `etl` first");
    }

    // Column means over the merged city table, used for imputation here and
    // again at prediction time. The city table is the training population:
    // the split below holds out price rows, never cities, so held-out rows
    // share these means by construction.
    let mut feature_means = [0.0; PROFILE_FEATURES];
    feature_means[0] = profiles.iter().map(|p| p.prix_moyen_global).sum::<f64>()
        / profiles.len() as f64;
    for i in 0..NUM_INDICES {
        let values: Vec<f64> = profiles.iter().filter_map(|p| p.indices[i]).collect();
        if !values.is_empty() {
            feature_means[i + 1] = values.iter().sum::<f64>() / values.len() as f64;
        }
    }

    let profile_map: BTreeMap<&str, &CityProfile> =
        profiles.iter().map(|p| (p.ville.as_str(), p)).collect();

    let examples: Vec<(&CleanedPriceRecord, &CityProfile)> = prices
        .iter()
        .filter_map(|r| profile_map.get(r.ville.as_str()).map(|p| (r, *p)))
        .collect();

    if examples.len() < 2 {
        bail!(
            "Not enough joined price/profile rows to train ({})",
            examples.len()
        );
    }

    let vocabulary = ProductVocabulary::from_labels(
        examples.iter().map(|(r, _)| r.produit.clone()).collect(),
    );
    let n_features = PROFILE_FEATURES + vocabulary.n_columns();

    let mut rows: Vec<Vec<f64>> = Vec::with_capacity(examples.len());
    let mut targets: Vec<f64> = Vec::with_capacity(examples.len());
    for (record, profile) in &examples {
        let mut row = profile_features(profile, &feature_means);
        row.resize(n_features, 0.0);
        if let Some(col) = vocabulary.one_hot_column(&record.produit) {
            row[PROFILE_FEATURES + col] = 1.0;
        }
        rows.push(row);
        targets.push(record.prix_moyen);
    }

    // Deterministic split: seeded shuffle, fixed test fraction, always at
    // least one training row.
    let mut indices: Vec<usize> = (0..rows.len()).collect();
    let mut rng = StdRng::seed_from_u64(config.seed);
    indices.shuffle(&mut rng);
    let n_test = ((rows.len() as f64) * config.test_fraction).round() as usize;
    let n_test = n_test.min(rows.len() - 1);
    let (test_idx, train_idx) = indices.split_at(n_test);

    let x_train = matrix_from(&rows, train_idx, n_features);
    let y_train = Array1::from_iter(train_idx.iter().map(|&i| targets[i]));

    let primary = LinearRegression::new()
        .fit(&Dataset::new(x_train.clone(), y_train.clone()))
        .context("Primary model fit failed")?;

    let x_train_profile = x_train.slice(s![.., 0..PROFILE_FEATURES]).to_owned();
    let fallback = LinearRegression::new()
        .fit(&Dataset::new(x_train_profile, y_train.clone()))
        .context("Fallback model fit failed")?;

    let models = TrainedModels {
        primary,
        fallback,
        vocabulary,
        feature_means,
    };

    let mut report = TrainingReport {
        n_train: train_idx.len(),
        n_test: test_idx.len(),
        primary_mse: None,
        primary_r2: None,
        fallback_mse: None,
        fallback_r2: None,
    };

    if !test_idx.is_empty() {
        let x_test = matrix_from(&rows, test_idx, n_features);
        let x_test_profile = x_test.slice(s![.., 0..PROFILE_FEATURES]).to_owned();
        let y_test = Array1::from_iter(test_idx.iter().map(|&i| targets[i]));
        let test_ds = Dataset::new(x_test, y_test);

        let primary_pred = models.primary.predict(test_ds.records());
        report.primary_mse = Some(primary_pred.mean_squared_error(&test_ds)?);
        report.primary_r2 = Some(primary_pred.r2(&test_ds)?);

        let fallback_pred = models.fallback.predict(&x_test_profile);
        report.fallback_mse = Some(fallback_pred.mean_squared_error(&test_ds)?);
        report.fallback_r2 = Some(fallback_pred.r2(&test_ds)?);
    }

    info!(
        "Trained on {} rows ({} held out), {} products ({} one-hot columns)",
        report.n_train,
        report.n_test,
        models.vocabulary.labels().len(),
        models.vocabulary.n_columns(),
    );
    if let (Some(mse), Some(r2)) = (report.primary_mse, report.primary_r2) {
        info!("Primary model:  MSE = {:.4}, R² = {:.4}", mse, r2);
    }
    if let (Some(mse), Some(r2)) = (report.fallback_mse, report.fallback_r2) {
        info!("Fallback model: MSE = {:.4}, R² = {:.4}", mse, r2);
    }

    Ok((models, report))
}

fn matrix_from(rows: &[Vec<f64>], idx: &[usize], n_features: usize) -> Array2<f64> {
    let mut m = Array2::zeros((idx.len(), n_features));
    for (r, &i) in idx.iter().enumerate() {
        for (c, v) in rows[i].iter().enumerate() {
            m[(r, c)] = *v;
        }
    }
    m
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QUALITY_INDICES;

    pub(super) fn price(ville: &str, produit: &str, prix: f64) -> CleanedPriceRecord {
        CleanedPriceRecord {
            ville: ville.to_string(),
            produit: produit.to_string(),
            prix_min: prix - 0.5,
            prix_max: prix + 0.5,
            prix_moyen: prix,
        }
    }

    pub(super) fn safety_slot() -> usize {
        QUALITY_INDICES
            .iter()
            .position(|n| *n == "Safety Index")
            .unwrap()
    }

    /// Synthetic city/price set, large enough that the one-hot design
    /// matrix has full column rank. Tiny LCG keeps it reproducible.
    pub(super) fn fixture() -> (Vec<CleanedPriceRecord>, Vec<CityProfile>) {
        let mut state: u64 = 9;
        let mut rand = move || -> f64 {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            ((state >> 33) as f64) / (u32::MAX as f64)
        };

        let products = [
            "Apples (1kg)",
            "Banana (1kg)",
            "Milk (regular), (1 liter)",
        ];

        let mut profiles = Vec::new();
        let mut prices = Vec::new();
        for i in 0..12 {
            let ville = format!("Ville{:02}", i);
            let mut indices = [None; NUM_INDICES];
            for slot in indices.iter_mut() {
                *slot = Some(30.0 + 60.0 * rand());
            }
            if i == 11 {
                // One city without a Safety Index, for the imputation test.
                indices[safety_slot()] = None;
            }
            let base = 1.5 + 3.0 * rand();
            profiles.push(CityProfile {
                ville: ville.clone(),
                prix_moyen_global: base,
                indices,
            });
            for (k, product) in products.iter().enumerate() {
                prices.push(price(&ville, product, base + 0.4 * k as f64 + 0.2 * rand()));
            }
        }
        (prices, profiles)
    }

    #[test]
    fn vocabulary_reference_category_is_dropped() {
        let vocab = ProductVocabulary::from_labels(vec![
            "Banana (1kg)".to_string(),
            "Apples (1kg)".to_string(),
            "Banana (1kg)".to_string(),
        ]);
        assert_eq!(vocab.labels(), &["Apples (1kg)", "Banana (1kg)"]);
        assert_eq!(vocab.n_columns(), 1);
        // Reference label is in vocabulary but has no column.
        assert!(vocab.contains("Apples (1kg)"));
        assert_eq!(vocab.one_hot_column("Apples (1kg)"), None);
        assert_eq!(vocab.one_hot_column("Banana (1kg)"), Some(0));
        assert_eq!(vocab.one_hot_column("Tofu"), None);
        assert!(!vocab.contains("Tofu"));
    }

    #[test]
    fn trains_both_models_and_reports() {
        let (prices, profiles) = fixture();
        let config = ModelConfig {
            test_fraction: 0.2,
            seed: 42,
        };
        let (models, report) = train_models(&prices, &profiles, &config).unwrap();

        assert_eq!(report.n_train + report.n_test, prices.len());
        assert!(report.n_train >= 1);
        assert!(report.n_test >= 1);
        assert_eq!(models.vocabulary.labels().len(), 3);
        assert!(report.primary_mse.unwrap().is_finite());
        assert!(report.fallback_mse.unwrap().is_finite());

        // Fallback prediction works on profile features alone.
        let features = models.profile_features(&profiles[0]);
        assert_eq!(features.len(), PROFILE_FEATURES);
        let value = models.predict_fallback(&features);
        assert!(value.is_finite());
    }

    #[test]
    fn imputation_fills_missing_indicator_with_column_mean() {
        let (prices, profiles) = fixture();
        let config = ModelConfig {
            test_fraction: 0.2,
            seed: 42,
        };
        let (models, _) = train_models(&prices, &profiles, &config).unwrap();

        let slot = safety_slot();
        // The last city has no Safety Index; the column mean over the
        // cities that do fills the gap.
        let values: Vec<f64> = profiles.iter().filter_map(|p| p.indices[slot]).collect();
        let expected = values.iter().sum::<f64>() / values.len() as f64;

        let features = models.profile_features(&profiles[11]);
        assert!((features[1 + slot] - expected).abs() < 1e-9);
    }

    #[test]
    fn split_is_deterministic_for_a_fixed_seed() {
        let (prices, profiles) = fixture();
        let config = ModelConfig {
            test_fraction: 0.25,
            seed: 7,
        };
        let (_, first) = train_models(&prices, &profiles, &config).unwrap();
        let (_, second) = train_models(&prices, &profiles, &config).unwrap();
        assert_eq!(first.primary_mse, second.primary_mse);
        assert_eq!(first.fallback_r2, second.fallback_r2);
    }
}
