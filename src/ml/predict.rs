//! Prediction service: one decision routes each request — is the product
//! in the one-hot vocabulary learned at training time? Known products go
//! to the primary model; anything else silently degrades to the fallback
//! model, flagged in the result.

use crate::ml::{TrainedModels, PROFILE_FEATURES};
use crate::models::CityProfile;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::debug;

// ── Alias table ───────────────────────────────────────────────────────────────

/// Maps a normalized (trimmed, lowercased) common-language product name to
/// the exact label used at training time. Extensible: new aliases are data,
/// not code.
#[derive(Debug, Clone)]
pub struct ProductAliases {
    map: HashMap<String, String>,
}

impl ProductAliases {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    pub fn with_alias(mut self, alias: &str, label: &str) -> Self {
        self.map
            .insert(alias.trim().to_lowercase(), label.to_string());
        self
    }

    /// Resolve a user-supplied name. Unmapped names pass through with
    /// only the surrounding whitespace removed.
    pub fn resolve(&self, raw: &str) -> String {
        let key = raw.trim().to_lowercase();
        match self.map.get(&key) {
            Some(label) => label.clone(),
            None => raw.trim().to_string(),
        }
    }
}

impl Default for ProductAliases {
    /// Built-in French-language aliases for common numbeo product labels.
    fn default() -> Self {
        Self::new()
            .with_alias("banane", "Banana (1kg)")
            .with_alias("pain", "Loaf of Fresh White Bread (500g)")
            .with_alias("lait", "Milk (regular), (1 liter)")
            .with_alias("eau", "Water (1.5 liter bottle)")
            .with_alias("riz", "Rice (white), (1kg)")
            .with_alias("oeufs", "Eggs (regular) (12)")
            .with_alias("œufs", "Eggs (regular) (12)")
            .with_alias("pommes", "Apples (1kg)")
            .with_alias("fromage", "Local Cheese (1kg)")
    }
}

// ── Prediction ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelPath {
    Primary,
    Fallback,
}

#[derive(Debug, Clone)]
pub struct Prediction {
    pub price: f64,
    pub path: ModelPath,
    /// The training label the requested product resolved to.
    pub resolved_label: String,
}

#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("city not found: {0}")]
    UnknownCity(String),
}

pub struct Predictor {
    models: TrainedModels,
    profiles: BTreeMap<String, CityProfile>,
    aliases: ProductAliases,
}

impl Predictor {
    pub fn new(
        models: TrainedModels,
        profiles: Vec<CityProfile>,
        aliases: ProductAliases,
    ) -> Self {
        let profiles = profiles
            .into_iter()
            .map(|p| (p.ville.clone(), p))
            .collect();
        Self {
            models,
            profiles,
            aliases,
        }
    }

    pub fn predict(&self, city: &str, product: &str) -> Result<Prediction, PredictionError> {
        let resolved_label = self.aliases.resolve(product);

        let profile = self
            .profiles
            .get(city.trim())
            .ok_or_else(|| PredictionError::UnknownCity(city.trim().to_string()))?;

        let base = self.models.profile_features(profile);

        if self.models.vocabulary.contains(&resolved_label) {
            let mut features = base;
            features.resize(PROFILE_FEATURES + self.models.vocabulary.n_columns(), 0.0);
            if let Some(col) = self.models.vocabulary.one_hot_column(&resolved_label) {
                features[PROFILE_FEATURES + col] = 1.0;
            }
            debug!("{} / {}: primary path", city, resolved_label);
            Ok(Prediction {
                price: self.models.predict_primary(&features),
                path: ModelPath::Primary,
                resolved_label,
            })
        } else {
            debug!("{} / {}: out of vocabulary, fallback path", city, resolved_label);
            Ok(Prediction {
                price: self.models.predict_fallback(&base),
                path: ModelPath::Fallback,
                resolved_label,
            })
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
