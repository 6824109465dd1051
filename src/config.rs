//! Resolver configuration: numeric thresholds, vocabulary allow-lists, models.
//!
//! Every field has a default, so a config file only needs the values it
//! overrides. The vocabularies drive the gate pipeline and the query cleaner;
//! extending them never requires a code change.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub thresholds: Thresholds,
    pub vocabulary: Vocabulary,
    pub models: ModelConfig,
    pub cache: CacheConfig,
}

impl ResolverConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: ResolverConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `NUTRI_CONFIG` when set, otherwise defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var("NUTRI_CONFIG") {
            Ok(path) if !path.trim().is_empty() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.thresholds;
        for (name, value) in [
            ("min_db_token_score", t.min_db_token_score),
            ("min_db_ai_pick_conf", t.min_db_ai_pick_conf),
            ("low_baseline_confidence", t.low_baseline_confidence),
            ("default_generative_confidence", t.default_generative_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "thresholds.{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if !t.pack_tolerance.is_finite() || t.pack_tolerance < 0.0 {
            return Err(ConfigError::Invalid(
                "thresholds.pack_tolerance must be a non-negative number".to_string(),
            ));
        }
        if t.shortlist_size == 0 {
            return Err(ConfigError::Invalid(
                "thresholds.shortlist_size must be >= 1".to_string(),
            ));
        }
        if t.max_catalog_results == 0 {
            return Err(ConfigError::Invalid(
                "thresholds.max_catalog_results must be >= 1".to_string(),
            ));
        }
        if !(t.pack_range_grams.min > 0.0 && t.pack_range_grams.min <= t.pack_range_grams.max) {
            return Err(ConfigError::Invalid(format!(
                "thresholds.pack_range_grams is inverted or empty: {}..{}",
                t.pack_range_grams.min, t.pack_range_grams.max
            )));
        }
        if self.models.selector.trim().is_empty() || self.models.estimator.trim().is_empty() {
            return Err(ConfigError::Invalid("model ids must be non-empty".to_string()));
        }
        Ok(())
    }
}

// =============================================================================
// Thresholds
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Minimum token overlap score for a catalog candidate to be trusted.
    pub min_db_token_score: f64,
    /// Selector confidence below this is vetoed unless the baseline is weak too.
    pub min_db_ai_pick_conf: f64,
    /// Baseline confidence below this counts as "low".
    pub low_baseline_confidence: f64,
    /// Max relative difference between requested grams and a pack size.
    pub pack_tolerance: f64,
    /// Gram range treated as a plausible single pack or bag.
    pub pack_range_grams: GramRange,
    /// Candidates shown to the selector.
    pub shortlist_size: usize,
    /// Entries requested from the catalog per search.
    pub max_catalog_results: usize,
    /// Used when the estimator omits its confidence.
    pub default_generative_confidence: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_db_token_score: 0.35,
            min_db_ai_pick_conf: 0.60,
            low_baseline_confidence: 0.65,
            pack_tolerance: 0.20,
            pack_range_grams: GramRange {
                min: 10.0,
                max: 250.0,
            },
            shortlist_size: 6,
            max_catalog_results: 10,
            default_generative_confidence: 0.70,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GramRange {
    pub min: f64,
    pub max: f64,
}

impl GramRange {
    pub fn contains(&self, grams: f64) -> bool {
        grams >= self.min && grams <= self.max
    }
}

// =============================================================================
// Vocabulary
// =============================================================================

/// Word lists consulted by the gates and the query cleaner.
///
/// Entries are matched against normalized text (lower-case, punctuation
/// replaced by spaces), so "low-fat" and "low fat" are the same entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Vocabulary {
    pub brands: Vec<String>,
    /// Multi-word dishes whose words must all appear in the candidate.
    pub phrases: Vec<String>,
    /// Words inside a phrase that are not required ("and", "with").
    pub phrase_connectives: Vec<String>,
    pub variant_words: Vec<String>,
    pub size_words: Vec<String>,
    pub drink_words: Vec<String>,
    /// Single-dose at-home product forms.
    pub at_home_forms: Vec<String>,
    /// Words that mark a description as pack/bag based.
    pub pack_words: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self {
            brands: strings(&[
                "starbucks",
                "costa",
                "pret",
                "greggs",
                "mcdonalds",
                "burger king",
                "kfc",
                "nandos",
                "subway",
                "tesco",
                "sainsburys",
                "asda",
                "waitrose",
                "marks and spencer",
                "lidl",
                "aldi",
                "coca cola",
                "pepsi",
                "cadbury",
                "walkers",
                "mcvities",
                "heinz",
                "kelloggs",
            ]),
            phrases: strings(&[
                "sausage roll",
                "chicken tikka masala",
                "fish and chips",
                "spaghetti bolognese",
                "cottage pie",
                "shepherds pie",
                "chilli con carne",
                "full english",
                "jacket potato",
                "pain au chocolat",
            ]),
            phrase_connectives: strings(&["and", "with", "of", "the", "au", "con", "a"]),
            variant_words: strings(&[
                "diet",
                "zero",
                "light",
                "lite",
                "low fat",
                "reduced fat",
                "fat free",
                "sugar free",
                "no added sugar",
                "baked",
                "skinny",
            ]),
            size_words: strings(&[
                "small", "medium", "large", "regular", "tall", "grande", "venti", "big", "mini",
                "extra large",
            ]),
            drink_words: strings(&[
                "latte",
                "cappuccino",
                "flat white",
                "americano",
                "mocha",
                "macchiato",
                "espresso",
                "coffee",
                "tea",
                "hot chocolate",
                "chai",
                "frappuccino",
            ]),
            at_home_forms: strings(&[
                "capsule", "capsules", "pod", "pods", "instant", "sachet", "sachets", "k cup",
            ]),
            pack_words: strings(&["pack", "packet", "bag", "bar", "tub", "pot"]),
        }
    }
}

// =============================================================================
// Models & cache
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Picks among catalog candidates.
    pub selector: String,
    /// Produces the generative baseline.
    pub estimator: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            selector: "openai/gpt-4o-mini".to_string(),
            estimator: "openai/gpt-4o-mini".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Prefix that separates results produced by different resolution strategies.
    pub namespace: String,
    pub ttl_secs: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: "hybrid_v1".to_string(),
            ttl_secs: 7 * 24 * 60 * 60,
        }
    }
}
