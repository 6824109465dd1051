//! Deterministic scaling of catalog nutrition to the requested quantity.
//!
//! Pure arithmetic; nothing here touches the network.

use serde::{Deserialize, Serialize};

use crate::candidate::{Candidate, Nutrition};
use crate::config::ResolverConfig;
use crate::extract::serving_basis;
use crate::scoring::contains_phrase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionMode {
    Weight,
    Volume,
    Serving,
}

impl ResolutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionMode::Weight => "weight",
            ResolutionMode::Volume => "volume",
            ResolutionMode::Serving => "serving",
        }
    }
}

/// Which denominator the factor was computed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleBasis {
    PerMl,
    PerGrams,
    PackGrams,
    Serving,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scaled {
    pub mode: ResolutionMode,
    /// Rounded: calories to integers, macros to one decimal.
    pub nutrition: Nutrition,
    pub factor: f64,
    pub basis: ScaleBasis,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScalePolicy {
    /// Max `|grams - pack| / grams` for pack-size scaling.
    pub pack_tolerance: f64,
    pub pack_words: Vec<String>,
}

impl Default for ScalePolicy {
    fn default() -> Self {
        Self::from_config(&ResolverConfig::default())
    }
}

impl ScalePolicy {
    pub fn from_config(config: &ResolverConfig) -> Self {
        Self {
            pack_tolerance: config.thresholds.pack_tolerance,
            pack_words: config.vocabulary.pack_words.clone(),
        }
    }
}

/// Whether the description's serving basis is a pack, bag or similar
/// ("Per 1 bag - ..."). Plurals count.
pub fn describes_pack(description: &str, pack_words: &[String]) -> bool {
    let Some(basis) = serving_basis(description) else {
        return false;
    };
    pack_words
        .iter()
        .any(|w| contains_phrase(basis, w) || contains_phrase(basis, &format!("{w}s")))
}

/// Scale with the default policy.
pub fn scale(candidate: &Candidate, grams: Option<f64>, ml: Option<f64>) -> Scaled {
    scale_with(candidate, grams, ml, &ScalePolicy::default())
}

/// Volume basis first, then weight, then pack size, then the stated serving.
pub fn scale_with(
    candidate: &Candidate,
    grams: Option<f64>,
    ml: Option<f64>,
    policy: &ScalePolicy,
) -> Scaled {
    let (mode, factor, basis) = match (ml, candidate.per_ml, grams, candidate.per_grams) {
        (Some(ml), Some(per_ml), _, _) => (ResolutionMode::Volume, ml / per_ml, ScaleBasis::PerMl),
        (_, _, Some(g), Some(per_g)) => (ResolutionMode::Weight, g / per_g, ScaleBasis::PerGrams),
        (_, _, Some(g), None) => match pack_factor(candidate, g, policy) {
            Some(factor) => (ResolutionMode::Weight, factor, ScaleBasis::PackGrams),
            None => (ResolutionMode::Serving, 1.0, ScaleBasis::Serving),
        },
        _ => (ResolutionMode::Serving, 1.0, ScaleBasis::Serving),
    };

    Scaled {
        mode,
        nutrition: candidate.nutrition.scaled(factor).rounded(),
        factor,
        basis,
    }
}

/// Factor for scaling by the pack size in the name, when the pack is within
/// tolerance of `grams` and the description is pack-phrased.
pub fn pack_factor(candidate: &Candidate, grams: f64, policy: &ScalePolicy) -> Option<f64> {
    let pack = candidate.pack_grams?;
    let within = (grams - pack).abs() / grams <= policy.pack_tolerance;
    (within && describes_pack(&candidate.description, &policy.pack_words)).then(|| grams / pack)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogEntry;

    fn candidate(name: &str, description: &str) -> Candidate {
        Candidate::from_entry(&CatalogEntry::new("1", name, None, description)).unwrap()
    }

    #[test]
    fn chicken_breast_by_weight() {
        let c = candidate(
            "Chicken Breast",
            "Per 100g - Calories: 165kcal | Fat: 3.6g | Carbs: 0g | Protein: 31g",
        );
        let s = scale(&c, Some(400.0), None);
        assert_eq!(s.mode, ResolutionMode::Weight);
        assert_eq!(s.basis, ScaleBasis::PerGrams);
        assert_eq!(s.factor, 4.0);
        assert_eq!(s.nutrition.calories, 660.0);
        assert_eq!(s.nutrition.protein, 124.0);
        assert_eq!(s.nutrition.fat, 14.4);
        assert_eq!(s.nutrition.carbs, 0.0);
    }

    #[test]
    fn coke_by_volume() {
        let c = candidate(
            "Coca Cola",
            "Per 100ml - Calories: 42kcal | Fat: 0g | Carbs: 10.6g | Protein: 0g",
        );
        let s = scale(&c, None, Some(330.0));
        assert_eq!(s.mode, ResolutionMode::Volume);
        assert_eq!(s.nutrition.calories, 139.0);
        assert_eq!(s.nutrition.carbs, 35.0);
    }

    #[test]
    fn weight_scaling_is_linear() {
        for (basis, kcal) in [(100.0_f64, 165.0_f64), (30.0, 117.0), (250.0, 512.5), (1.0, 9.0)] {
            let c = candidate(
                "Thing",
                &format!("Per {basis}g - Calories: {kcal}kcal | Fat: 1g | Carbs: 1g | Protein: 1g"),
            );
            assert_eq!(scale(&c, Some(basis), None).nutrition.calories, kcal.round());
            assert_eq!(
                scale(&c, Some(2.0 * basis), None).nutrition.calories,
                (2.0 * kcal).round()
            );
        }
    }

    #[test]
    fn no_quantity_is_serving_with_unit_factor() {
        let c = candidate(
            "Chicken Breast",
            "Per 100g - Calories: 165kcal | Fat: 3.6g | Carbs: 0g | Protein: 31g",
        );
        let s = scale(&c, None, None);
        assert_eq!(s.mode, ResolutionMode::Serving);
        assert_eq!(s.factor, 1.0);
        assert_eq!(s.nutrition.calories, 165.0);
    }

    #[test]
    fn volume_request_against_weight_basis_is_serving() {
        let c = candidate(
            "Chicken Breast",
            "Per 100g - Calories: 165kcal | Fat: 3.6g | Carbs: 0g | Protein: 31g",
        );
        let s = scale(&c, None, Some(250.0));
        assert_eq!(s.mode, ResolutionMode::Serving);
        assert_eq!(s.factor, 1.0);
    }

    #[test]
    fn pack_size_used_within_tolerance() {
        let c = candidate(
            "Ready Salted Crisps (45g)",
            "Per 1 bag - Calories: 237kcal | Fat: 14g | Carbs: 24g | Protein: 2.9g",
        );
        let s = scale(&c, Some(45.0), None);
        assert_eq!(s.mode, ResolutionMode::Weight);
        assert_eq!(s.basis, ScaleBasis::PackGrams);
        assert_eq!(s.nutrition.calories, 237.0);

        let s = scale(&c, Some(50.0), None);
        assert_eq!(s.basis, ScaleBasis::PackGrams);
        assert_eq!(s.nutrition.calories, (237.0_f64 * 50.0 / 45.0).round());

        let s = scale(&c, Some(90.0), None);
        assert_eq!(s.mode, ResolutionMode::Serving);
        assert_eq!(s.factor, 1.0);
        assert_eq!(pack_factor(&c, 100.0, &ScalePolicy::default()), None);
    }

    #[test]
    fn pack_size_needs_pack_phrasing() {
        let c = candidate(
            "Protein Shake (45g)",
            "Per 1 serving - Calories: 180kcal | Fat: 3g | Carbs: 8g | Protein: 30g",
        );
        assert_eq!(scale(&c, Some(45.0), None).mode, ResolutionMode::Serving);
        assert!(describes_pack(
            "Per 2 bars - Calories: 180kcal | Fat: 3g | Carbs: 8g | Protein: 30g",
            &ScalePolicy::default().pack_words
        ));
    }
}
