//! Quantity and basis extraction from query text and catalog descriptions.
//!
//! All matching is lexical. A quantity only counts when its unit token
//! directly follows the number ("400g", "400 g"), so "Room 400" yields
//! nothing. Nothing here returns an error: no match is `None`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::candidate::Nutrition;

/// Millilitres per US fluid ounce.
pub const ML_PER_US_FL_OZ: f64 = 29.5735;

const NUM: &str = r"(\d+(?:\.\d+)?)";

static GRAMS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\b{NUM}\s?(?:grams?|g)\b")).expect("Invalid grams regex")
});

static VOLUME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b{NUM}\s?(ml|millilit(?:re|er)s?|l|lit(?:re|er)s?)\b"
    ))
    .expect("Invalid volume regex")
});

static PER_GRAMS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\bper\s+{NUM}\s?(?:grams?|g)\b")).expect("Invalid per-grams regex")
});

static PER_VOLUME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\bper\s+{NUM}\s?(ml|l|fl\.?\s?oz)\b"))
        .expect("Invalid per-volume regex")
});

static NUTRITION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)^\s*per\s+(.+?)\s+-\s+calories:\s*{NUM}\s*kcal\s*\|\s*fat:\s*{NUM}\s*g\s*\|\s*carbs:\s*{NUM}\s*g\s*\|\s*protein:\s*{NUM}\s*g\s*$"
    ))
    .expect("Invalid nutrition regex")
});

static PACK_IN_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\(\s*{NUM}\s?(?:grams?|g)\s*\)")).expect("Invalid pack regex")
});

// =============================================================================
// Query
// =============================================================================

/// A food query with its explicit quantity, if the text states one.
///
/// `None` means "no explicit quantity", never zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodQuery {
    pub text: String,
    pub explicit_grams: Option<f64>,
    pub explicit_ml: Option<f64>,
}

impl FoodQuery {
    pub fn parse(text: &str) -> Self {
        Self {
            text: text.trim().to_string(),
            explicit_grams: extract_grams(text),
            explicit_ml: extract_ml(text),
        }
    }

    pub fn has_explicit_quantity(&self) -> bool {
        self.explicit_grams.is_some() || self.explicit_ml.is_some()
    }
}

// =============================================================================
// Extraction
// =============================================================================

/// Accept only finite, strictly positive quantities.
fn positive(value: f64) -> Option<f64> {
    (value.is_finite() && value > 0.0).then_some(value)
}

fn capture_number(caps: &regex::Captures<'_>, idx: usize) -> Option<f64> {
    caps.get(idx)?.as_str().parse::<f64>().ok()
}

fn volume_to_ml(value: f64, unit: &str) -> f64 {
    let unit = unit.to_lowercase();
    if unit == "ml" || unit.starts_with("milli") {
        value
    } else if unit.starts_with("fl") {
        value * ML_PER_US_FL_OZ
    } else {
        value * 1000.0
    }
}

/// Explicit gram quantity in free text ("400g chicken" → 400).
pub fn extract_grams(text: &str) -> Option<f64> {
    let caps = GRAMS.captures(text)?;
    positive(capture_number(&caps, 1)?)
}

/// Explicit volume in free text, in millilitres ("1.5l" → 1500).
pub fn extract_ml(text: &str) -> Option<f64> {
    let caps = VOLUME.captures(text)?;
    let value = capture_number(&caps, 1)?;
    positive(volume_to_ml(value, caps.get(2)?.as_str()))
}

/// `text` with every explicit gram and volume quantity replaced by a space.
pub fn strip_quantities(text: &str) -> String {
    let without_grams = GRAMS.replace_all(text, " ");
    VOLUME.replace_all(&without_grams, " ").into_owned()
}

/// Gram basis of a catalog description ("Per 100g - ..." → 100).
pub fn extract_per_grams(description: &str) -> Option<f64> {
    let caps = PER_GRAMS.captures(description)?;
    positive(capture_number(&caps, 1)?)
}

/// Volume basis of a catalog description in millilitres; US fl oz are converted.
pub fn extract_per_ml(description: &str) -> Option<f64> {
    let caps = PER_VOLUME.captures(description)?;
    let value = capture_number(&caps, 1)?;
    positive(volume_to_ml(value, caps.get(2)?.as_str()))
}

/// Nutrition values of a catalog description.
///
/// The description must follow the catalog shape exactly:
/// `Per <N><unit> - Calories: <N>kcal | Fat: <N>g | Carbs: <N>g | Protein: <N>g`.
/// Anything else is unparseable.
pub fn parse_nutrition(description: &str) -> Option<Nutrition> {
    let caps = NUTRITION.captures(description)?;
    let nutrition = Nutrition {
        calories: capture_number(&caps, 2)?,
        fat: capture_number(&caps, 3)?,
        carbs: capture_number(&caps, 4)?,
        protein: capture_number(&caps, 5)?,
    };
    nutrition.is_finite().then_some(nutrition)
}

/// The "<N><unit>" part of a well-formed description ("Per 1 bag - ..." → "1 bag").
pub fn serving_basis(description: &str) -> Option<&str> {
    NUTRITION
        .captures(description)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}

/// Pack size stated in a product name ("Crisps (45g)" → 45).
pub fn extract_pack_grams(name: &str) -> Option<f64> {
    let caps = PACK_IN_NAME.captures(name)?;
    positive(capture_number(&caps, 1)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grams_require_adjacent_unit() {
        assert_eq!(extract_grams("400g chicken breast"), Some(400.0));
        assert_eq!(extract_grams("chicken 250 grams"), Some(250.0));
        assert_eq!(extract_grams("1 gram of salt"), Some(1.0));
        assert_eq!(extract_grams("2.5g butter"), Some(2.5));
        assert_eq!(extract_grams("Room 400 chicken"), None);
        assert_eq!(extract_grams("2 grapes"), None);
        assert_eq!(extract_grams("2 digestive biscuits"), None);
        assert_eq!(extract_grams("1kg potatoes"), None);
    }

    #[test]
    fn zero_quantity_is_absent() {
        assert_eq!(extract_grams("0g sugar"), None);
        assert_eq!(extract_ml("0ml milk"), None);
    }

    #[test]
    fn volume_converts_litres() {
        assert_eq!(extract_ml("330ml coke"), Some(330.0));
        assert_eq!(extract_ml("1.5l water"), Some(1500.0));
        assert_eq!(extract_ml("2 litres of orange juice"), Some(2000.0));
        assert_eq!(extract_ml("medium latte"), None);
        assert_eq!(extract_ml("large glass"), None);
    }

    #[test]
    fn description_basis() {
        let d = "Per 100g - Calories: 165kcal | Fat: 3.60g | Carbs: 0.00g | Protein: 31.02g";
        assert_eq!(extract_per_grams(d), Some(100.0));
        assert_eq!(extract_per_ml(d), None);

        let d = "Per 330ml - Calories: 139kcal | Fat: 0g | Carbs: 35g | Protein: 0g";
        assert_eq!(extract_per_ml(d), Some(330.0));
        assert_eq!(extract_per_grams(d), None);

        let d = "Per 8 fl oz - Calories: 100kcal | Fat: 0g | Carbs: 26g | Protein: 0g";
        let ml = extract_per_ml(d).unwrap();
        assert!((ml - 236.588).abs() < 1e-9);

        let d = "Per 1 serving - Calories: 250kcal | Fat: 10g | Carbs: 30g | Protein: 8g";
        assert_eq!(extract_per_grams(d), None);
        assert_eq!(extract_per_ml(d), None);
        assert_eq!(serving_basis(d), Some("1 serving"));
    }

    #[test]
    fn nutrition_parses_catalog_shape() {
        let d = "Per 100g - Calories: 165kcal | Fat: 3.6g | Carbs: 0g | Protein: 31g";
        let n = parse_nutrition(d).unwrap();
        assert_eq!(n.calories, 165.0);
        assert_eq!(n.fat, 3.6);
        assert_eq!(n.carbs, 0.0);
        assert_eq!(n.protein, 31.0);
    }

    #[test]
    fn nutrition_rejects_deviations() {
        assert!(parse_nutrition("Calories: 165kcal | Fat: 3.6g | Carbs: 0g | Protein: 31g").is_none());
        assert!(parse_nutrition("Per 100g - Calories: n/a | Fat: 3.6g | Carbs: 0g | Protein: 31g").is_none());
        assert!(parse_nutrition("Per 100g - Calories: 165kcal | Fat: 3.6g").is_none());
        assert!(parse_nutrition("").is_none());
    }

    #[test]
    fn pack_size_from_name() {
        assert_eq!(extract_pack_grams("Ready Salted Crisps (45g)"), Some(45.0));
        assert_eq!(extract_pack_grams("Ready Salted Crisps ( 32.5 g )"), Some(32.5));
        assert_eq!(extract_pack_grams("Ready Salted Crisps"), None);
    }

    #[test]
    fn query_parse_keeps_text_and_quantities() {
        let q = FoodQuery::parse("  400g chicken breast ");
        assert_eq!(q.text, "400g chicken breast");
        assert_eq!(q.explicit_grams, Some(400.0));
        assert_eq!(q.explicit_ml, None);
        assert!(q.has_explicit_quantity());

        let q = FoodQuery::parse("medium latte");
        assert!(!q.has_explicit_quantity());
    }
}
