//! Generative nutrition estimate, used as baseline and fallback.
//!
//! With an explicit gram quantity the model is asked for values per 100 g and
//! the scaling happens here. Otherwise the model returns totals for a typical
//! serving (or the stated volume) and no scaling is applied.

use serde::Serialize;
use tracing::debug;

use crate::candidate::Nutrition;
use crate::extract::FoodQuery;
use crate::gateway::{Attribution, ChatGateway, ChatRequest, ProviderError};
use crate::llm_json::{number_field, parse_object};
use crate::prompts::estimator_prompt;
use crate::scale::ResolutionMode;

pub const ESTIMATE_MAX_OUTPUT_TOKENS: u32 = 256;

/// Nothing has more than this per 100 g (pure fat is ~900).
const MAX_KCAL_PER_100G: f64 = 950.0;
const MAX_GRAMS_PER_100G: f64 = 100.0;

#[derive(Debug, thiserror::Error)]
pub enum EstimateError {
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("malformed estimate: {0}")]
    Malformed(String),
}

impl EstimateError {
    pub fn code(&self) -> &'static str {
        match self {
            EstimateError::Provider(err) => err.code(),
            EstimateError::Malformed(_) => "malformed_estimate",
        }
    }

    pub fn provider_request_id(&self) -> Option<&str> {
        match self {
            EstimateError::Provider(err) => err.request_id(),
            EstimateError::Malformed(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Estimate {
    pub name: String,
    pub mode: ResolutionMode,
    /// Final totals, rounded.
    pub nutrition: Nutrition,
    pub grams: Option<f64>,
    pub ml: Option<f64>,
    pub confidence: f64,
    /// `grams / 100` in weight mode, otherwise 1.
    pub factor: f64,
}

impl Estimate {
    /// Zero-valued, zero-confidence last resort.
    pub fn stub(query: &FoodQuery) -> Self {
        let mode = match (query.explicit_grams, query.explicit_ml) {
            (Some(_), _) => ResolutionMode::Weight,
            (None, Some(_)) => ResolutionMode::Volume,
            (None, None) => ResolutionMode::Serving,
        };
        Self {
            name: query.text.clone(),
            mode,
            nutrition: Nutrition::default(),
            grams: query.explicit_grams,
            ml: query.explicit_ml,
            confidence: 0.0,
            factor: 1.0,
        }
    }
}

/// Ask the estimation service for a baseline.
pub async fn estimate(
    gateway: &dyn ChatGateway,
    model: &str,
    query: &FoodQuery,
    default_confidence: f64,
    attribution: Attribution,
) -> Result<Estimate, EstimateError> {
    let prompt = estimator_prompt(&query.text, query.explicit_grams, query.explicit_ml);
    let request = ChatRequest::json(
        model,
        prompt.to_messages(),
        ESTIMATE_MAX_OUTPUT_TOKENS,
        attribution,
    );
    let response = gateway.chat(request).await?;
    let estimate = parse_estimate(&response.content, query, default_confidence)?;
    debug!(
        template = %prompt.template_slug,
        mode = estimate.mode.as_str(),
        confidence = estimate.confidence,
        "generative estimate"
    );
    Ok(estimate)
}

/// Validate a raw estimator response and turn it into final totals.
pub fn parse_estimate(
    raw: &str,
    query: &FoodQuery,
    default_confidence: f64,
) -> Result<Estimate, EstimateError> {
    let map = parse_object(raw).map_err(EstimateError::Malformed)?;

    let field = |key: &str| -> Result<f64, EstimateError> {
        let value = number_field(&map, key)
            .ok_or_else(|| EstimateError::Malformed(format!("missing or non-numeric '{key}'")))?;
        if value < 0.0 {
            return Err(EstimateError::Malformed(format!("negative '{key}': {value}")));
        }
        Ok(value)
    };
    let base = Nutrition {
        calories: field("calories")?,
        protein: field("protein")?,
        carbs: field("carbs")?,
        fat: field("fat")?,
    };

    let confidence = number_field(&map, "confidence")
        .unwrap_or(default_confidence)
        .clamp(0.0, 1.0);
    let name = map
        .get("name")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(query.text.as_str())
        .to_string();
    let positive = |key: &str| number_field(&map, key).filter(|v| *v > 0.0);

    if let Some(grams) = query.explicit_grams {
        if base.calories > MAX_KCAL_PER_100G
            || [base.protein, base.carbs, base.fat]
                .iter()
                .any(|v| *v > MAX_GRAMS_PER_100G)
        {
            return Err(EstimateError::Malformed(format!(
                "implausible per-100g values: {base:?}"
            )));
        }
        let factor = grams / 100.0;
        return Ok(Estimate {
            name,
            mode: ResolutionMode::Weight,
            nutrition: base.scaled(factor).rounded(),
            grams: Some(grams),
            ml: None,
            confidence,
            factor,
        });
    }

    let (mode, ml) = match query.explicit_ml {
        Some(ml) => (ResolutionMode::Volume, Some(ml)),
        None => (ResolutionMode::Serving, positive("ml")),
    };
    Ok(Estimate {
        name,
        mode,
        nutrition: base.rounded(),
        grams: positive("grams"),
        ml,
        confidence,
        factor: 1.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weight_mode_scales_per_100g() {
        let q = FoodQuery::parse("400g chicken breast");
        let e = parse_estimate(
            r#"{"name": "Chicken breast", "calories": 165, "protein": 31, "carbs": 0, "fat": 3.6, "confidence": 0.8}"#,
            &q,
            0.7,
        )
        .unwrap();
        assert_eq!(e.mode, ResolutionMode::Weight);
        assert_eq!(e.factor, 4.0);
        assert_eq!(e.nutrition.calories, 660.0);
        assert_eq!(e.nutrition.fat, 14.4);
        assert_eq!(e.grams, Some(400.0));
        assert_eq!(e.confidence, 0.8);
    }

    #[test]
    fn serving_mode_returns_totals() {
        let q = FoodQuery::parse("medium latte");
        let e = parse_estimate(
            r#"{"name": "Latte", "calories": 190.4, "protein": 12.04, "carbs": 18, "fat": 7, "ml": 350}"#,
            &q,
            0.7,
        )
        .unwrap();
        assert_eq!(e.mode, ResolutionMode::Serving);
        assert_eq!(e.factor, 1.0);
        assert_eq!(e.nutrition.calories, 190.0);
        assert_eq!(e.nutrition.protein, 12.0);
        assert_eq!(e.ml, Some(350.0));
        assert_eq!(e.confidence, 0.7);
    }

    #[test]
    fn volume_query_keeps_requested_ml() {
        let q = FoodQuery::parse("330ml coke");
        let e = parse_estimate(
            r#"{"calories": 139, "protein": 0, "carbs": 35, "fat": 0, "ml": 500, "confidence": "high"}"#,
            &q,
            0.7,
        )
        .unwrap();
        assert_eq!(e.mode, ResolutionMode::Volume);
        assert_eq!(e.ml, Some(330.0));
        assert_eq!(e.name, "330ml coke");
        assert_eq!(e.confidence, 0.7);
    }

    #[test]
    fn rejects_malformed_output() {
        let q = FoodQuery::parse("mackerel");
        for raw in [
            "not json",
            r#"{"calories": 200, "protein": 20, "carbs": 0}"#,
            r#"{"calories": "200", "protein": 20, "carbs": 0, "fat": 13}"#,
            r#"{"calories": -5, "protein": 20, "carbs": 0, "fat": 13}"#,
            "[]",
        ] {
            assert!(
                matches!(parse_estimate(raw, &q, 0.7), Err(EstimateError::Malformed(_))),
                "{raw}"
            );
        }
    }

    #[test]
    fn rejects_prescaled_per_100g_values() {
        let q = FoodQuery::parse("400g chicken breast");
        let raw = r#"{"calories": 660, "protein": 124, "carbs": 0, "fat": 14.4}"#;
        assert!(parse_estimate(raw, &q, 0.7).is_err());
    }

    #[test]
    fn stub_is_zero_confidence() {
        let s = Estimate::stub(&FoodQuery::parse("330ml coke"));
        assert_eq!(s.confidence, 0.0);
        assert_eq!(s.mode, ResolutionMode::Volume);
        assert_eq!(s.nutrition, Nutrition::default());
    }
}
