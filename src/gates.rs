//! Veto rules applied to the selected catalog candidate.
//!
//! Every gate is evaluated and recorded so the trace shows the full picture.
//! Any veto rejects the candidate; the first veto in gate order is the
//! reported reason. Gates are pure functions of their inputs.

use serde::Serialize;
use tracing::debug;

use crate::config::{ResolverConfig, Thresholds, Vocabulary};
use crate::extract::FoodQuery;
use crate::scale::{pack_factor, ScalePolicy};
use crate::scoring::{contains_phrase, normalize_text, tokens, ScoredCandidate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassKind {
    Primary,
    Cleaned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateKind {
    MinTokenScore,
    Brand,
    Phrase,
    ProductForm,
    Variant,
    ScalingCompat,
    SelectionConfidence,
}

impl GateKind {
    pub const ORDER: [GateKind; 7] = [
        GateKind::MinTokenScore,
        GateKind::Brand,
        GateKind::Phrase,
        GateKind::ProductForm,
        GateKind::Variant,
        GateKind::ScalingCompat,
        GateKind::SelectionConfidence,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GateKind::MinTokenScore => "min_token_score",
            GateKind::Brand => "brand",
            GateKind::Phrase => "phrase",
            GateKind::ProductForm => "product_form",
            GateKind::Variant => "variant",
            GateKind::ScalingCompat => "scaling_compat",
            GateKind::SelectionConfidence => "selection_confidence",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GateOutcome {
    Pass,
    Skipped,
    Veto { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateCheck {
    pub gate: GateKind,
    #[serde(flatten)]
    pub outcome: GateOutcome,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct GateReport {
    pub checks: Vec<GateCheck>,
}

impl GateReport {
    pub fn accepted(&self) -> bool {
        self.first_veto().is_none()
    }

    pub fn first_veto(&self) -> Option<&GateCheck> {
        self.checks
            .iter()
            .find(|c| matches!(c.outcome, GateOutcome::Veto { .. }))
    }

    /// "gate: reason" of the first veto.
    pub fn veto_reason(&self) -> Option<String> {
        self.first_veto().map(|check| match &check.outcome {
            GateOutcome::Veto { reason } => format!("{}: {reason}", check.gate.as_str()),
            _ => check.gate.as_str().to_string(),
        })
    }
}

/// Everything the gates need besides the candidate.
#[derive(Debug, Clone, Copy)]
pub struct GateContext<'a> {
    /// The user's original query and its explicit quantities.
    pub query: &'a FoodQuery,
    pub pass: PassKind,
    pub selection_confidence: f64,
    pub baseline_confidence: f64,
}

/// Brands from the allow-list mentioned in `text`, in allow-list order.
pub fn detect_brands(text: &str, vocab: &Vocabulary) -> Vec<String> {
    vocab
        .brands
        .iter()
        .filter(|brand| contains_phrase(text, brand))
        .map(|brand| normalize_text(brand))
        .collect()
}

fn mentions_any(text: &str, words: &[String]) -> Option<String> {
    words
        .iter()
        .find(|w| contains_phrase(text, w))
        .map(|w| normalize_text(w))
}

pub fn evaluate_gates(
    ctx: &GateContext<'_>,
    scored: &ScoredCandidate,
    config: &ResolverConfig,
) -> GateReport {
    let candidate_text = scored.candidate.combined_text();
    let query_text = ctx.query.text.as_str();
    let vocab = &config.vocabulary;
    let thresholds = &config.thresholds;

    let checks: Vec<GateCheck> = GateKind::ORDER
        .iter()
        .map(|&gate| {
            let outcome = match gate {
                GateKind::MinTokenScore => min_token_score(scored.token_score, thresholds),
                GateKind::Brand => match ctx.pass {
                    PassKind::Primary => brand_gate(query_text, &candidate_text, vocab),
                    PassKind::Cleaned => GateOutcome::Skipped,
                },
                GateKind::Phrase => phrase_gate(query_text, &candidate_text, vocab),
                GateKind::ProductForm => product_form_gate(query_text, &candidate_text, vocab),
                GateKind::Variant => variant_gate(query_text, &candidate_text, vocab),
                GateKind::ScalingCompat => scaling_compat_gate(ctx.query, scored, config),
                GateKind::SelectionConfidence => selection_confidence_gate(ctx, thresholds),
            };
            GateCheck { gate, outcome }
        })
        .collect();

    let report = GateReport { checks };
    match report.veto_reason() {
        Some(reason) => debug!(candidate = %scored.candidate.id, %reason, "candidate vetoed"),
        None => debug!(candidate = %scored.candidate.id, "candidate passed all gates"),
    }
    report
}

fn min_token_score(score: f64, thresholds: &Thresholds) -> GateOutcome {
    // Inclusive: a score equal to the threshold passes.
    if score >= thresholds.min_db_token_score {
        GateOutcome::Pass
    } else {
        GateOutcome::Veto {
            reason: format!(
                "token score {score:.3} below {}",
                thresholds.min_db_token_score
            ),
        }
    }
}

fn brand_gate(query: &str, candidate: &str, vocab: &Vocabulary) -> GateOutcome {
    let brands = detect_brands(query, vocab);
    if brands.is_empty() || brands.iter().any(|b| contains_phrase(candidate, b)) {
        return GateOutcome::Pass;
    }
    GateOutcome::Veto {
        reason: format!("candidate lacks brand '{}'", brands.join("', '")),
    }
}

fn phrase_gate(query: &str, candidate: &str, vocab: &Vocabulary) -> GateOutcome {
    let candidate_tokens = tokens(candidate);
    for phrase in vocab.phrases.iter().filter(|p| contains_phrase(query, p)) {
        let mut missing: Vec<String> = tokens(phrase)
            .into_iter()
            .filter(|w| !vocab.phrase_connectives.iter().any(|c| c == w))
            .filter(|w| !candidate_tokens.contains(w))
            .collect();
        if !missing.is_empty() {
            missing.sort();
            return GateOutcome::Veto {
                reason: format!(
                    "candidate lacks '{}' from '{}'",
                    missing.join("', '"),
                    normalize_text(phrase)
                ),
            };
        }
    }
    GateOutcome::Pass
}

fn product_form_gate(query: &str, candidate: &str, vocab: &Vocabulary) -> GateOutcome {
    let in_venue = mentions_any(query, &vocab.size_words).is_some()
        && mentions_any(query, &vocab.drink_words).is_some()
        && mentions_any(query, &vocab.at_home_forms).is_none();
    if !in_venue {
        return GateOutcome::Pass;
    }
    match mentions_any(candidate, &vocab.at_home_forms) {
        Some(form) => GateOutcome::Veto {
            reason: format!("in-venue drink matched at-home '{form}' product"),
        },
        None => GateOutcome::Pass,
    }
}

fn variant_gate(query: &str, candidate: &str, vocab: &Vocabulary) -> GateOutcome {
    for word in &vocab.variant_words {
        if !contains_phrase(query, word) && contains_phrase(candidate, word) {
            return GateOutcome::Veto {
                reason: format!("candidate is a '{}' variant", normalize_text(word)),
            };
        }
    }
    GateOutcome::Pass
}

fn scaling_compat_gate(
    query: &FoodQuery,
    scored: &ScoredCandidate,
    config: &ResolverConfig,
) -> GateOutcome {
    let c = &scored.candidate;
    let matching_basis = match (query.explicit_ml, query.explicit_grams) {
        (None, None) => return GateOutcome::Pass,
        (Some(_), _) if c.per_ml.is_some() => true,
        (_, Some(_)) if c.per_grams.is_some() => true,
        _ => false,
    };
    if matching_basis {
        return GateOutcome::Pass;
    }

    if let Some(grams) = query.explicit_grams {
        // Only when the scaler will actually scale by pack size.
        if config.thresholds.pack_range_grams.contains(grams)
            && pack_factor(c, grams, &ScalePolicy::from_config(config)).is_some()
        {
            return GateOutcome::Pass;
        }
    }

    let requested = match (query.explicit_ml, query.explicit_grams) {
        (Some(ml), _) => format!("{ml}ml"),
        (_, Some(g)) => format!("{g}g"),
        _ => String::new(),
    };
    GateOutcome::Veto {
        reason: format!("{requested} requested but candidate has no matching basis"),
    }
}

fn selection_confidence_gate(ctx: &GateContext<'_>, thresholds: &Thresholds) -> GateOutcome {
    if ctx.selection_confidence < thresholds.min_db_ai_pick_conf
        && ctx.baseline_confidence >= thresholds.low_baseline_confidence
    {
        GateOutcome::Veto {
            reason: format!(
                "selection confidence {:.2} below {} while baseline is {:.2}",
                ctx.selection_confidence, thresholds.min_db_ai_pick_conf, ctx.baseline_confidence
            ),
        }
    } else {
        GateOutcome::Pass
    }
}
