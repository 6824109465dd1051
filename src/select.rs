//! Candidate selection: deterministic shortlist, model-assisted pick.
//!
//! Selection is advisory. It names a candidate and a confidence; gating and
//! arithmetic happen elsewhere.

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::Thresholds;
use crate::gateway::{Attribution, ChatGateway, ChatRequest};
use crate::llm_json::{number_field, parse_object};
use crate::prompts::selector_prompt;
use crate::scoring::ScoredCandidate;

/// Hard cap on generation for a selection.
pub const SELECT_MAX_OUTPUT_TOKENS: u32 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMethod {
    /// The model picked a valid shortlist index.
    Model,
    /// The model call failed or was unusable; the top-scored candidate is used.
    TopScoreFallback,
    /// The best token score was under the threshold; the model was not asked.
    BelowThreshold,
    NoCandidates,
}

#[derive(Debug, Clone)]
pub struct Selection {
    pub chosen: Option<ScoredCandidate>,
    pub selection_confidence: f64,
    pub method: SelectionMethod,
    /// Shortlist index of `chosen`.
    pub index: Option<usize>,
    pub shortlist_len: usize,
    pub error: Option<String>,
}

impl Selection {
    fn none(method: SelectionMethod) -> Self {
        Self {
            chosen: None,
            selection_confidence: 0.0,
            method,
            index: None,
            shortlist_len: 0,
            error: None,
        }
    }
}

/// Pick one candidate from `ranked` (sorted by descending token score).
pub async fn select_candidate(
    gateway: &dyn ChatGateway,
    model: &str,
    query: &str,
    ranked: &[ScoredCandidate],
    thresholds: &Thresholds,
    attribution: Attribution,
) -> Selection {
    let Some(best) = ranked.first() else {
        return Selection::none(SelectionMethod::NoCandidates);
    };
    if best.token_score < thresholds.min_db_token_score {
        debug!(
            best_score = best.token_score,
            threshold = thresholds.min_db_token_score,
            "no candidate above token threshold"
        );
        return Selection::none(SelectionMethod::BelowThreshold);
    }

    let shortlist = &ranked[..ranked.len().min(thresholds.shortlist_size)];
    let prompt = selector_prompt(query, shortlist);
    let request = ChatRequest::json(
        model,
        prompt.to_messages(),
        SELECT_MAX_OUTPUT_TOKENS,
        attribution,
    );

    let outcome = match gateway.chat(request).await {
        Ok(resp) => parse_selection(&resp.content, shortlist.len()),
        Err(err) => Err(format!("{}: {err}", err.code())),
    };

    match outcome {
        Ok((index, confidence)) => Selection {
            chosen: Some(shortlist[index].clone()),
            selection_confidence: confidence,
            method: SelectionMethod::Model,
            index: Some(index),
            shortlist_len: shortlist.len(),
            error: None,
        },
        Err(error) => {
            warn!(error = %error, "selector unusable, using top-scored candidate");
            Selection {
                chosen: Some(best.clone()),
                selection_confidence: 0.0,
                method: SelectionMethod::TopScoreFallback,
                index: Some(0),
                shortlist_len: shortlist.len(),
                error: Some(error),
            }
        }
    }
}

/// Parse `{"index", "confidence"}`. The index must address the shortlist; a
/// missing confidence counts as zero.
pub fn parse_selection(raw: &str, shortlist_len: usize) -> Result<(usize, f64), String> {
    let map = parse_object(raw)?;
    let index = number_field(&map, "index").ok_or("missing 'index'")?;
    if index.fract() != 0.0 || index < 0.0 || index >= shortlist_len as f64 {
        return Err(format!(
            "index out of range [0,{shortlist_len}): {index}"
        ));
    }
    let confidence = number_field(&map, "confidence")
        .unwrap_or(0.0)
        .clamp(0.0, 1.0);
    Ok((index as usize, confidence))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_pick() {
        assert_eq!(
            parse_selection(r#"{"index": 2, "confidence": 0.9}"#, 3).unwrap(),
            (2, 0.9)
        );
        assert_eq!(
            parse_selection("```json\n{\"index\": 0.0, \"confidence\": 1.7}\n```", 1).unwrap(),
            (0, 1.0)
        );
        assert_eq!(parse_selection(r#"{"index": 1}"#, 2).unwrap(), (1, 0.0));
    }

    #[test]
    fn rejects_bad_index() {
        assert!(parse_selection(r#"{"index": 3, "confidence": 0.9}"#, 3).is_err());
        assert!(parse_selection(r#"{"index": -1, "confidence": 0.9}"#, 3).is_err());
        assert!(parse_selection(r#"{"index": 0.5, "confidence": 0.9}"#, 3).is_err());
        assert!(parse_selection(r#"{"index": "1"}"#, 3).is_err());
        assert!(parse_selection(r#"{"confidence": 0.9}"#, 3).is_err());
        assert!(parse_selection("no json here", 3).is_err());
    }
}
