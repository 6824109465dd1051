//! Bag-of-words overlap between a query and catalog candidates.

use std::collections::HashSet;

use serde::Serialize;

use crate::candidate::Candidate;

/// Queries shorter than this are scored as if they had this many tokens, so a
/// one-word query can never reach a perfect score.
pub const MIN_QUERY_TOKENS: usize = 4;

/// Lower-case, drop apostrophes, replace other punctuation with spaces and
/// collapse whitespace. "McDonald's Big-Mac" becomes "mcdonalds big mac".
pub fn normalize_text(text: &str) -> String {
    let mapped: String = text
        .chars()
        .filter(|c| !matches!(c, '\'' | '\u{2019}'))
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .to_lowercase();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Distinct tokens of the normalized text.
pub fn tokens(text: &str) -> HashSet<String> {
    normalize_text(text)
        .split(' ')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Whether `phrase` occurs in `text` on word boundaries, after normalizing both.
pub fn contains_phrase(text: &str, phrase: &str) -> bool {
    let phrase = normalize_text(phrase);
    if phrase.is_empty() {
        return false;
    }
    format!(" {} ", normalize_text(text)).contains(&format!(" {phrase} "))
}

/// `|tokens(candidate) ∩ tokens(query)| / max(4, |tokens(query)|)`, in `[0, 1]`.
pub fn token_score(query: &str, candidate: &Candidate) -> f64 {
    let query_tokens = tokens(query);
    if query_tokens.is_empty() {
        return 0.0;
    }
    let candidate_tokens = tokens(&candidate.combined_text());
    let overlap = query_tokens.intersection(&candidate_tokens).count();
    overlap as f64 / query_tokens.len().max(MIN_QUERY_TOKENS) as f64
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub token_score: f64,
}

/// Score every candidate and sort by descending score.
///
/// The sort is stable, so equal scores keep catalog relevance order.
pub fn rank_candidates(query: &str, candidates: Vec<Candidate>) -> Vec<ScoredCandidate> {
    let mut scored: Vec<ScoredCandidate> = candidates
        .into_iter()
        .map(|candidate| ScoredCandidate {
            token_score: token_score(query, &candidate),
            candidate,
        })
        .collect();
    scored.sort_by(|a, b| b.token_score.total_cmp(&a.token_score));
    scored
}
