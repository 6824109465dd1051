//! Query cleaning for the single retry pass.

use crate::config::Vocabulary;
use crate::extract::strip_quantities;
use crate::scoring::normalize_text;

/// Remove detected brands, explicit quantities and size adjectives.
///
/// The result is normalized text. It may be empty, or equal to the
/// normalized query when there was nothing to remove; see [`retry_query`].
pub fn clean_query(query: &str, brand_hints: &[String], vocab: &Vocabulary) -> String {
    let mut needles: Vec<String> = brand_hints
        .iter()
        .chain(vocab.size_words.iter())
        .map(|w| normalize_text(w))
        .filter(|w| !w.is_empty())
        .map(|w| format!(" {w} "))
        .collect();
    // "extra large" before "large"
    needles.sort_by_key(|n| std::cmp::Reverse(n.len()));

    let mut text = format!(" {} ", normalize_text(&strip_quantities(query)));
    for needle in &needles {
        while text.contains(needle.as_str()) {
            text = text.replace(needle.as_str(), " ");
        }
    }
    normalize_text(&text)
}

/// The cleaned query to retry with, or `None` when cleaning changed nothing
/// or removed everything.
pub fn retry_query(query: &str, brand_hints: &[String], vocab: &Vocabulary) -> Option<String> {
    let cleaned = clean_query(query, brand_hints, vocab);
    (!cleaned.is_empty() && cleaned != normalize_text(query)).then_some(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gates::detect_brands;

    fn clean(query: &str) -> String {
        let vocab = Vocabulary::default();
        clean_query(query, &detect_brands(query, &vocab), &vocab)
    }

    #[test]
    fn removes_brand_quantity_and_size() {
        assert_eq!(clean("Large Starbucks Latte"), "latte");
        assert_eq!(clean("400g Tesco chicken breast"), "chicken breast");
        assert_eq!(clean("1.5l coca cola"), "");
        assert_eq!(clean("Greggs sausage roll"), "sausage roll");
        assert_eq!(clean("small small chips"), "chips");
    }

    #[test]
    fn keeps_unrelated_numbers() {
        assert_eq!(clean("2 digestive biscuits"), "2 digestive biscuits");
    }

    #[test]
    fn retry_only_when_changed_and_non_empty() {
        let vocab = Vocabulary::default();
        assert_eq!(retry_query("mackerel", &[], &vocab), None);
        assert_eq!(retry_query("Mackerel!", &[], &vocab), None);
        assert_eq!(retry_query("large", &[], &vocab), None);
        assert_eq!(
            retry_query("medium latte", &[], &vocab),
            Some("latte".to_string())
        );
    }
}
