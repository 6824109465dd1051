//! List prices for the models the resolver routes to, in nanodollars
//! (1e-9 USD) per token.

/// `(input, output)` nanodollars per token. Unknown models get a high price
/// so spend is over- rather than under-reported.
fn per_token_nanos(model: &str) -> (i64, i64) {
    match model {
        "openai/gpt-4o-mini" => (150, 600),
        "openai/gpt-4.1-mini" => (400, 1_600),
        "openai/gpt-5-mini" => (250, 2_000),
        "anthropic/claude-3.5-haiku" | "anthropic/claude-3-5-haiku" => (800, 4_000),
        "google/gemini-2.5-flash" => (300, 2_500),
        _ => (3_000, 15_000),
    }
}

pub fn chat_cost(model: &str, input_tokens: u32, output_tokens: u32) -> i64 {
    let (input, output) = per_token_nanos(model);
    i64::from(input_tokens) * input + i64::from(output_tokens) * output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_model_uses_list_price() {
        assert_eq!(chat_cost("openai/gpt-4o-mini", 1_000, 100), 150_000 + 60_000);
    }

    #[test]
    fn unknown_model_is_priced_high() {
        assert_eq!(chat_cost("someone/new-model", 1, 1), 18_000);
    }
}
