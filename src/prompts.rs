//! Prompt templates for the candidate selector and the generative estimator.
//!
//! Rendering is provider-agnostic; every interpolated value is XML-escaped.

use crate::extract::serving_basis;
use crate::gateway::Message;
use crate::scoring::ScoredCandidate;

// =============================================================================
// Prompt templates
// =============================================================================

/// Rendered prompt ready for LLM.
#[derive(Debug, Clone)]
pub struct PromptInstance {
    pub template_slug: String,
    pub system: String,
    pub user: String,
}

impl PromptInstance {
    pub fn to_messages(&self) -> Vec<Message> {
        vec![Message::system(&self.system), Message::user(&self.user)]
    }
}

/// Escape XML special characters to prevent prompt injection via tag breaking.
pub fn escape_xml_chars(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// A prompt template with `{name}` placeholders.
#[derive(Debug, Clone, Copy)]
pub struct PromptTemplate {
    pub slug: &'static str,
    pub system: &'static str,
    pub user: &'static str,
}

impl PromptTemplate {
    /// Substitute placeholders. Values are escaped; pass pre-rendered XML
    /// through `raw` instead.
    pub fn render(&self, vars: &[(&str, &str)], raw: &[(&str, &str)]) -> PromptInstance {
        let fill = |text: &str| {
            let mut out = text.to_string();
            for (name, value) in vars {
                out = out.replace(&format!("{{{name}}}"), &escape_xml_chars(value.trim()));
            }
            for (name, value) in raw {
                out = out.replace(&format!("{{{name}}}"), value);
            }
            out.trim().to_string()
        };

        PromptInstance {
            template_slug: self.slug.to_string(),
            system: fill(self.system),
            user: fill(self.user),
        }
    }
}

// =============================================================================
// Standard prompts
// =============================================================================

pub const SELECT_V1: PromptTemplate = PromptTemplate {
    slug: "select_v1",
    system: r#"You match a food log entry to one item from a food database shortlist. Judge by product identity: food type, brand, flavour, preparation and variant (diet, light, low fat). Ignore quantities; they are handled elsewhere.

Output only valid JSON `{"index": <shortlist index>, "confidence": <0..1>}`. If no item is the same food, pick the closest one and give a low confidence.
Example:
{"index": 1, "confidence": 0.82}"#,
    user: r#"<food_query>{query}</food_query>

<shortlist>
{candidates}
</shortlist>

json:"#,
};

pub const ESTIMATE_PER_100G_V1: PromptTemplate = PromptTemplate {
    slug: "estimate_per100g_v1",
    system: r#"You are a nutrition database. Estimate the nutrition of the described food PER 100 GRAMS. Never scale to the amount eaten; the caller does that.

Output only valid JSON `{"name": string, "calories": kcal per 100 g, "protein": g per 100 g, "carbs": g per 100 g, "fat": g per 100 g, "confidence": 0..1}`.
Example:
{"name": "Chicken breast, grilled", "calories": 165, "protein": 31, "carbs": 0, "fat": 3.6, "confidence": 0.8}"#,
    user: r#"<food_query>{query}</food_query>

Return nutrition per 100 g.
json:"#,
};

pub const ESTIMATE_SERVING_V1: PromptTemplate = PromptTemplate {
    slug: "estimate_serving_v1",
    system: r#"You are a nutrition database. Estimate the TOTAL nutrition of the described portion. If no amount is given, assume one typical single serving as sold or served in the UK.

Output only valid JSON `{"name": string, "calories": kcal, "protein": g, "carbs": g, "fat": g, "grams": serving weight or null, "ml": serving volume or null, "confidence": 0..1}`.
Example:
{"name": "Latte, medium, semi-skimmed", "calories": 190, "protein": 12, "carbs": 18, "fat": 7, "grams": null, "ml": 350, "confidence": 0.7}"#,
    user: r#"<food_query>{query}</food_query>
{portion}
json:"#,
};

pub const PROMPTS: &[PromptTemplate] = &[SELECT_V1, ESTIMATE_PER_100G_V1, ESTIMATE_SERVING_V1];

pub fn prompt_by_slug(slug: &str) -> Option<PromptTemplate> {
    PROMPTS.iter().find(|t| t.slug == slug).copied()
}

// =============================================================================
// Rendering
// =============================================================================

/// Selector prompt. Candidates are shown by name, brand and serving basis only;
/// nutrition numbers are never included.
pub fn selector_prompt(query: &str, shortlist: &[ScoredCandidate]) -> PromptInstance {
    let candidates = shortlist
        .iter()
        .enumerate()
        .map(|(idx, scored)| {
            let c = &scored.candidate;
            let brand = c.brand.as_deref().unwrap_or("");
            let basis = serving_basis(&c.description).unwrap_or("");
            format!(
                "<candidate index=\"{idx}\"><name>{}</name><brand>{}</brand><basis>{}</basis></candidate>",
                escape_xml_chars(&c.name),
                escape_xml_chars(brand),
                escape_xml_chars(basis),
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    SELECT_V1.render(&[("query", query)], &[("candidates", &candidates)])
}

/// Estimator prompt. An explicit gram quantity selects the per-100 g template.
pub fn estimator_prompt(query: &str, grams: Option<f64>, ml: Option<f64>) -> PromptInstance {
    if grams.is_some() {
        return ESTIMATE_PER_100G_V1.render(&[("query", query)], &[]);
    }
    let portion = match ml {
        Some(ml) => format!("<portion_ml>{ml}</portion_ml>\nEstimate totals for exactly this volume."),
        None => String::new(),
    };
    ESTIMATE_SERVING_V1.render(&[("query", query)], &[("portion", &portion)])
}

// =============================================================================
// TESTS
// =============================================================================
