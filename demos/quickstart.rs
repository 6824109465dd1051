//! Minimal end-to-end example for `nutrition-resolver`.
//!
//! Resolves a few food descriptions and prints where each answer came from.
//!
//! To run:
//! - Set `OPENROUTER_API_KEY`, `FATSECRET_CLIENT_ID` and `FATSECRET_CLIENT_SECRET`
//! - `cargo run --example quickstart`

use std::sync::Arc;

use nutrition_resolver::gateway::NoopUsageSink;
use nutrition_resolver::{
    FatSecretAdapter, ProviderGateway, ResolveOptions, Resolver, ResolverConfig,
    SqliteResultCache,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // -- Infrastructure setup ------------------------------------------------

    // Re-running the example serves repeated queries from this file.
    let cache = SqliteResultCache::new(SqliteResultCache::default_path())?;

    // NoopUsageSink discards cost tracking; use StderrUsageSink to see costs.
    let gateway = ProviderGateway::from_env(Arc::new(NoopUsageSink))?;
    let catalog = FatSecretAdapter::from_env()?;

    let resolver = Resolver::new(
        Arc::new(catalog),
        Arc::new(gateway),
        ResolverConfig::default(),
    )
    .with_cache(Arc::new(cache));

    // -- Resolve -------------------------------------------------------------

    for query in ["400g chicken breast", "330ml coca cola", "medium latte"] {
        let result = resolver.resolve(query, ResolveOptions::default()).await;
        println!(
            "{query:<24} {:>6.0} kcal  P {:>5.1}  C {:>5.1}  F {:>5.1}  [{} / {}, conf {:.2}]",
            result.calories,
            result.protein,
            result.carbs,
            result.fat,
            result.source.as_str(),
            result.mode.as_str(),
            result.confidence,
        );
    }

    Ok(())
}
