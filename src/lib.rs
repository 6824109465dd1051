#![forbid(unsafe_code)]

//! # nutrition-resolver
//!
//! Turns free-text food descriptions ("400g chicken breast", "medium latte")
//! into calories and macros.
//!
//! A structured food catalog is precise but noisy to match against free text;
//! a generative estimate is always available but imprecise. The resolver
//! scores catalog candidates, lets a model pick among the best, runs a set of
//! deterministic veto gates, retries once with a cleaned query, and scales the
//! accepted entry itself. When nothing survives it falls back to a generative
//! estimate that was requested per 100 g whenever a weight was given, so the
//! model never does the arithmetic.

pub mod cache;
pub mod candidate;
pub mod catalog;
pub mod clean;
pub mod config;
pub mod estimate;
pub mod extract;
pub mod gates;
pub mod gateway;
pub mod llm_json;
pub mod prompts;
pub mod resolve;
pub mod scale;
pub mod scoring;
pub mod select;
pub mod trace;

pub use cache::{MemoryResultCache, ResultCache, ResultCacheKey, SqliteResultCache};
pub use candidate::{build_candidates, Candidate, Nutrition};
pub use catalog::{CatalogEntry, CatalogResponse, CatalogSearch, FatSecretAdapter};
pub use config::ResolverConfig;
pub use extract::FoodQuery;
pub use gateway::{Attribution, ChatGateway, ProviderGateway, UsageSink};
pub use resolve::{ResolutionResult, ResolveOptions, Resolver, ResultSource};
pub use scale::{scale, ResolutionMode};
pub use scoring::{token_score, ScoredCandidate};
pub use trace::{JsonlTraceSink, ResolutionTrace, TraceError, TraceSink, TraceWorker};
