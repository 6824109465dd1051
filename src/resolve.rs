//! Resolution orchestrator.
//!
//! `CACHE_CHECK → BASELINE_ESTIMATE → PRIMARY_ATTEMPT → [CLEANED_RETRY] →
//! (ACCEPTED | FALLBACK) → DONE`. Every collaborator failure degrades to the
//! next state; the worst outcome is a zero-confidence stub, never an error.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::{ResultCache, ResultCacheKey};
use crate::candidate::build_candidates;
use crate::catalog::CatalogSearch;
use crate::clean::retry_query;
use crate::config::ResolverConfig;
use crate::estimate::{estimate, Estimate};
use crate::extract::FoodQuery;
use crate::gateway::{Attribution, ChatGateway};
use crate::gates::{detect_brands, evaluate_gates, GateContext, PassKind};
use crate::scale::{scale_with, ResolutionMode, ScaleBasis, ScalePolicy, Scaled};
use crate::scoring::{normalize_text, rank_candidates, ScoredCandidate};
use crate::select::select_candidate;
use crate::trace::{
    now_epoch_ms, BaselineTrace, CacheStatus, CacheTrace, Outcome, PassTrace, ResolutionTrace,
    TraceSink, TRACE_TOP_CANDIDATES,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultSource {
    Catalog,
    Generative,
}

impl ResultSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultSource::Catalog => "catalog",
            ResultSource::Generative => "generative",
        }
    }
}

/// The single externally visible artifact of a resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub source: ResultSource,
    pub mode: ResolutionMode,
    pub name: String,
    pub grams: Option<f64>,
    pub ml: Option<f64>,
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    /// In `[0, 1]`.
    pub confidence: f64,
    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub trace: Option<ResolutionTrace>,
}

impl ResolutionResult {
    fn from_estimate(estimate: &Estimate) -> Self {
        Self {
            source: ResultSource::Generative,
            mode: estimate.mode,
            name: estimate.name.clone(),
            grams: estimate.grams,
            ml: estimate.ml,
            calories: estimate.nutrition.calories,
            protein: estimate.nutrition.protein,
            carbs: estimate.nutrition.carbs,
            fat: estimate.nutrition.fat,
            confidence: estimate.confidence.clamp(0.0, 1.0),
            trace: None,
        }
    }

    fn from_catalog(
        scored: &ScoredCandidate,
        selection_confidence: f64,
        scaled: &Scaled,
        query: &FoodQuery,
    ) -> Self {
        let c = &scored.candidate;
        let (grams, ml) = match scaled.basis {
            ScaleBasis::PerMl => (None, query.explicit_ml),
            ScaleBasis::PerGrams | ScaleBasis::PackGrams => (query.explicit_grams, None),
            ScaleBasis::Serving => (c.per_grams, c.per_ml),
        };
        Self {
            source: ResultSource::Catalog,
            mode: scaled.mode,
            name: c.display_name(),
            grams,
            ml,
            calories: scaled.nutrition.calories,
            protein: scaled.nutrition.protein,
            carbs: scaled.nutrition.carbs,
            fat: scaled.nutrition.fat,
            confidence: selection_confidence.max(scored.token_score).clamp(0.0, 1.0),
            trace: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveOptions {
    /// Bypass the cache and attach the decision trace to the result.
    pub debug: bool,
}

enum PassOutcome {
    Accepted {
        chosen: ScoredCandidate,
        selection_confidence: f64,
    },
    Rejected,
    CatalogFailed,
}

pub struct Resolver {
    catalog: Arc<dyn CatalogSearch>,
    gateway: Arc<dyn ChatGateway>,
    cache: Option<Arc<dyn ResultCache>>,
    trace_sink: Option<Arc<dyn TraceSink>>,
    config: ResolverConfig,
    scale_policy: ScalePolicy,
}

impl Resolver {
    pub fn new(
        catalog: Arc<dyn CatalogSearch>,
        gateway: Arc<dyn ChatGateway>,
        config: ResolverConfig,
    ) -> Self {
        let scale_policy = ScalePolicy::from_config(&config);
        Self {
            catalog,
            gateway,
            cache: None,
            trace_sink: None,
            config,
            scale_policy,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_trace_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.trace_sink = Some(sink);
        self
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve free text into a nutrition record. Never fails.
    pub async fn resolve(&self, text: &str, options: ResolveOptions) -> ResolutionResult {
        let request_id = Uuid::new_v4();
        let query = FoodQuery::parse(text);
        let key = ResultCacheKey::new(&self.config.cache.namespace, &query.text);

        let mut trace = ResolutionTrace {
            request_id,
            timestamp_ms: now_epoch_ms(),
            query: query.text.clone(),
            normalized_query: normalize_text(&query.text),
            explicit_grams: query.explicit_grams,
            explicit_ml: query.explicit_ml,
            cache: CacheTrace {
                key_hash: key.key_hash.clone(),
                status: CacheStatus::Disabled,
                error: None,
            },
            baseline: None,
            passes: Vec::new(),
            scaling: None,
            outcome: Outcome::Stub,
        };

        // CACHE_CHECK
        if options.debug {
            trace.cache.status = CacheStatus::Bypassed;
        } else if let Some(cache) = &self.cache {
            match cache.get(&key).await {
                Ok(Some(hit)) => {
                    trace.cache.status = CacheStatus::Hit;
                    trace.outcome = Outcome::CacheHit;
                    info!(%request_id, query = %query.text, "cache hit");
                    self.emit(trace);
                    return hit;
                }
                Ok(None) => trace.cache.status = CacheStatus::Miss,
                Err(err) => {
                    warn!(%request_id, error = %err, "cache read failed");
                    trace.cache.status = CacheStatus::Error;
                    trace.cache.error = Some(err.to_string());
                }
            }
        }

        // BASELINE_ESTIMATE
        let attribution = Attribution::new("resolver::baseline").with_request(request_id);
        let (baseline, baseline_failed) = match estimate(
            self.gateway.as_ref(),
            &self.config.models.estimator,
            &query,
            self.config.thresholds.default_generative_confidence,
            attribution,
        )
        .await
        {
            Ok(estimate) => {
                trace.baseline = Some(BaselineTrace {
                    mode: Some(estimate.mode),
                    confidence: estimate.confidence,
                    calories: Some(estimate.nutrition.calories),
                    error: None,
                    provider_request_id: None,
                });
                (estimate, false)
            }
            Err(err) => {
                let provider_request_id = err.provider_request_id().map(str::to_string);
                warn!(
                    %request_id,
                    error = %err,
                    code = err.code(),
                    provider_request_id = provider_request_id.as_deref().unwrap_or("-"),
                    "baseline estimate failed"
                );
                trace.baseline = Some(BaselineTrace {
                    mode: None,
                    confidence: 0.0,
                    calories: None,
                    error: Some(err.to_string()),
                    provider_request_id,
                });
                (Estimate::stub(&query), true)
            }
        };

        // PRIMARY_ATTEMPT, then at most one CLEANED_RETRY
        let mut outcome = self
            .run_pass(
                request_id,
                &query,
                &query.text,
                PassKind::Primary,
                baseline.confidence,
                &mut trace,
            )
            .await;
        if matches!(outcome, PassOutcome::Rejected) {
            let brands = detect_brands(&query.text, &self.config.vocabulary);
            if let Some(cleaned) = retry_query(&query.text, &brands, &self.config.vocabulary) {
                debug!(%request_id, cleaned = %cleaned, "retrying with cleaned query");
                outcome = self
                    .run_pass(
                        request_id,
                        &query,
                        &cleaned,
                        PassKind::Cleaned,
                        baseline.confidence,
                        &mut trace,
                    )
                    .await;
            }
        }

        let mut result = match outcome {
            PassOutcome::Accepted {
                chosen,
                selection_confidence,
            } => {
                let scaled = scale_with(
                    &chosen.candidate,
                    query.explicit_grams,
                    query.explicit_ml,
                    &self.scale_policy,
                );
                trace.scaling = Some(scaled);
                trace.outcome = Outcome::Catalog;
                ResolutionResult::from_catalog(&chosen, selection_confidence, &scaled, &query)
            }
            PassOutcome::Rejected | PassOutcome::CatalogFailed => {
                trace.outcome = if baseline_failed {
                    Outcome::Stub
                } else {
                    Outcome::Generative
                };
                ResolutionResult::from_estimate(&baseline)
            }
        };

        info!(
            %request_id,
            query = %query.text,
            source = result.source.as_str(),
            mode = result.mode.as_str(),
            calories = result.calories,
            confidence = result.confidence,
            "resolved"
        );

        // DONE
        let is_stub = trace.outcome == Outcome::Stub;
        if !options.debug && !is_stub {
            if let Some(cache) = &self.cache {
                if let Err(err) = cache.set(&key, &result, self.config.cache.ttl()).await {
                    warn!(%request_id, error = %err, "cache write failed");
                }
            }
        }

        if options.debug {
            result.trace = Some(trace.clone());
        }
        self.emit(trace);
        result
    }

    async fn run_pass(
        &self,
        request_id: Uuid,
        query: &FoodQuery,
        search_text: &str,
        kind: PassKind,
        baseline_confidence: f64,
        trace: &mut ResolutionTrace,
    ) -> PassOutcome {
        let mut pass = PassTrace::new(kind, search_text);

        let response = match self
            .catalog
            .search(search_text, self.config.thresholds.max_catalog_results)
            .await
        {
            Ok(response) => response,
            Err(err) => {
                warn!(%request_id, error = %err, code = err.code(), "catalog search failed");
                pass.catalog_error = Some(err.to_string());
                trace.passes.push(pass);
                return PassOutcome::CatalogFailed;
            }
        };

        let candidates = build_candidates(&response);
        pass.candidate_count = candidates.len();
        let ranked = rank_candidates(search_text, candidates);
        pass.top_candidates = ranked
            .iter()
            .take(TRACE_TOP_CANDIDATES)
            .map(Into::into)
            .collect();

        let selection = select_candidate(
            self.gateway.as_ref(),
            &self.config.models.selector,
            search_text,
            &ranked,
            &self.config.thresholds,
            Attribution::new("resolver::select").with_request(request_id),
        )
        .await;
        pass.selection = Some((&selection).into());

        let Some(chosen) = selection.chosen else {
            trace.passes.push(pass);
            return PassOutcome::Rejected;
        };

        let ctx = GateContext {
            query,
            pass: kind,
            selection_confidence: selection.selection_confidence,
            baseline_confidence,
        };
        let report = evaluate_gates(&ctx, &chosen, &self.config);
        pass.accepted = report.accepted();
        pass.veto_reason = report.veto_reason();
        pass.gates = Some(report);
        let accepted = pass.accepted;
        trace.passes.push(pass);

        if accepted {
            PassOutcome::Accepted {
                chosen,
                selection_confidence: selection.selection_confidence,
            }
        } else {
            PassOutcome::Rejected
        }
    }

    fn emit(&self, trace: ResolutionTrace) {
        if let Some(sink) = &self.trace_sink {
            if let Err(err) = sink.record(trace) {
                warn!(error = %err, "failed to record resolution trace");
            }
        }
    }
}
