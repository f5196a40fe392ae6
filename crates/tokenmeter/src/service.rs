//! Orchestration layer used by every front-end.

use serde::Serialize;

use crate::model::{ModelSpec, Pricing};
use crate::tokenize::{Token, TokenizeError, TokenizerRegistry, tokenizer_for_model};

/// Error type for service operations.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum ServiceError {
    /// Requested model id is not in the catalog.
    #[error("unknown model: {0:?}")]
    #[diagnostic(
        code(tokenmeter::service::model_not_found),
        help("run `tokenmeter models` to list registered model ids")
    )]
    ModelNotFound(String),

    /// Tokenizer construction or resolution failed; propagated unchanged.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Tokenize(#[from] TokenizeError),
}

/// Pricing echo on a calculation, with the derived cost estimate attached
/// when an input rate is known.
#[derive(Clone, Debug, Serialize)]
pub struct PricingSummary {
    /// Currency the rates are quoted in.
    pub currency: String,
    /// Price per 1 000 input tokens.
    pub input_per_1k: Option<f64>,
    /// Price per 1 000 output tokens.
    pub output_per_1k: Option<f64>,
    /// `token_count / 1000 * input_per_1k`, rounded to 6 decimal places.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_input_cost: Option<f64>,
}

/// Result of one `calculate` call. Produced fresh per request.
#[derive(Clone, Debug, Serialize)]
pub struct Calculation {
    /// The resolved model, serialized in catalog form.
    pub model: ModelSpec,
    /// Number of tokens produced.
    pub token_count: usize,
    /// The tokens themselves, in input order.
    pub tokens: Vec<Token>,
    /// The model's declared context window (0 = unbounded).
    pub max_context: usize,
    /// `token_count / max_context`, or `null` when the window is unbounded.
    pub usage_ratio: Option<f64>,
    /// Tokens beyond the context window (0 when unbounded or within limits).
    pub overflow: usize,
    /// Pricing echo, `null` when the model has none.
    pub pricing: Option<PricingSummary>,
}

/// High-level token counting API shared by the CLI and HTTP front-ends.
///
/// Owns the catalog (insertion-ordered, immutable after construction) and a
/// reference to the tokenizer registry.
pub struct TokenService {
    models: Vec<ModelSpec>,
    registry: TokenizerRegistry,
}

impl TokenService {
    /// Create a service over `models`. Ids are expected to be unique; the
    /// catalog loader enforces this.
    #[must_use]
    pub fn new(models: Vec<ModelSpec>, registry: TokenizerRegistry) -> Self {
        Self { models, registry }
    }

    /// Every registered model, in catalog order.
    #[must_use]
    pub fn list_models(&self) -> &[ModelSpec] {
        &self.models
    }

    /// Exact-key model lookup.
    pub fn get_model(&self, model_id: &str) -> Result<&ModelSpec, ServiceError> {
        self.models
            .iter()
            .find(|model| model.model_id == model_id)
            .ok_or_else(|| ServiceError::ModelNotFound(model_id.to_owned()))
    }

    /// Tokenize `text` with the tokenizer bound to `model_id` and derive
    /// usage and cost metrics.
    pub fn calculate(&self, model_id: &str, text: &str) -> Result<Calculation, ServiceError> {
        let model = self.get_model(model_id)?;
        let tokenizer = tokenizer_for_model(model, &self.registry)?;
        let tokens = tokenizer.tokenize(text)?;
        let token_count = tokens.len();
        let max_context = model.max_context;

        // A zero context window means "no limit": the ratio is undefined
        // rather than zero or infinite.
        let usage_ratio = (max_context > 0).then(|| token_count as f64 / max_context as f64);
        let overflow = if max_context > 0 {
            token_count.saturating_sub(max_context)
        } else {
            0
        };

        Ok(Calculation {
            pricing: model.pricing.as_ref().map(|p| summarize(p, token_count)),
            model: model.clone(),
            token_count,
            tokens,
            max_context,
            usage_ratio,
            overflow,
        })
    }

    /// Drop all cached tokenizer instances. Test-isolation and embedding
    /// hook; the next `calculate` re-resolves from specs.
    pub fn reset_tokenizers(&self) {
        self.registry.invalidate(None);
    }
}

fn summarize(pricing: &Pricing, token_count: usize) -> PricingSummary {
    PricingSummary {
        currency: pricing.currency.clone(),
        input_per_1k: pricing.input_per_1k,
        output_per_1k: pricing.output_per_1k,
        estimated_input_cost: pricing
            .input_per_1k
            .map(|rate| round_micro(token_count as f64 / 1000.0 * rate)),
    }
}

/// Round to 6 decimal places.
fn round_micro(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}
