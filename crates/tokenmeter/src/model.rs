//! Value types describing catalog entries: models, tokenizer bindings, pricing.

use serde::{Deserialize, Serialize};

/// Per-1k-token pricing attached to a model. Immutable value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    /// ISO currency code the rates are quoted in.
    pub currency: String,
    /// Price per 1 000 input tokens, if published.
    pub input_per_1k: Option<f64>,
    /// Price per 1 000 output tokens, if published.
    pub output_per_1k: Option<f64>,
}

/// Declarative description of how to build a tokenizer adapter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TokenizerSpec {
    /// Adapter kind: `"regex"`, `"byte"`, `"huggingface"` / `"hf"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Construction options. May carry a `name` display-name override plus
    /// kind-specific parameters.
    #[serde(default)]
    pub options: serde_json::Map<String, serde_json::Value>,
}

impl TokenizerSpec {
    /// Convenience constructor used by tests and ad-hoc embedders.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            options: serde_json::Map::new(),
        }
    }

    /// Set one construction option.
    #[must_use]
    pub fn with_option(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.options.insert(key.to_owned(), value.into());
        self
    }
}

/// Static description of a supported large-language-model.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ModelSpec {
    /// Unique, non-empty catalog key.
    #[serde(rename = "id")]
    pub model_id: String,
    /// Human-readable name shown in listings.
    pub display_name: String,
    /// Model family (e.g. `"gpt"`, `"qwen"`).
    pub family: String,
    /// Vendor or hosting provider.
    pub provider: String,
    /// Declared context window in tokens. `0` means no limit is enforced.
    pub max_context: usize,
    /// How to build the tokenizer bound to this model.
    pub tokenizer: TokenizerSpec,
    /// Optional free-form description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Optional pricing information.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pricing: Option<Pricing>,
}
