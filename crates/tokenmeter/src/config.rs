//! Model catalog loading and validation.
//!
//! The catalog is a JSON array of model entries. A default catalog is
//! embedded at compile time; `--registry` (CLI) or [`load_registry`] with an
//! explicit path selects an alternative file. Malformed entries fail loading
//! immediately — the service never starts with a partially valid catalog.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use crate::model::{ModelSpec, Pricing, TokenizerSpec};

/// Embedded default catalog. Edited in-tree, parsed at startup.
static DEFAULT_REGISTRY: &str = include_str!("model_registry.json");

/// Error raised while loading or validating the model catalog.
///
/// Always fatal at startup; nothing here is retried.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum ConfigError {
    /// The requested catalog file does not exist.
    #[error("model registry file not found: {}", .0.display())]
    #[diagnostic(code(tokenmeter::config::not_found))]
    NotFound(PathBuf),

    /// The catalog file could not be read.
    #[error("failed to read model registry {}: {source}", .path.display())]
    #[diagnostic(code(tokenmeter::config::io))]
    Io {
        /// Path of the catalog file.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The catalog is not a JSON array of model entries.
    #[error("model registry is not valid JSON: {0}")]
    #[diagnostic(code(tokenmeter::config::json))]
    Json(#[from] serde_json::Error),

    /// A single model entry failed validation.
    #[error("invalid model entry at index {index}: {reason}")]
    #[diagnostic(code(tokenmeter::config::entry))]
    Entry {
        /// Zero-based position of the entry in the catalog array.
        index: usize,
        /// What was wrong with it.
        reason: String,
    },

    /// Two entries share the same `id`.
    #[error("duplicate model id: {0:?}")]
    #[diagnostic(code(tokenmeter::config::duplicate_id))]
    DuplicateId(String),
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(default)]
    id: String,
    display_name: Option<String>,
    family: Option<String>,
    provider: Option<String>,
    #[serde(default)]
    max_context: usize,
    tokenizer: Option<Value>,
    description: Option<String>,
    pricing: Option<RawPricing>,
}

#[derive(Debug, Deserialize)]
struct RawPricing {
    currency: Option<String>,
    input_per_1k: Option<f64>,
    output_per_1k: Option<f64>,
}

/// Load model specifications from `path`, or the embedded default catalog
/// when no path is given.
pub fn load_registry(path: Option<&Path>) -> Result<Vec<ModelSpec>, ConfigError> {
    match path {
        None => parse_registry(DEFAULT_REGISTRY),
        Some(path) => {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            parse_registry(&raw)
        }
    }
}

/// Parse and validate a JSON catalog document.
pub fn parse_registry(raw: &str) -> Result<Vec<ModelSpec>, ConfigError> {
    let entries: Vec<RawEntry> = serde_json::from_str(raw)?;

    let mut models = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        let model = convert_entry(entry, index)?;
        if models
            .iter()
            .any(|existing: &ModelSpec| existing.model_id == model.model_id)
        {
            return Err(ConfigError::DuplicateId(model.model_id));
        }
        models.push(model);
    }
    Ok(models)
}

fn convert_entry(entry: RawEntry, index: usize) -> Result<ModelSpec, ConfigError> {
    if entry.id.is_empty() {
        return Err(ConfigError::Entry {
            index,
            reason: "entry must include a non-empty 'id'".into(),
        });
    }

    let tokenizer = parse_tokenizer(entry.tokenizer.as_ref()).map_err(|reason| {
        ConfigError::Entry { index, reason }
    })?;

    Ok(ModelSpec {
        display_name: entry.display_name.unwrap_or_else(|| entry.id.clone()),
        model_id: entry.id,
        family: entry.family.unwrap_or_else(|| "unknown".into()),
        provider: entry.provider.unwrap_or_else(|| "unknown".into()),
        max_context: entry.max_context,
        tokenizer,
        description: entry.description,
        pricing: entry.pricing.map(|p| Pricing {
            currency: p.currency.unwrap_or_else(|| "USD".into()),
            input_per_1k: p.input_per_1k,
            output_per_1k: p.output_per_1k,
        }),
    })
}

fn parse_tokenizer(value: Option<&Value>) -> Result<TokenizerSpec, String> {
    let Some(Value::Object(spec)) = value else {
        return Err("tokenizer spec must be an object with a 'type'".into());
    };

    let kind = match spec.get("type") {
        Some(Value::String(kind)) if !kind.trim().is_empty() => {
            kind.trim().to_ascii_lowercase()
        }
        _ => return Err("tokenizer spec must define a non-empty 'type' string".into()),
    };

    let options = match spec.get("options") {
        None | Some(Value::Null) => serde_json::Map::new(),
        Some(Value::Object(options)) => options.clone(),
        Some(_) => return Err("tokenizer options must be a mapping".into()),
    };

    Ok(TokenizerSpec { kind, options })
}
