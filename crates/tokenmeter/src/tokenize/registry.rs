//! Factory and cache translating tokenizer specs into adapter instances.

use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use super::byte::ByteTokenizer;
use super::error::TokenizeError;
use super::regex::RegexTokenizer;
use super::TokenizerAdapter;
use crate::model::{ModelSpec, TokenizerSpec};

/// Owns the cache of constructed adapters.
///
/// One registry is created at service bootstrap and lives for the process;
/// [`TokenizerRegistry::invalidate`] exists for test isolation and embedders.
pub struct TokenizerRegistry {
    cache: Mutex<HashMap<String, Arc<dyn TokenizerAdapter>>>,
}

impl Default for TokenizerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenizerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Return the adapter for `spec`, constructing and caching it on first
    /// use. The cache key defaults to a deterministic digest of the spec.
    pub fn get_tokenizer(
        &self,
        spec: &TokenizerSpec,
        cache_key: Option<&str>,
    ) -> Result<Arc<dyn TokenizerAdapter>, TokenizeError> {
        let key = cache_key.map_or_else(|| default_cache_key(spec), str::to_owned);

        if let Some(existing) = self.lock().get(&key) {
            return Ok(Arc::clone(existing));
        }

        // Construct outside the lock; slow network work is deferred to the
        // adapter's own first tokenize call. If another thread won the race,
        // its instance stays and this one is discarded.
        let tokenizer = create_tokenizer(spec)?;
        let mut cache = self.lock();
        Ok(Arc::clone(cache.entry(key).or_insert(tokenizer)))
    }

    /// Remove one cached adapter, or clear the whole cache when no key is
    /// given.
    pub fn invalidate(&self, cache_key: Option<&str>) {
        let mut cache = self.lock();
        match cache_key {
            Some(key) => {
                cache.remove(key);
            }
            None => cache.clear(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<dyn TokenizerAdapter>>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Construct an adapter from `spec`, dispatching on its type tag
/// (case-insensitive). A `name` option overrides the display name, which
/// otherwise defaults to the type tag.
pub fn create_tokenizer(spec: &TokenizerSpec) -> Result<Arc<dyn TokenizerAdapter>, TokenizeError> {
    let kind = spec.kind.trim().to_ascii_lowercase();
    let mut options = spec.options.clone();
    let name = match options.remove("name") {
        None => kind.clone(),
        Some(Value::String(name)) => name,
        Some(other) => {
            return Err(TokenizeError::Options(format!(
                "'name' option must be a string, got: {other}"
            )));
        }
    };

    match kind.as_str() {
        "regex" => Ok(Arc::new(RegexTokenizer::from_options(name, options)?)),
        "byte" => Ok(Arc::new(ByteTokenizer::new(name))),
        "huggingface" | "hf" => {
            #[cfg(feature = "hf")]
            {
                Ok(Arc::new(super::hf::HuggingFaceTokenizer::from_options(
                    name, options,
                )?))
            }
            #[cfg(not(feature = "hf"))]
            {
                let _ = name;
                Err(TokenizeError::MissingDependency)
            }
        }
        _ => Err(TokenizeError::UnknownType(spec.kind.clone())),
    }
}

/// Resolve the adapter bound to `model`, cached under its `model_id`.
///
/// Every model gets its own cached instance for the registry's lifetime,
/// even when two models share an identical spec.
pub fn tokenizer_for_model(
    model: &ModelSpec,
    registry: &TokenizerRegistry,
) -> Result<Arc<dyn TokenizerAdapter>, TokenizeError> {
    registry.get_tokenizer(&model.tokenizer, Some(&model.model_id))
}

/// Deterministic cache key for a spec: type tag plus a digest of the sorted
/// options.
fn default_cache_key(spec: &TokenizerSpec) -> String {
    let sorted: BTreeMap<&str, String> = spec
        .options
        .iter()
        .map(|(key, value)| (key.as_str(), value.to_string()))
        .collect();
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    sorted.hash(&mut hasher);
    format!(
        "{}:{:016x}",
        spec.kind.trim().to_ascii_lowercase(),
        hasher.finish()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn registry() -> TokenizerRegistry {
        TokenizerRegistry::new()
    }

    fn regex_spec() -> TokenizerSpec {
        TokenizerSpec::new("regex")
    }

    fn model(id: &str, spec: TokenizerSpec) -> ModelSpec {
        ModelSpec {
            model_id: id.into(),
            display_name: id.into(),
            family: "test".into(),
            provider: "local".into(),
            max_context: 0,
            tokenizer: spec,
            description: None,
            pricing: None,
        }
    }

    // ── cache identity ─────────────────────────────────────────────────────

    /// Two lookups under the same key return the same instance, not merely
    /// an equal configuration.
    #[rstest]
    fn same_key_returns_same_instance(registry: TokenizerRegistry) {
        let spec = regex_spec();
        let first = registry.get_tokenizer(&spec, Some("k")).unwrap();
        let second = registry.get_tokenizer(&spec, Some("k")).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[rstest]
    fn identical_specs_share_default_key(registry: TokenizerRegistry) {
        let spec = TokenizerSpec::new("regex").with_option("keep_whitespace", true);
        let first = registry.get_tokenizer(&spec, None).unwrap();
        let second = registry.get_tokenizer(&spec.clone(), None).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[rstest]
    fn differing_options_get_distinct_instances(registry: TokenizerRegistry) {
        let plain = regex_spec();
        let keeping = TokenizerSpec::new("regex").with_option("keep_whitespace", true);
        let first = registry.get_tokenizer(&plain, None).unwrap();
        let second = registry.get_tokenizer(&keeping, None).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    /// Per-model resolution keys on the model id, so models sharing a spec
    /// still get separate instances.
    #[rstest]
    fn models_with_equal_specs_do_not_share(registry: TokenizerRegistry) {
        let a = model("model-a", regex_spec());
        let b = model("model-b", regex_spec());
        let tok_a = tokenizer_for_model(&a, &registry).unwrap();
        let tok_b = tokenizer_for_model(&b, &registry).unwrap();
        assert!(!Arc::ptr_eq(&tok_a, &tok_b));

        let tok_a_again = tokenizer_for_model(&a, &registry).unwrap();
        assert!(Arc::ptr_eq(&tok_a, &tok_a_again));
    }

    // ── invalidation ───────────────────────────────────────────────────────

    #[rstest]
    fn invalidate_single_key(registry: TokenizerRegistry) {
        let spec = regex_spec();
        let first = registry.get_tokenizer(&spec, Some("k")).unwrap();
        registry.invalidate(Some("k"));
        let second = registry.get_tokenizer(&spec, Some("k")).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[rstest]
    fn invalidate_all(registry: TokenizerRegistry) {
        let spec = regex_spec();
        let first = registry.get_tokenizer(&spec, Some("a")).unwrap();
        let second = registry.get_tokenizer(&spec, Some("b")).unwrap();
        registry.invalidate(None);
        assert!(!Arc::ptr_eq(
            &first,
            &registry.get_tokenizer(&spec, Some("a")).unwrap()
        ));
        assert!(!Arc::ptr_eq(
            &second,
            &registry.get_tokenizer(&spec, Some("b")).unwrap()
        ));
    }

    // ── factory dispatch ───────────────────────────────────────────────────

    #[rstest]
    #[case("regex")]
    #[case("Regex")]
    #[case("BYTE")]
    fn type_dispatch_is_case_insensitive(#[case] kind: &str) {
        assert!(create_tokenizer(&TokenizerSpec::new(kind)).is_ok());
    }

    #[test]
    fn unknown_type_is_rejected_by_name() {
        let err = create_tokenizer(&TokenizerSpec::new("sentencepiece")).unwrap_err();
        assert!(matches!(err, TokenizeError::UnknownType(kind) if kind == "sentencepiece"));
    }

    #[test]
    fn name_option_overrides_display_name() {
        let spec = TokenizerSpec::new("byte").with_option("name", "raw-bytes");
        let tokenizer = create_tokenizer(&spec).unwrap();
        assert_eq!(tokenizer.name(), "raw-bytes");
    }

    #[test]
    fn display_name_defaults_to_type_tag() {
        let tokenizer = create_tokenizer(&TokenizerSpec::new("byte")).unwrap();
        assert_eq!(tokenizer.name(), "byte");
    }

    #[test]
    fn non_string_name_is_rejected() {
        let spec = TokenizerSpec::new("byte").with_option("name", 7);
        let err = create_tokenizer(&spec).unwrap_err();
        assert!(matches!(err, TokenizeError::Options(_)));
    }

    #[cfg(feature = "hf")]
    #[test]
    fn hf_alias_builds_huggingface_adapter() {
        let spec = TokenizerSpec::new("hf")
            .with_option("name", "demo")
            .with_option("repo_id", "example/model");
        let tokenizer = create_tokenizer(&spec).unwrap();
        assert_eq!(tokenizer.name(), "demo");
    }

    #[cfg(not(feature = "hf"))]
    #[test]
    fn hf_without_feature_is_missing_dependency() {
        let spec = TokenizerSpec::new("huggingface").with_option("repo_id", "example/model");
        let err = create_tokenizer(&spec).unwrap_err();
        assert!(matches!(err, TokenizeError::MissingDependency));
    }

    // ── default cache key ──────────────────────────────────────────────────

    #[test]
    fn default_key_ignores_option_order() {
        let mut forward = serde_json::Map::new();
        forward.insert("a".into(), 1.into());
        forward.insert("b".into(), 2.into());
        let mut backward = serde_json::Map::new();
        backward.insert("b".into(), 2.into());
        backward.insert("a".into(), 1.into());

        let forward = TokenizerSpec {
            kind: "regex".into(),
            options: forward,
        };
        let backward = TokenizerSpec {
            kind: "regex".into(),
            options: backward,
        };
        assert_eq!(default_cache_key(&forward), default_cache_key(&backward));
    }

    #[test]
    fn default_key_distinguishes_values() {
        let one = TokenizerSpec::new("regex").with_option("keep_whitespace", true);
        let other = TokenizerSpec::new("regex").with_option("keep_whitespace", false);
        assert_ne!(default_cache_key(&one), default_cache_key(&other));
    }
}
