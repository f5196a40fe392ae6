//! Hugging Face subword tokenizer backed by a downloaded `tokenizer.json`.
//!
//! The asset is resolved lazily on first use: an explicit local path wins,
//! then the per-user cache, then an authenticated download from the Hub.
//! Downloaded bytes are validated as JSON before they are persisted, so a
//! bad payload never poisons the cache.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tokenizers::Tokenizer as HfBackend;

use super::error::TokenizeError;
use super::{Token, TokenizerAdapter};

const HF_HOST: &str = "https://huggingface.co";
const DEFAULT_REVISION: &str = "main";
const DEFAULT_TOKENIZER_FILE: &str = "tokenizer.json";
const DEFAULT_TIMEOUT_SECS: f64 = 30.0;
const DEFAULT_USER_AGENT: &str = concat!("tokenmeter/", env!("CARGO_PKG_VERSION"));

/// Environment variables checked for an access token, in order, after any
/// explicitly configured names.
const TOKEN_ENV_VARS: [&str; 3] = ["HUGGINGFACE_TOKEN", "HUGGINGFACEHUB_API_TOKEN", "HF_TOKEN"];

/// Spec options accepted by the Hugging Face variant. Unknown keys are
/// rejected.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct HfOptions {
    #[serde(default)]
    repo_id: String,
    revision: Option<String>,
    tokenizer_file: Option<String>,
    cache_dir: Option<String>,
    #[serde(default)]
    local_files_only: bool,
    local_tokenizer_path: Option<String>,
    #[serde(default)]
    add_special_tokens: bool,
    user_agent: Option<String>,
    download_timeout: Option<f64>,
    auth_token: Option<String>,
    auth_token_env: Option<EnvNames>,
}

/// One env-var name or an ordered list of them.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EnvNames {
    One(String),
    Many(Vec<String>),
}

impl EnvNames {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(name) => vec![name],
            Self::Many(names) => names,
        }
    }
}

/// Resolved location of the tokenizer asset.
struct TokenizerLocation {
    path: PathBuf,
    from_cache: bool,
}

#[derive(Debug)]
enum BackendState {
    Uninitialized,
    Ready(Arc<HfBackend>),
    Failed(TokenizeError),
}

/// Tokenizer adapter wrapping a Hugging Face `tokenizer.json` backend.
#[derive(Debug)]
pub struct HuggingFaceTokenizer {
    name: String,
    repo_id: String,
    revision: String,
    tokenizer_file: String,
    cache_root: PathBuf,
    local_files_only: bool,
    local_tokenizer_path: Option<PathBuf>,
    add_special_tokens: bool,
    user_agent: String,
    download_timeout: Duration,
    auth_token: Option<String>,
    state: Mutex<BackendState>,
}

impl HuggingFaceTokenizer {
    /// Build from raw spec options.
    pub fn from_options(
        name: impl Into<String>,
        options: serde_json::Map<String, Value>,
    ) -> Result<Self, TokenizeError> {
        let options: HfOptions = serde_json::from_value(Value::Object(options))
            .map_err(|e| TokenizeError::Options(e.to_string()))?;
        Self::new(name, options)
    }

    fn new(name: impl Into<String>, options: HfOptions) -> Result<Self, TokenizeError> {
        if options.repo_id.is_empty() {
            return Err(TokenizeError::Options(
                "'repo_id' option must be provided for Hugging Face tokenizers".into(),
            ));
        }

        let timeout = options.download_timeout.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if !timeout.is_finite() || timeout <= 0.0 {
            return Err(TokenizeError::Options(
                "'download_timeout' must be a positive number of seconds".into(),
            ));
        }

        let configured_env = options
            .auth_token_env
            .map(EnvNames::into_vec)
            .unwrap_or_default();
        let auth_token = resolve_auth_token(
            options.auth_token.as_deref(),
            &configured_env,
            |name| std::env::var(name).ok(),
        );

        Ok(Self {
            name: name.into(),
            repo_id: options.repo_id,
            revision: non_empty_or(options.revision, DEFAULT_REVISION),
            tokenizer_file: non_empty_or(options.tokenizer_file, DEFAULT_TOKENIZER_FILE),
            cache_root: options
                .cache_dir
                .as_deref()
                .map_or_else(default_cache_root, expand_path),
            local_files_only: options.local_files_only,
            local_tokenizer_path: options.local_tokenizer_path.as_deref().map(expand_path),
            add_special_tokens: options.add_special_tokens,
            user_agent: options
                .user_agent
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_owned()),
            download_timeout: Duration::from_secs_f64(timeout),
            auth_token,
            state: Mutex::new(BackendState::Uninitialized),
        })
    }

    /// Cache directory for this repo/revision: slashes in the repo id are
    /// replaced so the id maps onto a single path segment.
    fn repo_cache_dir(&self) -> PathBuf {
        self.cache_root
            .join(self.repo_id.replace('/', "__"))
            .join(&self.revision)
    }

    fn resolve_location(&self) -> Result<TokenizerLocation, TokenizeError> {
        if let Some(path) = &self.local_tokenizer_path {
            if !path.exists() {
                return Err(TokenizeError::LocalFileNotFound(path.clone()));
            }
            return Ok(TokenizerLocation {
                path: path.clone(),
                from_cache: false,
            });
        }

        let target_dir = self.repo_cache_dir();
        let target = target_dir.join(&self.tokenizer_file);
        if target.exists() {
            return Ok(TokenizerLocation {
                path: target,
                from_cache: true,
            });
        }

        if self.local_files_only {
            return Err(TokenizeError::Download(format!(
                "tokenizer file {} is not cached under {} and 'local_files_only' is set",
                self.tokenizer_file,
                target_dir.display(),
            )));
        }

        let url = format!(
            "{HF_HOST}/{}/resolve/{}/{}",
            self.repo_id, self.revision, self.tokenizer_file
        );
        let bytes = self.download(&url)?;

        std::fs::create_dir_all(&target_dir).map_err(|e| {
            TokenizeError::Download(format!(
                "failed to create cache directory {}: {e}",
                target_dir.display()
            ))
        })?;
        std::fs::write(&target, &bytes).map_err(|e| {
            TokenizeError::Download(format!(
                "failed to write cached tokenizer {}: {e}",
                target.display()
            ))
        })?;

        Ok(TokenizerLocation {
            path: target,
            from_cache: false,
        })
    }

    /// Fetch and validate the asset. Drives the async client the same way the
    /// rest of the crate does blocking network work.
    fn download(&self, url: &str) -> Result<Vec<u8>, TokenizeError> {
        tracing::debug!(url, "downloading tokenizer asset");
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| TokenizeError::Backend(format!("failed to start download runtime: {e}")))?;
        runtime.block_on(self.fetch(url))
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, TokenizeError> {
        let client = reqwest::Client::builder()
            .timeout(self.download_timeout)
            .user_agent(self.user_agent.clone())
            .build()
            .map_err(|e| TokenizeError::Backend(format!("failed to build HTTP client: {e}")))?;

        let mut request = client.get(url);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            TokenizeError::Download(format!("failed to download tokenizer from {url}: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(http_status_error(url, status.as_u16()));
        }

        let bytes = response.bytes().await.map_err(|e| {
            TokenizeError::Download(format!("failed to read tokenizer body from {url}: {e}"))
        })?;

        if serde_json::from_slice::<serde::de::IgnoredAny>(&bytes).is_err() {
            return Err(TokenizeError::Download(format!(
                "downloaded tokenizer file from {url} is not valid JSON"
            )));
        }

        Ok(bytes.to_vec())
    }

    fn load_backend(&self) -> Result<HfBackend, TokenizeError> {
        let location = self.resolve_location()?;
        tracing::debug!(
            path = %location.path.display(),
            from_cache = location.from_cache,
            "loading tokenizer backend"
        );
        HfBackend::from_file(&location.path).map_err(|e| {
            TokenizeError::Backend(format!(
                "failed to load tokenizer from {}: {e}",
                location.path.display()
            ))
        })
    }

    /// Backend handle, initialised at most once per adapter.
    ///
    /// Download failures leave the state untouched so a retried call attempts
    /// the download again; deterministic failures latch and are re-reported.
    fn backend(&self) -> Result<Arc<HfBackend>, TokenizeError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match &*state {
            BackendState::Ready(backend) => Ok(Arc::clone(backend)),
            BackendState::Failed(error) => Err(error.clone()),
            BackendState::Uninitialized => match self.load_backend() {
                Ok(backend) => {
                    let backend = Arc::new(backend);
                    *state = BackendState::Ready(Arc::clone(&backend));
                    Ok(backend)
                }
                Err(error) => {
                    if !matches!(error, TokenizeError::Download(_)) {
                        *state = BackendState::Failed(error.clone());
                    }
                    Err(error)
                }
            },
        }
    }
}

impl TokenizerAdapter for HuggingFaceTokenizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn tokenize(&self, text: &str) -> Result<Vec<Token>, TokenizeError> {
        if text.is_empty() {
            return Ok(Vec::new());
        }
        let backend = self.backend()?;
        let encoding = backend
            .encode(text, self.add_special_tokens)
            .map_err(|e| TokenizeError::Backend(format!("backend encode failed: {e}")))?;
        Ok(encoding
            .get_tokens()
            .iter()
            .cloned()
            .map(Token::Text)
            .collect())
    }
}

/// Select the access token to use for downloads.
///
/// An explicit token wins; otherwise the configured env-var names are checked
/// in order, then the well-known names. First non-empty value wins. Pure and
/// deterministic given `env`.
fn resolve_auth_token<F>(explicit: Option<&str>, configured: &[String], env: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(token) = explicit {
        if !token.is_empty() {
            return Some(token.to_owned());
        }
    }

    let mut checked: Vec<&str> = Vec::new();
    for name in configured
        .iter()
        .map(String::as_str)
        .chain(TOKEN_ENV_VARS)
    {
        if name.is_empty() || checked.contains(&name) {
            continue;
        }
        checked.push(name);
        if let Some(value) = env(name) {
            if !value.is_empty() {
                return Some(value);
            }
        }
    }
    None
}

fn http_status_error(url: &str, status: u16) -> TokenizeError {
    let mut message = format!("failed to download tokenizer from {url}: HTTP {status}");
    if matches!(status, 401 | 403) {
        message.push_str(
            ". Repository access was denied; provide a Hugging Face access token via the \
             'auth_token' option or the HUGGINGFACE_TOKEN / HUGGINGFACEHUB_API_TOKEN / HF_TOKEN \
             environment variables",
        );
    }
    TokenizeError::Download(message)
}

fn non_empty_or(value: Option<String>, default: &str) -> String {
    match value {
        Some(value) if !value.is_empty() => value,
        _ => default.to_owned(),
    }
}

fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

fn default_cache_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("tokenmeter")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    /// Minimal valid `tokenizer.json`: whitespace pre-tokenization over a
    /// three-word vocabulary. Stands in for real downloaded assets.
    const WORDLEVEL_TOKENIZER: &str = r#"{
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [],
        "normalizer": null,
        "pre_tokenizer": {"type": "Whitespace"},
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": {"[UNK]": 0, "hello": 1, "world": 2},
            "unk_token": "[UNK]"
        }
    }"#;

    fn adapter(options: HfOptions) -> HuggingFaceTokenizer {
        HuggingFaceTokenizer::new("hf-test", options).expect("valid options")
    }

    fn base_options(repo_id: &str) -> HfOptions {
        HfOptions {
            repo_id: repo_id.into(),
            revision: None,
            tokenizer_file: None,
            cache_dir: None,
            local_files_only: false,
            local_tokenizer_path: None,
            add_special_tokens: false,
            user_agent: None,
            download_timeout: None,
            auth_token: None,
            auth_token_env: None,
        }
    }

    fn text_tokens(tokens: &[Token]) -> Vec<&str> {
        tokens
            .iter()
            .map(|t| match t {
                Token::Text(s) => s.as_str(),
                Token::Byte(_) => panic!("expected text token"),
            })
            .collect()
    }

    // ── construction ───────────────────────────────────────────────────────

    #[test]
    fn empty_repo_id_is_rejected() {
        let err = HuggingFaceTokenizer::new("hf", base_options("")).unwrap_err();
        assert!(matches!(err, TokenizeError::Options(_)));
    }

    #[test]
    fn missing_repo_id_option_is_rejected() {
        let err =
            HuggingFaceTokenizer::from_options("hf", serde_json::Map::new()).unwrap_err();
        assert!(matches!(err, TokenizeError::Options(_)));
    }

    #[test]
    fn unknown_option_is_rejected() {
        let mut options = serde_json::Map::new();
        options.insert("repo_id".into(), "a/b".into());
        options.insert("no_such_option".into(), true.into());
        let err = HuggingFaceTokenizer::from_options("hf", options).unwrap_err();
        assert!(matches!(err, TokenizeError::Options(_)));
    }

    #[test]
    fn nonpositive_timeout_is_rejected() {
        let mut options = base_options("a/b");
        options.download_timeout = Some(0.0);
        let err = HuggingFaceTokenizer::new("hf", options).unwrap_err();
        assert!(matches!(err, TokenizeError::Options(_)));
    }

    #[test]
    fn repo_cache_dir_replaces_slashes() {
        let mut options = base_options("example/model");
        options.cache_dir = Some("/tmp/tokcache".into());
        options.revision = Some("v2".into());
        let adapter = adapter(options);
        assert_eq!(
            adapter.repo_cache_dir(),
            PathBuf::from("/tmp/tokcache/example__model/v2")
        );
    }

    // ── auth token resolution ──────────────────────────────────────────────

    #[rstest]
    #[case(Some("explicit"), &[], Some("explicit"))]
    #[case(None, &["MY_TOKEN"], Some("from-my-token"))]
    #[case(None, &[], Some("from-hf-token"))]
    fn auth_token_resolution_order(
        #[case] explicit: Option<&str>,
        #[case] configured: &[&str],
        #[case] expected: Option<&str>,
    ) {
        let configured: Vec<String> = configured.iter().map(|s| (*s).to_owned()).collect();
        let env = |name: &str| match name {
            "MY_TOKEN" => Some("from-my-token".to_owned()),
            "HF_TOKEN" => Some("from-hf-token".to_owned()),
            _ => None,
        };
        let resolved = resolve_auth_token(explicit, &configured, env);
        assert_eq!(resolved.as_deref(), expected);
    }

    #[test]
    fn auth_token_skips_empty_values() {
        let env = |name: &str| match name {
            "FIRST" => Some(String::new()),
            "SECOND" => Some("second".to_owned()),
            _ => None,
        };
        let configured = vec!["FIRST".to_owned(), "SECOND".to_owned()];
        assert_eq!(
            resolve_auth_token(None, &configured, env).as_deref(),
            Some("second")
        );
    }

    #[test]
    fn auth_token_none_when_nothing_set() {
        assert_eq!(resolve_auth_token(None, &[], |_| None), None);
    }

    #[test]
    fn configured_name_takes_priority_over_well_known() {
        let env = |name: &str| match name {
            "MY_TOKEN" => Some("mine".to_owned()),
            "HUGGINGFACE_TOKEN" => Some("well-known".to_owned()),
            _ => None,
        };
        let configured = vec!["MY_TOKEN".to_owned()];
        assert_eq!(
            resolve_auth_token(None, &configured, env).as_deref(),
            Some("mine")
        );
    }

    // ── error messages ─────────────────────────────────────────────────────

    #[rstest]
    #[case(401)]
    #[case(403)]
    fn denied_status_mentions_access_token(#[case] status: u16) {
        let err = http_status_error("https://example/x", status);
        let TokenizeError::Download(message) = err else {
            panic!("expected Download error");
        };
        assert!(message.contains("access token"));
    }

    #[test]
    fn other_status_reports_url_without_hint() {
        let err = http_status_error("https://example/x", 500);
        let TokenizeError::Download(message) = err else {
            panic!("expected Download error");
        };
        assert!(message.contains("https://example/x"));
        assert!(!message.contains("access token"));
    }

    // ── asset resolution ───────────────────────────────────────────────────

    #[test]
    fn explicit_local_path_is_used_without_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokenizer.json");
        std::fs::write(&path, WORDLEVEL_TOKENIZER).unwrap();

        let mut options = base_options("example/model");
        options.local_tokenizer_path = Some(path.to_string_lossy().into_owned());
        let adapter = adapter(options);

        let tokens = adapter.tokenize("hello world").unwrap();
        assert_eq!(text_tokens(&tokens), ["hello", "world"]);
        assert_eq!(adapter.count_tokens("hello world").unwrap(), 2);
    }

    #[test]
    fn missing_local_path_fails_and_latches() {
        let mut options = base_options("example/model");
        options.local_tokenizer_path = Some("/nonexistent/tokenizer.json".into());
        let adapter = adapter(options);

        let first = adapter.tokenize("hello").unwrap_err();
        assert!(matches!(first, TokenizeError::LocalFileNotFound(_)));
        let second = adapter.tokenize("hello").unwrap_err();
        assert!(matches!(second, TokenizeError::LocalFileNotFound(_)));
    }

    #[test]
    fn local_files_only_with_empty_cache_is_download_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut options = base_options("example/model");
        options.cache_dir = Some(dir.path().to_string_lossy().into_owned());
        options.local_files_only = true;
        let adapter = adapter(options);

        let err = adapter.tokenize("hello").unwrap_err();
        assert!(matches!(err, TokenizeError::Download(_)));
        assert!(err.to_string().contains("local_files_only"));
    }

    #[test]
    fn cached_asset_is_used_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let cached = dir.path().join("example__model").join("main");
        std::fs::create_dir_all(&cached).unwrap();
        std::fs::write(cached.join("tokenizer.json"), WORDLEVEL_TOKENIZER).unwrap();

        let mut options = base_options("example/model");
        options.cache_dir = Some(dir.path().to_string_lossy().into_owned());
        options.local_files_only = true;
        let adapter = adapter(options);

        let tokens = adapter.tokenize("world hello").unwrap();
        assert_eq!(text_tokens(&tokens), ["world", "hello"]);
    }

    #[test]
    fn empty_text_short_circuits_resolution() {
        // No local path, no cache, local_files_only: resolution would fail,
        // but empty input must not trigger it.
        let dir = tempfile::tempdir().unwrap();
        let mut options = base_options("example/model");
        options.cache_dir = Some(dir.path().to_string_lossy().into_owned());
        options.local_files_only = true;
        let adapter = adapter(options);

        assert_eq!(adapter.tokenize("").unwrap(), Vec::<Token>::new());
    }

    #[test]
    fn unparsable_cached_asset_is_backend_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokenizer.json");
        std::fs::write(&path, "{}").unwrap();

        let mut options = base_options("example/model");
        options.local_tokenizer_path = Some(path.to_string_lossy().into_owned());
        let adapter = adapter(options);

        let err = adapter.tokenize("hello").unwrap_err();
        assert!(matches!(err, TokenizeError::Backend(_)));
    }
}
