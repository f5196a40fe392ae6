use regex::Regex;
use serde::Deserialize;

use super::error::TokenizeError;
use super::{Token, TokenizerAdapter};

/// Sentinel emitted for a collapsed whitespace run.
pub const WS_SENTINEL: &str = "<ws>";

/// Built-in Unicode-aware segmentation pattern. Alternatives are tried in
/// order: CJK ideographs, kana, Hangul syllables, Latin words with optional
/// internal apostrophes, digit runs, underscore runs, single punctuation or
/// symbol characters, whitespace runs.
const DEFAULT_PATTERN: &str = concat!(
    "[\u{4e00}-\u{9fff}]",
    "|[\u{3040}-\u{30ff}]",
    "|[\u{ac00}-\u{d7af}]",
    "|[A-Za-z]+(?:'[A-Za-z]+)?",
    "|[0-9]+",
    "|_+",
    r"|[^\w\s]",
    r"|\s+",
);

/// Spec options accepted by the regex variant. Unknown keys are rejected.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegexOptions {
    /// Override for the built-in segmentation pattern.
    pub pattern: Option<String>,
    /// Lowercase the input before matching.
    pub normalize_lowercase: bool,
    /// Keep whitespace matches as tokens instead of dropping them.
    pub keep_whitespace: bool,
    /// Collapse consecutive kept whitespace matches into one [`WS_SENTINEL`].
    pub collapse_whitespace: bool,
}

/// Configurable tokenizer that scans text left-to-right with a pattern,
/// emitting one token per non-overlapping match.
#[derive(Debug)]
pub struct RegexTokenizer {
    name: String,
    pattern: Regex,
    normalize_lowercase: bool,
    keep_whitespace: bool,
    collapse_whitespace: bool,
}

impl RegexTokenizer {
    /// Build from parsed options.
    pub fn new(name: impl Into<String>, options: RegexOptions) -> Result<Self, TokenizeError> {
        let pattern = Regex::new(options.pattern.as_deref().unwrap_or(DEFAULT_PATTERN))
            .map_err(|e| TokenizeError::Options(format!("invalid 'pattern': {e}")))?;
        Ok(Self {
            name: name.into(),
            pattern,
            normalize_lowercase: options.normalize_lowercase,
            keep_whitespace: options.keep_whitespace,
            collapse_whitespace: options.collapse_whitespace,
        })
    }

    /// Build from raw spec options.
    pub fn from_options(
        name: impl Into<String>,
        options: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self, TokenizeError> {
        let options: RegexOptions = serde_json::from_value(serde_json::Value::Object(options))
            .map_err(|e| TokenizeError::Options(e.to_string()))?;
        Self::new(name, options)
    }
}

impl TokenizerAdapter for RegexTokenizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn tokenize(&self, text: &str) -> Result<Vec<Token>, TokenizeError> {
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let lowered;
        let text = if self.normalize_lowercase {
            lowered = text.to_lowercase();
            &lowered
        } else {
            text
        };

        let mut tokens: Vec<Token> = Vec::new();
        for m in self.pattern.find_iter(text) {
            let piece = m.as_str();
            if piece.chars().all(char::is_whitespace) {
                if !self.keep_whitespace {
                    continue;
                }
                if self.collapse_whitespace {
                    let previous_is_sentinel = matches!(
                        tokens.last(),
                        Some(Token::Text(prev)) if prev == WS_SENTINEL
                    );
                    if !previous_is_sentinel {
                        tokens.push(Token::Text(WS_SENTINEL.to_owned()));
                    }
                    continue;
                }
            }
            tokens.push(Token::Text(piece.to_owned()));
        }
        Ok(tokens)
    }
}
