//! Tokenizer adapters and the registry that builds and caches them.

mod byte;
mod error;
#[cfg(feature = "hf")]
mod hf;
mod regex;
mod registry;

pub use byte::ByteTokenizer;
pub use error::TokenizeError;
#[cfg(feature = "hf")]
pub use hf::HuggingFaceTokenizer;
pub use regex::{RegexOptions, RegexTokenizer, WS_SENTINEL};
pub use registry::{TokenizerRegistry, create_tokenizer, tokenizer_for_model};
pub use token::Token;

mod token {
    /// A single token produced by an adapter.
    ///
    /// Subword and regex adapters emit token strings; the byte adapter emits
    /// raw byte values. Serializes untagged, so JSON output is a plain string
    /// or number.
    #[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
    #[serde(untagged)]
    pub enum Token {
        /// A textual token (word, subword, punctuation, or sentinel).
        Text(String),
        /// One raw UTF-8 byte, 0–255.
        Byte(u8),
    }

    impl Token {
        /// Construct a textual token.
        #[must_use]
        pub fn text(piece: impl Into<String>) -> Self {
            Self::Text(piece.into())
        }
    }
}

/// Common interface for tokenizer adapters.
///
/// Empty input always yields an empty token sequence, and tokenizing the same
/// text twice on one instance yields identical results.
pub trait TokenizerAdapter: Send + Sync + std::fmt::Debug {
    /// Display name shown in listings and diagnostics.
    fn name(&self) -> &str;

    /// Split `text` into a sequence of tokens.
    fn tokenize(&self, text: &str) -> Result<Vec<Token>, TokenizeError>;

    /// Number of tokens emitted for `text`.
    fn count_tokens(&self, text: &str) -> Result<usize, TokenizeError> {
        Ok(self.tokenize(text)?.len())
    }
}
