use super::error::TokenizeError;
use super::{Token, TokenizerAdapter};

/// Deterministic tokenizer emitting one token per UTF-8 byte.
///
/// No configuration; extra spec options are ignored.
#[derive(Debug)]
pub struct ByteTokenizer {
    name: String,
}

impl ByteTokenizer {
    /// Create a byte tokenizer with the given display name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl TokenizerAdapter for ByteTokenizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn tokenize(&self, text: &str) -> Result<Vec<Token>, TokenizeError> {
        Ok(text.bytes().map(Token::Byte).collect())
    }
}
