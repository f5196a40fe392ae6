use std::path::PathBuf;

/// Error type for tokenizer construction and resolution failures.
///
/// Every variant maps to one failure kind front-ends can dispatch on;
/// variants are cloneable so a latched adapter failure can be re-reported.
#[derive(Clone, Debug, thiserror::Error, miette::Diagnostic)]
pub enum TokenizeError {
    /// A spec named a tokenizer kind the factory does not know.
    #[error("unknown tokenizer type: {0:?}")]
    #[diagnostic(
        code(tokenmeter::tokenize::unknown_type),
        help("supported types are \"regex\", \"byte\", \"huggingface\" (alias \"hf\")")
    )]
    UnknownType(String),

    /// Construction options were malformed for the requested kind.
    #[error("invalid tokenizer options: {0}")]
    #[diagnostic(code(tokenmeter::tokenize::options))]
    Options(String),

    /// The Hugging Face backend is not compiled into this build.
    #[error("Hugging Face tokenizer support is not available in this build")]
    #[diagnostic(
        code(tokenmeter::tokenize::missing_dependency),
        help("rebuild tokenmeter with the default `hf` feature enabled")
    )]
    MissingDependency,

    /// An explicitly configured local tokenizer file does not exist.
    #[error("local tokenizer file not found: {}", .0.display())]
    #[diagnostic(code(tokenmeter::tokenize::local_file))]
    LocalFileNotFound(PathBuf),

    /// Network, HTTP, cache, or content-validation failure while resolving a
    /// remote tokenizer asset.
    #[error("{0}")]
    #[diagnostic(code(tokenmeter::tokenize::download))]
    Download(String),

    /// The subword backend failed at load or encode time.
    #[error("tokenizer backend error: {0}")]
    #[diagnostic(code(tokenmeter::tokenize::backend))]
    Backend(String),
}
