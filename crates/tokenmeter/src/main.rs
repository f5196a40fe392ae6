//! tokenmeter — count LLM tokens and estimate cost from the command line.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use tokenmeter::config;
use tokenmeter::server;
use tokenmeter::service::{ServiceError, TokenService};
use tokenmeter::tokenize::{TokenizeError, TokenizerRegistry};

// ─── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(
    name = "tokenmeter",
    about = "Estimate LLM token usage, context overflow, and cost",
    version
)]
struct Cli {
    /// Path to a custom model registry JSON file.
    #[arg(long, value_name = "PATH", global = true)]
    registry: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List supported models as JSON.
    Models,

    /// Count tokens for input text.
    Count {
        /// Model identifier (see `tokenmeter models`).
        #[arg(long)]
        model: String,

        /// Text to tokenize.
        #[arg(long, conflicts_with = "file")]
        text: Option<String>,

        /// Read the text from a file instead.
        #[arg(long, value_name = "PATH")]
        file: Option<PathBuf>,
    },

    /// Start the HTTP API server.
    Serve {
        /// Host to bind.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind.
        #[arg(long, default_value_t = 8000)]
        port: u16,
    },
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

fn build_service(registry_path: Option<&PathBuf>) -> TokenService {
    match config::load_registry(registry_path.map(PathBuf::as_path)) {
        Ok(models) => TokenService::new(models, TokenizerRegistry::new()),
        Err(e) => {
            eprintln!("{:?}", miette::Report::new(e));
            std::process::exit(exitcode::CONFIG);
        }
    }
}

fn exit_code_for(error: &ServiceError) -> i32 {
    match error {
        ServiceError::ModelNotFound(_) => exitcode::USAGE,
        ServiceError::Tokenize(cause) => match cause {
            TokenizeError::MissingDependency
            | TokenizeError::Download(_)
            | TokenizeError::LocalFileNotFound(_) => exitcode::UNAVAILABLE,
            _ => exitcode::SOFTWARE,
        },
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(rendered) => println!("{rendered}"),
        Err(e) => {
            eprintln!("error serializing output: {e}");
            std::process::exit(exitcode::SOFTWARE);
        }
    }
}

// ─── Entry point ──────────────────────────────────────────────────────────────

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let service = build_service(cli.registry.as_ref());

    match cli.command {
        Command::Models => {
            print_json(&serde_json::json!({ "models": service.list_models() }));
        }

        Command::Count { model, text, file } => {
            let text = if let Some(path) = file {
                match std::fs::read_to_string(&path) {
                    Ok(content) => content,
                    Err(e) => {
                        eprintln!("error reading {}: {e}", path.display());
                        std::process::exit(exitcode::IOERR);
                    }
                }
            } else {
                text.unwrap_or_default()
            };

            match service.calculate(&model, &text) {
                Ok(result) => print_json(&result),
                Err(e) => {
                    let code = exit_code_for(&e);
                    eprintln!("{:?}", miette::Report::new(e));
                    std::process::exit(code);
                }
            }
        }

        Command::Serve { host, port } => {
            let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
                Ok(runtime) => runtime,
                Err(e) => {
                    eprintln!("error starting runtime: {e}");
                    std::process::exit(exitcode::SOFTWARE);
                }
            };
            if let Err(e) = runtime.block_on(server::serve(Arc::new(service), &host, port)) {
                eprintln!("server error: {e}");
                std::process::exit(exitcode::IOERR);
            }
        }
    }
}
