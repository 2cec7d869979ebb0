use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced to callers by type.
///
/// Everything except `MalformedSymbol` is fatal for a run: the engine reports
/// it before issuing any store write. Per-file problems are not represented
/// here; they are logged and collected in the run report instead.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("malformed symbol {input:?}: {reason}")]
    MalformedSymbol { input: String, reason: String },
    #[error("external tool `{0}` not found on PATH")]
    ToolNotFound(String),
    #[error("external tool `{tool}` exited with {status}: {output}")]
    ToolFailed {
        tool: String,
        status: String,
        output: String,
    },
    #[error("cannot decode index artifact {path}: {reason}")]
    Artifact { path: PathBuf, reason: String },
    #[error("cannot read project root {path}: {source}")]
    ProjectRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("graph store unavailable: {0}")]
    StoreUnavailable(String),
}

impl IndexError {
    pub fn malformed(input: &str, reason: impl Into<String>) -> Self {
        IndexError::MalformedSymbol {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}
