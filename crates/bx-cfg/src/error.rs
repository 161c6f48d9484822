use bx_core::CoreError;
use thiserror::Error;

/// Errors specific to CFG construction and optimization. Invariant
/// violations shared with the rest of the pipeline (dangling labels,
/// malformed opcodes) are [`CoreError`], composed in here rather than
/// duplicated.
#[derive(Debug, Error)]
pub enum CfgError {
    #[error("listing has no entry label")]
    MissingEntryLabel,

    #[error(transparent)]
    Core(#[from] CoreError),
}
