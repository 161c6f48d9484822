use thiserror::Error;

/// Everything that can go wrong driving the pipeline from the command
/// line: reading/parsing the input program, or any of the three
/// compiler crates' own fatal errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{path}' is not a valid program: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("no function named '{0}' in this program")]
    UnknownFunction(String),

    #[error(transparent)]
    Lower(#[from] bx_lower::LowerError),

    #[error(transparent)]
    Cfg(#[from] bx_cfg::CfgError),

    #[error(transparent)]
    Ssa(#[from] bx_ssa::SsaError),
}
