use bx_core::{CoreError, Label, Temp};
use thiserror::Error;

/// Errors specific to SSA construction, optimization and deconstruction.
/// Every variant here is the §7 "liveness miscomputation" or
/// "pipeline bug" kind of fatal invariant violation -- none of them
/// are reachable from a well-formed, already-optimized CFG.
#[derive(Debug, Error)]
pub enum SsaError {
    /// A phi's predecessor has no recorded exit-version for the name
    /// being joined -- the predecessor wasn't versioned before phi
    /// resolution ran, or liveness under-approximated a live-in.
    #[error("phi in block {block} is missing a source from predecessor {predecessor} for {temp}")]
    PhiSourceMissing {
        block: Label,
        predecessor: Label,
        temp: Temp,
    },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Cfg(#[from] bx_cfg::CfgError),
}
