//! Fatal conditions surfaced by the truncation core.

use curtail_model::{ModelType, StateId};
use thiserror::Error;

/// Build errors. Recoverable anomalies (floating-point drift on reachability
/// estimates) are clamped and logged instead; cooperative cancellation is a
/// flag on the returned components, not an error.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The oracle produced a choice with no transitions for a live state.
    #[error("oracle produced an empty choice for state {id}")]
    OracleEmpty { id: StateId },

    /// A successor id appeared that was never registered through the
    /// id callback. Indicates corruption in the oracle or the store.
    #[error("state {id} appeared in a successor list but was never registered")]
    UnexpectedState { id: StateId },

    /// The absorbing state did not receive id 0 at setup.
    #[error("absorbing state should be index 0, got {got}")]
    AbsorbingMisplaced { got: StateId },

    /// The variable layout has no `Absorbing` boolean to build the sink from.
    #[error("did not get an `Absorbing` variable in the variable layout")]
    AbsorbingVariableMissing,

    /// The oracle reports a model type the builder cannot truncate.
    #[error("model type {0} is not supported, only CTMCs can be truncated")]
    UnsupportedModelType(ModelType),

    /// The oracle produced no initial states.
    #[error("no initial states")]
    NoInitialStates,

    /// Writing the perimeter-state export failed.
    #[error("failed to write perimeter state export: {0}")]
    Export(#[from] std::io::Error),
}

pub type BuildResult<T> = Result<T, BuildError>;
