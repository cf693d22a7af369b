pub mod json_file;

use error_stack::Report;

use crate::error::StateError;
use crate::model::EvaluationState;

/// Persistence for the evaluation state carried between runs.
///
/// A missing document is not an error: `load` returns the first-run default.
pub trait StateStore: Send + Sync {
    fn load(&self) -> Result<EvaluationState, Report<StateError>>;

    fn save(&self, state: &EvaluationState) -> Result<(), Report<StateError>>;
}
