use std::io::{self, Write};
use std::path::{Path, PathBuf};

use error_stack::{Report, ResultExt};
use tempfile::NamedTempFile;

use crate::error::StateError;
use crate::model::EvaluationState;
use crate::storage::StateStore;

/// Stores the evaluation state as a pretty-printed JSON document.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for JsonFileStore {
    fn load(&self) -> Result<EvaluationState, Report<StateError>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "no state document, starting fresh");
                return Ok(EvaluationState::default());
            }
            Err(e) => {
                return Err(Report::new(e)
                    .change_context(StateError::Read)
                    .attach(format!("path: {}", self.path.display())));
            }
        };

        let state: EvaluationState = serde_json::from_str(&content)
            .change_context(StateError::Decode)
            .attach_with(|| format!("path: {}", self.path.display()))?;

        Ok(state.migrate_legacy())
    }

    fn save(&self, state: &EvaluationState) -> Result<(), Report<StateError>> {
        let json = serde_json::to_string_pretty(state).change_context(StateError::Encode)?;

        write_atomically(&self.path, json.as_bytes())
            .change_context(StateError::Write)
            .attach_with(|| format!("path: {}", self.path.display()))?;

        tracing::debug!(path = %self.path.display(), "state document written");
        Ok(())
    }
}

/// Replace `path` with `contents` via a temporary file in the same directory,
/// so a crash never leaves a truncated document behind.
pub fn write_atomically(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
