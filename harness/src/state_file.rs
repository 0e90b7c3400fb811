use provider::StateSnapshot;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum StateFileError {
    #[error("I/O error on state file: {0}")]
    Io(#[from] std::io::Error),

    #[error("State file is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StateFileResult<T> = Result<T, StateFileError>;

/// Loads a snapshot; a missing file is an empty snapshot.
pub fn load(path: &Path) -> StateFileResult<StateSnapshot> {
    if !path.exists() {
        debug!("No state file at {}, starting empty", path.display());
        return Ok(StateSnapshot::new());
    }
    let contents = std::fs::read_to_string(path)?;
    Ok(StateSnapshot::from_json(&contents)?)
}

/// Writes the snapshot next to its destination first, then renames it into
/// place.
pub fn save(path: &Path, snapshot: &StateSnapshot) -> StateFileResult<()> {
    let json = snapshot.to_json()?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    debug!(
        "Wrote state serial {} to {}",
        snapshot.serial,
        path.display()
    );
    Ok(())
}
