//! Scene file service: the relay's durable copy of the current scene.
//!
//! DESIGN
//! ======
//! One file, `<SCENES_DIR>/current_scene.json`, rewritten on every
//! `scene_update`. Writes go to a sibling temp file first and are renamed
//! into place, so a reader never sees a half-written document.
//!
//! ERROR HANDLING
//! ==============
//! Failures are returned to the caller, which logs them and keeps relaying.
//! A missing file is not an error: it means no scene has been stored yet.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

pub const CURRENT_SCENE_FILE: &str = "current_scene.json";

#[derive(Debug, thiserror::Error)]
pub enum SceneFileError {
    #[error("scene file i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("scene file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[must_use]
pub fn current_scene_path(dir: &Path) -> PathBuf {
    dir.join(CURRENT_SCENE_FILE)
}

/// Read the stored scene. `Ok(None)` when nothing has been stored.
pub async fn load_current(dir: &Path) -> Result<Option<Value>, SceneFileError> {
    let path = current_scene_path(dir);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_slice(&bytes)?))
}

/// Replace the stored scene, creating the directory on first use.
pub async fn save_current(dir: &Path, scene: &Value) -> Result<(), SceneFileError> {
    tokio::fs::create_dir_all(dir).await?;
    let path = current_scene_path(dir);
    let staging = path.with_extension("json.tmp");
    let bytes = serde_json::to_vec(scene)?;
    tokio::fs::write(&staging, &bytes).await?;
    tokio::fs::rename(&staging, &path).await?;
    debug!(path = %path.display(), bytes = bytes.len(), "scene saved");
    Ok(())
}

#[cfg(test)]
#[path = "scene_test.rs"]
mod tests;
