//! Compressed scene files
//!
//! The chunk stream from [`super::codec`] is LZ4-compressed with a
//! prepended size and written through async file I/O. Used at load and
//! save time, never during live frames.

use std::path::{Path, PathBuf};

use crate::core::error::Error;
use crate::core::types::Result;
use crate::scene::index::SceneIndex;

use super::codec::{self, LoadParams};

/// File path for a named scene under `base_dir`
pub fn scene_path(base_dir: &Path, name: &str) -> PathBuf {
    base_dir.join(format!("{name}.vsc"))
}

/// Serialize, compress and write the index to `path`
pub async fn save_scene_file(path: &Path, scene: &SceneIndex) -> Result<()> {
    let bytes = codec::save_index(scene);
    let compressed = lz4_flex::compress_prepend_size(&bytes);

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, compressed).await?;
    Ok(())
}

/// Read, decompress and load a scene file into `scene`.
///
/// Returns `Ok(false)` when the file does not exist.
pub async fn load_scene_file(
    path: &Path,
    scene: &mut SceneIndex,
    params: &LoadParams<'_>,
) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }

    let compressed = tokio::fs::read(path).await?;
    let bytes = lz4_flex::decompress_size_prepended(&compressed)
        .map_err(|e| Error::Corrupt(format!("LZ4 decompression failed: {e}")))?;

    codec::load_index(scene, &bytes, params)?;
    Ok(true)
}
