//! Scratch directory and file helpers.

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::fs;

use crate::error::{MediaError, MediaResult};

/// Per-job working directory, removed when dropped.
#[derive(Debug)]
pub struct ScratchDir {
    dir: TempDir,
}

impl ScratchDir {
    /// Create a scratch directory under the system temp dir, or under
    /// `root` when given.
    pub fn create(prefix: &str, root: Option<&Path>) -> MediaResult<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(prefix);
        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        tracing::debug!("Created scratch dir {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path for a file inside the scratch directory.
    pub fn file(&self, name: impl AsRef<Path>) -> PathBuf {
        self.dir.path().join(name)
    }
}

/// Fail with `FileNotFound` unless `path` exists.
pub async fn ensure_exists(path: &Path) -> MediaResult<()> {
    if fs::try_exists(path).await? {
        Ok(())
    } else {
        Err(MediaError::FileNotFound(path.to_path_buf()))
    }
}

/// Write an FFmpeg concat-demuxer list for `paths`.
pub async fn write_concat_list(paths: &[PathBuf], list_path: &Path) -> MediaResult<()> {
    let mut content = String::new();
    for path in paths {
        let absolute = if path.is_absolute() {
            path.clone()
        } else {
            std::env::current_dir()?.join(path)
        };
        let quoted = absolute.to_string_lossy().replace('\'', "'\\''");
        content.push_str(&format!("file '{}'\n", quoted));
    }
    fs::write(list_path, content).await?;
    Ok(())
}
