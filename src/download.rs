//! Saving converted artifacts to the local download directory.

use crate::config::{DownloadConfig, FileCollisionAction};
use crate::error::{Error, Result};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Maximum number of numbered names tried before giving up
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Writes converted artifacts to disk
///
/// Each call stages its payload in its own hidden temporary file inside the download
/// directory and then claims the destination name atomically, so concurrent saves of
/// the same filename never share a staging file or land on the same path.
#[derive(Clone, Debug)]
pub struct DownloadEmitter {
    download_dir: PathBuf,
    collision: FileCollisionAction,
}

impl DownloadEmitter {
    /// Create an emitter writing into `download_dir`
    pub fn new(download_dir: impl Into<PathBuf>, collision: FileCollisionAction) -> Self {
        Self {
            download_dir: download_dir.into(),
            collision,
        }
    }

    /// Create an emitter from the download section of the config
    pub fn from_config(config: &DownloadConfig) -> Self {
        Self::new(config.download_dir.clone(), config.file_collision)
    }

    /// Directory artifacts are written to
    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Save `bytes` as `filename` and return the final path
    pub async fn emit(&self, bytes: &[u8], filename: &str) -> Result<PathBuf> {
        validate_filename(filename)?;
        tokio::fs::create_dir_all(&self.download_dir).await?;

        let dir = self.download_dir.clone();
        let requested = self.download_dir.join(filename);
        let payload = bytes.to_vec();
        let collision = self.collision;

        let destination =
            tokio::task::spawn_blocking(move || store(&dir, &requested, &payload, collision))
                .await
                .map_err(|e| Error::Other(format!("save task failed: {}", e)))??;

        debug!(path = %destination.display(), size = bytes.len(), "saved converted file");
        Ok(destination)
    }
}

/// Stage `bytes` in `dir` and move them onto `requested` per the collision action
///
/// The staging file is removed when it is dropped, so every error path cleans up.
fn store(
    dir: &Path,
    requested: &Path,
    bytes: &[u8],
    action: FileCollisionAction,
) -> Result<PathBuf> {
    let mut staged = tempfile::Builder::new()
        .prefix(".vsync-")
        .suffix(".part")
        .tempfile_in(dir)?;
    staged.write_all(bytes)?;
    staged.flush()?;

    match action {
        FileCollisionAction::Overwrite => {
            staged.persist(requested).map_err(|e| e.error)?;
            Ok(requested.to_path_buf())
        }
        FileCollisionAction::Skip => match claim(staged, requested)? {
            Claim::Saved => Ok(requested.to_path_buf()),
            Claim::Taken(_) => Err(Error::FileCollision {
                path: requested.to_path_buf(),
                reason: "file already exists and collision action is skip".to_string(),
            }),
        },
        FileCollisionAction::Rename => {
            let mut staged = match claim(staged, requested)? {
                Claim::Saved => return Ok(requested.to_path_buf()),
                Claim::Taken(staged) => staged,
            };
            for n in 1..=MAX_RENAME_ATTEMPTS {
                let candidate = numbered(requested, n)?;
                staged = match claim(staged, &candidate)? {
                    Claim::Saved => return Ok(candidate),
                    Claim::Taken(staged) => staged,
                };
            }
            Err(Error::FileCollision {
                path: requested.to_path_buf(),
                reason: format!("no free name after {} attempts", MAX_RENAME_ATTEMPTS),
            })
        }
    }
}

enum Claim {
    Saved,
    Taken(NamedTempFile),
}

/// Move the staged file onto `target` only if nothing exists there yet
fn claim(staged: NamedTempFile, target: &Path) -> Result<Claim> {
    match staged.persist_noclobber(target) {
        Ok(_) => Ok(Claim::Saved),
        Err(e) if e.error.kind() == ErrorKind::AlreadyExists => Ok(Claim::Taken(e.file)),
        Err(e) => Err(e.error.into()),
    }
}

/// `name.ext` becomes `name (n).ext`
fn numbered(path: &Path, n: u32) -> Result<PathBuf> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::InvalidPath {
            path: path.to_path_buf(),
            reason: "file name has no stem".to_string(),
        })?;
    let name = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem} ({n}).{ext}"),
        None => format!("{stem} ({n})"),
    };
    Ok(path.with_file_name(name))
}

fn validate_filename(filename: &str) -> Result<()> {
    let invalid = filename.is_empty()
        || filename == "."
        || filename == ".."
        || filename.contains(['/', '\\'])
        || filename.contains('\0');
    if invalid {
        return Err(Error::InvalidPath {
            path: PathBuf::from(filename),
            reason: "not a plain file name".to_string(),
        });
    }
    Ok(())
}
