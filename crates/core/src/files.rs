//! Idempotent writes for host configuration files.

use std::fs;
use std::io::Write;
use std::path::Path;

use tracing::debug;

use crate::errors::FileError;

/// Write `data` to `path` only if the current contents differ.
///
/// Missing parent directories are created. Returns `true` if the file was
/// written. On error the returned [`FileError`] says which step failed; a
/// failed write may have left a partial file behind.
pub fn write_file_if_new(path: &Path, data: &[u8]) -> Result<bool, FileError> {
    match fs::read(path) {
        Ok(current) if current == data => {
            debug!(path = %path.display(), "file already up to date");
            return Ok(false);
        }
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(FileError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    }

    if let Some(parent) = path.parent() {
        create_dir_all(parent).map_err(|source| FileError::CreateDir {
            path: path.to_path_buf(),
            source,
        })?;
    }

    write_file(path, data).map_err(|source| FileError::Write {
        path: path.to_path_buf(),
        source,
    })?;

    debug!(path = %path.display(), bytes = data.len(), "wrote file");
    Ok(true)
}

/// Remove `path`. Returns `false` if it did not exist.
pub fn remove_file_if_exists(path: &Path) -> Result<bool, FileError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(FileError::Remove {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(unix)]
fn create_dir_all(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o755).create(dir)
}

#[cfg(not(unix))]
fn create_dir_all(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)
}

fn write_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o644);
    }
    let mut file = options.open(path)?;
    file.write_all(data)?;
    file.sync_all()
}
