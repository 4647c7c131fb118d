use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::TransferMode;
use crate::error::TomoError;
use crate::store::Store;

const IMPORT_PREFIX: &str = "import_";

pub fn import_file_name(extra_dir: &Utf8Path, source: &Utf8Path) -> Result<Utf8PathBuf, TomoError> {
    let name = source
        .file_name()
        .ok_or_else(|| TomoError::Filesystem(format!("source has no file name: {source}")))?;
    Ok(extra_dir.join(format!("{IMPORT_PREFIX}{name}")))
}

pub fn transfer(source: &Utf8Path, dest: &Utf8Path, mode: TransferMode) -> Result<(), TomoError> {
    if dest.as_std_path().exists() {
        return Err(TomoError::DestinationExists(dest.to_owned()));
    }
    if mode == TransferMode::Copy {
        return Store::copy_file_atomic(source, dest);
    }

    let write_err = |message: String| TomoError::FilesystemWrite {
        path: dest.to_owned(),
        message,
    };
    let absolute = source
        .canonicalize_utf8()
        .map_err(|err| write_err(format!("resolve {source}: {err}")))?;
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent.as_std_path()).map_err(|err| write_err(err.to_string()))?;
    }
    let linked = match mode {
        TransferMode::Symlink => symlink(&absolute, dest),
        _ => match fs::hard_link(absolute.as_std_path(), dest.as_std_path()) {
            Err(err) if err.kind() == io::ErrorKind::CrossesDevices => {
                tracing::warn!("{absolute} is on another device, symlinking instead");
                symlink(&absolute, dest)
            }
            other => other,
        },
    };
    linked.map_err(|err| write_err(format!("link from {absolute}: {err}")))
}

#[cfg(unix)]
fn symlink(target: &Utf8Path, link: &Utf8Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target.as_std_path(), link.as_std_path())
}

#[cfg(windows)]
fn symlink(target: &Utf8Path, link: &Utf8Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target.as_std_path(), link.as_std_path())
}
