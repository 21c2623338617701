// Junction lifecycle management
// Combines the reparse codec with a device channel: Create / Delete /
// Exists / GetTarget plus the overwrite and error translation policy.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use graft_core::{to_absolute, JunctionError, JunctionInfo};
use log::{debug, info};

use crate::channel::{HandleAccess, ReparseChannel, ReparseOp, ERROR_NOT_A_REPARSE_POINT};
use crate::codec::{self, DecodedReparse};

/// Orchestrates junction operations over a reparse channel.
///
/// Holds no state between calls: every operation opens a handle, performs
/// its control calls, and releases the handle before returning.
pub struct JunctionManager<C: ReparseChannel> {
    channel: C,
}

impl<C: ReparseChannel> JunctionManager<C> {
    pub fn new(channel: C) -> Self {
        JunctionManager { channel }
    }

    /// Create a junction at `link` pointing to `target`.
    ///
    /// `target` must already exist as a directory. An existing `link` is an
    /// error unless `overwrite` is set, and even then only an existing
    /// junction or an empty directory is replaced; a populated ordinary
    /// directory is never removed. If setting the reparse data fails, the
    /// placeholder directory stays behind so callers can observe the state
    /// and recover with `delete`.
    pub fn create(&self, link: &Path, target: &Path, overwrite: bool) -> Result<(), JunctionError> {
        let link = resolve(link)?;
        let target = resolve(target)?;

        match fs::metadata(&target) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(JunctionError::TargetNotADirectory(target)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(JunctionError::TargetNotFound(target));
            }
            Err(e) => return Err(JunctionError::os_failure("stat target path", &e)),
        }

        match fs::symlink_metadata(&link) {
            Ok(_) if !overwrite => return Err(JunctionError::LinkAlreadyExists(link)),
            Ok(meta) => {
                self.remove_replaceable(&link, &meta)?;
                fs::create_dir(&link)
                    .map_err(|e| JunctionError::os_failure("create link directory", &e))?;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                fs::create_dir(&link)
                    .map_err(|e| JunctionError::os_failure("create link directory", &e))?;
            }
            Err(e) => return Err(JunctionError::os_failure("stat link path", &e)),
        }

        let buffer = codec::encode_mount_point(path_text(&target)?)?;
        let mut handle = self.channel.open(&link, HandleAccess::ReadWrite)?;
        // A failure from here on leaves the placeholder directory in place;
        // that state is visible through exists() and recoverable.
        self.channel
            .control(&mut handle, ReparseOp::SetReparsePoint, &buffer)?;
        info!("created junction {} -> {}", link.display(), target.display());
        Ok(())
    }

    /// Remove the junction at `link`.
    ///
    /// A path that does not exist is a successful no-op. Clearing the
    /// reparse point and removing the directory are reported as distinct
    /// failures so callers can tell "link cleared but directory left
    /// behind" from "link clearing itself failed".
    pub fn delete(&self, link: &Path) -> Result<(), JunctionError> {
        let link = resolve(link)?;

        match fs::symlink_metadata(&link) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(JunctionError::os_failure("stat link path", &e)),
            Ok(meta) if !meta.is_dir() && !meta.file_type().is_symlink() => {
                return Err(JunctionError::NotAJunction(link));
            }
            Ok(_) => {}
        }

        let mut handle = self.channel.open(&link, HandleAccess::ReadWrite)?;
        match self
            .channel
            .control(&mut handle, ReparseOp::DeleteReparsePoint, &codec::encode_delete_marker())
        {
            Ok(_) => {}
            Err(e) if is_not_reparse(&e) => return Err(JunctionError::NotAJunction(link)),
            Err(e) => return Err(e),
        }
        // The handle is exclusive; release it before removing the directory.
        drop(handle);

        fs::remove_dir(&link)
            .map_err(|e| JunctionError::os_failure("remove link directory", &e))?;
        info!("deleted junction {}", link.display());
        Ok(())
    }

    /// True iff `path` is a directory junction with a non-empty target.
    /// Every failure mode reads as "not a junction"; this never errors.
    pub fn exists(&self, path: &Path) -> bool {
        matches!(self.read_mount_point(path), Ok(Some(target)) if !target.as_os_str().is_empty())
    }

    /// Resolve the target the junction at `path` points to.
    pub fn get_target(&self, path: &Path) -> Result<PathBuf, JunctionError> {
        let path = resolve(path)?;
        match self.read_mount_point(&path) {
            Ok(Some(target)) if !target.as_os_str().is_empty() => Ok(target),
            Ok(_) => Err(JunctionError::NotAJunction(path)),
            Err(e) if is_not_reparse(&e) => Err(JunctionError::NotAJunction(path)),
            Err(e) => Err(e),
        }
    }

    /// Describe the junction at `path` for reporting surfaces.
    pub fn info(&self, path: &Path) -> Result<JunctionInfo, JunctionError> {
        let path = resolve(path)?;
        let target = self.get_target(&path)?;
        Ok(JunctionInfo { path, target })
    }

    /// Shared read path: open for read, fetch the reparse buffer, decode.
    /// `Ok(None)` means the path exists but carries no mount point data.
    fn read_mount_point(&self, path: &Path) -> Result<Option<PathBuf>, JunctionError> {
        let path = resolve(path)?;
        match fs::symlink_metadata(&path) {
            // Junctions report as directories or as reparse links depending
            // on how the platform surfaces them; both are candidates.
            Ok(meta) if meta.is_dir() || meta.file_type().is_symlink() => {}
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(JunctionError::os_failure("stat link path", &e)),
        }

        let mut handle = self.channel.open(&path, HandleAccess::Read)?;
        let raw = self
            .channel
            .control(&mut handle, ReparseOp::GetReparsePoint, &[])?;
        match codec::decode(&raw)? {
            Some(DecodedReparse::MountPoint { substitute_name, .. }) => {
                Ok(Some(PathBuf::from(substitute_name)))
            }
            // Symbolic links and foreign tags are valid reparse points but
            // never junctions.
            _ => Ok(None),
        }
    }

    /// Overwrite policy for an existing link path: clear an existing
    /// junction through the channel, remove an empty directory, refuse
    /// everything else.
    fn remove_replaceable(&self, link: &Path, meta: &fs::Metadata) -> Result<(), JunctionError> {
        if self.exists(link) {
            debug!("overwrite: clearing existing junction at {}", link.display());
            return self.delete(link);
        }
        if meta.is_dir() || meta.file_type().is_symlink() {
            debug!("overwrite: removing existing directory at {}", link.display());
            return fs::remove_dir(link).map_err(|e| {
                if e.kind() == io::ErrorKind::DirectoryNotEmpty {
                    JunctionError::LinkAlreadyExists(link.to_path_buf())
                } else {
                    JunctionError::os_failure("remove existing link directory", &e)
                }
            });
        }
        Err(JunctionError::LinkAlreadyExists(link.to_path_buf()))
    }
}

fn resolve(path: &Path) -> Result<PathBuf, JunctionError> {
    to_absolute(path).map_err(|e| JunctionError::os_failure("resolve path", &e))
}

fn path_text(path: &Path) -> Result<&str, JunctionError> {
    path.to_str()
        .ok_or_else(|| JunctionError::InvalidPath(path.to_path_buf()))
}

fn is_not_reparse(err: &JunctionError) -> bool {
    err.os_code() == Some(ERROR_NOT_A_REPARSE_POINT)
}
