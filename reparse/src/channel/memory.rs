// In-memory reparse channel
// Backs the manager in tests and non-Windows development. Mirrors the error
// codes the Windows channel produces so the manager's translation paths are
// exercised identically.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use graft_core::JunctionError;
use log::trace;

use super::{
    HandleAccess, ReparseChannel, ReparseOp, ERROR_ACCESS_DENIED, ERROR_FILE_NOT_FOUND,
    ERROR_NOT_A_REPARSE_POINT,
};

/// Reparse buffer store keyed by link path. Directory structure itself is
/// still the real filesystem; only the reparse data lives here.
#[derive(Debug, Default)]
pub struct MemoryReparseChannel {
    buffers: Mutex<HashMap<PathBuf, Vec<u8>>>,
}

/// Open handle: the path it was opened on and the access it was granted.
#[derive(Debug)]
pub struct MemoryHandle {
    path: PathBuf,
    access: HandleAccess,
}

impl MemoryReparseChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plant a raw reparse buffer, bypassing the control protocol. Lets
    /// tests stage foreign or corrupt buffers a real volume could contain.
    pub fn plant(&self, path: &Path, buffer: Vec<u8>) {
        self.store().insert(path.to_path_buf(), buffer);
    }

    /// Whether any reparse buffer is recorded for the path.
    pub fn has_buffer(&self, path: &Path) -> bool {
        self.store().contains_key(path)
    }

    fn store(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, Vec<u8>>> {
        self.buffers.lock().expect("reparse store poisoned")
    }
}

impl ReparseChannel for MemoryReparseChannel {
    type Handle = MemoryHandle;

    fn open(&self, path: &Path, access: HandleAccess) -> Result<MemoryHandle, JunctionError> {
        if !path.exists() {
            return Err(JunctionError::OsFailure {
                operation: "open reparse handle",
                code: ERROR_FILE_NOT_FOUND,
            });
        }
        trace!("opened in-memory handle on {} ({:?})", path.display(), access);
        Ok(MemoryHandle {
            path: path.to_path_buf(),
            access,
        })
    }

    fn control(
        &self,
        handle: &mut MemoryHandle,
        op: ReparseOp,
        input: &[u8],
    ) -> Result<Vec<u8>, JunctionError> {
        match op {
            ReparseOp::SetReparsePoint => {
                if handle.access != HandleAccess::ReadWrite {
                    return Err(JunctionError::OsFailure {
                        operation: "set reparse point",
                        code: ERROR_ACCESS_DENIED,
                    });
                }
                self.store().insert(handle.path.clone(), input.to_vec());
                Ok(Vec::new())
            }
            ReparseOp::GetReparsePoint => {
                self.store()
                    .get(&handle.path)
                    .cloned()
                    .ok_or(JunctionError::OsFailure {
                        operation: "get reparse point",
                        code: ERROR_NOT_A_REPARSE_POINT,
                    })
            }
            ReparseOp::DeleteReparsePoint => {
                if handle.access != HandleAccess::ReadWrite {
                    return Err(JunctionError::OsFailure {
                        operation: "delete reparse point",
                        code: ERROR_ACCESS_DENIED,
                    });
                }
                self.store()
                    .remove(&handle.path)
                    .map(|_| Vec::new())
                    .ok_or(JunctionError::OsFailure {
                        operation: "delete reparse point",
                        code: ERROR_NOT_A_REPARSE_POINT,
                    })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_missing_path_reports_os_code() {
        let channel = MemoryReparseChannel::new();
        let err = channel
            .open(Path::new("/no/such/path"), HandleAccess::Read)
            .unwrap_err();
        assert_eq!(err.os_code(), Some(ERROR_FILE_NOT_FOUND));
    }

    #[test]
    fn test_get_without_buffer_is_not_a_reparse_point() {
        let tmp = TempDir::new().unwrap();
        let channel = MemoryReparseChannel::new();
        let mut handle = channel.open(tmp.path(), HandleAccess::Read).unwrap();
        let err = channel
            .control(&mut handle, ReparseOp::GetReparsePoint, &[])
            .unwrap_err();
        assert_eq!(err.os_code(), Some(ERROR_NOT_A_REPARSE_POINT));
    }

    #[test]
    fn test_set_requires_write_access() {
        let tmp = TempDir::new().unwrap();
        let channel = MemoryReparseChannel::new();
        let mut handle = channel.open(tmp.path(), HandleAccess::Read).unwrap();
        let err = channel
            .control(&mut handle, ReparseOp::SetReparsePoint, b"data")
            .unwrap_err();
        assert_eq!(err.os_code(), Some(ERROR_ACCESS_DENIED));
    }

    #[test]
    fn test_set_get_delete_cycle() {
        let tmp = TempDir::new().unwrap();
        let channel = MemoryReparseChannel::new();
        let mut handle = channel.open(tmp.path(), HandleAccess::ReadWrite).unwrap();

        channel
            .control(&mut handle, ReparseOp::SetReparsePoint, b"buffer")
            .unwrap();
        assert_eq!(
            channel
                .control(&mut handle, ReparseOp::GetReparsePoint, &[])
                .unwrap(),
            b"buffer"
        );

        channel
            .control(&mut handle, ReparseOp::DeleteReparsePoint, &[])
            .unwrap();
        let err = channel
            .control(&mut handle, ReparseOp::DeleteReparsePoint, &[])
            .unwrap_err();
        assert_eq!(err.os_code(), Some(ERROR_NOT_A_REPARSE_POINT));
    }
}
