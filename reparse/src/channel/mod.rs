// Device channel boundary
// The only layer that touches the operating system: scoped acquisition of a
// reparse-mode handle and submission of one control operation at a time.

pub mod memory;
#[cfg(target_os = "windows")]
pub mod windows;

use std::path::Path;

use graft_core::JunctionError;
use log::debug;

// Win32 error codes the channel and manager translate on.
pub const ERROR_FILE_NOT_FOUND: u32 = 2;
pub const ERROR_ACCESS_DENIED: u32 = 5;
pub const ERROR_INSUFFICIENT_BUFFER: u32 = 122;
pub const ERROR_MORE_DATA: u32 = 234;
pub const ERROR_NOT_A_REPARSE_POINT: u32 = 4390;

/// Largest reparse data buffer the kernel will hand back.
pub const MAXIMUM_REPARSE_DATA_BUFFER_SIZE: usize = 16 * 1024;
/// First capacity tried by the growable read: header and field blocks plus
/// one maximum-length path in UTF-16 units. Reads almost always succeed on
/// the first call.
pub const INITIAL_GET_BUFFER_SIZE: usize = 8 + 8 + 2 * 260;

/// The three control operations a reparse channel can submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReparseOp {
    SetReparsePoint,
    GetReparsePoint,
    DeleteReparsePoint,
}

/// Access requested when opening a reparse-mode handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleAccess {
    Read,
    ReadWrite,
}

/// Scoped access to a filesystem path opened in reparse point mode.
///
/// `open` yields a handle that owns the underlying resource and releases it
/// on every exit path. `control` submits one operation against the handle
/// and returns the kernel's output buffer; errors carry the OS code captured
/// immediately after the failing call.
pub trait ReparseChannel {
    type Handle;

    fn open(&self, path: &Path, access: HandleAccess) -> Result<Self::Handle, JunctionError>;

    fn control(
        &self,
        handle: &mut Self::Handle,
        op: ReparseOp,
        input: &[u8],
    ) -> Result<Vec<u8>, JunctionError>;
}

/// Outcome of one attempt at filling a caller-supplied buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillOutcome {
    /// The buffer was filled with this many bytes.
    Filled(usize),
    /// The buffer was too small; retry with a larger one.
    NeedLarger,
}

/// Growable-buffer read protocol: call `attempt` with a scratch buffer,
/// doubling its capacity each time the attempt reports it was too small,
/// bounded by `max` bytes. The retry loop is internal to the channel;
/// callers only ever see the final result.
pub fn read_growable<F>(initial: usize, max: usize, mut attempt: F) -> Result<Vec<u8>, JunctionError>
where
    F: FnMut(&mut [u8]) -> Result<FillOutcome, JunctionError>,
{
    let mut capacity = initial.clamp(1, max);
    loop {
        let mut buffer = vec![0u8; capacity];
        match attempt(&mut buffer)? {
            FillOutcome::Filled(len) => {
                buffer.truncate(len);
                return Ok(buffer);
            }
            FillOutcome::NeedLarger if capacity < max => {
                debug!("reparse buffer of {} bytes too small, growing", capacity);
                capacity = (capacity * 2).min(max);
            }
            FillOutcome::NeedLarger => {
                return Err(JunctionError::OsFailure {
                    operation: "get reparse point",
                    code: ERROR_INSUFFICIENT_BUFFER,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_growable_first_attempt() {
        let result = read_growable(16, 64, |buffer| {
            buffer[..4].copy_from_slice(b"data");
            Ok(FillOutcome::Filled(4))
        })
        .unwrap();
        assert_eq!(result, b"data");
    }

    #[test]
    fn test_read_growable_doubles_until_it_fits() {
        let mut sizes = Vec::new();
        let result = read_growable(16, 256, |buffer| {
            sizes.push(buffer.len());
            if buffer.len() < 64 {
                Ok(FillOutcome::NeedLarger)
            } else {
                Ok(FillOutcome::Filled(buffer.len()))
            }
        })
        .unwrap();
        assert_eq!(sizes, vec![16, 32, 64]);
        assert_eq!(result.len(), 64);
    }

    #[test]
    fn test_read_growable_bound_exhausted() {
        let err = read_growable(16, 64, |_| Ok(FillOutcome::NeedLarger)).unwrap_err();
        assert_eq!(err.os_code(), Some(ERROR_INSUFFICIENT_BUFFER));
    }

    #[test]
    fn test_read_growable_caps_initial_capacity() {
        let mut sizes = Vec::new();
        read_growable(1024, 64, |buffer| {
            sizes.push(buffer.len());
            Ok(FillOutcome::Filled(0))
        })
        .unwrap();
        assert_eq!(sizes, vec![64]);
    }

    #[test]
    fn test_read_growable_propagates_attempt_errors() {
        let err = read_growable(16, 64, |_| {
            Err(JunctionError::OsFailure {
                operation: "get reparse point",
                code: ERROR_ACCESS_DENIED,
            })
        })
        .unwrap_err();
        assert_eq!(err.os_code(), Some(ERROR_ACCESS_DENIED));
    }
}
