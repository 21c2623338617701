// Windows reparse device channel
// Thin binding over DeviceIoControl and the FSCTL reparse control codes.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::windows::fs::OpenOptionsExt;
use std::os::windows::io::AsRawHandle;
use std::path::Path;
use std::ptr;

use graft_core::JunctionError;
use log::debug;
use winapi::shared::minwindef::DWORD;
use winapi::um::ioapiset::DeviceIoControl;
use winapi::um::winbase::{FILE_FLAG_BACKUP_SEMANTICS, FILE_FLAG_OPEN_REPARSE_POINT};
use winapi::um::winioctl::{
    FSCTL_DELETE_REPARSE_POINT, FSCTL_GET_REPARSE_POINT, FSCTL_SET_REPARSE_POINT,
};
use winapi::um::winnt::{GENERIC_READ, GENERIC_WRITE};

use super::{
    read_growable, FillOutcome, HandleAccess, ReparseChannel, ReparseOp,
    ERROR_INSUFFICIENT_BUFFER, ERROR_MORE_DATA, INITIAL_GET_BUFFER_SIZE,
    MAXIMUM_REPARSE_DATA_BUFFER_SIZE,
};

/// Channel backed by the real filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsReparseChannel;

impl WindowsReparseChannel {
    pub fn new() -> Self {
        WindowsReparseChannel
    }
}

impl ReparseChannel for WindowsReparseChannel {
    // `File` closes the handle on every exit path.
    type Handle = File;

    fn open(&self, path: &Path, access: HandleAccess) -> Result<File, JunctionError> {
        let access_mode = match access {
            HandleAccess::Read => GENERIC_READ,
            HandleAccess::ReadWrite => GENERIC_READ | GENERIC_WRITE,
        };
        debug!("opening reparse handle on {} ({:?})", path.display(), access);
        OpenOptions::new()
            .access_mode(access_mode)
            .share_mode(0)
            .custom_flags(FILE_FLAG_BACKUP_SEMANTICS | FILE_FLAG_OPEN_REPARSE_POINT)
            .open(path)
            .map_err(|e| JunctionError::os_failure("open reparse handle", &e))
    }

    fn control(
        &self,
        handle: &mut File,
        op: ReparseOp,
        input: &[u8],
    ) -> Result<Vec<u8>, JunctionError> {
        match op {
            ReparseOp::SetReparsePoint => submit(handle, FSCTL_SET_REPARSE_POINT, input, &mut [])
                .map(|_| Vec::new())
                .map_err(|e| JunctionError::os_failure("set reparse point", &e)),
            ReparseOp::DeleteReparsePoint => {
                submit(handle, FSCTL_DELETE_REPARSE_POINT, input, &mut [])
                    .map(|_| Vec::new())
                    .map_err(|e| JunctionError::os_failure("delete reparse point", &e))
            }
            ReparseOp::GetReparsePoint => read_growable(
                INITIAL_GET_BUFFER_SIZE,
                MAXIMUM_REPARSE_DATA_BUFFER_SIZE,
                |buffer| match submit(handle, FSCTL_GET_REPARSE_POINT, &[], buffer) {
                    Ok(len) => Ok(FillOutcome::Filled(len)),
                    Err(e) if buffer_too_small(&e) => Ok(FillOutcome::NeedLarger),
                    Err(e) => Err(JunctionError::os_failure("get reparse point", &e)),
                },
            ),
        }
    }
}

fn buffer_too_small(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(code) if code as u32 == ERROR_MORE_DATA || code as u32 == ERROR_INSUFFICIENT_BUFFER
    )
}

/// One DeviceIoControl submission. The error is captured immediately after
/// the call, before any other OS call can overwrite the code.
fn submit(handle: &File, code: DWORD, input: &[u8], output: &mut [u8]) -> io::Result<usize> {
    let mut bytes_returned: DWORD = 0;
    let ok = unsafe {
        DeviceIoControl(
            handle.as_raw_handle() as *mut _,
            code,
            if input.is_empty() {
                ptr::null_mut()
            } else {
                input.as_ptr() as *mut _
            },
            input.len() as DWORD,
            if output.is_empty() {
                ptr::null_mut()
            } else {
                output.as_mut_ptr() as *mut _
            },
            output.len() as DWORD,
            &mut bytes_returned,
            ptr::null_mut(),
        )
    };
    if ok == 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(bytes_returned as usize)
    }
}
