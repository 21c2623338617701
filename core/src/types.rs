use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A junction as reported back to callers.
///
/// Junctions have no identity beyond their filesystem path; this is a
/// snapshot of what the reparse buffer said at query time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JunctionInfo {
    /// Absolute path of the junction directory.
    pub path: PathBuf,
    /// Directory the junction resolves to, with the kernel path prefix
    /// already stripped.
    pub target: PathBuf,
}
