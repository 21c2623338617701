// NTFS junction (directory reparse point) management
//
// Three layers, leaves first: a pure codec for the fixed-layout reparse
// buffer, a device channel that owns the handle/control-call boundary, and
// the junction manager that combines the two with lifecycle policy.

pub mod channel;
pub mod codec;
pub mod junction;

pub use channel::memory::MemoryReparseChannel;
#[cfg(target_os = "windows")]
pub use channel::windows::WindowsReparseChannel;
pub use channel::{HandleAccess, ReparseChannel, ReparseOp};
pub use codec::{DecodedReparse, ReparseTag};
pub use junction::JunctionManager;
