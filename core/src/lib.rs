pub mod error;
pub mod path;
pub mod types;

pub use error::JunctionError;
pub use path::to_absolute;
pub use types::JunctionInfo;
