//! Result type alias for XQSync operations

use crate::Error;

/// Result type alias for XQSync operations
pub type Result<T> = std::result::Result<T, Error>;
