//! Convenience result type alias for Kiln.

use crate::error::AppError;

/// A specialized `Result` type for Kiln operations.
pub type AppResult<T> = Result<T, AppError>;
