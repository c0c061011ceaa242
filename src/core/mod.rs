/// Core Module for hospdb
///
/// Connection handling, query and mutation execution, schema bootstrap,
/// and the shared error type.

pub mod db;
pub mod error;

// Re-export commonly used types for convenience
pub use error::{HospdbError, Result};
