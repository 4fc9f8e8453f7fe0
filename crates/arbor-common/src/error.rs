//! Error types for ArborDB.

use thiserror::Error;

/// Result type alias using ArborError.
pub type Result<T> = std::result::Result<T, ArborError>;

/// Errors that can occur in ArborDB operations.
#[derive(Debug, Error)]
pub enum ArborError {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Page not found: {page_id}")]
    PageNotFound { page_id: u32 },

    // Buffer pool errors
    #[error("Buffer pool full, unable to allocate frame")]
    BufferPoolFull,

    // Index errors
    #[error("Key size mismatch: expected {expected} bytes, got {actual}")]
    KeySizeMismatch { expected: usize, actual: usize },

    #[error("Index name too long: {len} bytes (max {max})")]
    InvalidIndexName { len: usize, max: usize },

    #[error("Catalog page full, unable to insert record")]
    CatalogFull,

    #[error("B+ tree corrupted: {0}")]
    TreeCorrupted(String),

    // Configuration errors
    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter { name: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoError, ErrorKind};

    #[test]
    fn test_io_error_conversion() {
        let io_err = IoError::new(ErrorKind::NotFound, "file not found");
        let arbor_err: ArborError = io_err.into();
        assert!(matches!(arbor_err, ArborError::Io(_)));
        assert!(arbor_err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_page_not_found_display() {
        let err = ArborError::PageNotFound { page_id: 42 };
        assert_eq!(err.to_string(), "Page not found: 42");
    }

    #[test]
    fn test_buffer_pool_full_display() {
        let err = ArborError::BufferPoolFull;
        assert_eq!(err.to_string(), "Buffer pool full, unable to allocate frame");
    }

    #[test]
    fn test_key_size_mismatch_display() {
        let err = ArborError::KeySizeMismatch {
            expected: 8,
            actual: 4,
        };
        assert_eq!(
            err.to_string(),
            "Key size mismatch: expected 8 bytes, got 4"
        );
    }

    #[test]
    fn test_catalog_errors_display() {
        let err = ArborError::InvalidIndexName { len: 64, max: 32 };
        assert_eq!(err.to_string(), "Index name too long: 64 bytes (max 32)");

        let err = ArborError::CatalogFull;
        assert_eq!(err.to_string(), "Catalog page full, unable to insert record");
    }

    #[test]
    fn test_tree_corrupted_display() {
        let err = ArborError::TreeCorrupted("child missing from parent".to_string());
        assert_eq!(
            err.to_string(),
            "B+ tree corrupted: child missing from parent"
        );
    }

    #[test]
    fn test_invalid_parameter_display() {
        let err = ArborError::InvalidParameter {
            name: "leaf_max".to_string(),
            value: "1".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid parameter: leaf_max = 1");
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<i32> {
            Ok(42)
        }

        fn returns_err() -> Result<i32> {
            Err(ArborError::BufferPoolFull)
        }

        assert!(returns_ok().is_ok());
        assert!(returns_err().is_err());
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ArborError>();
    }
}
