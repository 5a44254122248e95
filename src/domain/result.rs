//! Result type alias for chunkwise

use super::errors::BatchError;

/// Result of every fallible engine, adapter and config operation
///
/// # Examples
///
/// ```
/// use chunkwise::domain::result::Result;
/// use chunkwise::domain::errors::BatchError;
///
/// fn write_batch(items: &[String]) -> Result<usize> {
///     if items.is_empty() {
///         return Err(BatchError::Write("sink unavailable".to_string()));
///     }
///     Ok(items.len())
/// }
/// ```
pub type Result<T> = std::result::Result<T, BatchError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::ErrorKind;

    fn read_checkpoint(raw: &str) -> Result<serde_json::Value> {
        Ok(serde_json::from_str(raw)?)
    }

    #[test]
    fn test_question_mark_converts_foreign_errors() {
        assert!(read_checkpoint(r#"{"offset": 3}"#).is_ok());

        let err = read_checkpoint("{offset").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Serialization);
    }
}
