//! Sanitizing helpers for values that become storage keys or get parsed back
//! out of persisted JSON.

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};

/// Errors raised while validating a value bound for the store.
#[derive(Debug, thiserror::Error)]
pub enum SecurityError {
    #[error("content too long (max {max_length} bytes)")]
    ContentTooLong { max_length: usize },

    #[error("file size exceeds limit ({limit} bytes)")]
    FileSizeExceeded { limit: usize },

    #[error("invalid format")]
    InvalidFormat,
}

/// Percent-encode an arbitrary hostname (or site id) into a string that is
/// safe to use as a flat storage key, e.g. `floatingPanel.<hostname>`.
pub fn safe_storage_key(raw: &str) -> String {
    utf8_percent_encode(raw, NON_ALPHANUMERIC).to_string()
}

/// Guard a size before attempting to parse it, so a corrupted or hostile
/// on-disk document can't be read into memory unbounded.
pub fn validate_file_size(size: u64, max_size: u64) -> Result<(), SecurityError> {
    if size > max_size {
        return Err(SecurityError::FileSizeExceeded {
            limit: max_size as usize,
        });
    }
    Ok(())
}

/// Parse JSON with a size cap, tolerating a stray leading NUL byte left by an
/// interrupted write.
pub fn secure_json_parse<T>(content: &str, max_bytes: usize) -> Result<T, SecurityError>
where
    T: serde::de::DeserializeOwned,
{
    if content.len() > max_bytes {
        return Err(SecurityError::ContentTooLong { max_length: max_bytes });
    }
    let normalized = content.trim_start_matches('\0');
    serde_json::from_str(normalized).map_err(|_| SecurityError::InvalidFormat)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_storage_key_encodes_separators() {
        assert_eq!(safe_storage_key("chat.openai.com"), "chat%2Eopenai%2Ecom");
        assert!(!safe_storage_key("../etc/passwd").contains('/'));
    }

    #[test]
    fn file_size_guard_rejects_oversized() {
        assert!(validate_file_size(100, 200).is_ok());
        assert!(validate_file_size(300, 200).is_err());
    }

    #[test]
    fn secure_json_parse_round_trips() {
        #[derive(serde::Deserialize, PartialEq, Debug)]
        struct T {
            a: u32,
        }
        let parsed: T = secure_json_parse(r#"{"a": 5}"#, 1024).unwrap();
        assert_eq!(parsed, T { a: 5 });
    }

    #[test]
    fn secure_json_parse_rejects_oversized() {
        let big = "x".repeat(100);
        let res: Result<serde_json::Value, _> = secure_json_parse(&big, 10);
        assert!(res.is_err());
    }
}
