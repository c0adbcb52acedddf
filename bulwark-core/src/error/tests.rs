//! Tests for error conversions
//!
//! This module tests that wrapping is idempotent, that the `From`
//! implementations let the `?` operator cross I/O boundaries, and that the
//! retryability heuristic stays narrow.

#[cfg(test)]
mod tests {
    use crate::error::{
        is_retryable_error, wrap_error, wrap_error_with, ErrorCategory, ErrorKind, ErrorOptions,
        ResilienceError,
    };
    use std::io;

    #[test]
    fn test_wrap_error_is_idempotent() {
        let original = ResilienceError::network("socket closed");
        let id = original.id();

        let once = wrap_error(original);
        let twice = wrap_error(once.clone());

        assert_eq!(once.id(), id);
        assert_eq!(twice.id(), id);
        assert_eq!(twice.kind(), ErrorKind::Network);
    }

    #[test]
    fn test_wrap_error_idempotent_for_every_kind() {
        let kinds = [
            ResilienceError::validation("v"),
            ResilienceError::configuration("c"),
            ResilienceError::network("n"),
            ResilienceError::permission("p"),
            ResilienceError::resource("r"),
            ResilienceError::business_logic("b"),
            ResilienceError::integration("i"),
            wrap_error("plain text failure"),
        ];

        for error in kinds {
            let id = error.id();
            let kind = error.kind();
            let wrapped = wrap_error(wrap_error(error));
            assert_eq!(wrapped.id(), id);
            assert_eq!(wrapped.kind(), kind);
        }
    }

    #[test]
    fn test_wrap_error_keeps_native_cause() {
        let native = io::Error::new(io::ErrorKind::Other, "disk quota exceeded");
        let wrapped = wrap_error(native);

        assert_eq!(wrapped.kind(), ErrorKind::Generic);
        assert_eq!(wrapped.message(), "disk quota exceeded");
        assert_eq!(wrapped.code(), "UNKNOWN_ERROR");
        assert_eq!(wrapped.error_chain().len(), 2);
        assert_eq!(wrapped.root_cause().message(), "disk quota exceeded");
    }

    #[test]
    fn test_wrap_error_with_message_and_options() {
        let wrapped = wrap_error_with(
            "raw failure",
            Some("import step failed"),
            ErrorOptions::new()
                .code("IMPORT_FAILED")
                .category(ErrorCategory::Integration)
                .context("step", 3),
        );

        assert_eq!(wrapped.message(), "import step failed");
        assert_eq!(wrapped.code(), "IMPORT_FAILED");
        assert_eq!(wrapped.category(), ErrorCategory::Integration);
        assert_eq!(wrapped.context()["step"], 3);
        assert_eq!(wrapped.root_cause().message(), "raw failure");
    }

    #[test]
    fn test_retryable_flag_wins() {
        assert!(is_retryable_error(&ResilienceError::network("n")));
        assert!(!is_retryable_error(&ResilienceError::validation("v")));
    }

    #[test]
    fn test_retryable_heuristic_for_native_errors() {
        let reset = io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer");
        assert!(is_retryable_error(&reset));

        let textual = io::Error::new(io::ErrorKind::Other, "connect ECONNREFUSED 127.0.0.1:5432");
        assert!(is_retryable_error(&textual));

        let not_found = io::Error::new(io::ErrorKind::NotFound, "no such file");
        assert!(!is_retryable_error(&not_found));
    }

    #[test]
    fn test_wrapping_transient_io_error_sets_retryable_flag() {
        let wrapped = wrap_error(io::Error::new(io::ErrorKind::TimedOut, "read timed out"));
        assert!(wrapped.is_retryable());
        assert!(is_retryable_error(&wrapped));

        let wrapped = wrap_error(io::Error::new(io::ErrorKind::Other, "checksum mismatch"));
        assert!(!wrapped.is_retryable());
        assert!(!is_retryable_error(&wrapped));
    }

    #[test]
    fn test_explicit_non_retryable_flag_wins_over_transient_cause() {
        let wrapped = wrap_error_with(
            io::Error::new(io::ErrorKind::ConnectionReset, "peer reset"),
            Some("upload rejected"),
            ErrorOptions::new().retryable(false),
        );
        assert!(!wrapped.is_retryable());
        assert!(!is_retryable_error(&wrapped));

        let validation = ResilienceError::with_kind(
            ErrorKind::Validation,
            "payload rejected",
            ErrorOptions::new().cause(ResilienceError::from(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "peer reset",
            ))),
        );
        assert!(!is_retryable_error(&validation));
    }

    #[test]
    fn test_io_error_conversion() {
        fn open_missing() -> Result<(), ResilienceError> {
            Err(io::Error::new(io::ErrorKind::NotFound, "missing.toml"))?;
            Ok(())
        }

        let err = open_missing().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Resource);
        assert!(err.message().contains("missing.toml"));
    }

    #[tokio::test]
    async fn test_timeout_error_conversion() {
        use tokio::time::{timeout, Duration};

        async fn slow() -> Result<(), ResilienceError> {
            timeout(Duration::from_millis(1), tokio::time::sleep(Duration::from_secs(1))).await?;
            Ok(())
        }

        let err = slow().await.unwrap_err();
        assert_eq!(err.code(), "TIMEOUT");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_json_error_conversion() {
        fn parse() -> Result<serde_json::Value, ResilienceError> {
            Ok(serde_json::from_str("{not json")?)
        }

        let err = parse().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.code(), "INVALID_JSON");
    }

    #[test]
    fn test_display_and_source() {
        use std::error::Error;

        let err = wrap_error(io::Error::new(io::ErrorKind::Other, "inner"));
        assert_eq!(err.to_string(), "[UNKNOWN_ERROR] inner");
        assert_eq!(err.source().unwrap().to_string(), "inner");
    }
}
