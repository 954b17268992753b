//! Translation of AWS SDK failures into store errors

use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use s3sink_core::StoreError;

/// What the failed request was addressing, for error messages
#[derive(Debug, Clone, Copy)]
pub(crate) struct RequestTarget<'a> {
    pub bucket: &'a str,
    pub token: Option<&'a str>,
}

pub(crate) fn map_sdk_error<E>(err: SdkError<E>, target: RequestTarget<'_>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    match &err {
        SdkError::ServiceError(_) => {
            let message = err
                .message()
                .map(str::to_string)
                .unwrap_or_else(|| DisplayErrorContext(&err).to_string());
            classify(err.code(), message, target)
        }
        // Construction, dispatch, timeout and unparseable responses
        _ => StoreError::Transport(DisplayErrorContext(&err).to_string()),
    }
}

/// Map an S3 error code onto the store error taxonomy
pub(crate) fn classify(code: Option<&str>, message: String, target: RequestTarget<'_>) -> StoreError {
    match code {
        Some("NoSuchBucket") => StoreError::NoSuchBucket {
            bucket: target.bucket.to_string(),
        },
        Some("NoSuchUpload") => StoreError::NoSuchUpload {
            token: target.token.unwrap_or_default().to_string(),
        },
        Some("InvalidPartOrder") => StoreError::InvalidPartOrder(message),
        Some("AccessDenied")
        | Some("InvalidAccessKeyId")
        | Some("SignatureDoesNotMatch")
        | Some("ExpiredToken") => StoreError::AccessDenied(message),
        Some(code) => StoreError::Remote {
            code: code.to_string(),
            message,
        },
        None => StoreError::Remote {
            code: "Unknown".to_string(),
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TARGET: RequestTarget<'static> = RequestTarget {
        bucket: "logs",
        token: Some("upload-1"),
    };

    #[test]
    fn test_known_codes_map_to_variants() {
        assert!(matches!(
            classify(Some("NoSuchBucket"), "gone".into(), TARGET),
            StoreError::NoSuchBucket { bucket } if bucket == "logs"
        ));
        assert!(matches!(
            classify(Some("NoSuchUpload"), "expired".into(), TARGET),
            StoreError::NoSuchUpload { token } if token == "upload-1"
        ));
        assert!(matches!(
            classify(Some("InvalidPartOrder"), "order".into(), TARGET),
            StoreError::InvalidPartOrder(_)
        ));
        assert!(matches!(
            classify(Some("SignatureDoesNotMatch"), "sig".into(), TARGET),
            StoreError::AccessDenied(_)
        ));
    }

    #[test]
    fn test_other_codes_are_kept_verbatim() {
        match classify(Some("EntityTooSmall"), "too small".into(), TARGET) {
            StoreError::Remote { code, message } => {
                assert_eq!(code, "EntityTooSmall");
                assert_eq!(message, "too small");
            }
            other => panic!("unexpected {:?}", other),
        }

        let err = classify(None, "no code".into(), TARGET);
        assert!(matches!(err, StoreError::Remote { .. }));
        assert!(!err.is_retryable());
    }
}
