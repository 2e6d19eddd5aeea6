use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("invalid URL `{input}`: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("HTTP request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("request failed with HTTP {status} during {operation} for {url}")]
    HttpStatus {
        status: StatusCode,
        url: String,
        operation: &'static str,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("body truncated: expected {expected} bytes, received {received}")]
    Truncated { expected: u64, received: u64 },

    #[error("manifest error: {reason}")]
    Manifest { reason: String },

    #[error("key fetch error for {uri}: {reason}")]
    KeyFetch { uri: String, reason: String },

    #[error("unsupported encryption method `{method}`")]
    UnsupportedEncryption { method: String },

    #[error("segment {index} fetch error: {reason}")]
    SegmentFetch {
        index: usize,
        reason: String,
        retryable: bool,
    },

    #[error("segment {index} decryption error: {reason}")]
    Decryption { index: usize, reason: String },

    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl TransferError {
    pub fn invalid_url(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn http_status(
        status: StatusCode,
        url: impl Into<String>,
        operation: &'static str,
    ) -> Self {
        Self::HttpStatus {
            status,
            url: url.into(),
            operation,
        }
    }

    pub fn manifest(reason: impl Into<String>) -> Self {
        Self::Manifest {
            reason: reason.into(),
        }
    }

    /// Wrap a fetch failure with the index of the segment it belongs to.
    pub fn for_segment(self, index: usize) -> Self {
        match self {
            Self::SegmentFetch { .. } | Self::Decryption { .. } => self,
            other => {
                let retryable = other.is_retryable();
                Self::SegmentFetch {
                    index,
                    reason: other.to_string(),
                    retryable,
                }
            }
        }
    }

    /// Index of the segment that failed, for per-segment errors.
    pub fn segment_index(&self) -> Option<usize> {
        match self {
            Self::SegmentFetch { index, .. } | Self::Decryption { index, .. } => Some(*index),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::InvalidUrl { .. }
            | Self::Manifest { .. }
            | Self::KeyFetch { .. }
            | Self::UnsupportedEncryption { .. }
            | Self::Decryption { .. }
            | Self::Internal { .. } => false,
            Self::HttpStatus { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::SegmentFetch { retryable, .. } => *retryable,
            Self::Network { source } => crate::retry::is_retryable_reqwest_error(source),
            Self::Io { .. } | Self::Truncated { .. } => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_index_is_kept_through_wrapping() {
        let err = TransferError::http_status(StatusCode::BAD_GATEWAY, "https://cdn/2.ts", "segment")
            .for_segment(2);
        assert_eq!(err.segment_index(), Some(2));
        assert!(err.is_retryable());

        let decrypt = TransferError::Decryption {
            index: 4,
            reason: "bad padding".to_string(),
        };
        assert_eq!(decrypt.segment_index(), Some(4));
        assert!(!decrypt.is_retryable());
        assert_eq!(decrypt.for_segment(9).segment_index(), Some(4));
    }

    #[test]
    fn test_client_errors_are_not_retryable() {
        let err = TransferError::http_status(StatusCode::FORBIDDEN, "https://cdn/a", "direct");
        assert!(!err.is_retryable());
        assert_eq!(err.segment_index(), None);
        assert!(
            TransferError::http_status(StatusCode::TOO_MANY_REQUESTS, "https://cdn/a", "direct")
                .is_retryable()
        );
    }
}
