use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

/// 启动下载前的校验错误
#[derive(Error, Debug)]
pub enum DownloadStartError {
    #[error("Download has already been started")]
    AlreadyDownloading,

    #[error("Save directory does not exist: {}", .0.display())]
    DirectoryDoesNotExist(PathBuf),

    #[error("Failed to create save directory {}: {source}", .path.display())]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// 下载中发生的错误
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Resource size unknown: {0}")]
    SizeUnknown(String),

    #[error("Size probe request failed: {0}")]
    Probe(#[source] reqwest::Error),

    #[error("Chunk {index} failed: {cause}")]
    Fetch {
        index: usize,
        #[source]
        cause: FetchCause,
    },

    #[error("Failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: tokio::io::Error,
    },

    #[error("Download was cancelled")]
    Cancelled,
}

/// Why a single transfer attempt failed.
#[derive(Error, Debug)]
pub enum FetchCause {
    #[error("http request failed: {0}")]
    HttpRequestError(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(StatusCode),

    #[error("expected {expected} bytes, received {received}")]
    LengthMismatch { expected: u64, received: u64 },

    #[error("invalid range header")]
    InvalidRange,

    #[error("cancelled")]
    Cancelled,
}

impl FetchCause {
    /// Transient failures worth another attempt: timeouts, broken connections, 5xx and 429.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchCause::HttpRequestError(err) => {
                err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() || err.is_decode()
            }
            FetchCause::Status(status) => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            FetchCause::LengthMismatch { .. } | FetchCause::InvalidRange | FetchCause::Cancelled => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_classify_statuses() {
        assert!(FetchCause::Status(StatusCode::SERVICE_UNAVAILABLE).is_retryable());
        assert!(FetchCause::Status(StatusCode::INTERNAL_SERVER_ERROR).is_retryable());
        assert!(FetchCause::Status(StatusCode::TOO_MANY_REQUESTS).is_retryable());
        assert!(!FetchCause::Status(StatusCode::NOT_FOUND).is_retryable());
        assert!(!FetchCause::Status(StatusCode::FORBIDDEN).is_retryable());
    }

    #[test]
    fn should_not_retry_terminal_causes() {
        assert!(!FetchCause::LengthMismatch { expected: 10, received: 9 }.is_retryable());
        assert!(!FetchCause::Cancelled.is_retryable());
    }

    #[test]
    fn should_name_failed_chunk() {
        let err = DownloadError::Fetch {
            index: 3,
            cause: FetchCause::LengthMismatch { expected: 100, received: 40 },
        };

        assert_eq!(err.to_string(), "Chunk 3 failed: expected 100 bytes, received 40");
    }
}
