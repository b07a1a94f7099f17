use bytes::Bytes;
use log::info;
use reqwest::{Client, Request};
use tokio_util::sync::CancellationToken;

use crate::downloader::chunk_manager::{ChunkManager, CompletedChunks};
use crate::downloader::error::{DownloadError, FetchCause};
use crate::downloader::retry::{retry_fetch, RetryPolicy};
use crate::downloader::util::{clone_request, read_body, DownloadedLenSender};

/// One non-ranged GET of the whole file.
pub struct DownloadSingle {
    client: Client,
    expected_len: Option<u64>,
    retry_policy: RetryPolicy,
    cancel_token: CancellationToken,
    downloaded_len: DownloadedLenSender,
}

impl DownloadSingle {
    pub fn new(
        client: Client,
        expected_len: Option<u64>,
        retry_policy: RetryPolicy,
        cancel_token: CancellationToken,
        downloaded_len: DownloadedLenSender,
    ) -> Self {
        Self {
            client,
            expected_len,
            retry_policy,
            cancel_token,
            downloaded_len,
        }
    }

    pub async fn start_download(&self, request: Request) -> Result<CompletedChunks, DownloadError> {
        match self.expected_len {
            Some(len) => info!("Downloading {len} bytes over a single connection"),
            None => info!("Downloading unknown length over a single connection"),
        }

        let bytes = retry_fetch(&self.retry_policy, &self.cancel_token, "Whole file", || self.fetch(&request))
            .await
            .map_err(|cause| match cause {
                FetchCause::Cancelled => DownloadError::Cancelled,
                cause => DownloadError::Fetch { index: 0, cause },
            })?;

        Ok(CompletedChunks::whole(bytes))
    }

    async fn fetch(&self, request: &Request) -> Result<Bytes, FetchCause> {
        let response = self.client.execute(clone_request(request)).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchCause::Status(status));
        }

        read_body(response, self.expected_len, &self.downloaded_len).await
    }
}

pub enum DownloadWay {
    Range(ChunkManager),
    Single(DownloadSingle),
}

impl DownloadWay {
    pub fn chunk_count(&self) -> usize {
        match self {
            DownloadWay::Range(chunk_manager) => chunk_manager.chunk_count(),
            DownloadWay::Single(_) => 1,
        }
    }

    pub fn is_ranged(&self) -> bool {
        matches!(self, DownloadWay::Range(_))
    }

    pub async fn start_download(&self, request: Request) -> Result<CompletedChunks, DownloadError> {
        match self {
            DownloadWay::Range(chunk_manager) => chunk_manager.start_download(request).await,
            DownloadWay::Single(single) => single.start_download(request).await,
        }
    }
}
