use bytes::Bytes;
use headers::HeaderMapExt;
use log::debug;
use reqwest::{Client, Request};
use tokio_util::sync::CancellationToken;

use crate::downloader::chunk_info::ChunkInfo;
use crate::downloader::error::{DownloadError, FetchCause};
use crate::downloader::retry::{retry_fetch, RetryPolicy};
use crate::downloader::util::{clone_request, read_body, DownloadedLenSender};

/// Fetches the bytes of one planned range.
///
/// Each attempt builds its own request from the template; the only state shared with other
/// chunks is the `Client` (internally synchronized) and the downloaded length counter.
pub struct ChunkItem {
    client: Client,
    retry_policy: RetryPolicy,
    cancel_token: CancellationToken,
    downloaded_len: DownloadedLenSender,
    pub chunk_info: ChunkInfo,
}

impl ChunkItem {
    pub fn new(
        client: Client,
        chunk_info: ChunkInfo,
        retry_policy: RetryPolicy,
        cancel_token: CancellationToken,
        downloaded_len: DownloadedLenSender,
    ) -> Self {
        Self {
            client,
            retry_policy,
            cancel_token,
            downloaded_len,
            chunk_info,
        }
    }

    /// 执行下载 chunk，并进行 n 次重试
    pub async fn download(&self, request: Request) -> Result<Bytes, DownloadError> {
        let label = format!("Chunk {} ({}-{})", self.chunk_info.index, self.chunk_info.range.start, self.chunk_info.range.end);

        let bytes = retry_fetch(&self.retry_policy, &self.cancel_token, &label, || self.fetch_chunk(&request))
            .await
            .map_err(|cause| DownloadError::Fetch { index: self.chunk_info.index, cause })?;

        debug!("{label} finished");

        Ok(bytes)
    }

    async fn fetch_chunk(&self, request: &Request) -> Result<Bytes, FetchCause> {
        // 写入 range 头
        let mut range_request = clone_request(request);
        let range_header = self.chunk_info.range.to_range_header().map_err(|_| FetchCause::InvalidRange)?;
        range_request.headers_mut().typed_insert(range_header);

        let response = self.client.execute(range_request).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchCause::Status(status));
        }

        read_body(response, Some(self.chunk_info.range.len()), &self.downloaded_len).await
    }
}
