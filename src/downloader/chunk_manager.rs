use std::num::NonZeroU8;

use bytes::Bytes;
use futures_util::stream::FuturesUnordered;
use futures_util::StreamExt;
use log::{debug, error, info};
use reqwest::{Client, Request};
use tokio_util::sync::CancellationToken;

use crate::downloader::chunk_info::ChunkInfo;
use crate::downloader::chunk_item::ChunkItem;
use crate::downloader::chunk_iterator::ChunkIterator;
use crate::downloader::error::{DownloadError, FetchCause};
use crate::downloader::retry::RetryPolicy;
use crate::downloader::util::{clone_request, DownloadedLenSender};

/// Segments of a finished job, in file order. Only built from a fully populated slot array.
#[derive(Debug, Clone)]
pub struct CompletedChunks {
    slots: Vec<Bytes>,
}

impl CompletedChunks {
    pub(crate) fn whole(bytes: Bytes) -> Self {
        Self { slots: vec![bytes] }
    }

    #[cfg(test)]
    pub(crate) fn from_slots(slots: Vec<Bytes>) -> Self {
        Self { slots }
    }

    pub fn slots(&self) -> &[Bytes] {
        &self.slots
    }

    pub fn chunk_count(&self) -> usize {
        self.slots.len()
    }

    pub fn total_len(&self) -> u64 {
        self.slots.iter().map(|slot| slot.len() as u64).sum()
    }
}

/// Runs one [`ChunkItem`] per planned range, at most `connection_count` at a time,
/// and places every result at its range index.
pub struct ChunkManager {
    connection_count: u8,
    retry_policy: RetryPolicy,
    chunk_iter: ChunkIterator,
    client: Client,
    cancel_token: CancellationToken,
    downloaded_len: DownloadedLenSender,
}

impl ChunkManager {
    pub fn new(
        connection_count: NonZeroU8,
        retry_policy: RetryPolicy,
        chunk_iter: ChunkIterator,
        client: Client,
        cancel_token: CancellationToken,
        downloaded_len: DownloadedLenSender,
    ) -> Self {
        Self {
            retry_policy,
            chunk_iter,
            client,
            cancel_token,
            downloaded_len,
            connection_count: connection_count.get(),
        }
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_iter.chunk_count()
    }

    /// Waits for every started chunk before returning, so the result is either the full
    /// slot array or the first failure observed. A failure cancels the chunks still running
    /// and stops new ones from starting.
    pub async fn start_download(&self, request: Request) -> Result<CompletedChunks, DownloadError> {
        let mut chunk_iter = self.chunk_iter.clone();
        let mut slots: Vec<Option<Bytes>> = vec![None; chunk_iter.len()];
        let mut futures_unordered = FuturesUnordered::new();

        info!(
            "Downloading {} bytes in {} chunks over {} connections",
            chunk_iter.content_length(),
            slots.len(),
            self.connection_count
        );

        // 下载连接数的 chunk
        for chunk_info in chunk_iter.by_ref().take(self.connection_count as usize) {
            futures_unordered.push(self.download_chunk(chunk_info, clone_request(&request)));
        }

        let mut failure: Option<DownloadError> = None;
        while let Some((index, result)) = futures_unordered.next().await {
            // 等待 chunk 完成
            match result {
                Ok(bytes) => {
                    slots[index] = Some(bytes);
                }
                Err(err) if failure.is_none() => {
                    let err = match err {
                        // Nothing failed before, so the cancellation came from outside.
                        DownloadError::Fetch { cause: FetchCause::Cancelled, .. } => DownloadError::Cancelled,
                        err => {
                            error!("{err}, cancelling remaining chunks");
                            err
                        }
                    };
                    self.cancel_token.cancel();
                    failure = Some(err);
                }
                Err(err) => {
                    debug!("Discarding result of chunk {index}: {err}");
                }
            }

            if failure.is_none() && !self.cancel_token.is_cancelled() {
                if let Some(chunk_info) = chunk_iter.next() {
                    futures_unordered.push(self.download_chunk(chunk_info, clone_request(&request)));
                }
            }
        }

        if let Some(err) = failure {
            return Err(err);
        }

        // A slot can only be empty when cancellation stopped new chunks from starting.
        let slots = slots
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or(DownloadError::Cancelled)?;

        Ok(CompletedChunks { slots })
    }

    async fn download_chunk(&self, chunk_info: ChunkInfo, request: Request) -> (usize, Result<Bytes, DownloadError>) {
        let chunk_item = ChunkItem::new(
            self.client.clone(),
            chunk_info,
            self.retry_policy,
            self.cancel_token.clone(),
            self.downloaded_len.clone(),
        );

        (chunk_info.index, chunk_item.download(request).await)
    }
}
