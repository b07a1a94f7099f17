use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::Stream;
use log::{info, warn};
use reqwest::Client;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::downloader::chunk_iterator::ChunkIterator;
use crate::downloader::chunk_manager::ChunkManager;
use crate::downloader::chunk_merger::merge_chunks;
use crate::downloader::download_config::HttpDownloadConfig;
use crate::downloader::download_way::{DownloadSingle, DownloadWay};
use crate::downloader::error::{DownloadError, DownloadStartError};
use crate::downloader::util::{get_file_length, DownloadedLenSender};

type DownloadResult = Result<DownloadSummary, DownloadError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSummary {
    pub file_path: PathBuf,
    pub total_len: u64,
    pub chunk_count: usize,
    pub ranged: bool,
}

/// Downloads one remote file: probe, plan, fetch concurrently, then merge in order.
///
/// A downloader runs at most one job.
pub struct HttpFileDownloader {
    client: Client,
    config: Arc<HttpDownloadConfig>,
    cancel_token: CancellationToken,
    started: bool,
    // 发送接收数据接收长度
    downloaded_len_sender: DownloadedLenSender,
    downloaded_len_receiver: watch::Receiver<u64>,
    content_length_sender: Arc<watch::Sender<Option<u64>>>,
    content_length_receiver: watch::Receiver<Option<u64>>,
}

impl HttpFileDownloader {
    pub fn new(client: Client, config: Arc<HttpDownloadConfig>) -> Self {
        let cancel_token = match &config.cancel_token {
            Some(token) => token.child_token(),
            None => CancellationToken::new(),
        };
        let (downloaded_len_sender, downloaded_len_receiver) = watch::channel(0);
        let (content_length_sender, content_length_receiver) = watch::channel(None);

        Self {
            client,
            config,
            cancel_token,
            started: false,
            downloaded_len_sender: Arc::new(downloaded_len_sender),
            downloaded_len_receiver,
            content_length_sender: Arc::new(content_length_sender),
            content_length_receiver,
        }
    }

    pub fn downloaded_len(&self) -> u64 {
        *self.downloaded_len_receiver.borrow()
    }

    /// Probed size of the remote file, once known.
    pub fn content_length(&self) -> Option<u64> {
        *self.content_length_receiver.borrow()
    }

    pub fn downloaded_len_stream(&self) -> impl Stream<Item = u64> + 'static {
        let mut receiver = self.downloaded_len_receiver.clone();

        async_stream::stream! {
            let len = *receiver.borrow_and_update();
            yield len;

            while receiver.changed().await.is_ok() {
                let len = *receiver.borrow_and_update();
                yield len;
            }
        }
    }

    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub fn download(&mut self) -> Result<impl Future<Output = DownloadResult> + Send + 'static, DownloadStartError> {
        if self.started {
            return Err(DownloadStartError::AlreadyDownloading);
        }

        let save_dir = &self.config.save_dir;
        if !save_dir.exists() {
            if !self.config.create_dir {
                return Err(DownloadStartError::DirectoryDoesNotExist(save_dir.clone()));
            }
            std::fs::create_dir_all(save_dir).map_err(|source| DownloadStartError::CreateDirectory {
                path: save_dir.clone(),
                source,
            })?;
        }

        self.started = true;

        Ok(run_download(
            self.client.clone(),
            self.config.clone(),
            self.cancel_token.clone(),
            self.downloaded_len_sender.clone(),
            self.content_length_sender.clone(),
        ))
    }
}

async fn run_download(
    client: Client,
    config: Arc<HttpDownloadConfig>,
    cancel_token: CancellationToken,
    downloaded_len: DownloadedLenSender,
    content_length: Arc<watch::Sender<Option<u64>>>,
) -> DownloadResult {
    let request = config.create_http_request();

    let probe_result = tokio::select! {
        result = get_file_length(&client, &request) => result,
        _ = cancel_token.cancelled() => return Err(DownloadError::Cancelled),
    };
    let remote_file = match probe_result {
        Ok(remote_file) => Some(remote_file),
        Err(DownloadError::SizeUnknown(reason)) if config.single_fallback => {
            warn!("{reason}, falling back to a single connection");
            None
        }
        Err(err) => return Err(err),
    };
    content_length.send_replace(remote_file.map(|info| info.content_length));

    let download_way = match remote_file {
        Some(info) if info.accept_ranges || !config.strict_check_accept_ranges => {
            DownloadWay::Range(ChunkManager::new(
                config.download_connection_count,
                config.retry_policy,
                ChunkIterator::new(config.chunk_size, info.content_length),
                client,
                cancel_token,
                downloaded_len,
            ))
        }
        Some(info) => {
            warn!("Server does not accept byte ranges, falling back to a single connection");
            DownloadWay::Single(DownloadSingle::new(
                client,
                Some(info.content_length),
                config.retry_policy,
                cancel_token,
                downloaded_len,
            ))
        }
        None => DownloadWay::Single(DownloadSingle::new(
            client,
            None,
            config.retry_policy,
            cancel_token,
            downloaded_len,
        )),
    };

    let chunks = download_way.start_download(request).await?;

    let file_path = config.file_path();
    let total_len = merge_chunks(&file_path, &chunks, config.set_len_in_advance).await?;
    info!("Downloaded {} to {}", config.url, file_path.display());

    Ok(DownloadSummary {
        file_path,
        total_len,
        chunk_count: download_way.chunk_count(),
        ranged: download_way.is_ranged(),
    })
}
