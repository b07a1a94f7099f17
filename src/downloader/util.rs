use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use headers::HeaderMapExt;
use log::debug;
use reqwest::{Client, Request, Response, header::ACCEPT_RANGES};
use tokio::sync::watch;

use crate::downloader::error::{DownloadError, FetchCause};

pub type DownloadedLenSender = Arc<watch::Sender<u64>>;

/// What the size probe learned about the remote file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteFileInfo {
    pub content_length: u64,
    pub accept_ranges: bool,
}

pub fn clone_request(request: &Request) -> Request {
    let mut req = Request::new(request.method().clone(), request.url().clone());
    *req.headers_mut() = request.headers().clone();
    *req.version_mut() = request.version();
    *req.timeout_mut() = request.timeout().map(Clone::clone);

    req
}

/// 发送 HEAD 请求获取文件大小
///
/// A transport failure is returned as [`DownloadError::Probe`] and is never retried.
pub async fn get_file_length(client: &Client, request: &Request) -> Result<RemoteFileInfo, DownloadError> {
    let mut head_request = clone_request(request);
    *head_request.method_mut() = reqwest::Method::HEAD;

    let response = client.execute(head_request).await.map_err(DownloadError::Probe)?;
    let status = response.status();
    if !status.is_success() {
        return Err(DownloadError::SizeUnknown(format!("HEAD returned HTTP {status}")));
    }

    let content_length = match response.headers().typed_get::<headers::ContentLength>() {
        Some(headers::ContentLength(0)) => {
            return Err(DownloadError::SizeUnknown("Content-Length is 0".to_string()));
        }
        Some(headers::ContentLength(len)) => len,
        None => {
            return Err(DownloadError::SizeUnknown("missing or invalid Content-Length".to_string()));
        }
    };

    let accept_ranges = response
        .headers()
        .get_all(ACCEPT_RANGES)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.split(',').any(|unit| unit.trim().eq_ignore_ascii_case("bytes")));

    debug!("Probed {}: {content_length} bytes, accept ranges: {accept_ranges}", request.url());

    Ok(RemoteFileInfo { content_length, accept_ranges })
}

/// Bytes reported to the progress counter for one response body.
///
/// Unless committed, dropping it takes the reported bytes back.
struct ReportedLen<'a> {
    downloaded_len: &'a DownloadedLenSender,
    len: u64,
}

impl<'a> ReportedLen<'a> {
    fn new(downloaded_len: &'a DownloadedLenSender) -> Self {
        Self { downloaded_len, len: 0 }
    }

    fn add(&mut self, len: u64) {
        self.len += len;
        self.downloaded_len.send_modify(|downloaded| *downloaded += len);
    }

    fn commit(mut self) {
        self.len = 0;
    }
}

impl Drop for ReportedLen<'_> {
    fn drop(&mut self) {
        if self.len > 0 {
            let reported = self.len;
            self.downloaded_len.send_modify(|downloaded| *downloaded = downloaded.saturating_sub(reported));
        }
    }
}

/// 读取响应体
///
/// Stops early once the body grows past `expected_len`. Bytes reported to `downloaded_len`
/// are taken back if the read fails or the future is dropped, so a retried attempt starts
/// from the same count.
pub async fn read_body(
    response: Response,
    expected_len: Option<u64>,
    downloaded_len: &DownloadedLenSender,
) -> Result<Bytes, FetchCause> {
    let capacity = expected_len.unwrap_or_default().min(usize::MAX as u64) as usize;
    let mut buffer = BytesMut::with_capacity(capacity);
    let mut reported = ReportedLen::new(downloaded_len);
    let mut stream = response.bytes_stream();

    while let Some(bytes) = stream.next().await {
        let bytes = bytes?;
        buffer.extend_from_slice(&bytes);
        reported.add(bytes.len() as u64);

        if let Some(expected) = expected_len {
            if buffer.len() as u64 > expected {
                break;
            }
        }
    }

    if let Some(expected) = expected_len {
        if buffer.len() as u64 != expected {
            return Err(FetchCause::LengthMismatch { expected, received: buffer.len() as u64 });
        }
    }

    reported.commit();

    Ok(buffer.freeze())
}
