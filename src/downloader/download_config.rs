use std::num::{NonZeroU8, NonZeroUsize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use headers::{HeaderMap, HeaderMapExt, HeaderValue};
use reqwest::Request;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::downloader::retry::RetryPolicy;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36";

/// 下载配置文件
pub struct HttpDownloadConfig {
    pub url: Arc<Url>,
    pub save_dir: PathBuf,
    pub file_name: String,
    pub create_dir: bool,
    pub chunk_size: NonZeroUsize,
    pub download_connection_count: NonZeroU8,
    pub retry_policy: RetryPolicy,
    // 单个请求的超时时间
    pub timeout: Option<Duration>,
    pub header_map: HeaderMap,
    pub use_browser_user_agent: bool,
    // 服务器未声明 Accept-Ranges: bytes 时改用单连接下载
    pub strict_check_accept_ranges: bool,
    // 无法获取文件大小时改用单连接下载, 否则报错
    pub single_fallback: bool,
    // 提前设置长度，如果存储空间不足将提前报错
    pub set_len_in_advance: bool,
    pub cancel_token: Option<CancellationToken>,
}

impl HttpDownloadConfig {
    pub fn new(url: Url, save_dir: PathBuf, file_name: String) -> Self {
        Self {
            url: Arc::new(url),
            save_dir,
            file_name,
            create_dir: false,
            chunk_size: NonZeroUsize::new(1024 * 1024 * 4).unwrap_or(NonZeroUsize::MIN),
            download_connection_count: NonZeroU8::new(4).unwrap_or(NonZeroU8::MIN),
            retry_policy: RetryPolicy::default(),
            timeout: None,
            header_map: HeaderMap::new(),
            use_browser_user_agent: false,
            strict_check_accept_ranges: false,
            single_fallback: false,
            set_len_in_advance: false,
            cancel_token: None,
        }
    }

    pub fn file_path(&self) -> PathBuf {
        self.save_dir.join(&self.file_name)
    }

    /// GET template shared by the probe and every chunk request.
    pub fn create_http_request(&self) -> Request {
        let url = (*self.url).clone();
        let mut request = Request::new(reqwest::Method::GET, url);
        let header_map = request.headers_mut();

        // 设置 Agent
        if self.use_browser_user_agent {
            header_map.insert(reqwest::header::USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        }
        header_map.insert(reqwest::header::ACCEPT, HeaderValue::from_static("*/*"));
        header_map.typed_insert(headers::Connection::keep_alive());
        for (header_name, header_value) in self.header_map.iter() {
            header_map.insert(header_name, header_value.clone());
        }

        *request.timeout_mut() = self.timeout;

        request
    }
}
