use std::num::{NonZeroU8, NonZeroUsize};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use futures_util::StreamExt;
use log::{error, info};
use reqwest::header::{HeaderName, HeaderValue};
use tokio_util::sync::CancellationToken;

use segment_downloader::downloader::download_config::HttpDownloadConfig;
use segment_downloader::downloader::downloader::HttpFileDownloader;
use segment_downloader::downloader::retry::RetryPolicy;

use crate::cli::{resolve_destination, CliArgs};
use crate::config::Config;
use crate::progress_bar::ProgressBar;

mod cli;
mod config;
mod logger;
mod progress_bar;

const PROGRESS_INTERVAL: Duration = Duration::from_millis(200);

#[tokio::main]
async fn main() -> ExitCode {
    let started_at = Instant::now();
    let args = CliArgs::parse();
    if let Err(err) = logger::setup_logger(args.log_level, args.log_file.as_deref()) {
        eprintln!("Failed to set up logging: {err:#}");
        return ExitCode::FAILURE;
    }

    let result = run(args).await;
    info!("Operation took {:.2} seconds", started_at.elapsed().as_secs_f64());

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("Download failed: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: CliArgs) -> Result<()> {
    let config = Config::load(args.config.as_deref())?;
    let cancel_token = CancellationToken::new();
    let mut http_config = build_download_config(&args, &config)?;
    http_config.cancel_token = Some(cancel_token.clone());

    let mut downloader = HttpFileDownloader::new(reqwest::Client::new(), Arc::new(http_config));

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling download");
            cancel_token.cancel();
        }
    });

    let future = downloader.download()?;
    tokio::pin!(future);

    let result = if args.no_progress {
        future.await
    } else {
        let mut progress_bar = ProgressBar::new(100);
        let mut downloaded_len_stream = Box::pin(downloader.downloaded_len_stream());
        let mut last_print: Option<Instant> = None;

        let result = loop {
            tokio::select! {
                result = &mut future => break result,
                Some(len) = downloaded_len_stream.next() => {
                    if last_print.is_some_and(|instant| instant.elapsed() < PROGRESS_INTERVAL) {
                        continue;
                    }
                    last_print = Some(Instant::now());
                    progress_bar.print(len, downloader.content_length())?;
                }
            }
        };

        progress_bar.print(downloader.downloaded_len(), downloader.content_length())?;
        progress_bar.finish()?;
        result
    };

    let summary = result?;
    println!("Downloaded {} to {}", args.url, summary.file_path.display());
    info!(
        "{} bytes in {} {}",
        summary.total_len,
        summary.chunk_count,
        if summary.ranged { "ranges" } else { "request" }
    );

    Ok(())
}

fn build_download_config(args: &CliArgs, config: &Config) -> Result<HttpDownloadConfig> {
    let dest = args.dest.as_deref().or(config.download_dir.as_deref());
    let (save_dir, file_name) = resolve_destination(dest, args.name.as_deref(), &args.url)?;

    let chunk_size = args.chunk_size.unwrap_or(config.chunk_size);
    let chunk_size = usize::try_from(chunk_size)
        .ok()
        .and_then(NonZeroUsize::new)
        .context("Chunk size must be a positive number of bytes")?;
    let connection_count = NonZeroU8::new(args.connections.unwrap_or(config.connection_count))
        .context("Connection count must be at least 1")?;

    let mut http_config = HttpDownloadConfig::new(args.url.clone(), save_dir, file_name);
    http_config.chunk_size = chunk_size;
    http_config.download_connection_count = connection_count;
    http_config.retry_policy = RetryPolicy::new(
        args.retry.unwrap_or(config.retry_times),
        Duration::from_millis(config.retry_delay_ms),
    );
    http_config.timeout = args.timeout.or(config.timeout_secs).map(Duration::from_secs);
    http_config.use_browser_user_agent = config.use_browser_user_agent;
    http_config.strict_check_accept_ranges = args.strict_accept_ranges;
    http_config.single_fallback = args.single_fallback;
    http_config.create_dir = args.create_dir;

    let headers = config.headers.iter().map(|(name, value)| (name.as_str(), value.as_str()))
        .chain(args.headers.iter().map(|(name, value)| (name.as_str(), value.as_str())));
    for (name, value) in headers {
        let header_name = HeaderName::try_from(name).with_context(|| format!("Invalid header name: {name}"))?;
        let header_value = HeaderValue::try_from(value).with_context(|| format!("Invalid value for header {name}"))?;
        http_config.header_map.insert(header_name, header_value);
    }

    Ok(http_config)
}
