use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use log::LevelFilter;
use url::Url;

/// Download a file over HTTP in concurrent byte ranges.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct CliArgs {
    /// URL of the file to download
    #[arg(long)]
    pub url: Url,

    /// Destination directory (defaults to the configured download dir, then the current dir)
    #[arg(long)]
    pub dest: Option<PathBuf>,

    /// File name (defaults to the last segment of the URL path)
    #[arg(long)]
    pub name: Option<String>,

    /// JSON config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Bytes per range request
    #[arg(long)]
    pub chunk_size: Option<u64>,

    /// Maximum concurrent range requests
    #[arg(long)]
    pub connections: Option<u8>,

    /// Retries per range on transient failures
    #[arg(long)]
    pub retry: Option<u8>,

    /// Per-request timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Extra request header, e.g. "Authorization: Bearer ..."
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Download with one plain GET when the size cannot be determined
    #[arg(long)]
    pub single_fallback: bool,

    /// Only split the download when the server advertises byte ranges
    #[arg(long)]
    pub strict_accept_ranges: bool,

    /// Create the destination directory if it does not exist
    #[arg(long)]
    pub create_dir: bool,

    #[arg(long, default_value = "info")]
    pub log_level: LevelFilter,

    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Do not draw the progress bar
    #[arg(long)]
    pub no_progress: bool,
}

fn parse_header(value: &str) -> Result<(String, String)> {
    let (name, value) = value
        .split_once(':')
        .ok_or_else(|| anyhow!("expected \"Name: value\", got {value:?}"))?;
    let name = name.trim();
    if name.is_empty() {
        bail!("header name is empty");
    }

    Ok((name.to_string(), value.trim().to_string()))
}

/// Splits the destination into `(save_dir, file_name)`.
///
/// The file name is `name`, else the last non-empty path segment of `url`. A relative
/// directory is resolved against the current working directory.
pub fn resolve_destination(dest: Option<&Path>, name: Option<&str>, url: &Url) -> Result<(PathBuf, String)> {
    let file_name = match name.filter(|name| !name.is_empty()) {
        Some(name) => name.to_string(),
        None => url
            .path_segments()
            .and_then(|segments| segments.filter(|segment| !segment.is_empty()).last())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("Cannot derive a file name from {url}, use --name"))?,
    };

    let dest = dest.unwrap_or_else(|| Path::new(""));
    let save_dir = if dest.is_absolute() {
        dest.to_path_buf()
    } else {
        std::env::current_dir()
            .context("Failed to get current directory")?
            .join(dest)
    };

    Ok((save_dir, file_name))
}
