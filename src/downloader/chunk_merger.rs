use std::path::Path;

use log::debug;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use crate::downloader::chunk_manager::CompletedChunks;
use crate::downloader::error::DownloadError;

/// 按顺序写入所有 chunk
///
/// Creates or truncates `file_path` and writes the slots in index order. On failure the
/// prefix already written stays on disk.
pub async fn merge_chunks(
    file_path: &Path,
    chunks: &CompletedChunks,
    set_len_in_advance: bool,
) -> Result<u64, DownloadError> {
    let write_error = |source| DownloadError::Write { path: file_path.to_path_buf(), source };

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(file_path)
        .await
        .map_err(write_error)?;

    let total_len = chunks.total_len();
    // 提前设置长度，如果存储空间不足将提前报错
    if set_len_in_advance {
        file.set_len(total_len).await.map_err(write_error)?;
    }

    let mut written = 0u64;
    for slot in chunks.slots() {
        file.write_all(slot).await.map_err(write_error)?;
        written += slot.len() as u64;
    }

    file.flush().await.map_err(write_error)?;
    file.sync_all().await.map_err(write_error)?;

    debug!("Wrote {written} bytes in {} chunks to {}", chunks.chunk_count(), file_path.display());

    Ok(written)
}
