pub mod downloader;
pub mod download_config;
pub mod error;
pub mod retry;
mod chunk_info;
mod chunk_item;
mod chunk_iterator;
mod chunk_manager;
mod chunk_merger;
mod chunk_range;
mod download_way;
mod util;
#[cfg(test)]
mod test_server;
