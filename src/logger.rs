//! 日志模块

use std::path::Path;

use anyhow::{Context, Result};
use log::LevelFilter;

pub fn setup_logger(level: LevelFilter, log_file: Option<&Path>) -> Result<()> {
    let mut base_config = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}] {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S"),
                record.level(),
                message
            ))
        })
        .level(level)
        .level_for("reqwest", LevelFilter::Warn)
        .level_for("hyper_util", LevelFilter::Warn)
        .chain(std::io::stderr());

    if let Some(file) = log_file {
        let output = fern::log_file(file)
            .with_context(|| format!("Failed to open log file: {}", file.display()))?;
        base_config = base_config.chain(output);
    }

    base_config.apply()?;

    Ok(())
}
