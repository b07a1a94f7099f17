use std::fmt::Write;
use std::io::stdout;
use std::time::Instant;

use crossterm::cursor::{MoveToColumn, MoveToPreviousLine};
use crossterm::execute;
use crossterm::terminal::{Clear, ClearType};

pub struct ProgressBar {
    bar_buf: String,
    buf: String,
    start_instant: Instant,
    last_len: u64,
    last_instant: Instant,
    bar_width: usize,
    printed: bool,
}

impl ProgressBar {
    pub fn new(max_width: usize) -> Self {
        let now = Instant::now();
        Self {
            buf: String::new(),
            bar_buf: String::new(),
            start_instant: now,
            last_len: 0,
            last_instant: now,
            bar_width: crossterm::terminal::size().ok()
                .map(|(cols, _rows)| usize::from(cols))
                .unwrap_or(80).min(max_width),
            printed: false,
        }
    }

    fn update(&mut self, downloaded_len: u64, total_len: Option<u64>, speed: u64) -> Result<&str, std::fmt::Error> {
        let (downloaded_len_size, downloaded_len_unit) = Self::byte_unit(downloaded_len);
        let (speed_size, speed_unit) = Self::byte_unit(speed);
        let duration = self.start_instant.elapsed();

        self.bar_buf.clear();
        self.buf.clear();

        let progress = match total_len {
            Some(total_len) if total_len > 0 => {
                let (total_len_size, total_len_unit) = Self::byte_unit(total_len);
                let progress = (downloaded_len.min(total_len) * 100 / total_len) as usize;
                write!(self.bar_buf, "{speed_size:.2} {speed_unit}/s - {progress} % - elapsed: {duration:.2?} ")?;
                write!(self.buf, "{downloaded_len_size:.2} {downloaded_len_unit} / {total_len_size:.2} {total_len_unit}")?;
                progress
            }
            _ => {
                write!(self.bar_buf, "{speed_size:.2} {speed_unit}/s - elapsed: {duration:.2?} ")?;
                write!(self.buf, "{downloaded_len_size:.2} {downloaded_len_unit}")?;
                0
            }
        };

        let padding = self.bar_width.saturating_sub(self.bar_buf.len() + self.buf.len());
        self.bar_buf.extend(std::iter::repeat(' ').take(padding));
        writeln!(self.bar_buf, "{}", self.buf)?;

        let bar_p_width = self.bar_width.saturating_sub(2);
        let progress_width = progress * bar_p_width / 100;
        self.bar_buf.push('[');
        self.bar_buf.extend(std::iter::repeat('█').take(progress_width));
        self.bar_buf.extend(std::iter::repeat(' ').take(bar_p_width - progress_width));
        self.bar_buf.push(']');

        Ok(&self.bar_buf)
    }

    /// Redraws the two progress lines in place.
    pub fn print(&mut self, downloaded_len: u64, total_len: Option<u64>) -> std::io::Result<()> {
        let elapsed = self.last_instant.elapsed().as_secs_f64();
        let speed = if elapsed > 0.0 {
            (downloaded_len.saturating_sub(self.last_len) as f64 / elapsed) as u64
        } else {
            0
        };
        self.last_len = downloaded_len;
        self.last_instant = Instant::now();

        let printed = self.printed;
        self.printed = true;
        let update_value = self.update(downloaded_len, total_len, speed)
            .map_err(std::io::Error::other)?;

        if printed {
            execute!(
                stdout(),
                Clear(ClearType::CurrentLine),
                MoveToPreviousLine(1),
                Clear(ClearType::CurrentLine),
                MoveToColumn(0),
                crossterm::style::Print(update_value),
            )
        } else {
            execute!(stdout(), crossterm::style::Print(update_value))
        }
    }

    pub fn finish(&self) -> std::io::Result<()> {
        if self.printed {
            execute!(stdout(), crossterm::style::Print("\n"))?;
        }

        Ok(())
    }

    fn byte_unit(bytes_count: u64) -> (f32, &'static str) {
        const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

        let mut i = 0;
        let mut bytes_count = bytes_count as f32;
        while bytes_count >= 1024.0 && i < UNITS.len() - 1 {
            i += 1;
            bytes_count /= 1024.0;
        }
        (bytes_count, UNITS[i])
    }
}
