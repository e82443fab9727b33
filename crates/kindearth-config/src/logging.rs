//! Logging initialization for the storefront client.
//!
//! Every crate logs through `tracing`. The binary calls [`init_logging`] once
//! at startup, which installs:
//! - a compact stderr layer for immediate feedback
//! - a JSONL layer appending to `~/.kindearth/logs/client.jsonl`
//!
//! `RUST_LOG` overrides the configured level for both layers.

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Append-only log file writer shared by every event.
///
/// Each write is flushed so concurrent processes tailing the file see whole lines.
#[derive(Clone)]
struct LogFileWriter {
    inner: Arc<Mutex<BufWriter<File>>>,
}

impl LogFileWriter {
    fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            inner: Arc::new(Mutex::new(BufWriter::with_capacity(8192, file))),
        })
    }
}

impl Write for LogFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self.inner.lock();
        let written = guard.write(buf)?;
        guard.flush()?;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.lock().flush()
    }
}

#[derive(Clone)]
struct LogFileWriterFactory {
    writer: LogFileWriter,
}

impl<'a> MakeWriter<'a> for LogFileWriterFactory {
    type Writer = LogFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.writer.clone()
    }
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Initialize the logging system.
///
/// `log_file` enables the JSONL file layer. If the file cannot be opened the
/// client keeps logging to stderr only. Calling this more than once is a no-op.
///
/// ```ignore
/// init_logging("info", Some(&paths.log_file()));
/// tracing::info!("client started");
/// ```
pub fn init_logging(level: &str, log_file: Option<&Path>) {
    let mut file_error = None;
    let file_layer = log_file.and_then(|path| match LogFileWriter::open(path) {
        Ok(writer) => Some(
            tracing_subscriber::fmt::layer()
                .json()
                .with_target(true)
                .with_current_span(false)
                .with_writer(LogFileWriterFactory { writer })
                .with_filter(env_filter(level)),
        ),
        Err(e) => {
            file_error = Some(format!("{}: {}", path.display(), e));
            None
        }
    });

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .with_writer(io::stderr)
        .with_filter(env_filter(level));

    let installed = tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .is_ok();

    if installed {
        if let Some(error) = file_error {
            tracing::warn!(error = %error, "log file unavailable, logging to stderr only");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::tempdir;

    #[test]
    fn log_file_writer_creates_parent_dirs_and_appends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("logs").join("client.jsonl");

        let mut writer = LogFileWriter::open(&path).unwrap();
        writer.write_all(b"first\n").unwrap();
        let mut again = LogFileWriter::open(&path).unwrap();
        again.write_all(b"second\n").unwrap();

        let mut content = String::new();
        File::open(&path)
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "first\nsecond\n");
    }
}
