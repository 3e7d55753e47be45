use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// A `MakeWriter` that drops everything until a log file is attached.
///
/// The subscriber is installed before the config is read; the action log is
/// opened afterwards through the paired `LogFileHandle`.
#[derive(Clone)]
pub struct LazyLogFile {
    inner: Arc<Mutex<Option<File>>>,
}

#[derive(Clone)]
pub struct LogFileHandle {
    inner: Arc<Mutex<Option<File>>>,
}

impl LazyLogFile {
    pub fn new() -> (Self, LogFileHandle) {
        let inner = Arc::new(Mutex::new(None));
        (
            Self {
                inner: inner.clone(),
            },
            LogFileHandle { inner },
        )
    }
}

impl LogFileHandle {
    /// Open `path` for appending and start writing to it.
    pub fn attach(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        if let Ok(mut slot) = self.inner.lock() {
            *slot = Some(file);
        }
        Ok(())
    }
}

pub struct LazyWriter {
    inner: Arc<Mutex<Option<File>>>,
}

impl std::io::Write for LazyWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self.inner.lock() {
            Ok(mut guard) => match guard.as_mut() {
                Some(f) => f.write(buf),
                None => Ok(buf.len()),
            },
            Err(_) => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self.inner.lock() {
            Ok(mut guard) => match guard.as_mut() {
                Some(f) => f.flush(),
                None => Ok(()),
            },
            Err(_) => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for LazyLogFile {
    type Writer = LazyWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LazyWriter {
            inner: self.inner.clone(),
        }
    }
}

/// How much goes to stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalLog {
    /// `vmdeck=info`, overridable through `RUST_LOG`.
    Normal,
    Verbose,
    /// Nothing; stdout carries machine-readable output.
    Off,
}

/// Install the global subscriber: a stderr layer and a file layer that
/// always records `vmdeck=debug` once attached.
pub fn init(terminal: TerminalLog) -> LogFileHandle {
    let terminal_filter = match terminal {
        TerminalLog::Verbose => EnvFilter::new("debug"),
        TerminalLog::Off => EnvFilter::new("off"),
        TerminalLog::Normal => EnvFilter::builder()
            .with_default_directive(
                "vmdeck=info"
                    .parse()
                    .unwrap_or_else(|_| LevelFilter::INFO.into()),
            )
            .from_env_lossy(),
    };

    let terminal_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(terminal_filter);

    let (file_writer, handle) = LazyLogFile::new();
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer)
        .with_filter(EnvFilter::new("vmdeck=debug"));

    tracing_subscriber::registry()
        .with(terminal_layer)
        .with(file_layer)
        .init();

    handle
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn discards_until_attached() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("vmdeck.log");
        let (writer, handle) = LazyLogFile::new();

        writer.make_writer().write_all(b"dropped\n").unwrap();
        assert!(!path.exists());

        handle.attach(&path).unwrap();
        let mut w = writer.make_writer();
        w.write_all(b"kept\n").unwrap();
        w.flush().unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "kept\n");
    }

    #[test]
    fn attach_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vmdeck.log");
        std::fs::write(&path, "earlier\n").unwrap();

        let (writer, handle) = LazyLogFile::new();
        handle.attach(&path).unwrap();
        writer.make_writer().write_all(b"later\n").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "earlier\nlater\n");
    }
}
