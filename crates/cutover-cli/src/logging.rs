use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use cutover_core::CutoverLayout;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

pub(crate) const LOG_FILTER_ENV: &str = "CUTOVER_LOG";

/// Keeps the log file open for the lifetime of the process.
pub(crate) struct LogGuard {
    path: Option<PathBuf>,
    _file: Option<Arc<Mutex<File>>>,
}

impl LogGuard {
    pub(crate) fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

struct TeeWriter {
    file: Option<Arc<Mutex<File>>>,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let _ = io::stderr().write_all(buf);
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.write_all(buf);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let _ = io::stderr().flush();
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
        Ok(())
    }
}

pub(crate) fn log_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber writing to stderr and, when the log
/// directory is usable, to `cutover-<stamp>.log` inside it.
pub(crate) fn init_logging(layout: &CutoverLayout) -> LogGuard {
    let path = layout.log_file_path(&Utc::now().format("%Y%m%d-%H%M%S").to_string());
    let file = match open_log_file(&path) {
        Ok(file) => Some(Arc::new(Mutex::new(file))),
        Err(err) => {
            eprintln!("log_file_error: {}: {err}", path.display());
            None
        }
    };

    let writer_file = file.clone();
    let make_writer = BoxMakeWriter::new(move || TeeWriter {
        file: writer_file.clone(),
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(log_filter())
        .with_ansi(false)
        .with_writer(make_writer)
        .try_init();

    LogGuard {
        path: file.is_some().then_some(path),
        _file: file,
    }
}

fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}
