use crate::config::Config;
use chrono::{DateTime, Local};
use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use tracing_subscriber::{fmt::writer::BoxMakeWriter, EnvFilter};
use url::Url;

type SharedFile = Arc<Mutex<File>>;

/// Holds the run's log file open until the process exits.
pub struct LogGuard {
    pub path: Option<PathBuf>,
    _file: Option<SharedFile>,
}

/// Sends each formatted event to the run file and, on request, to stdout.
#[derive(Clone)]
struct DeckWriter {
    file: Option<SharedFile>,
    echo_stdout: bool,
}

/// Stdout belongs to the terminal UI, so it only receives logs when
/// `SRVDECK_LOG_STDOUT` is set.
pub fn init_logging(config: &Config) -> Option<LogGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    let (path, file) = match open_run_log(Path::new(&config.log_dir), &config.url, Local::now()) {
        Ok(Some((path, file))) => (Some(path), Some(Arc::new(Mutex::new(file)))),
        Ok(None) => (None, None),
        Err(err) => {
            eprintln!("log_file_error: {err}");
            (None, None)
        }
    };
    let writer = DeckWriter {
        file: file.clone(),
        echo_stdout: config.log_stdout,
    };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(BoxMakeWriter::new(move || writer.clone()))
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok()?;
    Some(LogGuard { path, _file: file })
}

impl DeckWriter {
    fn each_sink(&self, mut op: impl FnMut(&mut dyn Write)) {
        if self.echo_stdout {
            op(&mut io::stdout());
        }
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                op(&mut *file);
            }
        }
    }
}

impl Write for DeckWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.each_sink(|sink| {
            let _ = sink.write_all(buf);
        });
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.each_sink(|sink| {
            let _ = sink.flush();
        });
        Ok(())
    }
}

/// One file per run, named after the server it talks to:
/// `srvdeck-<host>-<port>-<YYYYmmdd-HHMMSS>-<pid>.log`.
fn run_log_name(url: &Url, started: DateTime<Local>) -> String {
    let host: String = url
        .host_str()
        .unwrap_or("unknown")
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '.' { ch } else { '_' })
        .collect();
    let port = url
        .port_or_known_default()
        .map(|port| port.to_string())
        .unwrap_or_else(|| "0".to_string());
    format!(
        "srvdeck-{host}-{port}-{}-{}.log",
        started.format("%Y%m%d-%H%M%S"),
        std::process::id()
    )
}

/// An empty log dir disables file output.
fn open_run_log(
    log_dir: &Path,
    url: &Url,
    started: DateTime<Local>,
) -> io::Result<Option<(PathBuf, File)>> {
    if log_dir.to_string_lossy().trim().is_empty() {
        return Ok(None);
    }
    fs::create_dir_all(log_dir)?;
    let path = log_dir.join(run_log_name(url, started));
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    Ok(Some((path, file)))
}
