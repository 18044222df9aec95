use tokio::sync::broadcast;
use tracing_subscriber::fmt::MakeWriter;

/// Ring size of the log broadcast channel feeding `GET /api/logs`.
pub const LOG_CHANNEL_CAPACITY: usize = 500;

/// Tracing writer that mirrors every formatted line to stdout and to
/// whoever is subscribed to the log stream.
#[derive(Clone)]
pub(crate) struct LogFanoutWriter {
    pub sender: broadcast::Sender<String>,
    pub suppress_stdout: bool,
}

impl<'a> MakeWriter<'a> for LogFanoutWriter {
    type Writer = LogFanout;

    fn make_writer(&'a self) -> Self::Writer {
        LogFanout {
            sender: self.sender.clone(),
            suppress_stdout: self.suppress_stdout,
        }
    }
}

pub(crate) struct LogFanout {
    sender: broadcast::Sender<String>,
    suppress_stdout: bool,
}

impl std::io::Write for LogFanout {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let line = String::from_utf8_lossy(buf).trim_end().to_string();
        // No subscribers is the normal case.
        let _ = self.sender.send(line);
        if !self.suppress_stdout {
            std::io::stdout().write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if !self.suppress_stdout {
            std::io::stdout().flush()?;
        }
        Ok(())
    }
}

/// Installs the global subscriber. Returns false when one was already set.
pub(crate) fn init(level: tracing::Level, sender: broadcast::Sender<String>) -> bool {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(level)
        .with_ansi(false)
        .with_writer(LogFanoutWriter {
            sender,
            suppress_stdout: false,
        })
        .finish();
    tracing::subscriber::set_global_default(subscriber).is_ok()
}
