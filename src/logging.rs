use std::io::Write;
use tokio::sync::broadcast;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use tracing_subscriber::fmt::MakeWriter;

/// Formatted log lines go to stderr (stdout carries command output) and are
/// optionally mirrored into a broadcast channel.
#[derive(Clone)]
pub struct TeeMakeWriter {
    pub sender: Option<broadcast::Sender<String>>,
    pub suppress_stderr: bool,
}

impl<'a> MakeWriter<'a> for TeeMakeWriter {
    type Writer = TeeWriter;

    fn make_writer(&'a self) -> Self::Writer {
        TeeWriter {
            sender: self.sender.clone(),
            suppress_stderr: self.suppress_stderr,
        }
    }
}

pub struct TeeWriter {
    sender: Option<broadcast::Sender<String>>,
    suppress_stderr: bool,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Some(sender) = &self.sender {
            let line = String::from_utf8_lossy(buf).trim_end().to_string();
            let _ = sender.send(line); // no receivers is fine
        }
        if !self.suppress_stderr {
            std::io::stderr().write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if !self.suppress_stderr {
            std::io::stderr().flush()?;
        }
        Ok(())
    }
}

/// Install the global subscriber. Returns false when one was already set.
pub fn init_logging(level: Level, writer: TeeMakeWriter) -> bool {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_ansi(writer.sender.is_none() && !writer.suppress_stderr)
        .with_writer(writer)
        .finish();
    tracing::subscriber::set_global_default(subscriber).is_ok()
}
