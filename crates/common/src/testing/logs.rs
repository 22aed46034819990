//! In-memory capture of structured log output
//!
//! Installs a JSON `fmt` subscriber as the thread default and keeps every
//! line it writes, so tests can assert on event fields and the spans that
//! were open when the event fired.

use std::io;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

/// Shared buffer that collects JSON log lines
#[derive(Debug, Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route events on this thread into the capture until the guard drops
    ///
    /// Use a current-thread runtime (the `#[tokio::test]` default) so that
    /// spawned tasks log into the same capture.
    #[must_use = "capture stops when the guard is dropped"]
    pub fn install(&self) -> DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_writer(self.clone())
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock()).into_owned()
    }

    /// Every captured line that parses as JSON
    pub fn events(&self) -> Vec<serde_json::Value> {
        self.contents().lines().filter_map(|line| serde_json::from_str(line).ok()).collect()
    }

    /// Events whose message equals `message`
    pub fn events_with_message(&self, message: &str) -> Vec<serde_json::Value> {
        self.events()
            .into_iter()
            .filter(|event| event["fields"]["message"].as_str() == Some(message))
            .collect()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.contents().contains(needle)
    }
}

/// Writer handed out per event by [`LogCapture`]
#[derive(Debug)]
pub struct CaptureWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl io::Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = CaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CaptureWriter { buffer: Arc::clone(&self.buffer) }
    }
}
