//! External destinations for execution records.

use super::record::ExecutionRecord;
use parking_lot::Mutex;
use std::io::{self, BufWriter, Write};

/// Receives every published execution record.
///
/// Sinks are called after the engine has released its state lock. A sink
/// error is logged by the engine and never affects state or the caller's
/// outcome.
pub trait AuditSink: Send + Sync {
    fn append(&self, record: &ExecutionRecord) -> io::Result<()>;

    fn flush(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Writes one JSON document per record, newline separated.
///
/// # Example
///
/// ```rust
/// use warrant::audit::JsonLinesSink;
///
/// let sink = JsonLinesSink::new(Vec::<u8>::new());
/// let bytes = sink.into_inner().unwrap();
/// assert!(bytes.is_empty());
/// ```
pub struct JsonLinesSink<W: Write + Send> {
    writer: Mutex<BufWriter<W>>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(BufWriter::new(writer)),
        }
    }

    /// Flush buffered lines and hand back the writer.
    pub fn into_inner(self) -> io::Result<W> {
        self.writer
            .into_inner()
            .into_inner()
            .map_err(io::IntoInnerError::into_error)
    }
}

impl<W: Write + Send> AuditSink for JsonLinesSink<W> {
    fn append(&self, record: &ExecutionRecord) -> io::Result<()> {
        let mut writer = self.writer.lock();
        serde_json::to_writer(&mut *writer, record)?;
        writer.write_all(b"\n")
    }

    fn flush(&self) -> io::Result<()> {
        self.writer.lock().flush()
    }
}
