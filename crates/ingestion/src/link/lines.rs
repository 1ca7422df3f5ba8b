//! Line framing shared by the byte-stream readers (live, replay)

use std::io::{self, BufRead, Read};

use contracts::{LinkItem, RawLine};
use tracing::{debug, error, info, warn};

use crate::queue::{QueueClosed, QueueProducer};

/// Longest line kept while waiting for a newline
pub(crate) const MAX_LINE_BYTES: usize = 16 * 1024;

/// Splits a byte stream into newline-terminated lines
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Append bytes, returning every completed line
    pub(crate) fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&raw).into_owned());
        }
        if self.pending.len() > MAX_LINE_BYTES {
            warn!(
                bytes = self.pending.len(),
                "discarding oversized partial line without newline"
            );
            self.pending.clear();
        }
        lines
    }
}

/// Result of `read_capped_line`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CappedLine {
    Eof,
    /// `buf` holds the line, newline included when present
    Line,
    /// Line longer than `MAX_LINE_BYTES`, skipped up to its newline
    Oversized(usize),
}

/// Read one line from `reader` into `buf`, buffering at most `MAX_LINE_BYTES`
pub(crate) fn read_capped_line<R: BufRead>(
    reader: &mut R,
    buf: &mut Vec<u8>,
) -> io::Result<CappedLine> {
    buf.clear();
    let n = reader
        .by_ref()
        .take(MAX_LINE_BYTES as u64 + 1)
        .read_until(b'\n', buf)?;
    if n == 0 {
        return Ok(CappedLine::Eof);
    }
    if n <= MAX_LINE_BYTES || buf.last() == Some(&b'\n') {
        return Ok(CappedLine::Line);
    }

    buf.clear();
    let mut skipped = n;
    loop {
        let available = reader.fill_buf()?;
        if available.is_empty() {
            break;
        }
        match available.iter().position(|b| *b == b'\n') {
            Some(pos) => {
                reader.consume(pos + 1);
                skipped += pos + 1;
                break;
            }
            None => {
                let len = available.len();
                reader.consume(len);
                skipped += len;
            }
        }
    }
    Ok(CappedLine::Oversized(skipped))
}

/// Level of a device log line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeviceLog {
    Info,
    Warn,
    Error,
}

/// Device firmware log lines (`[INFO]`, `[WARN]`, `[ERROR]`) without telemetry
pub(crate) fn device_log_level(line: &str) -> Option<DeviceLog> {
    if line.contains('{') {
        return None;
    }
    if line.contains("[ERROR]") {
        Some(DeviceLog::Error)
    } else if line.contains("[WARN]") {
        Some(DeviceLog::Warn)
    } else if line.contains("[INFO]") {
        Some(DeviceLog::Info)
    } else {
        None
    }
}

/// Trim, forward device logs, enqueue everything else
///
/// Device log lines are consumed here and never reach the queue.
pub(crate) fn dispatch_line(
    raw: &str,
    producer: &QueueProducer,
    source: &str,
) -> Result<(), QueueClosed> {
    let line = raw.trim();
    if line.is_empty() {
        return Ok(());
    }

    match device_log_level(line) {
        Some(DeviceLog::Info) => info!(target: "device", source, "{line}"),
        Some(DeviceLog::Warn) => warn!(target: "device", source, "{line}"),
        Some(DeviceLog::Error) => error!(target: "device", source, "{line}"),
        None => {
            debug!(source, bytes = line.len(), "line received");
            producer.push_blocking(LinkItem::Raw(RawLine::new(line)))?;
        }
    }
    Ok(())
}
