//! Replay link: plays a captured serial log back line by line

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use contracts::ReplayConfig;
use tracing::{debug, info, warn};

use super::lines::{dispatch_line, read_capped_line, CappedLine, MAX_LINE_BYTES};
use crate::error::LinkError;
use crate::queue::QueueProducer;

/// Longest sleep between running-flag checks
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Replay link settings
#[derive(Debug, Clone)]
pub struct ReplayLink {
    pub(crate) path: PathBuf,
    pub(crate) interval: Duration,
    pub(crate) loop_playback: bool,
}

impl ReplayLink {
    pub fn new(path: impl Into<PathBuf>, config: &ReplayConfig) -> Self {
        Self {
            path: path.into(),
            interval: config.interval(),
            loop_playback: config.loop_playback,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check the capture is readable
    pub(crate) fn open(&self) -> Result<File, LinkError> {
        File::open(&self.path).map_err(|e| LinkError::connect(self.path.display().to_string(), e))
    }
}

/// Blocking playback loop
pub(crate) fn replay_loop(
    link: ReplayLink,
    first: File,
    producer: QueueProducer,
    running: Arc<AtomicBool>,
) {
    let source = link.path.display().to_string();
    let mut file = Some(first);
    let mut passes = 0u64;
    info!(source = %source, loop_playback = link.loop_playback, "replay started");

    'playback: while running.load(Ordering::Relaxed) {
        let reader = match file.take() {
            Some(f) => f,
            None => match link.open() {
                Ok(f) => f,
                Err(e) => {
                    warn!(source = %source, error = %e, "cannot reopen capture");
                    break;
                }
            },
        };
        let mut reader = BufReader::new(reader);
        let mut raw = Vec::new();
        let mut lines = 0u64;

        loop {
            if !running.load(Ordering::Relaxed) {
                break 'playback;
            }
            match read_capped_line(&mut reader, &mut raw) {
                Ok(CappedLine::Eof) => break,
                Ok(CappedLine::Oversized(bytes)) => {
                    warn!(
                        source = %source,
                        bytes,
                        limit = MAX_LINE_BYTES,
                        "skipping oversized capture line"
                    );
                }
                Ok(CappedLine::Line) => {
                    let line = String::from_utf8_lossy(&raw);
                    if line.trim().is_empty() {
                        continue;
                    }
                    if dispatch_line(&line, &producer, &source).is_err() {
                        debug!(source = %source, "queue closed, leaving replay");
                        break 'playback;
                    }
                    lines += 1;
                    if !pause(link.interval, &running) {
                        break 'playback;
                    }
                }
                Err(e) => {
                    warn!(source = %source, error = %e, "capture read failed");
                    break 'playback;
                }
            }
        }

        passes += 1;
        debug!(source = %source, passes, lines, "replay pass finished");
        if !link.loop_playback || lines == 0 {
            break;
        }
    }

    info!(source = %source, passes, "replay stopped");
}

/// Sleep in slices, false when asked to stop meanwhile
fn pause(total: Duration, running: &AtomicBool) -> bool {
    let mut left = total;
    while !left.is_zero() {
        if !running.load(Ordering::Relaxed) {
            return false;
        }
        let step = left.min(SLEEP_SLICE);
        std::thread::sleep(step);
        left -= step;
    }
    running.load(Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{DropPolicy, IngestionQueue};
    use std::io::Write;

    fn capture(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        file
    }

    fn link(path: &Path, loop_playback: bool) -> ReplayLink {
        ReplayLink {
            path: path.to_path_buf(),
            interval: Duration::from_millis(1),
            loop_playback,
        }
    }

    #[test]
    fn test_replay_single_pass() {
        let file = capture(&["a", "", "[INFO] boot", "b"]);
        let link = link(file.path(), false);
        let queue = IngestionQueue::new(8);
        let consumer = queue.consumer();

        let first = link.open().unwrap();
        replay_loop(
            link,
            first,
            queue.producer(DropPolicy::Block),
            Arc::new(AtomicBool::new(true)),
        );
        assert_eq!(consumer.len(), 2);
    }

    #[test]
    fn test_replay_skips_oversized_line() {
        let huge = "x".repeat(MAX_LINE_BYTES * 4);
        let file = capture(&[huge.as_str(), "after"]);
        let link = link(file.path(), false);
        let queue = IngestionQueue::new(8);
        let consumer = queue.consumer();

        let first = link.open().unwrap();
        replay_loop(
            link,
            first,
            queue.producer(DropPolicy::Block),
            Arc::new(AtomicBool::new(true)),
        );
        assert_eq!(consumer.len(), 1);
        match consumer.try_get() {
            Some(contracts::LinkItem::Raw(line)) => assert_eq!(line.text, "after"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_replay_loops_until_queue_closed() {
        let file = capture(&["x", "y"]);
        let link = link(file.path(), true);
        let queue = IngestionQueue::new(5);
        let consumer = queue.consumer();

        let first = link.open().unwrap();
        let producer = queue.producer(DropPolicy::Block);
        let handle = std::thread::spawn(move || {
            replay_loop(link, first, producer, Arc::new(AtomicBool::new(true)))
        });
        while consumer.len() < 5 {
            std::thread::sleep(Duration::from_millis(5));
        }
        queue.close();
        handle.join().unwrap();
        assert_eq!(consumer.len(), 5);
    }

    #[test]
    fn test_missing_capture_fails_to_open() {
        let link = link(Path::new("/nonexistent/capture.log"), false);
        assert!(matches!(link.open(), Err(LinkError::Connect { .. })));
    }

    #[test]
    fn test_pause_stops_early() {
        let running = AtomicBool::new(false);
        assert!(!pause(Duration::from_secs(5), &running));
    }
}
