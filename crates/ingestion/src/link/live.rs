//! Live device link: serial port or a TCP serial bridge

use std::io::{ErrorKind, Read};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use contracts::DeviceConfig;
use tracing::{debug, error, info, warn};

use super::lines::{dispatch_line, LineBuffer};
use crate::error::LinkError;
use crate::queue::QueueProducer;

/// Pause after a transient read error
const RETRY_PAUSE: Duration = Duration::from_millis(200);

/// Boxed byte source owned by the reading loop
pub(crate) type ByteStream = Box<dyn Read + Send>;

/// Where the live bytes come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveEndpoint {
    /// Local serial device path
    Serial { path: String, baud_rate: u32 },
    /// `tcp://host:port` serial bridge
    Tcp { host_port: String },
}

impl LiveEndpoint {
    /// Interpret a configured address
    pub fn from_address(address: &str, baud_rate: u32) -> Self {
        match address.strip_prefix("tcp://") {
            Some(host_port) => Self::Tcp {
                host_port: host_port.to_string(),
            },
            None => Self::Serial {
                path: address.to_string(),
                baud_rate,
            },
        }
    }
}

/// Live link settings
#[derive(Debug, Clone)]
pub struct LiveLink {
    pub(crate) address: String,
    pub(crate) endpoint: LiveEndpoint,
    pub(crate) read_timeout: Duration,
}

impl LiveLink {
    pub fn new(config: &DeviceConfig) -> Self {
        Self {
            address: config.address.clone(),
            endpoint: LiveEndpoint::from_address(&config.address, config.baud_rate),
            read_timeout: config.read_timeout(),
        }
    }

    pub fn endpoint(&self) -> &LiveEndpoint {
        &self.endpoint
    }

    /// Open the channel; blocking, run it off the async runtime
    pub(crate) fn open(&self) -> Result<ByteStream, LinkError> {
        match &self.endpoint {
            LiveEndpoint::Serial { path, baud_rate } => {
                let port = serialport::new(path.as_str(), *baud_rate)
                    .timeout(self.read_timeout)
                    .open()
                    .map_err(|e| LinkError::connect(&self.address, e))?;
                info!(path = %path, baud_rate, "serial port opened");
                Ok(Box::new(port))
            }
            LiveEndpoint::Tcp { host_port } => {
                let addr = host_port
                    .to_socket_addrs()
                    .map_err(|e| LinkError::connect(&self.address, e))?
                    .next()
                    .ok_or_else(|| LinkError::connect(&self.address, "address did not resolve"))?;
                let stream = TcpStream::connect_timeout(&addr, self.read_timeout.max(Duration::from_secs(1)))
                    .map_err(|e| LinkError::connect(&self.address, e))?;
                stream
                    .set_read_timeout(Some(self.read_timeout))
                    .map_err(|e| LinkError::io(&self.address, e))?;
                info!(peer = %addr, "tcp serial bridge connected");
                Ok(Box::new(stream))
            }
        }
    }
}

/// Blocking reading loop
///
/// Read timeouts are idle time and only re-check the running flag.
/// End of stream and dead connections end the loop; other errors are retried.
pub(crate) fn read_loop(
    mut stream: ByteStream,
    producer: QueueProducer,
    running: Arc<AtomicBool>,
    source: String,
) {
    let mut chunk = [0u8; 1024];
    let mut lines = LineBuffer::default();
    info!(source = %source, "live reading loop started");

    while running.load(Ordering::Relaxed) {
        match stream.read(&mut chunk) {
            Ok(0) => {
                warn!(source = %source, "device closed the stream");
                break;
            }
            Ok(n) => {
                for line in lines.feed(&chunk[..n]) {
                    if dispatch_line(&line, &producer, &source).is_err() {
                        debug!(source = %source, "queue closed, leaving reading loop");
                        return;
                    }
                }
            }
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) if is_fatal(e.kind()) => {
                error!(source = %source, error = %e, "device link lost");
                break;
            }
            Err(e) => {
                warn!(source = %source, error = %e, "transient read error, retrying");
                std::thread::sleep(RETRY_PAUSE);
            }
        }
    }

    info!(source = %source, "live reading loop stopped");
}

fn is_fatal(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::UnexpectedEof
            | ErrorKind::BrokenPipe
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
    )
}
