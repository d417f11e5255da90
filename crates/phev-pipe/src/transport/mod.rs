//! Transport adapters
//!
//! The pipe reads and writes through `LazyConnection`, which opens the
//! underlying channel on first use and reopens it after an I/O failure.

pub mod serial;
mod stream;

use std::io::{self, Read, Write};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::PipeError;

pub use serial::{list_ports, open_port, PortInfo, SerialConnector, DEFAULT_BAUD_RATE};
pub use stream::{Channel, SerialChannel, TcpChannel, TcpConnector};

/// Default read timeout applied to freshly opened channels
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 100;

/// Opens channels on demand
pub trait Connector: Send {
    /// Open a new channel
    fn connect(&mut self) -> Result<Box<dyn Channel>, PipeError>;

    /// Human readable endpoint description for logs
    fn describe(&self) -> String;
}

/// Hook run immediately before a connection is opened
pub type PreConnectHook = Box<dyn FnMut() -> Result<(), PipeError> + Send>;

/// A connection that is only established when first used
pub struct LazyConnection {
    name: &'static str,
    connector: Box<dyn Connector>,
    channel: Option<Box<dyn Channel>>,
    pre_connect: Option<PreConnectHook>,
    read_timeout: Duration,
    tx_bytes: u64,
    rx_bytes: u64,
}

impl LazyConnection {
    /// Wrap a connector; nothing is opened yet
    pub fn new(name: &'static str, connector: Box<dyn Connector>) -> Self {
        Self {
            name,
            connector,
            channel: None,
            pre_connect: None,
            read_timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
            tx_bytes: 0,
            rx_bytes: 0,
        }
    }

    /// Run `hook` before every connection attempt
    pub fn with_pre_connect_hook(mut self, hook: PreConnectHook) -> Self {
        self.pre_connect = Some(hook);
        self
    }

    /// Read timeout applied to the channel once opened
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Check whether a channel is open
    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    /// Open the channel if it is not open yet
    pub fn connect(&mut self) -> Result<(), PipeError> {
        self.channel_mut().map(|_| ())
    }

    /// Close the channel; the next read or write reconnects
    pub fn disconnect(&mut self) {
        if self.channel.take().is_some() {
            info!(connection = self.name, "disconnected");
        }
    }

    /// Read whatever is available. A read timeout yields `Ok(0)`.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, PipeError> {
        let result = self.channel_mut()?.read(buf);
        match result {
            Ok(0) => {
                warn!(connection = self.name, "end of stream");
                self.disconnect();
                Err(PipeError::NotConnected)
            }
            Ok(n) => {
                self.rx_bytes = self.rx_bytes.saturating_add(n as u64);
                Ok(n)
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                Ok(0)
            }
            Err(e) => {
                warn!(connection = self.name, error = %e, "read failed");
                self.disconnect();
                Err(PipeError::Io(e))
            }
        }
    }

    /// Write all of `data` and flush
    pub fn write(&mut self, data: &[u8]) -> Result<(), PipeError> {
        let channel = self.channel_mut()?;
        let result = channel.write_all(data).and_then(|_| channel.flush());
        match result {
            Ok(()) => {
                self.tx_bytes = self.tx_bytes.saturating_add(data.len() as u64);
                Ok(())
            }
            Err(e) => {
                warn!(connection = self.name, error = %e, "write failed");
                self.disconnect();
                Err(PipeError::Io(e))
            }
        }
    }

    /// Cumulative (tx, rx) byte counters
    pub fn counters(&self) -> (u64, u64) {
        (self.tx_bytes, self.rx_bytes)
    }

    /// Connection name used in logs
    pub fn name(&self) -> &'static str {
        self.name
    }

    fn channel_mut(&mut self) -> Result<&mut Box<dyn Channel>, PipeError> {
        if self.channel.is_none() {
            if let Some(hook) = self.pre_connect.as_mut() {
                debug!(connection = self.name, "running pre-connect hook");
                hook()?;
            }

            let endpoint = self.connector.describe();
            let mut channel = self.connector.connect()?;
            channel.set_timeout(self.read_timeout)?;
            info!(connection = self.name, %endpoint, "connected");
            self.channel = Some(channel);
        }

        self.channel.as_mut().ok_or(PipeError::NotConnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// In-memory channel: reads pop scripted chunks, writes are recorded
    struct ScriptedChannel {
        reads: VecDeque<io::Result<Vec<u8>>>,
        written: Arc<Mutex<Vec<u8>>>,
    }

    impl Read for ScriptedChannel {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.reads.pop_front() {
                Some(Ok(chunk)) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                Some(Err(e)) => Err(e),
                None => Err(io::ErrorKind::TimedOut.into()),
            }
        }
    }

    impl Write for ScriptedChannel {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Channel for ScriptedChannel {
        fn set_timeout(&mut self, _timeout: Duration) -> io::Result<()> {
            Ok(())
        }
    }

    struct ScriptedConnector {
        connects: Arc<AtomicUsize>,
        reads: Vec<io::Result<Vec<u8>>>,
        written: Arc<Mutex<Vec<u8>>>,
    }

    impl Connector for ScriptedConnector {
        fn connect(&mut self) -> Result<Box<dyn Channel>, PipeError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(ScriptedChannel {
                reads: self.reads.drain(..).collect(),
                written: self.written.clone(),
            }))
        }

        fn describe(&self) -> String {
            "scripted".to_string()
        }
    }

    fn scripted(reads: Vec<io::Result<Vec<u8>>>) -> (LazyConnection, Arc<AtomicUsize>, Arc<Mutex<Vec<u8>>>) {
        let connects = Arc::new(AtomicUsize::new(0));
        let written = Arc::new(Mutex::new(Vec::new()));
        let connector = ScriptedConnector {
            connects: connects.clone(),
            reads,
            written: written.clone(),
        };
        (LazyConnection::new("test", Box::new(connector)), connects, written)
    }

    #[test]
    fn test_connects_lazily() {
        let (mut conn, connects, written) = scripted(vec![]);
        assert!(!conn.is_connected());
        assert_eq!(connects.load(Ordering::SeqCst), 0);

        conn.write(&[1, 2]).unwrap();
        conn.write(&[3]).unwrap();

        assert!(conn.is_connected());
        assert_eq!(connects.load(Ordering::SeqCst), 1);
        assert_eq!(*written.lock().unwrap(), vec![1, 2, 3]);
        assert_eq!(conn.counters(), (3, 0));
    }

    #[test]
    fn test_timeout_reads_zero() {
        let (mut conn, _, _) = scripted(vec![Ok(vec![9, 9])]);
        let mut buf = [0u8; 8];

        assert_eq!(conn.read(&mut buf).unwrap(), 2);
        assert_eq!(conn.read(&mut buf).unwrap(), 0);
        assert!(conn.is_connected());
    }

    #[test]
    fn test_read_error_disconnects() {
        let (mut conn, connects, _) = scripted(vec![Err(io::ErrorKind::BrokenPipe.into())]);
        let mut buf = [0u8; 8];

        assert!(matches!(conn.read(&mut buf), Err(PipeError::Io(_))));
        assert!(!conn.is_connected());

        // Next use reconnects
        assert_eq!(conn.read(&mut buf).unwrap(), 0);
        assert_eq!(connects.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_pre_connect_hook_runs_first() {
        let hook_calls = Arc::new(AtomicUsize::new(0));
        let seen = hook_calls.clone();
        let (conn, connects, _) = scripted(vec![]);
        let connects_at_hook = Arc::new(AtomicUsize::new(usize::MAX));
        let at_hook = connects_at_hook.clone();
        let connects_view = connects.clone();

        let mut conn = conn.with_pre_connect_hook(Box::new(move || {
            seen.fetch_add(1, Ordering::SeqCst);
            at_hook.store(connects_view.load(Ordering::SeqCst), Ordering::SeqCst);
            Ok(())
        }));
        conn.connect().unwrap();
        conn.connect().unwrap();

        assert_eq!(hook_calls.load(Ordering::SeqCst), 1);
        assert_eq!(connects_at_hook.load(Ordering::SeqCst), 0);
        assert_eq!(connects.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failing_hook_blocks_connect() {
        let (conn, connects, _) = scripted(vec![]);
        let mut conn = conn.with_pre_connect_hook(Box::new(|| {
            Err(PipeError::PreConnectHook("no access point".to_string()))
        }));

        assert!(matches!(conn.connect(), Err(PipeError::PreConnectHook(_))));
        assert_eq!(connects.load(Ordering::SeqCst), 0);
    }
}
