//! Pipe construction and pumping
//!
//! `PhevPipe` owns both chains and both lazy connections. The two pump
//! methods may run concurrently on separate threads; each connection sits
//! behind its own lock and no pump ever holds both.

use std::any::Any;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::error::PipeError;
use crate::events::{EventBroadcaster, EventListener, PipeContext};
use crate::protocol::{FrameCodec, PhevCodec, ProtocolMessage};
use crate::transport::{Connector, LazyConnection, PreConnectHook, DEFAULT_READ_TIMEOUT_MS};

use super::{
    Chain, ChainConfig, ChainOutput, CommandResponder, FrameReassembler, FrameTranslator,
    PipeMessage, RespondFn, SplitFn, TransformFn, DEFAULT_READ_BUFFER_SIZE,
};

/// Everything needed to build a pipe.
///
/// Stage overrides left as `None` fall back to the built-in stages for the
/// out chain and to no stage for the in chain.
pub struct PipeSettings {
    /// Pipe name, used in logs and handed to listeners
    pub name: String,
    /// Application side ("in")
    pub app: Box<dyn Connector>,
    /// Vehicle side ("out")
    pub vehicle: Box<dyn Connector>,
    /// Wire codec; defaults to `PhevCodec`
    pub codec: Option<Arc<dyn FrameCodec>>,
    /// Runs right before the vehicle connection is opened
    pub pre_connect_hook: Option<PreConnectHook>,
    /// Opaque user data passed to listeners
    pub context: Option<Arc<dyn Any + Send + Sync>>,
    /// Read timeout for both connections
    pub read_timeout: Duration,
    /// Size of each read buffer
    pub read_buffer_size: usize,
    /// In chain splitter (none by default)
    pub input_splitter: Option<SplitFn>,
    /// In chain responder (none by default)
    pub input_responder: Option<RespondFn>,
    /// Out chain splitter (frame reassembler by default)
    pub output_splitter: Option<SplitFn>,
    /// Out chain input transform (frame decode by default)
    pub output_input_transformer: Option<TransformFn>,
    /// Out chain output transform (event classification by default)
    pub output_output_transformer: Option<TransformFn>,
    /// Out chain responder (command responder by default)
    pub output_responder: Option<RespondFn>,
}

impl PipeSettings {
    /// Settings with default stages for the given endpoints
    pub fn new(name: impl Into<String>, app: Box<dyn Connector>, vehicle: Box<dyn Connector>) -> Self {
        Self {
            name: name.into(),
            app,
            vehicle,
            codec: None,
            pre_connect_hook: None,
            context: None,
            read_timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            input_splitter: None,
            input_responder: None,
            output_splitter: None,
            output_input_transformer: None,
            output_output_transformer: None,
            output_responder: None,
        }
    }
}

/// Byte counters for both connections
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct PipeStats {
    pub app_tx: u64,
    pub app_rx: u64,
    pub vehicle_tx: u64,
    pub vehicle_rx: u64,
}

/// Bidirectional pipe between the vehicle link and the application
pub struct PhevPipe {
    name: String,
    codec: Arc<dyn FrameCodec>,
    broadcaster: Arc<EventBroadcaster>,
    in_chain: Chain,
    out_chain: Chain,
    in_conn: Mutex<LazyConnection>,
    out_conn: Mutex<LazyConnection>,
    read_buffer_size: usize,
}

impl PhevPipe {
    /// Build both chains and bind them to lazy connections. Nothing is
    /// connected until the first read or write.
    pub fn new(settings: PipeSettings) -> Self {
        trace!(pipe = %settings.name, "creating pipe");

        let codec: Arc<dyn FrameCodec> = settings
            .codec
            .unwrap_or_else(|| Arc::new(PhevCodec::new()));
        let broadcaster = Arc::new(EventBroadcaster::new(PipeContext::new(
            settings.name.clone(),
            settings.context,
        )));
        let translator = FrameTranslator::new(codec.clone(), broadcaster.clone());

        let in_chain = Chain::new(
            "in",
            ChainConfig {
                split: settings.input_splitter,
                respond: settings.input_responder,
                respond_once: true,
                ..Default::default()
            },
        );

        let out_chain = Chain::new(
            "out",
            ChainConfig {
                input_transform: Some(
                    settings
                        .output_input_transformer
                        .unwrap_or_else(|| translator.decode_stage()),
                ),
                split: Some(
                    settings
                        .output_splitter
                        .unwrap_or_else(|| FrameReassembler::new(codec.clone()).into_stage()),
                ),
                respond: Some(
                    settings
                        .output_responder
                        .unwrap_or_else(|| CommandResponder::new(codec.clone()).into_stage()),
                ),
                output_transform: Some(
                    settings
                        .output_output_transformer
                        .unwrap_or_else(|| translator.event_stage()),
                ),
                respond_once: false,
                ..Default::default()
            },
        );

        let in_conn = LazyConnection::new("app", settings.app).with_read_timeout(settings.read_timeout);
        let mut out_conn =
            LazyConnection::new("vehicle", settings.vehicle).with_read_timeout(settings.read_timeout);
        if let Some(hook) = settings.pre_connect_hook {
            out_conn = out_conn.with_pre_connect_hook(hook);
        }

        debug!(pipe = %settings.name, in_chain = ?in_chain.config(), out_chain = ?out_chain.config(), "pipe created");

        Self {
            name: settings.name,
            codec,
            broadcaster,
            in_chain,
            out_chain,
            in_conn: Mutex::new(in_conn),
            out_conn: Mutex::new(out_conn),
            read_buffer_size: settings.read_buffer_size.max(1),
        }
    }

    /// Pipe name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Codec shared by all stages
    pub fn codec(&self) -> &Arc<dyn FrameCodec> {
        &self.codec
    }

    /// Chain for application to vehicle traffic
    pub fn in_chain(&self) -> &Chain {
        &self.in_chain
    }

    /// Chain for vehicle to application traffic
    pub fn out_chain(&self) -> &Chain {
        &self.out_chain
    }

    /// Install the event listener, replacing any previous one.
    ///
    /// The listener runs on the pump thread while the listener slot is
    /// locked. Calling `register_event_listener` or `deregister_event_listener`
    /// from inside the callback deadlocks.
    pub fn register_event_listener(&self, listener: impl EventListener + 'static) {
        self.broadcaster.register(listener);
    }

    /// Remove the event listener
    pub fn deregister_event_listener(&self) {
        self.broadcaster.deregister();
    }

    /// Event broadcaster used by the out chain
    pub fn broadcaster(&self) -> &Arc<EventBroadcaster> {
        &self.broadcaster
    }

    /// Run a buffer read from the vehicle through the out chain
    pub fn process_out(&self, data: &[u8]) -> ChainOutput {
        self.out_chain.process(data)
    }

    /// Run a buffer read from the application through the in chain
    pub fn process_in(&self, data: &[u8]) -> ChainOutput {
        self.in_chain.process(data)
    }

    /// Read once from the vehicle, reply to it and forward to the application.
    /// Returns the number of bytes read.
    ///
    /// Forwarding still happens when writing a reply fails; the first write
    /// error is returned afterwards.
    pub fn pump_out(&self) -> Result<usize, PipeError> {
        self.pump(&self.out_conn, &self.in_conn, &self.out_chain)
    }

    /// Read once from the application, reply to it and forward to the vehicle.
    /// Returns the number of bytes read.
    pub fn pump_in(&self) -> Result<usize, PipeError> {
        self.pump(&self.in_conn, &self.out_conn, &self.in_chain)
    }

    /// Open the vehicle connection now instead of on first use
    pub fn connect_vehicle(&self) -> Result<(), PipeError> {
        lock(&self.out_conn).connect()
    }

    /// Encode and send a message to the vehicle
    pub fn send_to_vehicle(&self, message: ProtocolMessage) -> Result<(), PipeError> {
        let message = PipeMessage::canonical(self.codec.as_ref(), message)?;
        lock(&self.out_conn).write(message.data())
    }

    /// Encode and send a message to the application
    pub fn send_to_app(&self, message: ProtocolMessage) -> Result<(), PipeError> {
        let message = PipeMessage::canonical(self.codec.as_ref(), message)?;
        lock(&self.in_conn).write(message.data())
    }

    /// Byte counters for both connections
    pub fn stats(&self) -> PipeStats {
        let (app_tx, app_rx) = lock(&self.in_conn).counters();
        let (vehicle_tx, vehicle_rx) = lock(&self.out_conn).counters();
        PipeStats {
            app_tx,
            app_rx,
            vehicle_tx,
            vehicle_rx,
        }
    }

    fn pump(
        &self,
        source: &Mutex<LazyConnection>,
        target: &Mutex<LazyConnection>,
        chain: &Chain,
    ) -> Result<usize, PipeError> {
        let mut buf = vec![0u8; self.read_buffer_size];
        let n = lock(source).read(&mut buf)?;
        if n == 0 {
            return Ok(0);
        }

        let output = chain.process(&buf[..n]);

        // Forwards are written even when the replies fail
        let replied = Self::write_messages(source, &output.replies);
        let forwarded = Self::write_messages(target, &output.forward);

        replied.and(forwarded).map(|_| n)
    }

    fn write_messages(conn: &Mutex<LazyConnection>, messages: &[PipeMessage]) -> Result<(), PipeError> {
        if messages.is_empty() {
            return Ok(());
        }

        let mut conn = lock(conn);
        for message in messages {
            if let Err(e) = conn.write(message.data()) {
                warn!(connection = conn.name(), error = %e, "write failed, dropping remaining messages");
                return Err(e);
            }
        }
        trace!(connection = conn.name(), messages = messages.len(), "messages written");
        Ok(())
    }
}

impl Drop for PhevPipe {
    fn drop(&mut self) {
        info!(pipe = %self.name, stats = ?self.stats(), "pipe closed");
    }
}

fn lock(conn: &Mutex<LazyConnection>) -> MutexGuard<'_, LazyConnection> {
    // Connection state survives a panic in another pump
    conn.lock().unwrap_or_else(|e| e.into_inner())
}
