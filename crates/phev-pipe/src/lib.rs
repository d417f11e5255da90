//! # PHEV Pipe
//!
//! Message pipeline between a plug-in hybrid vehicle's gateway link and a
//! client application.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Framing and checksums for the gateway protocol
//! - Reassembly of back-to-back frames from a single read
//! - Automatic replies to vehicle requests
//! - Domain events (VIN, pairing, registration) for the application
//! - Lazy serial and TCP transports, plus a simulated vehicle
//!
//! ## Example
//!
//! ```rust,ignore
//! use phev_pipe::prelude::*;
//!
//! let settings = PipeSettings::new(
//!     "car",
//!     Box::new(TcpConnector::new("127.0.0.1:8080")),
//!     Box::new(SerialConnector::new("/dev/rfcomm0", DEFAULT_BAUD_RATE)),
//! );
//! let pipe = PhevPipe::new(settings);
//! pipe.register_event_listener(|_: &PipeContext, event: &PipeEvent| {
//!     println!("{event:?}");
//! });
//!
//! loop {
//!     pipe.pump_out()?;
//! }
//! ```

pub mod demo;
pub mod error;
pub mod events;
pub mod pipe;
pub mod protocol;
pub mod transport;

pub use error::PipeError;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::demo::{DemoConnector, SimulatedVehicle};
    pub use crate::error::PipeError;
    pub use crate::events::{EventListener, PipeContext, PipeEvent, Vin};
    pub use crate::pipe::{ChainOutput, PhevPipe, PipeMessage, PipeSettings, PipeStats};
    pub use crate::protocol::{FrameCodec, MessageKind, PhevCodec, ProtocolMessage, Register};
    pub use crate::transport::{
        Connector, SerialConnector, TcpConnector, DEFAULT_BAUD_RATE,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
