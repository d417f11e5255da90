//! PHEV Gateway Protocol
//!
//! Message model and framing for the gateway ECU link.
//!
//! Every frame is self-delimiting, so a read buffer can hold several
//! back-to-back frames that are extracted one at a time.

pub mod codec;
pub mod hexdump;
mod message;

pub use codec::{CodecError, FrameCodec, PhevCodec};
pub use hexdump::hex_dump;
pub use message::{MessageKind, ProtocolMessage, Register};

/// Command byte used by the application for requests sent to the vehicle
pub const SEND_COMMAND: u8 = 0xf6;

/// Command byte used by the vehicle for data and responses
pub const RESPONSE_COMMAND: u8 = 0x6f;

/// Length of a vehicle identification number
pub const VIN_LEN: usize = 17;

/// Bytes of framing around the payload: command, length, kind, register, checksum
pub const FRAME_OVERHEAD: usize = 5;

/// Largest payload a single frame can carry (the length byte covers kind,
/// register and checksum as well)
pub const MAX_PAYLOAD_SIZE: usize = u8::MAX as usize - 3;
