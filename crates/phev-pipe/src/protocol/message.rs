//! Protocol message model

use std::fmt;

use serde::{Deserialize, Serialize};

/// Whether a message asks for something or answers it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// Request (kind byte 0)
    Request,
    /// Response (kind byte 1)
    Response,
}

impl MessageKind {
    /// Wire value of the kind byte
    pub fn to_byte(self) -> u8 {
        match self {
            MessageKind::Request => 0,
            MessageKind::Response => 1,
        }
    }

    /// Parse the kind byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(MessageKind::Request),
            1 => Some(MessageKind::Response),
            _ => None,
        }
    }
}

/// Register code identifying what a message is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Register(pub u8);

impl Register {
    /// Pairing start ("AA") handshake
    pub const START_AA: Register = Register(0x01);
    /// Vehicle asks the client to register
    pub const REGISTRATION: Register = Register(0x10);
    /// Vehicle identification number
    pub const VIN_INFO: Register = Register(0x15);

    /// Raw register code
    pub fn code(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}", self.0)
    }
}

/// A decoded protocol message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolMessage {
    /// Command byte (direction/type of exchange)
    pub command: u8,
    /// Register the message refers to
    pub register: Register,
    /// Request or response
    pub kind: MessageKind,
    /// Message payload
    pub payload: Vec<u8>,
}

impl ProtocolMessage {
    /// Create a new message
    pub fn new(command: u8, register: Register, kind: MessageKind, payload: Vec<u8>) -> Self {
        Self {
            command,
            register,
            kind,
            payload,
        }
    }

    /// Create a request message
    pub fn request(command: u8, register: Register, payload: Vec<u8>) -> Self {
        Self::new(command, register, MessageKind::Request, payload)
    }

    /// Create a response message
    pub fn response(command: u8, register: Register, payload: Vec<u8>) -> Self {
        Self::new(command, register, MessageKind::Response, payload)
    }

    /// Payload length in bytes
    pub fn payload_length(&self) -> usize {
        self.payload.len()
    }

    /// Check if this message is a request
    pub fn is_request(&self) -> bool {
        self.kind == MessageKind::Request
    }
}
