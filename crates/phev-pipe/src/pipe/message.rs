//! Messages flowing through a chain

use crate::error::PipeError;
use crate::protocol::{CodecError, FrameCodec, ProtocolMessage};

use super::MAX_BUNDLE_MESSAGES;

/// A unit of data moving through a chain.
///
/// Raw messages carry only bytes. Canonical messages also carry the decoded
/// form so later stages never decode the same frame twice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipeMessage {
    data: Vec<u8>,
    decoded: Option<ProtocolMessage>,
}

impl PipeMessage {
    /// Wrap raw bytes
    pub fn raw(data: Vec<u8>) -> Self {
        Self {
            data,
            decoded: None,
        }
    }

    /// Encode a protocol message into its canonical form
    pub fn canonical(codec: &dyn FrameCodec, message: ProtocolMessage) -> Result<Self, CodecError> {
        let data = codec.encode(&message)?;
        Ok(Self {
            data,
            decoded: Some(message),
        })
    }

    /// Encoded bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Decoded message, when this message is canonical
    pub fn decoded(&self) -> Option<&ProtocolMessage> {
        self.decoded.as_ref()
    }

    /// Length of the encoded bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check for an empty message
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Take the encoded bytes
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

/// Frames extracted from one read buffer, in stream order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageBundle {
    messages: Vec<PipeMessage>,
}

impl MessageBundle {
    /// Create an empty bundle
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a frame; fails once the bundle holds `MAX_BUNDLE_MESSAGES`
    pub fn push(&mut self, message: PipeMessage) -> Result<(), PipeError> {
        if self.messages.len() >= MAX_BUNDLE_MESSAGES {
            return Err(PipeError::BundleOverflow {
                capacity: MAX_BUNDLE_MESSAGES,
            });
        }
        self.messages.push(message);
        Ok(())
    }

    /// Number of frames
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check for an empty bundle
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Iterate over the frames
    pub fn iter(&self) -> impl Iterator<Item = &PipeMessage> {
        self.messages.iter()
    }

    /// Take the frames
    pub fn into_messages(self) -> Vec<PipeMessage> {
        self.messages
    }
}
