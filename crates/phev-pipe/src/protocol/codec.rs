//! Frame encoding/decoding
//!
//! Implements the gateway ECU framing.
//!
//! Frame format:
//! - 1 byte: Command
//! - 1 byte: Length (kind + register + payload + checksum)
//! - 1 byte: Kind (0 = request, 1 = response)
//! - 1 byte: Register
//! - N bytes: Payload
//! - 1 byte: Checksum (wrapping sum of all preceding bytes)

use thiserror::Error;

use super::{MessageKind, ProtocolMessage, Register, FRAME_OVERHEAD, MAX_PAYLOAD_SIZE};

/// Errors reported by a frame codec
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Fewer bytes than the frame needs
    #[error("Truncated frame: need {needed} bytes, have {available}")]
    Truncated {
        /// Bytes the frame needs
        needed: usize,
        /// Bytes available
        available: usize,
    },

    /// Length byte smaller than kind, register and checksum
    #[error("Length field too short: {0}")]
    LengthTooShort(u8),

    /// Kind byte is neither request nor response
    #[error("Invalid message kind: {0:#04x}")]
    InvalidKind(u8),

    /// Trailing checksum does not match the frame
    #[error("Checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    ChecksumMismatch {
        /// Checksum computed over the frame
        expected: u8,
        /// Checksum byte found in the frame
        actual: u8,
    },

    /// Payload does not fit in the length byte
    #[error("Payload too large: {0} bytes")]
    PayloadTooLarge(usize),
}

/// Wire codec used by the pipeline stages
pub trait FrameCodec: Send + Sync {
    /// Decode one frame from the start of `data`, returning the message and
    /// the number of bytes it occupied
    fn decode(&self, data: &[u8]) -> Result<(ProtocolMessage, usize), CodecError>;

    /// Encode a message into a complete frame
    fn encode(&self, message: &ProtocolMessage) -> Result<Vec<u8>, CodecError>;

    /// Build the reply the vehicle expects for a request
    fn build_response(&self, request: &ProtocolMessage) -> ProtocolMessage;

    /// Return the first complete, self-consistent frame at the start of `data`
    fn extract_frame<'a>(&self, data: &'a [u8]) -> Result<&'a [u8], CodecError>;
}

/// Codec for the PHEV gateway framing
#[derive(Debug, Clone, Copy, Default)]
pub struct PhevCodec;

impl PhevCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self
    }

    /// Validate the frame at the start of `data` and return its total length
    fn frame_len(data: &[u8]) -> Result<usize, CodecError> {
        if data.len() < FRAME_OVERHEAD {
            return Err(CodecError::Truncated {
                needed: FRAME_OVERHEAD,
                available: data.len(),
            });
        }

        // Length covers kind, register and checksum at minimum
        let length = data[1];
        if length < 3 {
            return Err(CodecError::LengthTooShort(length));
        }

        let total = length as usize + 2;
        if data.len() < total {
            return Err(CodecError::Truncated {
                needed: total,
                available: data.len(),
            });
        }

        let expected = checksum(&data[..total - 1]);
        let actual = data[total - 1];
        if expected != actual {
            return Err(CodecError::ChecksumMismatch { expected, actual });
        }

        Ok(total)
    }
}

impl FrameCodec for PhevCodec {
    fn decode(&self, data: &[u8]) -> Result<(ProtocolMessage, usize), CodecError> {
        let total = Self::frame_len(data)?;

        let kind = MessageKind::from_byte(data[2]).ok_or(CodecError::InvalidKind(data[2]))?;
        let payload = data[4..total - 1].to_vec();

        let message = ProtocolMessage {
            command: data[0],
            register: Register(data[3]),
            kind,
            payload,
        };

        Ok((message, total))
    }

    fn encode(&self, message: &ProtocolMessage) -> Result<Vec<u8>, CodecError> {
        let payload_len = message.payload.len();
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(CodecError::PayloadTooLarge(payload_len));
        }

        let mut bytes = Vec::with_capacity(payload_len + FRAME_OVERHEAD);
        bytes.push(message.command);
        bytes.push((payload_len + 3) as u8);
        bytes.push(message.kind.to_byte());
        bytes.push(message.register.code());
        bytes.extend_from_slice(&message.payload);
        bytes.push(checksum(&bytes));

        Ok(bytes)
    }

    fn build_response(&self, request: &ProtocolMessage) -> ProtocolMessage {
        // Request and response commands are nibble-swapped pairs (0xf6 <-> 0x6f)
        ProtocolMessage::response(
            request.command.rotate_left(4),
            request.register,
            vec![0x00],
        )
    }

    fn extract_frame<'a>(&self, data: &'a [u8]) -> Result<&'a [u8], CodecError> {
        let total = Self::frame_len(data)?;
        Ok(&data[..total])
    }
}

/// Wrapping byte sum used as the frame checksum
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{RESPONSE_COMMAND, SEND_COMMAND};

    #[test]
    fn test_frame_roundtrip() {
        let codec = PhevCodec::new();
        for kind in [MessageKind::Request, MessageKind::Response] {
            for len in [0, 1, 17, MAX_PAYLOAD_SIZE] {
                let payload: Vec<u8> = (0..len).map(|i| i as u8).collect();
                let original = ProtocolMessage::new(RESPONSE_COMMAND, Register(0x12), kind, payload);
                let encoded = codec.encode(&original).expect("Should encode");
                let (decoded, used) = codec.decode(&encoded).expect("Should decode");

                assert_eq!(decoded, original, "kind {kind:?}, payload {len}");
                assert_eq!(used, encoded.len());
                assert_eq!(encoded.len(), len + FRAME_OVERHEAD);
            }
        }
    }

    #[test]
    fn test_known_frame_layout() {
        let codec = PhevCodec::new();
        let msg = ProtocolMessage::response(SEND_COMMAND, Register::START_AA, vec![0x00]);
        let encoded = codec.encode(&msg).unwrap();

        assert_eq!(encoded, vec![0xf6, 0x04, 0x01, 0x01, 0x00, 0xfc]);
    }

    #[test]
    fn test_checksum_verification() {
        let codec = PhevCodec::new();
        let msg = ProtocolMessage::request(RESPONSE_COMMAND, Register(0x20), vec![5, 6]);
        let mut encoded = codec.encode(&msg).unwrap();

        // Corrupt a payload byte
        encoded[4] ^= 0xFF;

        assert!(matches!(
            codec.decode(&encoded),
            Err(CodecError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_truncated_frame() {
        let codec = PhevCodec::new();
        let msg = ProtocolMessage::request(RESPONSE_COMMAND, Register(0x20), vec![5, 6, 7]);
        let encoded = codec.encode(&msg).unwrap();

        let err = codec.extract_frame(&encoded[..encoded.len() - 1]).unwrap_err();
        assert_eq!(
            err,
            CodecError::Truncated {
                needed: encoded.len(),
                available: encoded.len() - 1
            }
        );
    }

    #[test]
    fn test_invalid_kind() {
        let mut frame = vec![0x6f, 0x04, 0x07, 0x10, 0x00];
        frame.push(checksum(&frame));
        assert_eq!(
            PhevCodec::new().decode(&frame).unwrap_err(),
            CodecError::InvalidKind(0x07)
        );
    }

    #[test]
    fn test_length_too_short() {
        let frame = [0x6f, 0x02, 0x00, 0x10, 0x81];
        assert_eq!(
            PhevCodec::new().extract_frame(&frame).unwrap_err(),
            CodecError::LengthTooShort(2)
        );
    }

    #[test]
    fn test_extract_ignores_trailing_bytes() {
        let codec = PhevCodec::new();
        let msg = ProtocolMessage::request(RESPONSE_COMMAND, Register(0x20), vec![9]);
        let mut data = codec.encode(&msg).unwrap();
        let frame_len = data.len();
        data.extend_from_slice(&[0xde, 0xad]);

        assert_eq!(codec.extract_frame(&data).unwrap().len(), frame_len);
    }

    #[test]
    fn test_build_response_swaps_command() {
        let codec = PhevCodec::new();
        let request = ProtocolMessage::request(RESPONSE_COMMAND, Register::REGISTRATION, vec![1]);
        let response = codec.build_response(&request);

        assert_eq!(response.command, SEND_COMMAND);
        assert_eq!(response.register, Register::REGISTRATION);
        assert_eq!(response.kind, MessageKind::Response);
        assert_eq!(response.payload, vec![0x00]);
    }

    #[test]
    fn test_payload_too_large() {
        let msg = ProtocolMessage::request(SEND_COMMAND, Register(1), vec![0; MAX_PAYLOAD_SIZE + 1]);
        assert!(matches!(
            PhevCodec::new().encode(&msg),
            Err(CodecError::PayloadTooLarge(_))
        ));
    }
}
