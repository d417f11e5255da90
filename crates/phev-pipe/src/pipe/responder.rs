//! Automatic replies to vehicle requests

use std::sync::Arc;

use tracing::{debug, error, trace};

use crate::protocol::{FrameCodec, MessageKind, ProtocolMessage};

use super::{PipeMessage, RespondFn};

/// Builds exactly one reply for each request and none for responses
#[derive(Clone)]
pub struct CommandResponder {
    codec: Arc<dyn FrameCodec>,
}

impl CommandResponder {
    /// Create a responder
    pub fn new(codec: Arc<dyn FrameCodec>) -> Self {
        Self { codec }
    }

    /// Produce the reply for `message`, if it needs one
    pub fn respond(&self, message: Option<&PipeMessage>) -> Option<PipeMessage> {
        let message = message?;
        trace!(length = message.len(), "responder");

        let owned: ProtocolMessage;
        let decoded = match message.decoded() {
            Some(decoded) => decoded,
            None => match self.codec.decode(message.data()) {
                Ok((decoded, _)) => {
                    owned = decoded;
                    &owned
                }
                Err(e) => {
                    debug!(error = %e, "cannot respond to undecodable message");
                    return None;
                }
            },
        };

        if decoded.kind != MessageKind::Request {
            return None;
        }

        let reply = self.codec.build_response(decoded);
        debug!(register = %reply.register, command = reply.command, "responding to request");

        match PipeMessage::canonical(self.codec.as_ref(), reply) {
            Ok(reply) => Some(reply),
            Err(e) => {
                error!(error = %e, "failed to encode reply");
                None
            }
        }
    }

    /// Wrap the responder as a chain respond stage
    pub fn into_stage(self) -> RespondFn {
        Arc::new(move |message: Option<&PipeMessage>| self.respond(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{PhevCodec, Register, SEND_COMMAND};

    fn responder() -> CommandResponder {
        CommandResponder::new(Arc::new(PhevCodec::new()))
    }

    #[test]
    fn test_no_message_no_reply() {
        assert!(responder().respond(None).is_none());
    }

    #[test]
    fn test_request_gets_reply() {
        let codec = PhevCodec::new();
        let request = ProtocolMessage::request(0x6f, Register::REGISTRATION, vec![3]);
        let msg = PipeMessage::raw(codec.encode(&request).unwrap());

        let reply = responder().respond(Some(&msg)).expect("reply");
        let expected = codec.build_response(&request);

        assert!(!reply.is_empty());
        assert_eq!(reply.decoded(), Some(&expected));
        assert_eq!(reply.decoded().unwrap().command, SEND_COMMAND);
    }

    #[test]
    fn test_response_gets_no_reply() {
        let codec = PhevCodec::new();
        let response = ProtocolMessage::response(0x6f, Register::START_AA, vec![0]);
        let msg = PipeMessage::canonical(&codec, response).unwrap();

        assert!(responder().respond(Some(&msg)).is_none());
    }

    #[test]
    fn test_undecodable_gets_no_reply() {
        assert!(responder().respond(Some(&PipeMessage::raw(vec![0; 3]))).is_none());
    }
}
