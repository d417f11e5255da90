//! Frame translation between the vehicle framing and canonical messages

use std::sync::Arc;

use tracing::{debug, error, trace};

use crate::events::{classify, EventBroadcaster};
use crate::protocol::{hex_dump, FrameCodec, ProtocolMessage};

use super::{PipeMessage, TransformFn};

/// Decodes incoming frames and re-encodes them for delivery, raising events
/// on the way out
#[derive(Clone)]
pub struct FrameTranslator {
    codec: Arc<dyn FrameCodec>,
    broadcaster: Arc<EventBroadcaster>,
}

impl FrameTranslator {
    /// Create a translator
    pub fn new(codec: Arc<dyn FrameCodec>, broadcaster: Arc<EventBroadcaster>) -> Self {
        Self { codec, broadcaster }
    }

    /// Decode a raw frame into its canonical form.
    ///
    /// Frames that do not decode are dropped.
    pub fn decode_transform(&self, message: PipeMessage) -> Option<PipeMessage> {
        trace!(length = message.len(), "decode transform");

        let decoded = match self.codec.decode(message.data()) {
            Ok((decoded, _)) => decoded,
            Err(e) => {
                error!(error = %e, "invalid message received");
                debug!("invalid frame\n{}", hex_dump(message.data()));
                return None;
            }
        };

        debug!(
            register = %decoded.register,
            length = decoded.payload_length(),
            kind = ?decoded.kind,
            "decoded message"
        );
        trace!("payload\n{}", hex_dump(&decoded.payload));

        self.to_canonical(decoded)
    }

    /// Classify a message, dispatch its event, and return it in canonical form.
    ///
    /// The event is dispatched before the message is returned.
    pub fn event_transform(&self, message: PipeMessage) -> Option<PipeMessage> {
        trace!(length = message.len(), "event transform");

        // Canonical messages already hold the encoded frame
        if let Some(decoded) = message.decoded() {
            self.raise_event(decoded);
            return Some(message);
        }

        let decoded = match self.codec.decode(message.data()) {
            Ok((decoded, _)) => decoded,
            Err(e) => {
                error!(
                    error = %e,
                    "invalid message at event stage, it should have been validated upstream"
                );
                debug!("invalid frame\n{}", hex_dump(message.data()));
                return None;
            }
        };

        self.raise_event(&decoded);
        self.to_canonical(decoded)
    }

    /// Decode transform as a chain stage
    pub fn decode_stage(&self) -> TransformFn {
        let translator = self.clone();
        Arc::new(move |message| translator.decode_transform(message))
    }

    /// Event transform as a chain stage
    pub fn event_stage(&self) -> TransformFn {
        let translator = self.clone();
        Arc::new(move |message| translator.event_transform(message))
    }

    fn raise_event(&self, decoded: &ProtocolMessage) {
        match classify(decoded) {
            Some(event) => self.broadcaster.dispatch(&event),
            None => debug!(register = %decoded.register, "not sending event"),
        }
    }

    fn to_canonical(&self, decoded: ProtocolMessage) -> Option<PipeMessage> {
        match PipeMessage::canonical(self.codec.as_ref(), decoded) {
            Ok(message) => Some(message),
            Err(e) => {
                error!(error = %e, "failed to encode message");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{PipeContext, PipeEvent};
    use crate::protocol::{PhevCodec, Register};
    use std::sync::Mutex;

    fn translator() -> (FrameTranslator, Arc<Mutex<Vec<PipeEvent>>>) {
        let broadcaster = Arc::new(EventBroadcaster::new(PipeContext::default()));
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        broadcaster.register(move |_: &PipeContext, event: &PipeEvent| {
            sink.lock().unwrap().push(event.clone());
        });
        (
            FrameTranslator::new(Arc::new(PhevCodec::new()), broadcaster),
            events,
        )
    }

    fn raw(msg: &ProtocolMessage) -> PipeMessage {
        PipeMessage::raw(PhevCodec::new().encode(msg).unwrap())
    }

    #[test]
    fn test_decode_transform_canonicalises() {
        let (translator, _) = translator();
        let msg = ProtocolMessage::request(0x6f, Register::REGISTRATION, vec![1]);

        let out = translator.decode_transform(raw(&msg)).expect("decoded");
        assert_eq!(out.decoded(), Some(&msg));
    }

    #[test]
    fn test_decode_transform_drops_invalid() {
        let (translator, events) = translator();
        let out = translator.decode_transform(PipeMessage::raw(vec![0x6f, 0x04, 0x00, 0x10, 0x00, 0x00]));

        assert!(out.is_none());
        assert!(events.lock().unwrap().is_empty());
    }

    #[test]
    fn test_event_transform_dispatches_event() {
        let (translator, events) = translator();
        let msg = ProtocolMessage::response(0x6f, Register::START_AA, vec![0]);

        let canonical = translator.decode_transform(raw(&msg)).unwrap();
        let out = translator.event_transform(canonical).expect("encoded");

        assert_eq!(out.data(), raw(&msg).data());
        assert_eq!(*events.lock().unwrap(), vec![PipeEvent::PairingAcknowledged]);
    }

    #[test]
    fn test_event_transform_decodes_raw_input() {
        let (translator, events) = translator();
        let msg = ProtocolMessage::request(0x6f, Register::REGISTRATION, vec![0]);

        assert!(translator.event_transform(raw(&msg)).is_some());
        assert_eq!(*events.lock().unwrap(), vec![PipeEvent::RegistrationRequested]);
    }

    #[test]
    fn test_event_transform_drops_garbage() {
        let (translator, events) = translator();
        assert!(translator.event_transform(PipeMessage::raw(vec![1, 2, 3])).is_none());
        assert!(events.lock().unwrap().is_empty());
    }
}
