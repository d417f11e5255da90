//! Domain events derived from vehicle registers

use std::fmt;

use serde::{Serialize, Serializer};
use tracing::{debug, trace, warn};

use crate::protocol::{hex_dump, MessageKind, ProtocolMessage, Register, VIN_LEN};

/// Vehicle identification number as reported by the gateway
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Vin([u8; VIN_LEN]);

impl Vin {
    /// Build a VIN from exactly 17 bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; VIN_LEN] = bytes.try_into().ok()?;
        Some(Self(raw))
    }

    /// Raw VIN bytes
    pub fn as_bytes(&self) -> &[u8; VIN_LEN] {
        &self.0
    }
}

impl fmt::Display for Vin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for Vin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vin({})", self)
    }
}

impl Serialize for Vin {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Event raised towards the application
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipeEvent {
    /// The vehicle reported its VIN
    VinDiscovered {
        /// Reported VIN
        vin: Vin,
    },
    /// The vehicle acknowledged the pairing start
    PairingAcknowledged,
    /// The vehicle asked the client to register
    RegistrationRequested,
}

/// Map a decoded message to the domain event it carries, if any
pub fn classify(message: &ProtocolMessage) -> Option<PipeEvent> {
    trace!(
        register = %message.register,
        length = message.payload_length(),
        kind = ?message.kind,
        "classifying message"
    );

    let event = match message.register {
        Register::VIN_INFO => vin_event(&message.payload),
        Register::START_AA => match message.kind {
            MessageKind::Response => Some(PipeEvent::PairingAcknowledged),
            MessageKind::Request => None,
        },
        Register::REGISTRATION => match message.kind {
            MessageKind::Request => Some(PipeEvent::RegistrationRequested),
            MessageKind::Response => None,
        },
        other => {
            warn!(register = %other, "register not handled");
            None
        }
    };

    if let Some(ref event) = event {
        debug!(?event, "created event");
    }
    event
}

/// VIN payload is a one-byte tag followed by the 17 VIN characters
fn vin_event(payload: &[u8]) -> Option<PipeEvent> {
    match payload.get(1..1 + VIN_LEN).and_then(Vin::from_bytes) {
        Some(vin) => Some(PipeEvent::VinDiscovered { vin }),
        None => {
            warn!(
                length = payload.len(),
                "VIN payload too short\n{}",
                hex_dump(payload)
            );
            None
        }
    }
}
