//! Demo Mode - Simulated vehicle gateway for testing
//!
//! Produces a plausible gateway byte stream without a real vehicle: a
//! registration request, the VIN, then periodic status frames. Reads sometimes
//! carry several frames and sometimes end with a torn frame. Requests written
//! to the simulator are answered the way the gateway answers them.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::error::PipeError;
use crate::protocol::{
    FrameCodec, MessageKind, PhevCodec, ProtocolMessage, Register, RESPONSE_COMMAND, VIN_LEN,
};
use crate::transport::{Channel, Connector};

/// VIN reported by the simulator
pub const DEMO_VIN: &[u8; VIN_LEN] = b"JMFXDGG2WGZ012345";

/// Registers used for simulated status frames
const STATUS_REGISTERS: [Register; 4] = [Register(0x1d), Register(0x1f), Register(0x24), Register(0x29)];

/// Register of the periodic keep-alive request the gateway expects answered
const KEEP_ALIVE: Register = Register(0x12);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    /// Ask the client to register
    Registration,
    /// Report the VIN
    Vin,
    /// Stream status frames
    Status,
}

/// Simulated gateway channel
pub struct SimulatedVehicle {
    codec: PhevCodec,
    rng: StdRng,
    stage: Stage,
    /// Bytes produced but not yet read
    pending: VecDeque<u8>,
    /// Responses owed to the client for its requests
    answers: VecDeque<Vec<u8>>,
    /// Chance that a status burst ends in a torn frame
    tear_probability: f64,
    /// Delay before each read, standing in for link latency
    interval: Duration,
    written: Arc<Mutex<Vec<u8>>>,
}

impl SimulatedVehicle {
    /// Create a simulator with a fixed seed
    pub fn new(seed: u64) -> Self {
        Self {
            codec: PhevCodec::new(),
            rng: StdRng::seed_from_u64(seed),
            stage: Stage::Registration,
            pending: VecDeque::new(),
            answers: VecDeque::new(),
            tear_probability: 0.1,
            interval: Duration::from_millis(250),
            written: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Set the delay applied before each read
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the chance that a status burst ends in a torn frame
    pub fn with_tear_probability(mut self, probability: f64) -> Self {
        self.tear_probability = probability.clamp(0.0, 1.0);
        self
    }

    /// Shared log of every byte written to the simulator
    pub fn written(&self) -> Arc<Mutex<Vec<u8>>> {
        self.written.clone()
    }

    /// Produce the next burst of gateway traffic
    fn next_burst(&mut self) -> Vec<u8> {
        let mut burst = Vec::new();

        while let Some(answer) = self.answers.pop_front() {
            burst.extend(answer);
        }

        match self.stage {
            Stage::Registration => {
                self.push(&mut burst, ProtocolMessage::request(RESPONSE_COMMAND, Register::REGISTRATION, vec![0x00]));
                self.stage = Stage::Vin;
            }
            Stage::Vin => {
                let mut payload = vec![0x00];
                payload.extend_from_slice(DEMO_VIN);
                self.push(&mut burst, ProtocolMessage::response(RESPONSE_COMMAND, Register::VIN_INFO, payload));
                self.stage = Stage::Status;
            }
            Stage::Status => {
                let count = self.rng.gen_range(1..=3);
                for _ in 0..count {
                    let register = STATUS_REGISTERS[self.rng.gen_range(0..STATUS_REGISTERS.len())];
                    let value: u8 = self.rng.gen_range(0..=100);
                    self.push(&mut burst, ProtocolMessage::response(RESPONSE_COMMAND, register, vec![value]));
                }
                if self.rng.gen_bool(0.2) {
                    self.push(&mut burst, ProtocolMessage::request(RESPONSE_COMMAND, KEEP_ALIVE, vec![0x00]));
                }
                if self.rng.gen_bool(self.tear_probability) {
                    // Start of a frame whose remainder never arrives
                    burst.extend_from_slice(&[RESPONSE_COMMAND, 0x06, 0x01]);
                }
            }
        }

        burst
    }

    fn push(&self, burst: &mut Vec<u8>, message: ProtocolMessage) {
        match self.codec.encode(&message) {
            Ok(frame) => burst.extend(frame),
            Err(e) => debug!(error = %e, "demo frame not encodable"),
        }
    }

    /// Answer every complete request found in `data`
    fn handle_written(&mut self, data: &[u8]) {
        let mut offset = 0;
        while offset < data.len() {
            match self.codec.decode(&data[offset..]) {
                Ok((message, used)) => {
                    offset += used;
                    if message.kind == MessageKind::Request {
                        let answer = self.codec.build_response(&message);
                        if let Ok(frame) = self.codec.encode(&answer) {
                            self.answers.push_back(frame);
                        }
                    }
                }
                Err(_) => break,
            }
        }
    }
}

impl Read for SimulatedVehicle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            if !self.interval.is_zero() {
                std::thread::sleep(self.interval);
            }
            let burst = self.next_burst();
            self.pending.extend(burst);
        }

        let n = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for SimulatedVehicle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written
            .lock()
            .map_err(|_| io::Error::other("demo write log poisoned"))?
            .extend_from_slice(buf);
        self.handle_written(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Channel for SimulatedVehicle {
    fn set_timeout(&mut self, _timeout: Duration) -> io::Result<()> {
        Ok(())
    }
}

/// Connector that opens a fresh simulated session on every connect
#[derive(Debug, Clone)]
pub struct DemoConnector {
    seed: u64,
    interval: Duration,
    written: Arc<Mutex<Vec<u8>>>,
}

impl DemoConnector {
    /// Create a demo connector
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            interval: Duration::from_millis(250),
            written: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Set the delay applied before each read
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Every byte written to any session opened by this connector
    pub fn written(&self) -> Arc<Mutex<Vec<u8>>> {
        self.written.clone()
    }
}

impl Connector for DemoConnector {
    fn connect(&mut self) -> Result<Box<dyn Channel>, PipeError> {
        let mut vehicle = SimulatedVehicle::new(self.seed).with_interval(self.interval);
        vehicle.written = self.written.clone();
        Ok(Box::new(vehicle))
    }

    fn describe(&self) -> String {
        format!("demo://seed={}", self.seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{classify, PipeEvent};
    use crate::protocol::SEND_COMMAND;

    fn read_burst(vehicle: &mut SimulatedVehicle) -> Vec<u8> {
        let mut buf = [0u8; 1024];
        let n = vehicle.read(&mut buf).unwrap();
        buf[..n].to_vec()
    }

    fn quiet(seed: u64) -> SimulatedVehicle {
        SimulatedVehicle::new(seed).with_interval(Duration::ZERO)
    }

    #[test]
    fn test_opening_sequence() {
        let codec = PhevCodec::new();
        let mut vehicle = quiet(1);

        let (registration, _) = codec.decode(&read_burst(&mut vehicle)).unwrap();
        assert_eq!(classify(&registration), Some(PipeEvent::RegistrationRequested));

        let (vin, _) = codec.decode(&read_burst(&mut vehicle)).unwrap();
        match classify(&vin) {
            Some(PipeEvent::VinDiscovered { vin }) => assert_eq!(vin.as_bytes(), DEMO_VIN),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_same_seed_same_stream() {
        let mut a = quiet(7);
        let mut b = quiet(7);
        for _ in 0..10 {
            assert_eq!(read_burst(&mut a), read_burst(&mut b));
        }
    }

    #[test]
    fn test_small_reads_drain_pending() {
        let mut vehicle = quiet(3);
        let mut buf = [0u8; 2];
        let mut total = Vec::new();
        for _ in 0..3 {
            let n = vehicle.read(&mut buf).unwrap();
            total.extend_from_slice(&buf[..n]);
        }
        // Registration frame is six bytes long
        assert_eq!(total.len(), 6);
        assert!(PhevCodec::new().decode(&total).is_ok());
    }

    #[test]
    fn test_answers_client_requests() {
        let codec = PhevCodec::new();
        let mut vehicle = quiet(5);
        let request = ProtocolMessage::request(SEND_COMMAND, Register::START_AA, vec![0x01]);
        vehicle.write_all(&codec.encode(&request).unwrap()).unwrap();

        let burst = read_burst(&mut vehicle);
        let (answer, _) = codec.decode(&burst).unwrap();

        assert_eq!(answer.command, RESPONSE_COMMAND);
        assert_eq!(classify(&answer), Some(PipeEvent::PairingAcknowledged));
        assert!(!vehicle.written().lock().unwrap().is_empty());
    }

    #[test]
    fn test_connector_shares_write_log() {
        let mut connector = DemoConnector::new(9).with_interval(Duration::ZERO);
        let mut channel = connector.connect().unwrap();
        channel.write_all(&[0x01, 0x02]).unwrap();

        assert_eq!(*connector.written().lock().unwrap(), vec![0x01, 0x02]);
    }
}
