use std::{
    collections::VecDeque,
    io,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use sr700_common::{FOOTER, HEADER, RECIPE_HEADER};

use crate::transport::{Connector, Transport, TransportError};

pub fn response_packet(flags: u8, temp: u16) -> Vec<u8> {
    let [hi, lo] = temp.to_be_bytes();
    let mut packet = HEADER.to_vec();
    packet.extend_from_slice(&[0x61, 0x74, flags, 0x02, 0x01, 0x00, 0x00, 0x00, hi, lo]);
    packet.extend_from_slice(&FOOTER);
    packet
}

#[derive(Default)]
pub struct ScriptedTransport {
    pub inbound: VecDeque<u8>,
    pub written: Vec<Vec<u8>>,
    pub failing_writes: usize,
    pub failing_reads: usize,
}

impl ScriptedTransport {
    pub fn queue(&mut self, bytes: &[u8]) {
        self.inbound.extend(bytes.iter().copied());
    }

    pub fn last_written(&self) -> Option<&[u8]> {
        self.written.last().map(Vec::as_slice)
    }
}

impl Transport for ScriptedTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<usize, TransportError> {
        if self.failing_writes > 0 {
            self.failing_writes -= 1;
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged").into());
        }
        self.written.push(bytes.to_vec());
        Ok(bytes.len())
    }

    fn read_byte(&mut self) -> Result<Option<u8>, TransportError> {
        if self.failing_reads > 0 {
            self.failing_reads -= 1;
            return Err(io::Error::new(io::ErrorKind::Other, "framing error").into());
        }
        Ok(self.inbound.pop_front())
    }

    fn close(&mut self) {}
}

/// Answers every packet the way the roaster does: recipe replay while
/// addressed with the recipe header, telemetry afterwards.
pub struct SimulatedRoaster {
    temperature: u16,
    pending: VecDeque<u8>,
    unplugged: bool,
}

impl Transport for SimulatedRoaster {
    fn write(&mut self, bytes: &[u8]) -> Result<usize, TransportError> {
        if self.unplugged {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged").into());
        }
        let reply = if bytes.starts_with(&RECIPE_HEADER) {
            response_packet(0xAF, 0xFF00)
        } else {
            response_packet(0x63, self.temperature)
        };
        self.pending.extend(reply);
        Ok(bytes.len())
    }

    fn read_byte(&mut self) -> Result<Option<u8>, TransportError> {
        Ok(self.pending.pop_front())
    }

    fn close(&mut self) {}
}

#[derive(Clone)]
pub struct SimulatedConnector {
    pub temperature: u16,
    pub fail_opens: usize,
    /// Links opened while this is non-zero fail every write.
    pub dead_links: usize,
    pub attempts: Arc<AtomicUsize>,
}

impl SimulatedConnector {
    pub fn new(temperature: u16) -> Self {
        Self {
            temperature,
            fail_opens: 0,
            dead_links: 0,
            attempts: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl Connector for SimulatedConnector {
    fn open(&mut self) -> Result<Box<dyn Transport>, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_opens > 0 {
            self.fail_opens -= 1;
            return Err(TransportError::Open {
                path: self.describe(),
                source: serialport::Error::new(serialport::ErrorKind::NoDevice, "no device"),
            });
        }
        let unplugged = self.dead_links > 0;
        self.dead_links = self.dead_links.saturating_sub(1);
        Ok(Box::new(SimulatedRoaster {
            temperature: self.temperature,
            pending: VecDeque::new(),
            unplugged,
        }))
    }

    fn describe(&self) -> String {
        "simulated".to_string()
    }
}
