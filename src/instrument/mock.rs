//! A mock SR810 that answers the driver's command set from memory.
//!
//! `MockLockin` is both the [`Connector`] and a handle onto the simulated
//! instrument's state. Clone it before handing it to the driver and keep the
//! clone to steer the device (overload, readings, scripted replies) and to
//! inspect every command that went over the wire.
//!
//! Behaviour mirrors the real front end closely enough for the driver's
//! protocol to be exercised:
//!
//! - `SLVL` is rounded to 2 mV and clamped to 0.004-5.000 V
//! - `LIAS?` reports latched bits plus the live overload bit, and clears the
//!   latched bits on read; `*CLS` clears them as well
//! - unknown queries get no reply and surface as a timeout
//! - when no fixed reading is set, `OUTP? 3` returns a slowly varying
//!   synthetic signal around 1 mV

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::trace;

use super::{Connector, Transport};
use crate::error::{DaqError, DaqResult};

const IDN: &str = "Stanford_Research_Systems,SR810,s/n00000,ver1.06";
const OVERLOAD_BIT: u8 = 1 << 2;
const SLVL_MIN: f64 = 0.004;
const SLVL_MAX: f64 = 5.0;
const SLVL_STEP: f64 = 0.002;

/// One message seen on the simulated bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exchange {
    /// Command with no reply.
    Write(String),
    /// Query that expected a reply.
    Query(String),
}

#[derive(Debug)]
struct MockState {
    excitation: f64,
    sensitivity: i64,
    time_constant: i64,
    latched_status: u8,
    status_bits: u8,
    overload: bool,
    reading: Option<f64>,
    phase: f64,
    scripted: HashMap<String, String>,
    traffic: Vec<Exchange>,
    opened: Vec<String>,
    fail_open: Option<String>,
    offline: bool,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            excitation: 1.0,
            sensitivity: 17,
            time_constant: 10,
            latched_status: 0,
            status_bits: 0,
            overload: false,
            reading: None,
            phase: 0.0,
            scripted: HashMap::new(),
            traffic: Vec::new(),
            opened: Vec::new(),
            fail_open: None,
            offline: false,
        }
    }
}

impl MockState {
    fn apply(&mut self, command: &str) {
        let mut parts = command.split_whitespace();
        let mnemonic = parts.next().unwrap_or_default();
        let arg = parts.next();
        match (mnemonic, arg) {
            ("*CLS", None) => self.latched_status = 0,
            ("SLVL", Some(v)) => {
                if let Ok(v) = v.parse::<f64>() {
                    let stepped = (v / SLVL_STEP).round() * SLVL_STEP;
                    self.excitation = stepped.clamp(SLVL_MIN, SLVL_MAX);
                }
            }
            ("SENS", Some(v)) => {
                if let Ok(v) = v.parse() {
                    self.sensitivity = v;
                }
            }
            ("OFLT", Some(v)) => {
                if let Ok(v) = v.parse() {
                    self.time_constant = v;
                }
            }
            // OUTX / OVRM and anything unrecognised are accepted silently.
            _ => {}
        }
    }

    fn answer(&mut self, command: &str) -> Option<String> {
        if let Some(reply) = self.scripted.get(command) {
            return Some(reply.clone());
        }
        match command {
            "*IDN?" => Some(IDN.to_string()),
            "SLVL?" => Some(format!("{:.3}", self.excitation)),
            "SENS?" => Some(self.sensitivity.to_string()),
            "OFLT?" => Some(self.time_constant.to_string()),
            "LIAS?" => {
                let live = if self.overload { OVERLOAD_BIT } else { 0 };
                let word = self.latched_status | self.status_bits | live;
                self.latched_status = 0;
                Some(word.to_string())
            }
            "OUTP? 3" => {
                let volts = self.reading.unwrap_or_else(|| {
                    self.phase += 0.1;
                    1e-3 * (1.0 + 0.2 * self.phase.sin() + 0.02 * (self.phase * 37.0).sin())
                });
                Some(format!("{volts:e}"))
            }
            _ => None,
        }
    }
}

/// Simulated SR810 and its bus.
#[derive(Debug, Clone, Default)]
pub struct MockLockin {
    state: Arc<Mutex<MockState>>,
}

impl MockLockin {
    /// A device in its power-on state with no traffic recorded.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make `OUTP? 3` return a fixed value.
    pub fn set_reading(&self, volts: f64) {
        self.lock().reading = Some(volts);
    }

    /// Drive the live input-overload condition.
    pub fn set_overload(&self, overload: bool) {
        self.lock().overload = overload;
    }

    /// Latch status bits as if a past event had set them.
    pub fn set_latched_status(&self, bits: u8) {
        self.lock().latched_status = bits;
    }

    /// Live status bits reported on every `LIAS?` in addition to overload.
    pub fn set_status_bits(&self, bits: u8) {
        self.lock().status_bits = bits;
    }

    /// Answer `query` with `reply` instead of the simulated value.
    pub fn script_reply(&self, query: &str, reply: &str) {
        self.lock()
            .scripted
            .insert(query.to_string(), reply.to_string());
    }

    /// Refuse the next open with `reason`.
    pub fn fail_next_open(&self, reason: &str) {
        self.lock().fail_open = Some(reason.to_string());
    }

    /// Make every further write and query fail as if the cable were pulled.
    pub fn go_offline(&self) {
        self.lock().offline = true;
    }

    /// Current excitation level in volts.
    pub fn excitation(&self) -> f64 {
        self.lock().excitation
    }

    /// Current sensitivity code.
    pub fn sensitivity(&self) -> i64 {
        self.lock().sensitivity
    }

    /// Current time constant code.
    pub fn time_constant(&self) -> i64 {
        self.lock().time_constant
    }

    /// Everything sent since the last [`clear_traffic`](Self::clear_traffic).
    pub fn traffic(&self) -> Vec<Exchange> {
        self.lock().traffic.clone()
    }

    /// Only the write commands from [`traffic`](Self::traffic).
    pub fn writes(&self) -> Vec<String> {
        self.lock()
            .traffic
            .iter()
            .filter_map(|e| match e {
                Exchange::Write(cmd) => Some(cmd.clone()),
                Exchange::Query(_) => None,
            })
            .collect()
    }

    /// Number of measurement queries seen.
    pub fn measurement_queries(&self) -> usize {
        self.lock()
            .traffic
            .iter()
            .filter(|e| matches!(e, Exchange::Query(q) if q.starts_with("OUTP?")))
            .count()
    }

    /// Addresses passed to every successful open, in order.
    pub fn opened_addresses(&self) -> Vec<String> {
        self.lock().opened.clone()
    }

    /// Forget recorded traffic.
    pub fn clear_traffic(&self) {
        self.lock().traffic.clear();
    }
}

impl Connector for MockLockin {
    type Link = MockLink;

    fn open(&self, address: &str) -> DaqResult<MockLink> {
        let mut state = self.lock();
        if let Some(reason) = state.fail_open.take() {
            return Err(DaqError::ConnectionFailed {
                address: address.to_string(),
                reason,
            });
        }
        state.opened.push(address.to_string());
        Ok(MockLink {
            state: Arc::clone(&self.state),
        })
    }
}

/// Open handle onto a [`MockLockin`].
#[derive(Debug)]
pub struct MockLink {
    state: Arc<Mutex<MockState>>,
}

impl MockLink {
    fn lock_online(&self) -> DaqResult<MutexGuard<'_, MockState>> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.offline {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock bus offline").into());
        }
        Ok(state)
    }
}

impl Transport for MockLink {
    fn write(&mut self, command: &str) -> DaqResult<()> {
        let mut state = self.lock_online()?;
        state.traffic.push(Exchange::Write(command.to_string()));
        state.apply(command);
        Ok(())
    }

    fn query(&mut self, command: &str) -> DaqResult<String> {
        let mut state = self.lock_online()?;
        state.traffic.push(Exchange::Query(command.to_string()));
        let reply = state.answer(command).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::TimedOut,
                format!("no reply to '{command}'"),
            )
        })?;
        trace!("mock reply '{}' -> '{}'", command, reply);
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(bus: &MockLockin) -> DaqResult<MockLink> {
        bus.open("GPIB0::8::INSTR")
    }

    #[test]
    fn lias_clears_latched_bits_on_read() -> DaqResult<()> {
        let bus = MockLockin::new();
        let mut link = link(&bus)?;
        bus.set_latched_status(OVERLOAD_BIT);
        assert_eq!(link.query("LIAS?")?, "4");
        assert_eq!(link.query("LIAS?")?, "0");
        Ok(())
    }

    #[test]
    fn slvl_is_stepped_and_clamped() -> DaqResult<()> {
        let bus = MockLockin::new();
        let mut link = link(&bus)?;
        link.write("SLVL 0.0001")?;
        assert_eq!(bus.excitation(), SLVL_MIN);
        link.write("SLVL 9")?;
        assert_eq!(link.query("SLVL?")?, "5.000");
        Ok(())
    }

    #[test]
    fn unknown_query_times_out() -> DaqResult<()> {
        let bus = MockLockin::new();
        let mut link = link(&bus)?;
        let err = link.query("FREQ?");
        assert!(matches!(err, Err(DaqError::Io(ref e)) if e.kind() == io::ErrorKind::TimedOut));
        Ok(())
    }

    #[test]
    fn offline_bus_fails_io() -> DaqResult<()> {
        let bus = MockLockin::new();
        let mut link = link(&bus)?;
        bus.go_offline();
        assert!(link.write("*CLS").is_err());
        assert!(bus.traffic().is_empty());
        Ok(())
    }

    #[test]
    fn synthetic_reading_parses() -> DaqResult<()> {
        let bus = MockLockin::new();
        let mut link = link(&bus)?;
        let volts: f64 = link.query("OUTP? 3")?.parse().unwrap();
        assert!(volts > 0.5e-3 && volts < 1.5e-3);
        Ok(())
    }
}
