//! Synchronous Modbus TCP client for the remote load-cell indicator.
//!
//! Every transaction opens a fresh connection, sends one read-input-registers
//! request and waits for the header and the payload separately, each phase
//! bounded by the configured timeout. Nothing is retried here; the caller
//! decides when to try again (see [`IndicatorClient::reconnect`]).

use std::io::{self, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::{Duration, Instant};

use feeder_traits::{BinReader, Clock};

use crate::error::{HwError, Result};
use crate::modbus::{
    self, BIN_BASE_ADDR, BIN_COUNT, ModbusError, RESPONSE_HEADER_LEN, ReadRequest,
};
use crate::util::{ReadPhase, read_exact_before};

pub const DEFAULT_PORT: u16 = 502;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5_000);
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(2_000);
/// A link with no successful read for this long is reported as disconnected.
pub const LIVENESS_WINDOW_MS: u32 = 30_000;

/// How `read_all_bins` splits the register range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadLayout {
    /// One 8-register read covering bins A..D.
    Full,
    /// Bins A..C in one 6-register read, bin D separately. Used once the slave
    /// has refused the full read.
    Split,
}

pub struct IndicatorClient {
    host: String,
    port: u16,
    unit_id: u8,
    timeout: Duration,
    retry_delay_ms: u32,
    clock: Arc<dyn Clock + Send + Sync>,
    transaction_id: u16,
    last_error: String,
    last_read_ms: Option<u32>,
    last_connect_attempt_ms: Option<u32>,
    connected: bool,
    layout: ReadLayout,
}

impl std::fmt::Debug for IndicatorClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndicatorClient")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("unit_id", &self.unit_id)
            .field("connected", &self.connected)
            .field("layout", &self.layout)
            .finish()
    }
}

impl IndicatorClient {
    pub fn new(clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            unit_id: 1,
            timeout: DEFAULT_TIMEOUT,
            retry_delay_ms: DEFAULT_RETRY_DELAY.as_millis() as u32,
            clock,
            transaction_id: 1,
            last_error: "Not initialized".to_string(),
            last_read_ms: None,
            last_connect_attempt_ms: None,
            connected: false,
            layout: ReadLayout::Full,
        }
    }

    /// Store connection parameters. Reachability is only proven by a read.
    pub fn connect(&mut self, host: impl Into<String>, port: u16, unit_id: u8) {
        self.host = host.into();
        self.port = port;
        self.unit_id = unit_id;
        self.connected = false;
        self.last_error = "Configured".to_string();
        tracing::info!(host = %self.host, port, unit_id, "indicator configured");
    }

    pub fn with_timeouts(mut self, timeout: Duration, retry_delay: Duration) -> Self {
        self.timeout = timeout;
        self.retry_delay_ms = retry_delay.as_millis().min(u128::from(u32::MAX)) as u32;
        self
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn layout(&self) -> ReadLayout {
        self.layout
    }

    pub fn last_error(&self) -> &str {
        &self.last_error
    }

    /// True only if a read succeeded within the liveness window.
    pub fn is_connected(&mut self) -> bool {
        if !self.connected {
            return false;
        }
        let fresh = self
            .last_read_ms
            .is_some_and(|t| self.clock.ms_since(t) < LIVENESS_WINDOW_MS);
        if !fresh {
            self.connected = false;
            self.last_error = "Connection timeout".to_string();
            tracing::warn!(addr = %self.addr(), "no successful indicator read within liveness window");
        }
        fresh
    }

    /// Probe the indicator with a single bin-A read. Attempts closer together
    /// than the retry delay skip the network and report the current link state.
    pub fn reconnect(&mut self) -> bool {
        let now = self.clock.now_ms();
        if self
            .last_connect_attempt_ms
            .is_some_and(|last| now.wrapping_sub(last) < self.retry_delay_ms)
        {
            return self.connected;
        }
        self.last_connect_attempt_ms = Some(now);
        tracing::info!(addr = %self.addr(), "reconnecting to indicator");
        match self.read_registers(BIN_BASE_ADDR, 2) {
            Ok(_) => {
                self.last_error = "Connected".to_string();
                tracing::info!(addr = %self.addr(), "indicator reachable");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "indicator reconnect failed");
                false
            }
        }
    }

    /// Read all four bins. Disabled bins and, in split layout, an unreachable
    /// bin D report 0.0.
    pub fn read_all_bins(&mut self) -> Result<[f32; BIN_COUNT]> {
        match self.layout {
            ReadLayout::Full => match self.read_registers(BIN_BASE_ADDR, 8) {
                Ok(regs) => Ok(weights_from(&regs)),
                Err(HwError::Modbus(
                    e @ (ModbusError::Exception { .. } | ModbusError::ByteCount { .. }),
                )) => {
                    tracing::warn!(error = %e, "full bin read refused; switching to split reads");
                    self.layout = ReadLayout::Split;
                    self.read_split()
                }
                Err(e) => Err(e),
            },
            ReadLayout::Split => self.read_split(),
        }
    }

    /// Read one bin (0 = A .. 3 = D).
    pub fn read_bin(&mut self, index: usize) -> Result<f32> {
        if index >= BIN_COUNT {
            return Err(HwError::BinIndex(index));
        }
        let regs = self.read_registers(modbus::bin_address(index), 2)?;
        Ok(modbus::bin_weight(regs[0], regs[1]))
    }

    fn read_split(&mut self) -> Result<[f32; BIN_COUNT]> {
        let regs = self.read_registers(BIN_BASE_ADDR, 6)?;
        let mut weights = [0.0; BIN_COUNT];
        for (i, pair) in regs.chunks_exact(2).enumerate() {
            weights[i] = modbus::bin_weight(pair[0], pair[1]);
        }
        match self.transact(modbus::bin_address(3), 2) {
            Ok(d) => weights[3] = modbus::bin_weight(d[0], d[1]),
            Err(e) => {
                tracing::debug!(error = %e, "bin D unavailable; reporting 0");
                self.last_error = e.to_string();
            }
        }
        Ok(weights)
    }

    /// One transaction with connection bookkeeping.
    pub fn read_registers(&mut self, start: u16, count: u16) -> Result<Vec<u16>> {
        match self.transact(start, count) {
            Ok(regs) => {
                self.last_read_ms = Some(self.clock.now_ms());
                self.connected = true;
                Ok(regs)
            }
            Err(e) => {
                self.last_error = e.to_string();
                self.connected = false;
                tracing::debug!(error = %e, start, count, "indicator read failed");
                Err(e)
            }
        }
    }

    fn next_transaction_id(&mut self) -> u16 {
        let id = self.transaction_id;
        self.transaction_id = self.transaction_id.wrapping_add(1);
        id
    }

    fn resolve(&self) -> Result<SocketAddr> {
        if self.host.is_empty() {
            return Err(HwError::NotConfigured("host"));
        }
        let addr = self.addr();
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|source| HwError::Connect {
                addr: addr.clone(),
                source,
            })?
            .next()
            .ok_or_else(|| HwError::Connect {
                addr,
                source: io::Error::new(io::ErrorKind::NotFound, "no address for host"),
            })
    }

    fn transact(&mut self, start: u16, count: u16) -> Result<Vec<u16>> {
        let socket = self.resolve()?;
        let tid = self.next_transaction_id();
        let request = ReadRequest::new(tid, self.unit_id, start, count)?;
        let addr = self.addr();

        let mut stream =
            TcpStream::connect_timeout(&socket, self.timeout).map_err(|source| HwError::Connect {
                addr: addr.clone(),
                source,
            })?;
        let _ = stream.set_nodelay(true);
        stream.set_write_timeout(Some(self.timeout))?;
        stream.write_all(&request.encode())?;
        tracing::trace!(tid, start, count, "request sent");

        let mut head = [0u8; RESPONSE_HEADER_LEN];
        read_exact_before(
            &mut stream,
            &mut head,
            Instant::now() + self.timeout,
            ReadPhase::Header,
            &addr,
        )?;
        let header = modbus::parse_response_header(&head)?;
        request.check_response(&header)?;
        let expected = request.expected_byte_count();

        let mut payload = vec![0u8; expected];
        read_exact_before(
            &mut stream,
            &mut payload,
            Instant::now() + self.timeout,
            ReadPhase::Payload,
            &addr,
        )?;
        Ok(modbus::decode_registers(&payload, count)?)
    }
}

fn weights_from(regs: &[u16]) -> [f32; BIN_COUNT] {
    let mut weights = [0.0; BIN_COUNT];
    for (w, pair) in weights.iter_mut().zip(regs.chunks_exact(2)) {
        *w = modbus::bin_weight(pair[0], pair[1]);
    }
    weights
}

impl BinReader for IndicatorClient {
    fn read_all_bins(&mut self) -> std::result::Result<[f32; 4], Box<dyn std::error::Error + Send + Sync>> {
        IndicatorClient::read_all_bins(self).map_err(Into::into)
    }

    fn is_connected(&mut self) -> bool {
        IndicatorClient::is_connected(self)
    }

    fn reconnect(&mut self) -> bool {
        IndicatorClient::reconnect(self)
    }

    fn last_error(&self) -> &str {
        IndicatorClient::last_error(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feeder_traits::ManualClock;

    #[test]
    fn transaction_id_starts_at_one_and_wraps() {
        let mut c = IndicatorClient::new(Arc::new(ManualClock::new()));
        assert_eq!(c.next_transaction_id(), 1);
        c.transaction_id = u16::MAX;
        assert_eq!(c.next_transaction_id(), u16::MAX);
        assert_eq!(c.next_transaction_id(), 0);
    }

    #[test]
    fn unconfigured_read_fails_without_network() {
        let mut c = IndicatorClient::new(Arc::new(ManualClock::new()));
        assert_eq!(c.last_error(), "Not initialized");
        let err = c.read_all_bins().unwrap_err();
        assert!(matches!(err, HwError::NotConfigured("host")));
        assert!(!c.is_connected());
    }

    #[test]
    fn bin_index_is_checked() {
        let mut c = IndicatorClient::new(Arc::new(ManualClock::new()));
        assert!(matches!(c.read_bin(4), Err(HwError::BinIndex(4))));
    }

    #[test]
    fn reconnect_is_rate_limited() {
        let clock = ManualClock::new();
        let mut c = IndicatorClient::new(Arc::new(clock.clone()));
        // Unconfigured: first attempt runs (and fails), second is throttled.
        assert!(!c.reconnect());
        let first = c.last_connect_attempt_ms;
        clock.advance(Duration::from_millis(500));
        assert!(!c.reconnect());
        assert_eq!(c.last_connect_attempt_ms, first);
        clock.advance(Duration::from_millis(1_600));
        assert!(!c.reconnect());
        assert_ne!(c.last_connect_attempt_ms, first);
    }
}
