// src/hal/serial.rs
//! Serial link to the strain and motion microcontrollers
//!
//! Each device is probed with `IDENTITY` after opening and must answer with its
//! ready token before it is bound to a role. Readers get their own cloned
//! handle so a slow reader never blocks command writes.

use crate::acquisition::framing::{decode_line, parse_frame};
use crate::config::constants::serial::READ_CHUNK_SIZE;
use crate::config::SerialSettings;
use crate::error::{AcquisitionError, ConnectError, FrameError, StreamError};
use crate::hal::traits::{SampleSource, SampleStream};
use crate::hal::types::{
    Connection, ConnectionState, DeviceCommand, PerRole, PortInfo, Role, Sample, SourceKind,
};
use serialport::{SerialPortType, UsbPortInfo};
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// List serial ports visible to the host
pub fn enumerate_ports() -> Result<Vec<PortInfo>, ConnectError> {
    let ports = serialport::available_ports()
        .map_err(|e| ConnectError::Enumeration(e.to_string()))?;

    Ok(ports
        .into_iter()
        .map(|info| {
            let description = match &info.port_type {
                SerialPortType::UsbPort(UsbPortInfo {
                    product,
                    manufacturer,
                    vid,
                    pid,
                    ..
                }) => {
                    let name = product
                        .clone()
                        .or_else(|| manufacturer.clone())
                        .unwrap_or_else(|| "USB serial".to_string());
                    format!("{name} ({vid:04x}:{pid:04x})")
                }
                SerialPortType::PciPort => "PCI serial".to_string(),
                SerialPortType::BluetoothPort => "Bluetooth serial".to_string(),
                SerialPortType::Unknown => "Serial port".to_string(),
            };
            PortInfo {
                device_id: info.port_name,
                description,
            }
        })
        .collect())
}

/// Byte link to a device
pub trait SerialTransport: Read + Write + Send {
    /// Independent handle onto the same link
    fn try_clone_transport(&self) -> io::Result<Box<dyn SerialTransport>>;

    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    /// Drop whatever the device sent before now
    fn discard_input(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SerialTransport for Box<dyn serialport::SerialPort> {
    fn try_clone_transport(&self) -> io::Result<Box<dyn SerialTransport>> {
        let clone = (**self).try_clone().map_err(io::Error::from)?;
        Ok(Box::new(clone))
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.set_timeout(timeout).map_err(io::Error::from)
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.clear(serialport::ClearBuffer::Input).map_err(io::Error::from)
    }
}

/// Result of one line read attempt
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    Line(String),
    Invalid(FrameError),
    /// No complete line yet
    Idle,
}

/// Reassembles newline-terminated lines across reads. Partial lines survive
/// read timeouts.
#[derive(Debug)]
pub struct LineReader {
    pending: Vec<u8>,
    max_len: usize,
    discarding: bool,
}

impl LineReader {
    pub fn new(max_len: usize) -> Self {
        Self {
            pending: Vec::with_capacity(max_len),
            max_len,
            discarding: false,
        }
    }

    /// Return a buffered line, or perform a single read and try again
    pub fn read_line<R: Read + ?Sized>(&mut self, source: &mut R) -> io::Result<ReadOutcome> {
        if let Some(outcome) = self.take_line() {
            return Ok(outcome);
        }

        let mut chunk = [0u8; READ_CHUNK_SIZE];
        match source.read(&mut chunk) {
            Ok(0) => return Ok(ReadOutcome::Idle),
            Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                return Ok(ReadOutcome::Idle)
            }
            Err(e) => return Err(e),
        }

        Ok(self.take_line().unwrap_or(ReadOutcome::Idle))
    }

    /// Bytes held back waiting for a terminator
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn take_line(&mut self) -> Option<ReadOutcome> {
        loop {
            match self.pending.iter().position(|&b| b == b'\n') {
                Some(end) => {
                    let mut line: Vec<u8> = self.pending.drain(..=end).collect();
                    if self.discarding {
                        // Tail of an overlong line
                        self.discarding = false;
                        continue;
                    }
                    line.pop();
                    if line.last() == Some(&b'\r') {
                        line.pop();
                    }
                    if line.len() > self.max_len {
                        return Some(ReadOutcome::Invalid(FrameError::LineTooLong { limit: self.max_len }));
                    }
                    let text = match decode_line(&line) {
                        Ok(text) => text.trim(),
                        Err(e) => return Some(ReadOutcome::Invalid(e)),
                    };
                    if text.is_empty() {
                        continue;
                    }
                    return Some(ReadOutcome::Line(text.to_string()));
                }
                None if self.pending.len() > self.max_len => {
                    self.pending.clear();
                    if self.discarding {
                        return None;
                    }
                    self.discarding = true;
                    return Some(ReadOutcome::Invalid(FrameError::LineTooLong { limit: self.max_len }));
                }
                None => return None,
            }
        }
    }
}

/// Send `IDENTITY` and check that the first reply line carries the ready token of `role`
pub fn probe_identity(
    transport: &mut dyn SerialTransport,
    role: Role,
    port: &str,
    timeout: Duration,
    max_line_length: usize,
) -> Result<(), ConnectError> {
    let io_err = |source| ConnectError::Io {
        port: port.to_string(),
        source,
    };

    transport.discard_input().map_err(io_err)?;
    transport
        .write_all(DeviceCommand::Identity.to_line().as_bytes())
        .map_err(io_err)?;
    transport.flush().map_err(io_err)?;

    let deadline = Instant::now() + timeout;
    let mut reader = LineReader::new(max_line_length);
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(ConnectError::Timeout {
                port: port.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        transport.set_read_timeout(remaining).map_err(io_err)?;

        let response = match reader.read_line(transport).map_err(io_err)? {
            ReadOutcome::Idle => continue,
            ReadOutcome::Line(line) => line,
            ReadOutcome::Invalid(e) => e.to_string(),
        };

        debug!(port, %role, response = %response, "Identity reply");
        return if response.contains(role.ready_token()) {
            Ok(())
        } else {
            Err(ConnectError::WrongDevice {
                port: port.to_string(),
                expected: role.ready_token(),
                response,
            })
        };
    }
}

struct Link {
    device_id: String,
    transport: Box<dyn SerialTransport>,
    state: ConnectionState,
}

/// Serial-attached devices, at most one per role
pub struct HardwareSource {
    settings: SerialSettings,
    dedupe_repeated_lines: bool,
    links: PerRole<Option<Link>>,
}

impl HardwareSource {
    pub fn new(settings: SerialSettings) -> Self {
        Self {
            settings,
            dedupe_repeated_lines: false,
            links: PerRole::new(None, None),
        }
    }

    /// Drop a line identical to the one before it
    pub fn with_dedupe(mut self, enabled: bool) -> Self {
        self.dedupe_repeated_lines = enabled;
        self
    }

    /// Open `port`, wait for the device reset, and probe its identity
    pub fn connect(&mut self, role: Role, port: &str) -> Result<Connection, ConnectError> {
        self.ensure_free(role)?;
        info!(%role, port, baud = self.settings.baud_rate, "Opening serial port");

        let serial = serialport::new(port, self.settings.baud_rate)
            .timeout(self.settings.read_timeout())
            .open()
            .map_err(|e| ConnectError::PortBusy {
                port: port.to_string(),
                reason: e.to_string(),
            })?;

        self.bind(role, port, Box::new(serial), self.settings.settle_delay())
    }

    /// Probe an already open transport and bind it to `role`
    pub fn attach(
        &mut self,
        role: Role,
        device_id: &str,
        transport: Box<dyn SerialTransport>,
    ) -> Result<Connection, ConnectError> {
        self.ensure_free(role)?;
        self.bind(role, device_id, transport, Duration::ZERO)
    }

    /// Hold the link as `Connecting` through the settle delay and the probe
    fn bind(
        &mut self,
        role: Role,
        device_id: &str,
        transport: Box<dyn SerialTransport>,
        settle: Duration,
    ) -> Result<Connection, ConnectError> {
        let timeout = self.settings.read_timeout();
        let max_line_length = self.settings.max_line_length;

        let link = self.links.get_mut(role).insert(Link {
            device_id: device_id.to_string(),
            transport,
            state: ConnectionState::Connecting,
        });
        debug!(%role, device_id, state = %link.state, "Waiting for device");

        if !settle.is_zero() {
            std::thread::sleep(settle);
        }
        let probed = probe_identity(
            link.transport.as_mut(),
            role,
            device_id,
            timeout,
            max_line_length,
        );
        if let Err(e) = probed {
            warn!(%role, device_id, error = %e, "Identity probe failed");
            // Dropping the link closes the port
            *self.links.get_mut(role) = None;
            return Err(e);
        }

        link.state = ConnectionState::Connected;
        info!(%role, device_id, "Device connected");
        Ok(Connection {
            device_id: device_id.to_string(),
            role,
            state: ConnectionState::Connected,
        })
    }

    /// Close the link of `role`; false if it was not connected
    pub fn disconnect(&mut self, role: Role) -> bool {
        match self.links.get_mut(role).take() {
            Some(link) => {
                info!(%role, device_id = %link.device_id, "Device disconnected");
                true
            }
            None => false,
        }
    }

    pub fn connection(&self, role: Role) -> Option<Connection> {
        self.links.get(role).as_ref().map(|link| Connection {
            device_id: link.device_id.clone(),
            role,
            state: link.state,
        })
    }

    fn ensure_free(&self, role: Role) -> Result<(), ConnectError> {
        match self.links.get(role) {
            Some(link) => Err(ConnectError::AlreadyConnected {
                role,
                port: link.device_id.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl SampleSource for HardwareSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Hardware
    }

    fn open_stream(&mut self, role: Role) -> Result<Box<dyn SampleStream>, AcquisitionError> {
        let link = self
            .links
            .get_mut(role)
            .as_mut()
            .ok_or(AcquisitionError::NotConnected(role))?;

        let transport = link
            .transport
            .try_clone_transport()
            .map_err(|source| AcquisitionError::Io { role, source })?;

        Ok(Box::new(HardwareStream::new(
            role,
            transport,
            self.settings.max_line_length,
            self.dedupe_repeated_lines,
        )))
    }

    fn send_command(&mut self, role: Role, command: DeviceCommand) -> Result<(), AcquisitionError> {
        let link = self
            .links
            .get_mut(role)
            .as_mut()
            .ok_or(AcquisitionError::NotConnected(role))?;

        debug!(%role, command = command.as_str(), "Sending device command");
        let io_err = |source| AcquisitionError::Io { role, source };
        link.transport
            .write_all(command.to_line().as_bytes())
            .map_err(io_err)?;
        link.transport.flush().map_err(io_err)
    }

    fn connection_state(&self, role: Role) -> ConnectionState {
        self.links
            .get(role)
            .as_ref()
            .map_or(ConnectionState::Disconnected, |link| link.state)
    }

    fn mark_faulted(&mut self, role: Role) {
        if let Some(link) = self.links.get_mut(role).as_mut() {
            link.state = ConnectionState::Faulted;
        }
    }
}

/// Line-oriented sample stream over one serial handle
pub struct HardwareStream {
    role: Role,
    transport: Box<dyn SerialTransport>,
    reader: LineReader,
    read_timeout: Option<Duration>,
    dedupe_repeated_lines: bool,
    last_line: Option<String>,
}

impl HardwareStream {
    pub fn new(
        role: Role,
        transport: Box<dyn SerialTransport>,
        max_line_length: usize,
        dedupe_repeated_lines: bool,
    ) -> Self {
        Self {
            role,
            transport,
            reader: LineReader::new(max_line_length),
            read_timeout: None,
            dedupe_repeated_lines,
            last_line: None,
        }
    }
}

impl SampleStream for HardwareStream {
    fn role(&self) -> Role {
        self.role
    }

    fn next_sample(&mut self, timeout: Duration) -> Result<Option<Sample>, StreamError> {
        if self.read_timeout != Some(timeout) {
            self.transport.set_read_timeout(timeout)?;
            self.read_timeout = Some(timeout);
        }

        let deadline = Instant::now() + timeout;
        loop {
            match self.reader.read_line(&mut self.transport)? {
                ReadOutcome::Line(line) => {
                    if self.dedupe_repeated_lines && self.last_line.as_deref() == Some(line.as_str()) {
                        trace!(role = %self.role, "Dropping repeated line");
                    } else {
                        let parsed = parse_frame(self.role, &line);
                        self.last_line = Some(line);
                        return parsed.map(Some).map_err(StreamError::from);
                    }
                }
                ReadOutcome::Invalid(e) => return Err(e.into()),
                ReadOutcome::Idle => {}
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
        }
    }
}
