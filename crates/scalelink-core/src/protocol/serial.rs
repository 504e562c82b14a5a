//! Serial port handling
//!
//! Native port provider backed by `serialport` enumeration and `tokio-serial`
//! async streams.

use async_trait::async_trait;
use serialport::{SerialPortInfo, SerialPortType};
use std::collections::HashMap;
#[cfg(target_os = "linux")]
use std::fs;
use tokio::io::AsyncReadExt;
use tokio_serial::{SerialPortBuilderExt, SerialStream};

use super::classifier::{classify, LinkParameters, PortIdentity, ProtocolVariant};
use super::port::{ChunkReader, PortProvider, ReadOutcome, ScalePort};
use super::{ScaleError, DEFAULT_READ_CHUNK_SIZE};
use crate::config::ConnectionConfig;

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyUSB0" or "COM3")
    pub name: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,

    /// Manufacturer name (if available)
    pub manufacturer: Option<String>,

    /// Product name (if available)
    pub product: Option<String>,

    /// Serial number (if available)
    pub serial_number: Option<String>,
}

impl PortInfo {
    /// Port known only by name
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
            serial_number: None,
        }
    }

    /// Vendor/product identity of the port
    pub fn identity(&self) -> PortIdentity {
        PortIdentity {
            vendor_id: self.vid,
            product_id: self.pid,
        }
    }

    /// Protocol variant a scale on this port would use
    pub fn variant(&self) -> ProtocolVariant {
        classify(&self.identity()).0
    }
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let (vid, pid, manufacturer, product, serial_number) = match info.port_type {
            SerialPortType::UsbPort(usb_info) => (
                Some(usb_info.vid),
                Some(usb_info.pid),
                usb_info.manufacturer,
                usb_info.product,
                usb_info.serial_number,
            ),
            _ => (None, None, None, None, None),
        };

        Self {
            name: info.port_name,
            vid,
            pid,
            manufacturer,
            product,
            serial_number,
        }
    }
}

/// Helper used to sort port names so that:
///  - ttyACM* ports come first (sorted numerically by suffix)
///  - then ttyUSB* ports (sorted numerically)
///  - then other ports (sorted by name)
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let basename = name.rsplit('/').next().unwrap_or(name);
    if let Some(rest) = basename.strip_prefix("ttyACM") {
        let num = rest.parse::<usize>().unwrap_or(usize::MAX);
        return (0, num, basename.to_string());
    }
    if let Some(rest) = basename.strip_prefix("ttyUSB") {
        let num = rest.parse::<usize>().unwrap_or(usize::MAX);
        return (1, num, basename.to_string());
    }
    (2, 0, basename.to_string())
}

/// List all available serial ports, with /dev fallbacks and deterministic ordering
pub fn list_ports() -> Vec<PortInfo> {
    let mut map: HashMap<String, PortInfo> = HashMap::new();
    for info in serialport::available_ports()
        .unwrap_or_default()
        .into_iter()
    {
        let p = PortInfo::from(info);
        map.entry(p.name.clone()).or_insert(p);
    }

    // Linux-only: Add /dev/ttyACM* and /dev/ttyUSB* entries if present but not found by API
    #[cfg(target_os = "linux")]
    if let Ok(entries) = fs::read_dir("/dev") {
        for entry in entries.flatten() {
            if let Some(fname) = entry.file_name().to_str() {
                if fname.starts_with("ttyACM") || fname.starts_with("ttyUSB") {
                    let full = format!("/dev/{}", fname);
                    map.entry(full.clone())
                        .or_insert_with(|| PortInfo::named(&full));
                }
            }
        }
    }

    let mut v: Vec<PortInfo> = map.into_values().collect();
    v.sort_by_key(|p| port_sort_key(&p.name));
    v
}

/// Pick the port to use: the named one if given, otherwise the first USB port
fn select_port(ports: Vec<PortInfo>, name: Option<&str>) -> Result<PortInfo, ScaleError> {
    match name {
        // Ports missing from enumeration (ptys, adapters without descriptors)
        // are still opened by name, just without an identity.
        Some(name) => Ok(ports
            .into_iter()
            .find(|p| p.name == name)
            .unwrap_or_else(|| PortInfo::named(name))),
        None => ports
            .into_iter()
            .find(|p| p.vid.is_some())
            .ok_or_else(|| ScaleError::PortNotFound("no USB serial port available".to_string())),
    }
}

/// Port provider for locally attached serial devices
#[derive(Debug, Clone)]
pub struct SerialPortProvider {
    port_name: Option<String>,
    read_chunk_size: usize,
}

impl SerialPortProvider {
    /// Provider that opens `port_name`, or the first USB serial port when `None`
    pub fn new(port_name: Option<String>) -> Self {
        Self {
            port_name,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
        }
    }

    /// Provider configured from a [`ConnectionConfig`]
    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self {
            port_name: config.port_name.clone(),
            read_chunk_size: config.read_chunk_size.max(1),
        }
    }
}

#[async_trait]
impl PortProvider for SerialPortProvider {
    async fn request_port(&self) -> Result<Box<dyn ScalePort>, ScaleError> {
        let info = select_port(list_ports(), self.port_name.as_deref())?;
        tracing::debug!(port = %info.name, identity = %info.identity(), "selected serial port");
        Ok(Box::new(NativePort {
            info,
            read_chunk_size: self.read_chunk_size,
            stream: None,
            is_open: false,
        }))
    }
}

/// Serial port opened through `tokio-serial`
pub struct NativePort {
    info: PortInfo,
    read_chunk_size: usize,
    stream: Option<SerialStream>,
    is_open: bool,
}

impl NativePort {
    /// Enumeration details of the port
    pub fn info(&self) -> &PortInfo {
        &self.info
    }
}

#[async_trait]
impl ScalePort for NativePort {
    fn name(&self) -> String {
        self.info.name.clone()
    }

    fn identity(&self) -> PortIdentity {
        self.info.identity()
    }

    async fn open(&mut self, params: &LinkParameters) -> Result<(), ScaleError> {
        if self.is_open {
            return Err(ScaleError::AlreadyOpen);
        }

        let stream = tokio_serial::new(&self.info.name, params.baud_rate)
            .data_bits(params.data_bits)
            .stop_bits(params.stop_bits)
            .parity(params.parity)
            .flow_control(params.flow_control)
            .open_native_async()
            .map_err(|e| ScaleError::OpenFailed(format!("{}: {}", self.info.name, e)))?;

        self.stream = Some(stream);
        self.is_open = true;
        Ok(())
    }

    fn reader(&mut self) -> Result<Box<dyn ChunkReader>, ScaleError> {
        if !self.is_open {
            return Err(ScaleError::ReaderUnavailable);
        }
        // The reader takes the stream; releasing the reader drops it, which
        // closes the device handle.
        let stream = self.stream.take().ok_or(ScaleError::ReaderUnavailable)?;
        Ok(Box::new(NativeReader {
            stream: Some(stream),
            buf: vec![0u8; self.read_chunk_size],
        }))
    }

    async fn close(&mut self) -> Result<(), ScaleError> {
        if !self.is_open {
            return Err(ScaleError::NotOpen);
        }
        self.stream = None;
        self.is_open = false;
        Ok(())
    }
}

/// Reader over a [`NativePort`]'s stream
pub struct NativeReader {
    stream: Option<SerialStream>,
    buf: Vec<u8>,
}

#[async_trait]
impl ChunkReader for NativeReader {
    async fn read(&mut self) -> Result<ReadOutcome, ScaleError> {
        let stream = self.stream.as_mut().ok_or(ScaleError::ReaderUnavailable)?;
        let n = stream
            .read(&mut self.buf)
            .await
            .map_err(|e| ScaleError::ReadFailed(e.to_string()))?;
        if n == 0 {
            return Ok(ReadOutcome::Done);
        }
        Ok(ReadOutcome::Chunk(self.buf[..n].to_vec()))
    }

    fn release(&mut self) {
        self.stream = None;
    }
}
