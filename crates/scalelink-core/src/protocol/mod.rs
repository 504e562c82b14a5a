//! Scale Protocol Communication
//!
//! Implements the serial link to weighing scales.
//!
//! Supports both the legacy `+NNNNNN` framed protocol and the standard raw
//! digit protocol, selected from the port's USB identity.

pub mod classifier;
mod connection;
pub mod decoder;
mod error;
pub mod port;
pub mod serial;

pub use classifier::{
    classify, is_legacy_device, LinkParameters, PortIdentity, ProtocolVariant, LEGACY_PRODUCT_ID,
    LEGACY_VENDOR_ID,
};
pub use connection::{ConnectionState, ScaleConnection};
pub use decoder::{decode, strip_non_printable, DecodeSession, Weight, WeightReading};
pub use error::ScaleError;
pub use port::{ChunkReader, PortProvider, ReadOutcome, ScalePort};
pub use serial::{list_ports, PortInfo, SerialPortProvider};

/// Baud rate of legacy scales
pub const LEGACY_BAUD_RATE: u32 = 1200;

/// Baud rate of standard scales
pub const STANDARD_BAUD_RATE: u32 = 9600;

/// Default number of bytes requested per read
pub const DEFAULT_READ_CHUNK_SIZE: usize = 64;

/// Default size at which a legacy decode buffer without a frame is trimmed
pub const DEFAULT_DECODE_BUFFER_LIMIT: usize = 4096;
