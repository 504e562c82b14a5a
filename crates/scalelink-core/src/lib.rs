//! # scalelink Core Library
//!
//! Core functionality for reading serial weighing scales.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Scale classification from USB vendor/product identity
//! - Link parameter selection (baud rate, 7E1 framing)
//! - Frame decoding for legacy `+NNNNNN` and standard raw digit scales
//! - The connection lifecycle with an async read loop and guaranteed teardown
//! - A simulated scale for running without hardware
//!
//! ## Supported Scales
//!
//! - Legacy scales behind the 067b:23a3 serial bridge (1200 baud)
//! - Any other scale on a serial port (9600 baud)
//!
//! ## Example
//!
//! ```rust,ignore
//! use scalelink_core::{config::ConnectionConfig, protocol::{ScaleConnection, SerialPortProvider}};
//!
//! let config = ConnectionConfig::default();
//! let mut conn = ScaleConnection::new(SerialPortProvider::from_config(&config), config);
//! conn.connect().await?;
//!
//! let mut weight = conn.watch_weight();
//! while weight.changed().await.is_ok() {
//!     if let Some(reading) = *weight.borrow() {
//!         println!("Weight: {} kg", reading.weight);
//!     }
//! }
//! ```

pub mod config;
pub mod demo;
pub mod protocol;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::ConnectionConfig;
    pub use crate::demo::DemoProvider;
    pub use crate::protocol::{
        classify, ConnectionState, PortIdentity, PortProvider, ProtocolVariant, ScaleConnection,
        ScaleError, SerialPortProvider, Weight, WeightReading,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
