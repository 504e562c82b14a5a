//! Device classification
//!
//! Maps a port's USB identity to the scale protocol variant and the serial
//! link parameters that variant requires.

use serde::{Deserialize, Serialize};
use serialport::{DataBits, FlowControl, Parity, StopBits};
use std::fmt;

use super::{LEGACY_BAUD_RATE, STANDARD_BAUD_RATE};

/// USB vendor ID of the legacy scale's serial bridge
pub const LEGACY_VENDOR_ID: u16 = 1659;

/// USB product ID of the legacy scale's serial bridge
pub const LEGACY_PRODUCT_ID: u16 = 9123;

/// Vendor/product identity reported by a port
///
/// Either field may be missing (non-USB ports, or a provider that cannot read
/// the descriptor). Missing fields never match a known device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortIdentity {
    /// USB vendor ID
    pub vendor_id: Option<u16>,
    /// USB product ID
    pub product_id: Option<u16>,
}

impl PortIdentity {
    /// Identity with both fields present
    pub fn usb(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id: Some(vendor_id),
            product_id: Some(product_id),
        }
    }
}

impl fmt::Display for PortIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.vendor_id, self.product_id) {
            (Some(vid), Some(pid)) => write!(f, "{:04x}:{:04x}", vid, pid),
            _ => write!(f, "unknown"),
        }
    }
}

/// Scale protocol variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolVariant {
    /// Older scale: 1200 baud, `+NNNNNN` frames, integer units
    Legacy,
    /// Any other scale: 9600 baud, raw digit chunks scaled by 1/1000
    Standard,
}

impl fmt::Display for ProtocolVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolVariant::Legacy => write!(f, "legacy"),
            ProtocolVariant::Standard => write!(f, "standard"),
        }
    }
}

/// Serial link configuration for a scale
///
/// Only the baud rate depends on the variant. The framing (7E1, no flow
/// control) is what both scale families transmit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkParameters {
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits per character
    pub data_bits: DataBits,
    /// Stop bits
    pub stop_bits: StopBits,
    /// Parity
    pub parity: Parity,
    /// Flow control
    pub flow_control: FlowControl,
}

impl LinkParameters {
    /// Link parameters required by the given variant
    pub fn for_variant(variant: ProtocolVariant) -> Self {
        let baud_rate = match variant {
            ProtocolVariant::Legacy => LEGACY_BAUD_RATE,
            ProtocolVariant::Standard => STANDARD_BAUD_RATE,
        };
        Self {
            baud_rate,
            data_bits: DataBits::Seven,
            stop_bits: StopBits::One,
            parity: Parity::Even,
            flow_control: FlowControl::None,
        }
    }
}

/// Whether the identity is exactly the legacy scale's vendor/product pair
pub fn is_legacy_device(identity: &PortIdentity) -> bool {
    identity.vendor_id == Some(LEGACY_VENDOR_ID) && identity.product_id == Some(LEGACY_PRODUCT_ID)
}

/// Classify a port identity into its protocol variant and link parameters
pub fn classify(identity: &PortIdentity) -> (ProtocolVariant, LinkParameters) {
    let variant = if is_legacy_device(identity) {
        ProtocolVariant::Legacy
    } else {
        ProtocolVariant::Standard
    };
    (variant, LinkParameters::for_variant(variant))
}
