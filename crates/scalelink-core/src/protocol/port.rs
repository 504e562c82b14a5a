//! Port provider abstraction
//!
//! The connection state machine talks to scales only through these traits, so
//! the native serial backend, the demo scale and test doubles are
//! interchangeable.

use async_trait::async_trait;

use super::classifier::{LinkParameters, PortIdentity};
use super::ScaleError;

/// Result of a single read from a port's input stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A chunk of raw bytes
    Chunk(Vec<u8>),
    /// The stream has ended; no further chunks will arrive
    Done,
}

/// Source of scale ports (the platform's port chooser)
#[async_trait]
pub trait PortProvider: Send + Sync {
    /// Select a port. Fails when the user cancels, permission is denied or
    /// no suitable device exists.
    async fn request_port(&self) -> Result<Box<dyn ScalePort>, ScaleError>;
}

/// A selected, possibly open, scale port
#[async_trait]
pub trait ScalePort: Send {
    /// Human readable port name
    fn name(&self) -> String;

    /// Vendor/product identity, with missing fields left empty
    fn identity(&self) -> PortIdentity;

    /// Open the port with the given link parameters
    async fn open(&mut self, params: &LinkParameters) -> Result<(), ScaleError>;

    /// Acquire the reader for the port's input stream.
    ///
    /// Only one reader may exist per open port; asking again fails with
    /// [`ScaleError::ReaderUnavailable`].
    fn reader(&mut self) -> Result<Box<dyn ChunkReader>, ScaleError>;

    /// Close the port. Closing a port that is not open returns an error,
    /// which callers tearing down a connection are expected to ignore.
    async fn close(&mut self) -> Result<(), ScaleError>;
}

/// Exclusive reader over a port's input stream
#[async_trait]
pub trait ChunkReader: Send {
    /// Wait for the next chunk. There is no timeout: this suspends until
    /// data arrives, the stream ends, or the future is dropped.
    async fn read(&mut self) -> Result<ReadOutcome, ScaleError>;

    /// Release the reader's hold on the stream. Safe to call repeatedly.
    fn release(&mut self);
}
