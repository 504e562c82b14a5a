//! Connection management
//!
//! Handles the scale connection lifecycle: port selection, opening with the
//! variant's link parameters, the read loop and teardown.
//!
//! ```text
//! Disconnected -> Requesting -> Opening -> Reading -> Disconnected
//!       ^______________|____________|          (any failure or disconnect)
//! ```
//!
//! The read loop runs as a tokio task that exclusively owns the port and its
//! reader. Whichever way the loop ends (stream end, read error, cancellation)
//! it releases the reader, closes the port and publishes `Disconnected`, so
//! explicit and implicit teardown converge on the same state.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use super::{
    classify, ChunkReader, DecodeSession, PortProvider, ProtocolVariant, ReadOutcome, ScaleError,
    ScalePort, WeightReading,
};
use crate::config::ConnectionConfig;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No port held
    Disconnected,
    /// Waiting for the provider to select a port
    Requesting,
    /// Opening the selected port
    Opening,
    /// Port open and read loop running
    Reading,
}

impl ConnectionState {
    /// Whether a scale is connected and being read
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Reading)
    }
}

/// Why a read loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopEnd {
    Cancelled,
    StreamEnded,
    ReadFailed,
}

/// Ownership of the running read loop for one open port
struct ConnectionHandle {
    session_id: Uuid,
    port_name: String,
    variant: ProtocolVariant,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ConnectionHandle {
    /// Cancel the read loop and wait until it has released the port
    async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!(session = %self.session_id, error = %e, "read loop task failed");
            }
        }
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        // The read loop sees the cancellation and tears the port down itself.
        self.cancel.cancel();
    }
}

/// Scale connection session
///
/// Holds at most one open port. Observers follow the connection through
/// [`watch_state`](Self::watch_state) and [`watch_weight`](Self::watch_weight).
/// Dropping the session cancels the read loop, which releases the reader and
/// closes the port.
pub struct ScaleConnection {
    provider: Box<dyn PortProvider>,
    config: ConnectionConfig,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    weight_tx: Arc<watch::Sender<Option<WeightReading>>>,
    handle: Option<ConnectionHandle>,
}

impl ScaleConnection {
    /// Create a session (not yet connected)
    pub fn new<P: PortProvider + 'static>(provider: P, config: ConnectionConfig) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (weight_tx, _) = watch::channel(None);
        Self {
            provider: Box::new(provider),
            config,
            state_tx: Arc::new(state_tx),
            weight_tx: Arc::new(weight_tx),
            handle: None,
        }
    }

    /// Get current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Check if a scale is connected
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Latest weight reading, kept across reconnects until replaced
    pub fn weight(&self) -> Option<WeightReading> {
        *self.weight_tx.borrow()
    }

    /// Protocol variant of the current connection
    pub fn variant(&self) -> Option<ProtocolVariant> {
        self.handle
            .as_ref()
            .filter(|_| self.is_connected())
            .map(|h| h.variant)
    }

    /// Name of the connected port
    pub fn port_name(&self) -> Option<&str> {
        self.handle
            .as_ref()
            .filter(|_| self.is_connected())
            .map(|h| h.port_name.as_str())
    }

    /// Subscribe to connection state changes
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Subscribe to weight updates
    pub fn watch_weight(&self) -> watch::Receiver<Option<WeightReading>> {
        self.weight_tx.subscribe()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            tracing::debug!(from = ?previous, to = ?state, "connection state changed");
        }
    }

    /// Connect to a scale
    ///
    /// Any existing connection is fully torn down first. Selection and open
    /// failures are logged, leave the session `Disconnected` and are returned;
    /// `connect` can simply be called again.
    pub async fn connect(&mut self) -> Result<(), ScaleError> {
        if self.handle.is_some() {
            self.disconnect().await;
        }

        let session_id = Uuid::new_v4();
        let span = tracing::info_span!("scale_connection", session = %session_id);
        self.establish(session_id).instrument(span).await
    }

    async fn establish(&mut self, session_id: Uuid) -> Result<(), ScaleError> {
        self.set_state(ConnectionState::Requesting);
        let mut port = match self.provider.request_port().await {
            Ok(port) => port,
            Err(e) => {
                tracing::error!(error = %e, "error selecting port");
                self.set_state(ConnectionState::Disconnected);
                return Err(e);
            }
        };

        let port_name = port.name();
        let identity = port.identity();
        let (variant, params) = classify(&identity);
        tracing::debug!(port = %port_name, %identity, %variant, "classified port");

        self.set_state(ConnectionState::Opening);
        if let Err(e) = port.open(&params).await {
            tracing::error!(port = %port_name, error = %e, "error opening port");
            self.set_state(ConnectionState::Disconnected);
            return Err(e);
        }

        let reader = match port.reader() {
            Ok(reader) => reader,
            Err(e) => {
                tracing::error!(port = %port_name, error = %e, "error acquiring reader");
                close_port(port.as_mut()).await;
                self.set_state(ConnectionState::Disconnected);
                return Err(e);
            }
        };

        tracing::info!(
            port = %port_name,
            baud_rate = params.baud_rate,
            %variant,
            "connected to port"
        );
        self.set_state(ConnectionState::Reading);

        let cancel = CancellationToken::new();
        let session = DecodeSession::with_buffer_limit(variant, self.config.decode_buffer_limit);
        let task = tokio::spawn(
            read_loop(
                port,
                reader,
                session,
                cancel.clone(),
                self.state_tx.clone(),
                self.weight_tx.clone(),
            )
            .in_current_span(),
        );

        self.handle = Some(ConnectionHandle {
            session_id,
            port_name,
            variant,
            cancel,
            task: Some(task),
        });
        Ok(())
    }

    /// Disconnect from the scale
    ///
    /// Cancels any pending read, releases the reader and closes the port.
    /// Safe to call when never connected, after the read loop already ended,
    /// and any number of times in a row.
    pub async fn disconnect(&mut self) {
        if let Some(handle) = self.handle.take() {
            let port_name = handle.port_name.clone();
            handle.shutdown().await;
            tracing::info!(port = %port_name, "port closed");
        }
        self.set_state(ConnectionState::Disconnected);
    }
}

impl Drop for ScaleConnection {
    fn drop(&mut self) {
        // Dropping the handle cancels the read loop, which then releases the
        // reader and closes the port on the runtime.
        drop(self.handle.take());
        self.state_tx.send_replace(ConnectionState::Disconnected);
    }
}

/// Read chunks until the stream ends, a read fails or the loop is cancelled
async fn read_loop(
    mut port: Box<dyn ScalePort>,
    mut reader: Box<dyn ChunkReader>,
    mut session: DecodeSession,
    cancel: CancellationToken,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    weight_tx: Arc<watch::Sender<Option<WeightReading>>>,
) {
    let end = loop {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => break LoopEnd::Cancelled,
            outcome = reader.read() => outcome,
        };

        match outcome {
            Ok(ReadOutcome::Chunk(bytes)) => {
                tracing::debug!(len = bytes.len(), "chunk received");
                if let Some(reading) = session.push(&bytes) {
                    tracing::debug!(weight = %reading.weight, "weight updated");
                    weight_tx.send_replace(Some(reading));
                }
            }
            Ok(ReadOutcome::Done) => break LoopEnd::StreamEnded,
            Err(e) => {
                tracing::error!(error = %e, "error reading data");
                break LoopEnd::ReadFailed;
            }
        }
    };

    reader.release();
    close_port(port.as_mut()).await;
    state_tx.send_replace(ConnectionState::Disconnected);
    tracing::info!(reason = ?end, "read loop finished");
}

/// Close a port, logging rather than propagating failures
async fn close_port(port: &mut dyn ScalePort) {
    if let Err(e) = port.close().await {
        tracing::warn!(port = %port.name(), error = %e, "error closing port");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::SerialPortProvider;

    #[test]
    fn test_connection_state() {
        let conn = ScaleConnection::new(SerialPortProvider::new(None), ConnectionConfig::default());
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(!conn.is_connected());
        assert!(conn.weight().is_none());
        assert!(conn.variant().is_none());
        assert!(conn.port_name().is_none());
    }

    #[test]
    fn test_only_reading_is_connected() {
        assert!(ConnectionState::Reading.is_connected());
        assert!(!ConnectionState::Disconnected.is_connected());
        assert!(!ConnectionState::Requesting.is_connected());
        assert!(!ConnectionState::Opening.is_connected());
    }

    #[tokio::test]
    async fn test_disconnect_when_never_connected() {
        let mut conn =
            ScaleConnection::new(SerialPortProvider::new(None), ConnectionConfig::default());
        conn.disconnect().await;
        conn.disconnect().await;
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_open_failure_leaves_disconnected() {
        let mut conn = ScaleConnection::new(
            SerialPortProvider::new(Some("/nonexistent/scalelink-port".to_string())),
            ConnectionConfig::default(),
        );
        let result = conn.connect().await;
        assert!(matches!(result, Err(ScaleError::OpenFailed(_))));
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(conn.port_name().is_none());
    }
}
