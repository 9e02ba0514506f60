//! Command dispatcher
//!
//! Serializes outbound writes against one transport session. Concurrent
//! writes to the same characteristic are a known source of corruption on
//! these peripherals, so at most one command is in flight per device.
//!
//! The mower has no write response: it answers through notifications. A
//! successful write therefore nudges the mower with a status query and
//! waits for the state store to see any update. The outcome is a typed
//! three-way result (Confirmed, Unacknowledged, or a hard failure)
//! rather than a pretend return value.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::TimingConfig;
use crate::protocol::{self, Command};
use crate::state::StateStore;
use crate::transport::{BleTransport, ConnectionState, TransportError};

/// Outcome of a successfully written command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// A state update arrived within the response window
    Confirmed,
    /// The write went out but no confirming update was observed. The
    /// command is never retried automatically: re-sending a control with
    /// unknown mower-side effect could double-trigger a physical action.
    Unacknowledged,
}

/// Dispatch failures, surfaced to the caller; a swallowed "stop" failure
/// has safety implications
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The link is not ready; nothing was written and nothing is queued.
    /// Retry after the supervisor reports the link back up.
    #[error("link not ready for commands")]
    NotReady,

    /// The write itself failed
    #[error("command write failed: {0}")]
    Write(#[from] TransportError),
}

/// Serializes commands against one mower link
pub struct CommandDispatcher {
    transport: Arc<dyn BleTransport>,
    store: Arc<StateStore>,
    /// One in-flight write per device, shared with the supervisor's
    /// periodic refresh
    write_gate: Mutex<()>,
    response_window: Duration,
}

impl CommandDispatcher {
    pub fn new(
        transport: Arc<dyn BleTransport>,
        store: Arc<StateStore>,
        timing: &TimingConfig,
    ) -> Self {
        Self {
            transport,
            store,
            write_gate: Mutex::new(()),
            response_window: Duration::from_millis(timing.response_window_ms),
        }
    }

    /// Submit a command.
    ///
    /// Fails fast with [`DispatchError::NotReady`] when the link is down;
    /// commands are never silently queued across disconnects.
    pub async fn submit(&self, command: Command) -> Result<CommandOutcome, DispatchError> {
        let _gate = self.write_gate.lock().await;

        if self.transport.connection_state() != ConnectionState::Ready {
            return Err(DispatchError::NotReady);
        }

        let mut updates = self.store.watch_updates();
        updates.borrow_and_update();

        let frame = protocol::encode(command);
        debug!(?command, frame = %hex::encode(&frame), "dispatching command");
        self.transport.write(&frame).await?;

        // Expedited refresh: ask the mower to report state now instead of
        // waiting for the next baseline cycle.
        if !command.is_query() {
            if let Err(e) = self
                .transport
                .write(&protocol::encode(Command::QueryStatus))
                .await
            {
                warn!(%e, "expedited refresh write failed");
            }
        }

        match tokio::time::timeout(self.response_window, updates.changed()).await {
            Ok(Ok(())) => Ok(CommandOutcome::Confirmed),
            Ok(Err(_)) | Err(_) => {
                debug!(?command, "no confirming update within response window");
                Ok(CommandOutcome::Unacknowledged)
            }
        }
    }

    /// Write a query frame without waiting for confirmation. Used for the
    /// initial query burst after (re)connect.
    pub async fn query(&self, command: Command) -> Result<(), TransportError> {
        let _gate = self.write_gate.lock().await;
        self.write_query(command).await
    }

    /// Baseline refresh: status + battery.
    ///
    /// Never waits on an in-flight command: the notification pipeline
    /// calls this, and a held gate means a command is mid-dispatch whose
    /// own expedited query covers this cycle.
    pub async fn refresh(&self) {
        let Ok(_gate) = self.write_gate.try_lock() else {
            return;
        };
        for command in [Command::QueryStatus, Command::QueryBattery] {
            if let Err(e) = self.write_query(command).await {
                debug!(%e, ?command, "refresh query failed");
                return;
            }
        }
    }

    async fn write_query(&self, command: Command) -> Result<(), TransportError> {
        if self.transport.connection_state() != ConnectionState::Ready {
            return Err(TransportError::NotConnected);
        }
        self.transport.write(&protocol::encode(command)).await
    }
}
