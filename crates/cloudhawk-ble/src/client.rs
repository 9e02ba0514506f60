//! Client facade: the upward API
//!
//! One [`MowerClient`] per mower. Entity platforms and tooling consume
//! state through [`MowerClient::snapshot`] / [`MowerClient::changes`] and
//! act through [`MowerClient::submit`]; everything else is internal.
//! Multiple clients are fully independent; no shared mutable state.

use std::sync::Arc;
use std::time::Duration;

use cloudhawk_core::{MowerState, StateChangeSet};
use tokio::sync::{broadcast, watch};

use crate::config::MowerConfig;
use crate::dispatcher::{CommandDispatcher, CommandOutcome, DispatchError};
use crate::protocol::Command;
use crate::state::StateStore;
use crate::supervisor::{Supervisor, SupervisorState};
use crate::transport::{create_transport, BleTransport, ConnectionState};

/// Handle to one mower
pub struct MowerClient {
    transport: Arc<dyn BleTransport>,
    store: Arc<StateStore>,
    dispatcher: Arc<CommandDispatcher>,
    supervisor: Supervisor,
}

impl MowerClient {
    /// Build a client from configuration. The client starts cold; call
    /// [`MowerClient::start`] to bring the link up.
    pub fn new(config: MowerConfig) -> Self {
        let transport = create_transport(&config.transport);
        Self::with_transport(config, transport)
    }

    /// Build against a caller-supplied transport (tests, custom stacks)
    pub fn with_transport(config: MowerConfig, transport: Arc<dyn BleTransport>) -> Self {
        let store = Arc::new(StateStore::new());
        let dispatcher = Arc::new(CommandDispatcher::new(
            transport.clone(),
            store.clone(),
            &config.timing,
        ));
        let supervisor = Supervisor::new(
            transport.clone(),
            store.clone(),
            dispatcher.clone(),
            &config,
        );
        Self {
            transport,
            store,
            dispatcher,
            supervisor,
        }
    }

    /// Start the reconnection supervisor
    pub fn start(&self) {
        self.supervisor.start();
    }

    /// Stop the supervisor and release the link. Safe at any point,
    /// including mid-connect or mid-backoff.
    pub async fn stop(&self) {
        self.supervisor.stop().await;
    }

    /// Immutable copy of the last-known mower state
    pub fn snapshot(&self) -> MowerState {
        self.store.snapshot()
    }

    /// Submit a command. See [`CommandDispatcher::submit`] for semantics.
    pub async fn submit(&self, command: Command) -> Result<CommandOutcome, DispatchError> {
        self.dispatcher.submit(command).await
    }

    /// Stream of non-empty state change sets
    pub fn changes(&self) -> broadcast::Receiver<StateChangeSet> {
        self.store.subscribe()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.transport.connection_state()
    }

    pub fn supervisor_state(&self) -> SupervisorState {
        self.supervisor.state()
    }

    pub fn watch_supervisor(&self) -> watch::Receiver<SupervisorState> {
        self.supervisor.watch()
    }

    /// Wait until the link is ready for commands, or the timeout elapses.
    /// Returns `false` on timeout.
    pub async fn wait_until_ready(&self, timeout: Duration) -> bool {
        let mut state = self.transport.watch_state();
        let ready = async {
            loop {
                if *state.borrow_and_update() == ConnectionState::Ready {
                    return;
                }
                if state.changed().await.is_err() {
                    // Transport gone; keep waiting until the deadline so
                    // the caller gets a consistent timeout result.
                    futures::future::pending::<()>().await;
                }
            }
        };
        tokio::time::timeout(timeout, ready).await.is_ok()
    }
}
