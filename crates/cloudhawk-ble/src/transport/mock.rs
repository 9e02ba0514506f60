//! Mock transport for testing

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};

use super::{BleTransport, ConnectionState, Notification, TransportError};
use crate::config::MockConfig;

/// Mock transport: scripted connects, injectable notifications, recorded
/// writes. Fills the role the real adapter plays in production so the
/// supervisor/dispatcher stack can be driven deterministically.
pub struct MockTransport {
    config: MockConfig,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    notif_tx: broadcast::Sender<Notification>,
    writes: Mutex<Vec<Vec<u8>>>,
    /// Scripted results for upcoming `connect` calls; empty queue = succeed
    connect_script: Mutex<VecDeque<Result<(), TransportError>>>,
    connect_attempts: Mutex<u32>,
    last_error: Mutex<Option<TransportError>>,
}

impl MockTransport {
    pub fn new(config: &MockConfig) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (notif_tx, _) = broadcast::channel(256);
        Self {
            config: config.clone(),
            state_tx: Arc::new(state_tx),
            notif_tx,
            writes: Mutex::new(Vec::new()),
            connect_script: Mutex::new(VecDeque::new()),
            connect_attempts: Mutex::new(0),
            last_error: Mutex::new(None),
        }
    }

    /// Queue an outcome for the next `connect` call
    pub fn script_connect(&self, result: Result<(), TransportError>) {
        self.connect_script.lock().push_back(result);
    }

    /// Inject an inbound notification (simulates the mower pushing a frame)
    pub fn inject_notification(&self, data: Vec<u8>) {
        let _ = self.notif_tx.send(Notification {
            received_at: Instant::now(),
            data,
        });
    }

    /// Simulate a peripheral-initiated disconnect
    pub fn drop_link(&self) {
        self.set_state(ConnectionState::Disconnected);
    }

    /// Frames written so far, in order
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.writes.lock().clone()
    }

    pub fn clear_written(&self) {
        self.writes.lock().clear();
    }

    /// Number of `connect` calls observed
    pub fn connect_attempts(&self) -> u32 {
        *self.connect_attempts.lock()
    }

    fn set_state(&self, next: ConnectionState) {
        self.state_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

#[async_trait]
impl BleTransport for MockTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        *self.connect_attempts.lock() += 1;
        self.set_state(ConnectionState::Connecting);

        if self.config.latency_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.config.latency_ms)).await;
        }

        let scripted = self.connect_script.lock().pop_front();
        match scripted.unwrap_or(Ok(())) {
            Ok(()) => {
                self.set_state(ConnectionState::Connected);
                self.set_state(ConnectionState::Subscribing);
                self.set_state(ConnectionState::Ready);
                *self.last_error.lock() = None;
                Ok(())
            }
            Err(e) => {
                *self.last_error.lock() = Some(e.clone());
                self.set_state(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    async fn write(&self, frame: &[u8]) -> Result<(), TransportError> {
        if self.connection_state() != ConnectionState::Ready {
            return Err(TransportError::NotConnected);
        }
        self.writes.lock().push(frame.to_vec());
        Ok(())
    }

    fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.notif_tx.subscribe()
    }

    fn connection_state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    fn last_error(&self) -> Option<TransportError> {
        self.last_error.lock().clone()
    }

    async fn close(&self) {
        self.set_state(ConnectionState::Disconnected);
    }
}
