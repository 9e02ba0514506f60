//! btleplug transport session
//!
//! Owns exactly one peripheral connection: discovery by address or
//! advertised name, GATT service resolution, notify subscription, and a
//! pump task that forwards notifications in arrival order.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use btleplug::api::{
    Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{BleTransport, ConnectionState, Notification, TransportError};
use crate::config::BleConfig;

/// Primary GATT service and characteristics (from the decompiled vendor app)
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x0000ff12_0000_1000_8000_00805f9b34fb);
pub const WRITE_CHAR_UUID: Uuid = Uuid::from_u128(0x0000ff01_0000_1000_8000_00805f9b34fb);
pub const NOTIFY_CHAR_UUID: Uuid = Uuid::from_u128(0x0000ff02_0000_1000_8000_00805f9b34fb);

/// SUMIC-branded units speak the same protocol under different UUIDs
pub const SUMIC_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000abf0_0000_1000_8000_00805f9b34fb);
pub const SUMIC_WRITE_UUID: Uuid = Uuid::from_u128(0x0000abf4_0000_1000_8000_00805f9b34fb);
pub const SUMIC_NOTIFY_UUID: Uuid = Uuid::from_u128(0x0000abf3_0000_1000_8000_00805f9b34fb);

/// (service, write characteristic, notify characteristic) triples to probe
const GATT_LAYOUTS: [(Uuid, Uuid, Uuid); 2] = [
    (SERVICE_UUID, WRITE_CHAR_UUID, NOTIFY_CHAR_UUID),
    (SUMIC_SERVICE_UUID, SUMIC_WRITE_UUID, SUMIC_NOTIFY_UUID),
];

#[derive(Clone)]
struct Link {
    peripheral: Peripheral,
    write_char: Characteristic,
    notify_char: Characteristic,
}

/// BLE transport backed by btleplug
pub struct BtleplugTransport {
    config: BleConfig,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    notif_tx: broadcast::Sender<Notification>,
    link: Mutex<Option<Link>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    last_error: Mutex<Option<TransportError>>,
}

impl BtleplugTransport {
    pub fn new(config: &BleConfig) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (notif_tx, _) = broadcast::channel(256);
        Self {
            config: config.clone(),
            state_tx: Arc::new(state_tx),
            notif_tx,
            link: Mutex::new(None),
            pump: Mutex::new(None),
            last_error: Mutex::new(None),
        }
    }

    fn set_state(&self, next: ConnectionState) {
        set_state(&self.state_tx, next);
    }

    /// Poll scan results until the configured address or name matches, or
    /// the connect timeout elapses.
    async fn discover(&self, central: &Adapter) -> Result<Peripheral, TransportError> {
        central
            .start_scan(ScanFilter::default())
            .await
            .map_err(|e| TransportError::Io(e.to_string()))?;

        let deadline =
            tokio::time::Instant::now() + Duration::from_millis(self.config.connect_timeout_ms);
        let poll = Duration::from_millis(self.config.scan_poll_ms);

        let found = loop {
            let peripherals = central
                .peripherals()
                .await
                .map_err(|e| TransportError::Io(e.to_string()))?;

            let mut matched = None;
            for peripheral in peripherals {
                if self.matches(&peripheral).await {
                    matched = Some(peripheral);
                    break;
                }
            }
            if let Some(peripheral) = matched {
                break Some(peripheral);
            }
            if tokio::time::Instant::now() >= deadline {
                break None;
            }
            tokio::time::sleep(poll).await;
        };

        if let Err(e) = central.stop_scan().await {
            debug!(%e, "stop_scan failed");
        }

        found.ok_or_else(|| {
            TransportError::DeviceUnreachable(format!(
                "no peripheral matching {} found within {}ms",
                self.config.target_description(),
                self.config.connect_timeout_ms
            ))
        })
    }

    async fn matches(&self, peripheral: &Peripheral) -> bool {
        if let Some(address) = &self.config.address {
            if peripheral
                .address()
                .to_string()
                .eq_ignore_ascii_case(address)
            {
                return true;
            }
        }
        if let Some(fragment) = &self.config.device_name {
            if let Ok(Some(props)) = peripheral.properties().await {
                if let Some(name) = props.local_name {
                    return name.contains(fragment.as_str());
                }
            }
        }
        false
    }

    /// Resolve the mower service, falling back to the SUMIC layout
    fn resolve_characteristics(
        peripheral: &Peripheral,
    ) -> Result<(Characteristic, Characteristic), TransportError> {
        let characteristics = peripheral.characteristics();

        for (service, write_uuid, notify_uuid) in GATT_LAYOUTS {
            let write_char = characteristics
                .iter()
                .find(|c| c.uuid == write_uuid && c.service_uuid == service);
            let notify_char = characteristics
                .iter()
                .find(|c| c.uuid == notify_uuid && c.service_uuid == service);
            if let (Some(write_char), Some(notify_char)) = (write_char, notify_char) {
                return Ok((write_char.clone(), notify_char.clone()));
            }
        }

        Err(TransportError::ServiceMismatch(
            "mower service/characteristics not present; wrong device model?".into(),
        ))
    }

    async fn try_connect(&self) -> Result<(), TransportError> {
        let manager = Manager::new()
            .await
            .map_err(|e| TransportError::Io(e.to_string()))?;
        let central = manager
            .adapters()
            .await
            .map_err(|e| TransportError::Io(e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::DeviceUnreachable("no Bluetooth adapter".into()))?;

        let peripheral = self.discover(&central).await?;
        info!(address = %peripheral.address(), "connecting to mower");

        peripheral
            .connect()
            .await
            .map_err(|e| TransportError::DeviceUnreachable(e.to_string()))?;
        self.set_state(ConnectionState::Connected);

        peripheral
            .discover_services()
            .await
            .map_err(|e| TransportError::Io(e.to_string()))?;
        let (write_char, notify_char) = Self::resolve_characteristics(&peripheral)?;

        self.set_state(ConnectionState::Subscribing);
        peripheral
            .subscribe(&notify_char)
            .await
            .map_err(|e| TransportError::SubscriptionFailed(e.to_string()))?;

        let stream = peripheral
            .notifications()
            .await
            .map_err(|e| TransportError::SubscriptionFailed(e.to_string()))?;
        self.start_pump(stream, notify_char.uuid);

        *self.link.lock() = Some(Link {
            peripheral,
            write_char,
            notify_char,
        });
        self.set_state(ConnectionState::Ready);
        info!("mower link ready");
        Ok(())
    }

    /// Forward notifications in arrival order. The stream ending means the
    /// link is gone; that is the single place a peripheral-initiated
    /// disconnect becomes visible.
    fn start_pump(
        &self,
        mut stream: impl futures::Stream<Item = btleplug::api::ValueNotification>
            + Send
            + Unpin
            + 'static,
        notify_uuid: Uuid,
    ) {
        let state_tx = self.state_tx.clone();
        let notif_tx = self.notif_tx.clone();

        let handle = tokio::spawn(async move {
            while let Some(event) = stream.next().await {
                if event.uuid != notify_uuid {
                    continue;
                }
                let _ = notif_tx.send(Notification {
                    received_at: Instant::now(),
                    data: event.value,
                });
            }
            debug!("notification stream ended");
            set_state(&state_tx, ConnectionState::Disconnected);
        });

        if let Some(previous) = self.pump.lock().replace(handle) {
            previous.abort();
        }
    }

    async fn teardown(&self) {
        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }
        let link = self.link.lock().take();
        if let Some(link) = link {
            if let Err(e) = link.peripheral.unsubscribe(&link.notify_char).await {
                debug!(%e, "unsubscribe failed during teardown");
            }
            if let Err(e) = link.peripheral.disconnect().await {
                debug!(%e, "disconnect failed during teardown");
            }
        }
        self.set_state(ConnectionState::Disconnected);
    }
}

fn set_state(state_tx: &watch::Sender<ConnectionState>, next: ConnectionState) {
    state_tx.send_if_modified(|current| {
        if *current == next {
            false
        } else {
            *current = next;
            true
        }
    });
}

#[async_trait]
impl BleTransport for BtleplugTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        // A half-open previous link must not leak its subscription.
        self.teardown().await;
        self.set_state(ConnectionState::Connecting);

        match self.try_connect().await {
            Ok(()) => {
                *self.last_error.lock() = None;
                Ok(())
            }
            Err(e) => {
                warn!(%e, "connect failed");
                *self.last_error.lock() = Some(e.clone());
                self.teardown().await;
                Err(e)
            }
        }
    }

    async fn write(&self, frame: &[u8]) -> Result<(), TransportError> {
        if self.connection_state() != ConnectionState::Ready {
            return Err(TransportError::NotConnected);
        }
        let link = self
            .link
            .lock()
            .clone()
            .ok_or(TransportError::NotConnected)?;

        match link
            .peripheral
            .write(&link.write_char, frame, WriteType::WithoutResponse)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) => {
                let err = TransportError::Io(e.to_string());
                *self.last_error.lock() = Some(err.clone());
                // Write failure on an established link: force the state
                // machine down so the supervisor can recycle the session.
                self.teardown().await;
                Err(err)
            }
        }
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
        self.teardown().await;
    }
}

impl Drop for BtleplugTransport {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }
    }
}
