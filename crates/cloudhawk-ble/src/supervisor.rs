//! Reconnection supervisor
//!
//! An explicit state machine over the transport's connection lifecycle:
//! Idle -> Connecting -> Connected -> Backoff -> Connecting -> ...
//!
//! Consumer BLE peripherals drop links routinely; the supervisor recycles
//! the session on disconnects and on staleness (no state update within the
//! configured window), with capped exponential backoff so a sleeping or
//! out-of-range mower is not hammered. While connected it also runs the
//! notification pipeline and the baseline fallback refresh.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{BackoffConfig, MowerConfig, TimingConfig};
use crate::dispatcher::CommandDispatcher;
use crate::protocol::{self, Command};
use crate::state::StateStore;
use crate::transport::{BleTransport, ConnectionState};

/// Supervisor states, published through a watch channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SupervisorState {
    /// No session requested
    #[default]
    Idle,
    Connecting,
    Connected,
    /// Waiting out a backoff delay before the next attempt
    Backoff,
}

/// Exponential backoff with a cap.
///
/// Pure function of the attempt number so tests can check the schedule
/// without real delays.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    initial: Duration,
    max: Duration,
}

impl BackoffPolicy {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max }
    }

    pub fn from_config(config: &BackoffConfig) -> Self {
        Self::new(
            Duration::from_millis(config.initial_ms),
            Duration::from_millis(config.max_ms),
        )
    }

    /// Delay before retry `attempt` (0-based): initial * 2^attempt, capped
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor).min(self.max)
    }
}

/// Queries issued after every (re)connect to rebuild the state image
const INITIAL_QUERIES: [Command; 10] = [
    Command::QueryFirmware,
    Command::QuerySerial,
    Command::QueryBattery,
    Command::QuerySignal,
    Command::QueryTrimming,
    Command::QueryRainDelay,
    Command::QueryUltrasonic,
    Command::QueryWorkingHours,
    Command::QueryFaultLog,
    Command::QueryStatus,
];

enum ServeOutcome {
    Stopped,
    LinkLost,
    Stale,
}

struct SupervisorInner {
    transport: Arc<dyn BleTransport>,
    store: Arc<StateStore>,
    dispatcher: Arc<CommandDispatcher>,
    timing: TimingConfig,
    backoff: BackoffPolicy,
    state_tx: watch::Sender<SupervisorState>,
}

impl SupervisorInner {
    fn set_state(&self, next: SupervisorState) {
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

/// Owns the reconnect loop for one mower
pub struct Supervisor {
    inner: Arc<SupervisorInner>,
    stop_tx: parking_lot::Mutex<Option<watch::Sender<bool>>>,
    task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl Supervisor {
    pub fn new(
        transport: Arc<dyn BleTransport>,
        store: Arc<StateStore>,
        dispatcher: Arc<CommandDispatcher>,
        config: &MowerConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(SupervisorState::Idle);
        Self {
            inner: Arc::new(SupervisorInner {
                transport,
                store,
                dispatcher,
                timing: config.timing.clone(),
                backoff: BackoffPolicy::from_config(&config.backoff),
                state_tx,
            }),
            stop_tx: parking_lot::Mutex::new(None),
            task: parking_lot::Mutex::new(None),
        }
    }

    pub fn state(&self) -> SupervisorState {
        *self.inner.state_tx.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<SupervisorState> {
        self.inner.state_tx.subscribe()
    }

    /// Start the reconnect loop. No-op when already running.
    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.as_ref().map(|t| !t.is_finished()).unwrap_or(false) {
            return;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        *self.stop_tx.lock() = Some(stop_tx);
        let inner = self.inner.clone();
        *task = Some(tokio::spawn(run(inner, stop_rx)));
    }

    /// Stop the loop: interrupts an in-progress backoff wait, abandons an
    /// in-progress connect attempt, and closes the transport.
    pub async fn stop(&self) {
        let stop_tx = self.stop_tx.lock().take();
        if let Some(stop_tx) = stop_tx {
            let _ = stop_tx.send(true);
        }
        let task = self.task.lock().take();
        if let Some(task) = task {
            if task.await.is_err() {
                debug!("supervisor task aborted");
            }
        }
        // Belt and braces: the loop closes the transport on exit, but a
        // panicked task must not leak the link.
        self.inner.transport.close().await;
        self.inner.set_state(SupervisorState::Idle);
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

async fn run(inner: Arc<SupervisorInner>, mut stop_rx: watch::Receiver<bool>) {
    let mut attempt: u32 = 0;

    loop {
        if *stop_rx.borrow() {
            break;
        }
        inner.set_state(SupervisorState::Connecting);
        let connected = tokio::select! {
            result = inner.transport.connect() => result,
            _ = stop_rx.changed() => break,
        };

        match connected {
            Ok(()) => {
                attempt = 0;
                // Fresh link, possibly a different physical device: stale
                // data from the previous session must not carry over.
                inner.store.reset();
                inner.set_state(SupervisorState::Connected);
                info!("mower session established");

                // Subscribe before the query burst so replies that arrive
                // while commands are still being spaced out are not lost.
                let notifications = inner.transport.notifications();
                initial_queries(&inner, &mut stop_rx).await;

                match serve(&inner, notifications, &mut stop_rx).await {
                    ServeOutcome::Stopped => break,
                    ServeOutcome::LinkLost => warn!("mower link lost"),
                    ServeOutcome::Stale => warn!("mower state stale, recycling link"),
                }
            }
            Err(e) => {
                debug!(%e, "connect attempt failed");
            }
        }

        if *stop_rx.borrow() {
            break;
        }

        let delay = inner.backoff.delay(attempt);
        attempt = attempt.saturating_add(1);
        inner.set_state(SupervisorState::Backoff);
        debug!(delay_ms = delay.as_millis() as u64, attempt, "backing off");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = stop_rx.changed() => break,
        }
    }

    inner.transport.close().await;
    inner.set_state(SupervisorState::Idle);
}

/// Rebuild the state image after (re)connect. Commands are spaced out;
/// the mower drops back-to-back writes.
async fn initial_queries(inner: &SupervisorInner, stop_rx: &mut watch::Receiver<bool>) {
    let spacing = Duration::from_millis(inner.timing.query_spacing_ms);
    for command in INITIAL_QUERIES {
        if let Err(e) = inner.dispatcher.query(command).await {
            debug!(%e, ?command, "initial query failed");
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(spacing) => {}
            _ = stop_rx.changed() => return,
        }
    }
}

/// Serve one established link until it drops, goes stale, or we stop
async fn serve(
    inner: &SupervisorInner,
    mut notifications: tokio::sync::broadcast::Receiver<crate::transport::Notification>,
    stop_rx: &mut watch::Receiver<bool>,
) -> ServeOutcome {
    // The stop edge may have been consumed during the query burst.
    if *stop_rx.borrow() {
        return ServeOutcome::Stopped;
    }
    let mut link = inner.transport.watch_state();
    // The link may already be gone by the time we get here.
    if *link.borrow_and_update() == ConnectionState::Disconnected {
        return ServeOutcome::LinkLost;
    }

    let refresh_interval = Duration::from_secs(inner.timing.refresh_interval_secs);
    let staleness_window = Duration::from_secs(inner.timing.staleness_window_secs);
    let mut refresh = tokio::time::interval_at(Instant::now() + refresh_interval, refresh_interval);
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            _ = stop_rx.changed() => return ServeOutcome::Stopped,

            changed = link.changed() => {
                if changed.is_err()
                    || *link.borrow_and_update() == ConnectionState::Disconnected
                {
                    return ServeOutcome::LinkLost;
                }
            }

            notification = notifications.recv() => {
                match notification {
                    Ok(notification) => {
                        last_seen = Instant::now();
                        handle_frame(inner, &notification.data);
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "notification receiver lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        return ServeOutcome::LinkLost;
                    }
                }
            }

            _ = refresh.tick() => {
                inner.dispatcher.refresh().await;
            }

            _ = tokio::time::sleep_until(last_seen + staleness_window) => {
                return ServeOutcome::Stale;
            }
        }
    }
}

/// Decode one notification and merge it. Undecodable frames are logged and
/// dropped; they never take the connection down or reach the state model.
fn handle_frame(inner: &SupervisorInner, data: &[u8]) {
    match protocol::decode(data) {
        Ok(frame) => {
            let changes = inner.store.apply(frame.into_update());
            if !changes.is_empty() {
                debug!(?changes, "state updated");
            }
        }
        Err(e) => {
            warn!(%e, frame = %hex::encode(data), "discarding frame");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_delays_increase_then_cap() {
        let policy = BackoffPolicy::new(Duration::from_secs(5), Duration::from_secs(80));
        let delays: Vec<Duration> = (0..6).map(|attempt| policy.delay(attempt)).collect();

        assert_eq!(delays[0], Duration::from_secs(5));
        assert_eq!(delays[1], Duration::from_secs(10));
        assert_eq!(delays[2], Duration::from_secs(20));
        assert_eq!(delays[3], Duration::from_secs(40));
        assert_eq!(delays[4], Duration::from_secs(80));
        // Capped from here on
        assert_eq!(delays[5], Duration::from_secs(80));

        for pair in delays.windows(2) {
            assert!(pair[0] < pair[1] || pair[1] == Duration::from_secs(80));
        }
    }

    #[test]
    fn backoff_survives_large_attempt_numbers() {
        let policy = BackoffPolicy::new(Duration::from_secs(5), Duration::from_secs(80));
        assert_eq!(policy.delay(40), Duration::from_secs(80));
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(80));
    }
}
