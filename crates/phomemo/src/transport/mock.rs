//! In-memory transport for testing without printer hardware.
//!
//! [`MockTransport::link`] returns the transport side, to be handed to the
//! driver, and a [`MockHandle`] that plays the printer: it records every
//! write and injects notifications or a disconnect.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::mpsc;

use super::{EVENT_CHANNEL_CAPACITY, Link, Transport, TransportEvent};
use crate::{PrinterError, Result};

#[derive(Debug, Default)]
struct MockState {
    writes: Mutex<Vec<Vec<u8>>>,
    write_delay: Mutex<Duration>,
    fail_writes: AtomicBool,
    closed: AtomicBool,
}

impl MockState {
    fn writes(&self) -> MutexGuard<'_, Vec<Vec<u8>>> {
        self.writes.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn write_delay(&self) -> Duration {
        *self.write_delay.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Transport that records writes instead of sending them.
#[derive(Debug)]
pub struct MockTransport {
    state: Arc<MockState>,
}

impl MockTransport {
    /// Create a connected transport and the handle controlling it.
    pub fn link() -> (Link<MockTransport>, MockHandle) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let state = Arc::new(MockState::default());

        let transport = Self {
            state: state.clone(),
        };
        let handle = MockHandle { state, event_tx };

        (Link::new(transport, event_rx), handle)
    }
}

impl Transport for MockTransport {
    async fn write(&self, data: &[u8]) -> Result<()> {
        let delay = self.state.write_delay();
        if delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(delay).await;
        }

        if self.state.closed.load(Ordering::SeqCst) {
            return Err(PrinterError::NotConnected);
        }
        if self.state.fail_writes.load(Ordering::SeqCst) {
            return Err(PrinterError::Write("mock write failure".into()));
        }
        self.state.writes().push(data.to_vec());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.state.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Printer side of a [`MockTransport`].
#[derive(Debug, Clone)]
pub struct MockHandle {
    state: Arc<MockState>,
    event_tx: mpsc::Sender<TransportEvent>,
}

impl MockHandle {
    /// Push a raw notification buffer to the driver.
    pub async fn notify(&self, data: &[u8]) {
        let _ = self
            .event_tx
            .send(TransportEvent::Notification(data.to_vec()))
            .await;
    }

    /// Report paper loaded (`1A 06 89`) or absent (`1A 06 88`).
    pub async fn paper(&self, loaded: bool) {
        let status = if loaded { 0x89 } else { 0x88 };
        self.notify(&[0x1a, 0x06, status]).await;
    }

    /// Report a finished print (`1A 0F 0C`).
    pub async fn finished(&self) {
        self.notify(&[0x1a, 0x0f, 0x0c]).await;
    }

    /// Drop the link.
    pub async fn disconnect(&self) {
        let _ = self.event_tx.send(TransportEvent::Disconnected).await;
    }

    /// Every write so far, in order.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state.writes().clone()
    }

    /// Return and clear the recorded writes.
    pub fn take_writes(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *self.state.writes())
    }

    /// Make subsequent writes fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.state.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Delay every write by `delay` before it is recorded.
    pub fn set_write_delay(&self, delay: Duration) {
        *self
            .state
            .write_delay
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = delay;
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }
}
