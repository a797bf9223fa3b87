//! Printer driver: connection state machine and print orchestration.
//!
//! The printer only talks back through notifications, so every call that
//! needs an answer (`connect`, `print`) writes its request and then waits
//! for the event task to observe the matching notification.
//!
//! Concurrency model:
//! - `DeviceInfo` (including the state) sits behind a plain mutex and is
//!   only ever held for short, non-async sections.
//! - The transport lives inside an async mutex. Holding it is the write
//!   lock: a print keeps it from its first segment until the printer
//!   reports completion, so a status poll can never land mid-job.
//! - Each connection gets a [`Session`]. Ending the session cancels its
//!   event task, its poller, and any print waiting on it.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use image::DynamicImage;
use tokio::sync::{Mutex as AsyncMutex, Notify, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::bitmap::{Bitmap, ImageBitmap, PackedBitmap};
use crate::options::DriverOptions;
use crate::poller;
use crate::protocol::{Notification, PrintJob, commands, notification};
use crate::state::{DeviceInfo, PrinterState};
use crate::transport::{Link, Transport, TransportEvent};
use crate::{PrinterError, Result};

/// Identity of one connection.
#[derive(Debug, Clone)]
pub(crate) struct Session {
    pub(crate) id: u64,
    pub(crate) token: CancellationToken,
}

impl Session {
    fn ended() -> Self {
        let token = CancellationToken::new();
        token.cancel();
        Self { id: 0, token }
    }
}

/// Sleep for `duration`; returns `true` if the token was cancelled first.
async fn sleep_or_cancel(token: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = token.cancelled() => true,
        _ = tokio::time::sleep(duration) => false,
    }
}

type ReadySender = Option<oneshot::Sender<PrinterState>>;

pub(crate) struct Shared<T> {
    pub(crate) options: DriverOptions,
    info: Mutex<DeviceInfo>,
    session: Mutex<Session>,
    link: AsyncMutex<Option<T>>,
    finished: Notify,
    pub(crate) poll_now: Notify,
}

impl<T: Transport> Shared<T> {
    fn new(options: DriverOptions) -> Self {
        Self {
            options,
            info: Mutex::new(DeviceInfo::default()),
            session: Mutex::new(Session::ended()),
            link: AsyncMutex::new(None),
            finished: Notify::new(),
            poll_now: Notify::new(),
        }
    }

    fn info(&self) -> MutexGuard<'_, DeviceInfo> {
        self.info.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn state(&self) -> PrinterState {
        self.info().state
    }

    /// Whether `session` is the live connection.
    fn is_current(&self, session: &Session) -> bool {
        let current = self.session();
        current.id == session.id && !current.token.is_cancelled()
    }

    /// Whether no connection was started after `session`. Must be checked
    /// under the link lock, which `connect` holds while swapping sessions.
    fn is_latest(&self, session: &Session) -> bool {
        self.session().id == session.id
    }

    fn start_session(&self) -> Session {
        let mut current = self.session();
        current.token.cancel();
        *current = Session {
            id: current.id + 1,
            token: CancellationToken::new(),
        };
        *self.info() = DeviceInfo::connecting();
        current.clone()
    }

    /// Mark `session` disconnected. Returns `false` if it had already ended.
    fn end_session(&self, session: &Session) -> bool {
        let current = self.session();
        if current.id != session.id || current.token.is_cancelled() {
            return false;
        }
        current.token.cancel();
        let previous = std::mem::take(&mut *self.info()).state;
        drop(current);

        tracing::info!(session = session.id, from = %previous, "Printer disconnected");
        true
    }

    /// Claim the printer for a print: `Ready -> Busy`.
    fn begin_print(&self) -> Result<Session> {
        let session = self.session().clone();
        let mut info = self.info();
        if !info.state.accepts_print() {
            return Err(PrinterError::NotReady(info.state));
        }
        info.state = PrinterState::Busy;
        Ok(session)
    }

    /// Release the printer after a print: `Busy -> Ready`. A paper-out or
    /// disconnect seen while printing takes precedence.
    fn finish_print(&self) {
        let mut info = self.info();
        if info.state == PrinterState::Busy {
            info.state = PrinterState::Ready;
        }
    }

    fn check_poll(&self) -> Result<()> {
        let state = self.state();
        if state.accepts_poll() {
            Ok(())
        } else {
            Err(PrinterError::NotReady(state))
        }
    }

    /// Write the combined status query under the write lock.
    pub(crate) async fn poll_status(&self, session: &Session) -> Result<()> {
        self.check_poll()?;
        let link = self.link.lock().await;
        if !self.is_current(session) {
            return Err(PrinterError::NotConnected);
        }
        // A print may have started while we waited for the lock.
        self.check_poll()?;

        let transport = link.as_ref().ok_or(PrinterError::NotConnected)?;
        tracing::debug!("Polling printer status");
        transport.write(&commands::status_poll()).await
    }

    async fn close_transport(slot: &mut Option<T>) {
        if let Some(transport) = slot.take() {
            if let Err(err) = transport.close().await {
                tracing::debug!(error = %err, "Error while closing transport");
            }
        }
    }

    fn handle_notification(
        &self,
        session: &Session,
        event: Notification,
        ready_tx: &mut ReadySender,
    ) {
        if !self.is_current(session) {
            return;
        }

        match event {
            Notification::Ready => {
                tracing::info!("Printer ready for printing");
                self.poll_now.notify_one();
            }
            Notification::Finished => {
                // Wakes only a print already past its grace delay. With no
                // waiter registered the signal is dropped.
                tracing::debug!("Printer reported print finished");
                self.finished.notify_waiters();
            }
            Notification::ReadyForData(extra) => {
                tracing::debug!(data = %notification::hex(&extra), "Printer ready for data");
            }
            Notification::BatteryLevel(level) => {
                tracing::debug!(level, "Battery level");
                self.info().battery_level = i32::from(level);
            }
            Notification::FirmwareVersion(version) => {
                tracing::debug!(%version, "Firmware version");
                self.info().firmware_version = version.to_string();
            }
            Notification::PaperStatus { loaded } => {
                self.on_paper_status(loaded, ready_tx);
            }
            Notification::Acknowledged => {
                tracing::trace!("Command acknowledged");
            }
            Notification::Unknown(data) => {
                tracing::info!(data = %notification::hex(&data), "Ignoring unknown notification");
            }
        }
    }

    fn on_paper_status(&self, loaded: bool, ready_tx: &mut ReadySender) {
        let (old, new) = {
            let mut info = self.info();
            let old = info.state;
            if !loaded {
                info.state = PrinterState::OutOfPaper;
            } else if old != PrinterState::Busy {
                info.state = PrinterState::Ready;
            }
            (old, info.state)
        };

        if old != new {
            tracing::info!(from = %old, to = %new, "Printer state changed");
        }
        if old == PrinterState::Connecting {
            if let Some(tx) = ready_tx.take() {
                let _ = tx.send(new);
            }
        }
    }
}

/// Consume the transport's events for one session.
async fn run_events<T: Transport>(
    shared: Arc<Shared<T>>,
    mut events: mpsc::Receiver<TransportEvent>,
    session: Session,
    ready_tx: oneshot::Sender<PrinterState>,
) {
    let mut ready_tx = Some(ready_tx);

    loop {
        let event = tokio::select! {
            _ = session.token.cancelled() => break,
            event = events.recv() => event,
        };

        match event {
            Some(TransportEvent::Notification(data)) => {
                let parsed = Notification::parse(&data);
                shared.handle_notification(&session, parsed, &mut ready_tx);
            }
            Some(TransportEvent::Disconnected) | None => {
                shared.end_session(&session);
                break;
            }
        }
    }

    tracing::debug!(session = session.id, "Event task stopped");
}

/// Driver for one T02 printer.
///
/// Cloning is cheap and every clone drives the same printer.
pub struct Printer<T: Transport> {
    shared: Arc<Shared<T>>,
}

impl<T: Transport> Clone for Printer<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T: Transport> Default for Printer<T> {
    fn default() -> Self {
        Self::new(DriverOptions::default())
    }
}

impl<T: Transport> Printer<T> {
    pub fn new(options: DriverOptions) -> Self {
        Self {
            shared: Arc::new(Shared::new(options)),
        }
    }

    pub fn options(&self) -> &DriverOptions {
        &self.shared.options
    }

    /// Snapshot of the last known device details. Never blocks on I/O.
    pub fn info(&self) -> DeviceInfo {
        self.shared.info().clone()
    }

    pub fn state(&self) -> PrinterState {
        self.shared.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() != PrinterState::Disconnected
    }

    /// Take over an established link and wait until the printer reports its
    /// paper status, which resolves `Connecting` to `Ready` or `OutOfPaper`.
    ///
    /// Fails with [`PrinterError::ConnectionLost`] if the link drops first
    /// and with [`PrinterError::ConnectTimeout`] if no status arrives in
    /// time; the link is closed in that case.
    pub async fn connect(&self, link: Link<T>) -> Result<PrinterState> {
        let Link { transport, events } = link;

        let session = {
            let mut slot = self.shared.link.lock().await;
            if self.state() != PrinterState::Disconnected {
                drop(slot);
                if let Err(err) = transport.close().await {
                    tracing::debug!(error = %err, "Error while closing rejected link");
                }
                return Err(PrinterError::AlreadyConnected);
            }

            Shared::close_transport(&mut slot).await;
            let session = self.shared.start_session();
            *slot = Some(transport);
            session
        };

        tracing::info!(session = session.id, "Printer link established, waiting for status");

        let (ready_tx, ready_rx) = oneshot::channel();
        tokio::spawn(run_events(
            self.shared.clone(),
            events,
            session.clone(),
            ready_tx,
        ));
        tokio::spawn(poller::run(self.shared.clone(), session.clone()));

        let timeout = self.shared.options.connect_timeout;
        match tokio::time::timeout(timeout, ready_rx).await {
            Ok(Ok(state)) => {
                tracing::info!(%state, "Printer connected");
                Ok(state)
            }
            Ok(Err(_)) => Err(PrinterError::ConnectionLost),
            Err(_) => {
                tracing::warn!(
                    timeout_secs = timeout.as_secs(),
                    "Printer never reported paper status, giving up"
                );
                self.close_session(&session).await;
                Err(PrinterError::ConnectTimeout(timeout.as_secs()))
            }
        }
    }

    async fn close_session(&self, session: &Session) {
        self.shared.end_session(session);
        let mut slot = self.shared.link.lock().await;
        if self.shared.is_latest(session) {
            Shared::close_transport(&mut slot).await;
        }
    }

    /// Close the current connection. A print in progress fails with
    /// [`PrinterError::PrintIncomplete`].
    pub async fn disconnect(&self) -> Result<()> {
        let session = self.shared.session().clone();
        self.shared.end_session(&session);

        let mut slot = self.shared.link.lock().await;
        if !self.shared.is_latest(&session) {
            return Ok(());
        }
        match slot.take() {
            Some(transport) => transport.close().await,
            None => Ok(()),
        }
    }

    /// Ask the printer for battery, paper and firmware status now.
    ///
    /// Answers arrive as notifications and show up in [`Printer::info`].
    pub async fn refresh_status(&self) -> Result<()> {
        let session = self.shared.session().clone();
        self.shared.poll_status(&session).await
    }

    /// Convert a decoded image with the configured black point and print it.
    pub async fn print_image(&self, image: &DynamicImage) -> Result<()> {
        let bitmap = ImageBitmap::from_dynamic(image, self.shared.options.print.black_point);
        self.print(&bitmap).await
    }

    /// Pack and print a bitmap.
    pub async fn print<B: Bitmap + ?Sized>(&self, bitmap: &B) -> Result<()> {
        let packed = PackedBitmap::pack(bitmap)?;
        self.print_packed(&packed).await
    }

    /// Print an already packed bitmap and wait for the printer to finish.
    ///
    /// Only accepted while [`PrinterState::Ready`]; a print arriving while
    /// another is in flight is rejected rather than queued. Oversized or
    /// empty bitmaps are rejected before anything is written.
    pub async fn print_packed(&self, bitmap: &PackedBitmap) -> Result<()> {
        let job = PrintJob::encode(bitmap, &self.shared.options.print)?;
        let session = self.shared.begin_print()?;

        let mut slot = self.shared.link.lock().await;
        if !self.shared.is_current(&session) {
            return Err(PrinterError::NotConnected);
        }
        let Some(transport) = slot.as_ref() else {
            self.shared.finish_print();
            return Err(PrinterError::NotConnected);
        };

        tracing::info!(%bitmap, bytes = job.len(), segments = job.segments().len(), "Sending print job");
        for segment in job.segments() {
            if let Err(err) = transport.write(segment).await {
                tracing::error!(error = %err, "Couldn't write print job");
                self.shared.finish_print();
                return Err(err);
            }
        }

        // The printer signals "finished" once right after the transfer; only
        // listen after that has had time to pass.
        if sleep_or_cancel(&session.token, self.shared.options.finish_grace).await {
            return Err(PrinterError::PrintIncomplete);
        }
        let finished = self.shared.finished.notified();
        tracing::info!("Waiting for printer to finish");

        let timeout = self.shared.options.print_timeout;
        tokio::select! {
            _ = finished => {
                self.shared.finish_print();
                tracing::info!("Print finished");
                Ok(())
            }
            _ = session.token.cancelled() => {
                tracing::warn!("Printer disconnected while printing");
                Err(PrinterError::PrintIncomplete)
            }
            _ = tokio::time::sleep(timeout) => {
                tracing::warn!(timeout_secs = timeout.as_secs(), "Print never finished, dropping connection");
                self.shared.end_session(&session);
                Shared::close_transport(&mut slot).await;
                Err(PrinterError::PrintTimeout(timeout.as_secs()))
            }
        }
    }
}
