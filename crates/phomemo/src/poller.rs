//! Background status polling for a connected printer.
//!
//! One poller runs per connection. It writes the combined status query on
//! every tick, and immediately when the driver asks for a fresh status
//! (for instance when the printer reports it is ready again). Polls are
//! skipped while a print holds the printer.

use std::sync::Arc;

use tokio::time::MissedTickBehavior;

use crate::driver::{Session, Shared};
use crate::transport::Transport;

pub(crate) async fn run<T: Transport>(shared: Arc<Shared<T>>, session: Session) {
    let mut ticker = tokio::time::interval(shared.options.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = session.token.cancelled() => break,
            _ = ticker.tick() => {}
            _ = shared.poll_now.notified() => ticker.reset(),
        }

        if let Err(err) = shared.poll_status(&session).await {
            tracing::debug!(error = %err, "Status poll skipped");
        }
    }

    tracing::debug!(session = session.id, "Status poller stopped");
}
