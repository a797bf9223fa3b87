//! Retry helpers for BLE adapter initialisation.
//!
//! Right after boot or resume the host Bluetooth stack can report the
//! adapter as unavailable for a short while (BlueZ not yet powered, macOS
//! CentralManager still in its unknown state).

use std::future::Future;
use std::time::Duration;

use crate::{PrinterError, Result};

pub(crate) const RETRY_COUNT: usize = 6;
pub(crate) const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Error substrings reported while the adapter is still coming up.
const TRANSIENT_PATTERNS: &[&str] = &[
    "central manager has invalid state",
    "not ready",
    "not powered",
    "resource not ready",
];

pub(crate) fn is_transient(err: &PrinterError) -> bool {
    match err {
        PrinterError::AdapterUnavailable(msg) | PrinterError::Ble(msg) => {
            let msg = msg.to_ascii_lowercase();
            TRANSIENT_PATTERNS.iter().any(|p| msg.contains(p))
        }
        _ => false,
    }
}

/// Run `init` until it succeeds, fails permanently, or retries run out.
pub(crate) async fn with_retry<T, F, Fut>(mut init: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match init().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < RETRY_COUNT && is_transient(&err) => {
                tracing::debug!(attempt, error = %err, "BLE adapter not ready, retrying");
                attempt += 1;
                tokio::time::sleep(RETRY_DELAY).await;
            }
            Err(err) => return Err(with_platform_hint(err)),
        }
    }
}

/// Add a pointer to the OS permission setting for macOS permission failures.
pub(crate) fn with_platform_hint(err: PrinterError) -> PrinterError {
    #[cfg(target_os = "macos")]
    {
        if let PrinterError::AdapterUnavailable(msg) | PrinterError::Ble(msg) = &err {
            if msg
                .to_ascii_lowercase()
                .contains("central manager has invalid state")
            {
                return PrinterError::AdapterUnavailable(format!(
                    "{msg} (check that Bluetooth is on and allowed under System Settings > Privacy & Security > Bluetooth)"
                ));
            }
        }
    }

    err
}
