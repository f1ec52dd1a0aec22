//! Process-wide cooperative interruption flag.
//!
//! Poll loops sample the flag before every attempt; nothing aborts an
//! in-flight remote call.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::task::JoinHandle;

/// Shared, thread-safe boolean cell raised when the user interrupts a run.
#[derive(Clone, Debug, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    /// Creates an unset flag that is not shared with any other run.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag for every holder of a clone.
    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Reports whether the flag has been raised.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Spawns a task that raises `flag` on the first Ctrl-C.
///
/// Must be called from within a tokio runtime.
pub fn install_ctrl_c_handler(flag: InterruptFlag) -> JoinHandle<()> {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::warn!("interrupt received; waiting for the current step to unwind");
                flag.set();
            }
            Err(err) => tracing::error!(error = %err, "failed to listen for Ctrl-C"),
        }
    })
}
