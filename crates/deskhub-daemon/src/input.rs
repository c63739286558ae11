//! Pending user-input requests.
//!
//! An app asks for user input with `get input`; the UI answers with a
//! `user_input` command. Each app has at most one pending request, which
//! expires after the configured timeout.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

#[derive(Debug)]
struct PendingInput {
    ticket: u64,
    cancel: CancellationToken,
}

#[derive(Debug, Clone, Default)]
pub struct InputRequests {
    pending: Arc<Mutex<HashMap<String, PendingInput>>>,
    next_ticket: Arc<AtomicU64>,
}

impl InputRequests {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a request slot for `app`, replacing any earlier one.
    ///
    /// Must be called from within a tokio runtime.
    pub fn begin(&self, app: &str, timeout: Duration) {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();

        {
            let Ok(mut pending) = self.pending.lock() else {
                error!("[{}] Input request table poisoned, dropping request", app);
                return;
            };
            let previous = pending.insert(
                app.to_string(),
                PendingInput {
                    ticket,
                    cancel: cancel.clone(),
                },
            );
            if let Some(previous) = previous {
                debug!("[{}] Replacing pending input request", app);
                previous.cancel.cancel();
            }
        }

        let pending = Arc::clone(&self.pending);
        let app = app.to_string();
        tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {}
                () = tokio::time::sleep(timeout) => {
                    let Ok(mut pending) = pending.lock() else {
                        error!("[{}] Input request table poisoned", app);
                        return;
                    };
                    if pending.get(&app).is_some_and(|p| p.ticket == ticket) {
                        pending.remove(&app);
                        warn!("[{}] User input request timed out after {:?}", app, timeout);
                    }
                }
            }
        });
    }

    /// Take the pending slot for `app`. Returns `false` if nothing was
    /// pending (never requested, already answered or expired).
    pub fn complete(&self, app: &str) -> bool {
        self.take(app)
    }

    /// Drop the pending slot without answering.
    pub fn cancel(&self, app: &str) -> bool {
        let cancelled = self.take(app);
        if cancelled {
            debug!("[{}] Input request cancelled", app);
        }
        cancelled
    }

    fn take(&self, app: &str) -> bool {
        let Ok(mut pending) = self.pending.lock() else {
            error!("[{}] Input request table poisoned", app);
            return false;
        };
        match pending.remove(app) {
            Some(slot) => {
                slot.cancel.cancel();
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn is_pending(&self, app: &str) -> bool {
        self.pending
            .lock()
            .is_ok_and(|pending| pending.contains_key(app))
    }
}
