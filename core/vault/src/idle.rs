//! Idle-timeout locking.
//!
//! Polls [`VaultSession::check_idle`] on a fixed interval. This is a poll, not
//! a precise timer: a session locks up to one poll period after the timeout.

use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::session::VaultSession;

/// Background task that locks an idle session.
///
/// Holds only a weak reference, so it never keeps a session alive and
/// exits on its own once the session is dropped.
pub struct IdleMonitor {
    handle: JoinHandle<()>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl IdleMonitor {
    /// Start polling at the session's configured interval.
    pub fn spawn(session: &Arc<VaultSession>) -> Self {
        let weak = Arc::downgrade(session);
        let period = session.config().idle_poll_interval();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!(period_secs = period.as_secs(), "Idle monitor started");

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        debug!("Idle monitor stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let Some(session) = weak.upgrade() else {
                            debug!("Session dropped; idle monitor exiting");
                            break;
                        };
                        if session.check_idle().await {
                            info!("Idle timeout reached");
                        }
                    }
                }
            }
        });

        Self {
            handle,
            shutdown: Some(shutdown_tx),
        }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stop polling and wait for the task to exit.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.handle).await;
    }
}

impl Drop for IdleMonitor {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
