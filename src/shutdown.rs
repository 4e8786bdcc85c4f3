//! Shutdown coordination
//!
//! A [`ShutdownTrigger`] is the single handle allowed to request shutdown.
//! Any number of [`ShutdownToken`]s can wait for it.

use tokio::sync::watch;
use tracing::info;

pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownToken) {
    let (sender, receiver) = watch::channel(false);
    (
        ShutdownTrigger { sender },
        ShutdownToken { receiver },
    )
}

#[derive(Debug)]
pub struct ShutdownTrigger {
    sender: watch::Sender<bool>,
}

#[derive(Debug, Clone)]
pub struct ShutdownToken {
    receiver: watch::Receiver<bool>,
}

impl ShutdownTrigger {
    pub fn fire(self) {
        self.sender.send_replace(true);
    }
}

impl ShutdownToken {
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once the trigger fires. Never resolves if the trigger is
    /// dropped without firing.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }

        let mut receiver = self.receiver.clone();
        if receiver.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Waits for SIGINT or SIGTERM, then fires the trigger.
pub async fn listen_for_signals(trigger: ShutdownTrigger) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!(signal = "SIGINT", "termination signal received"),
        _ = terminate => info!(signal = "SIGTERM", "termination signal received"),
    }

    trigger.fire();
}
