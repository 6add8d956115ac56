// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Cancellation plumbing between signal handling and the control loop.

use tokio::sync::watch;

/// Trigger side. Cloneable; triggering more than once is harmless.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

/// Receiving side, checked by the loop at every suspension point.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

/// Create a connected trigger/signal pair.
pub fn channel() -> (Shutdown, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (Shutdown { tx }, ShutdownSignal { rx })
}

impl Shutdown {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl ShutdownSignal {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown has been triggered. Never resolves if every
    /// [`Shutdown`] was dropped without triggering.
    pub async fn triggered(&mut self) {
        let closed = self.rx.wait_for(|stop| *stop).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }
}

/// Trigger `shutdown` on the first SIGINT or SIGTERM.
pub fn listen_for_signals(shutdown: Shutdown) -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => log::info!("Received SIGINT"),
            _ = sigterm.recv() => log::info!("Received SIGTERM"),
        }
        shutdown.trigger();
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_triggered_resolves_after_trigger() {
        let (shutdown, mut signal) = channel();
        assert!(!signal.is_triggered());

        let waiter = tokio::spawn(async move {
            signal.triggered().await;
            signal.is_triggered()
        });
        shutdown.trigger();
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_trigger_before_wait_is_not_missed() {
        let (shutdown, mut signal) = channel();
        shutdown.trigger();
        tokio::time::timeout(Duration::from_millis(100), signal.triggered())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_dropped_trigger_never_resolves() {
        let (shutdown, mut signal) = channel();
        drop(shutdown);
        assert!(
            tokio::time::timeout(Duration::from_millis(20), signal.triggered())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_subscribers_see_trigger() {
        let (shutdown, _signal) = channel();
        let late = shutdown.subscribe();
        shutdown.trigger();
        assert!(late.is_triggered());
    }
}
