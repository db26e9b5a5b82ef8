//! Process signals the daemon reacts to.

use std::io;

use tokio::signal::unix::{Signal, SignalKind, signal};

/// Resolves when the daemon is asked to shut down.
pub struct Terminate {
    /// Ctrl+C from a terminal.
    sigint: Signal,
    /// Service manager stop.
    sigterm: Signal,
}

impl Terminate {
    pub fn new() -> io::Result<Self> {
        let sigint = signal(SignalKind::interrupt())?;
        let sigterm = signal(SignalKind::terminate())?;

        Ok(Self { sigint, sigterm })
    }

    /// Waits for SIGINT or SIGTERM.
    pub async fn recv(&mut self) {
        tokio::select! {
            _ = self.sigint.recv() => {}
            _ = self.sigterm.recv() => {}
        }
    }
}

/// Resolves when the daemon is asked to reload its configuration.
pub struct Hangup {
    sighup: Signal,
}

impl Hangup {
    pub fn new() -> io::Result<Self> {
        let sighup = signal(SignalKind::hangup())?;

        Ok(Self { sighup })
    }

    /// Waits for SIGHUP.
    pub async fn recv(&mut self) {
        self.sighup.recv().await;
    }
}
