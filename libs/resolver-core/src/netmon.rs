//! Watches the network manager's per-link state directory.

use std::io;
use std::path::Path;

use anyhow::{Context as _, Result};
use futures::FutureExt as _;
use futures::StreamExt as _;
use inotify::{EventStream, Inotify, WatchMask};

/// Signals that per-link network configuration, DHCP lease state
/// included, may have changed.
pub(crate) struct NetworkMonitor {
    events: EventStream<[u8; 1024]>,
}

impl NetworkMonitor {
    pub(crate) fn new(state_dir: &Path) -> Result<Self> {
        let links_dir = state_dir.join("links");

        std::fs::create_dir_all(&links_dir)
            .with_context(|| format!("Failed to create {}", links_dir.display()))?;

        let inotify = Inotify::init().context("Failed to initialize inotify")?;
        inotify
            .watches()
            .add(
                &links_dir,
                WatchMask::CREATE | WatchMask::MOVED_TO | WatchMask::CLOSE_WRITE | WatchMask::DELETE,
            )
            .with_context(|| format!("Failed to watch {}", links_dir.display()))?;

        let events = inotify
            .into_event_stream([0u8; 1024])
            .context("Failed to create inotify event stream")?;

        Ok(Self { events })
    }

    /// Wait for the next change, then drain everything already queued so
    /// one sweep covers a whole batch of updates.
    pub(crate) async fn changed(&mut self) -> io::Result<()> {
        match self.events.next().await {
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(e),
            None => return Err(io::Error::other("inotify event stream ended")),
        }

        while let Some(Some(event)) = self.events.next().now_or_never() {
            event?;
        }

        Ok(())
    }
}
