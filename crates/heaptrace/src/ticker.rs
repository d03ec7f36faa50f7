use crossbeam_channel::{Sender, bounded, select};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::{Platform, Tracker};

/// Background thread that ages a tracker's live allocations at a fixed period.
///
/// Spawning arms the tracker's concurrency gate, since from then on the tracker is shared
/// with a second thread. Dropping the handle stops the thread and waits for it.
pub struct Ticker {
    shutdown_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    pub fn spawn<const N: usize, P>(
        tracker: &'static Tracker<N, P>,
        period: Duration,
    ) -> std::io::Result<Self>
    where
        P: Platform + Sync + 'static,
    {
        tracker.arm();

        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("heaptrace-ticker".into())
            .spawn(move || {
                loop {
                    select! {
                        recv(shutdown_rx) -> _ => break,
                        default(period) => tracker.tick(),
                    }
                }
            })?;

        Ok(Self {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
