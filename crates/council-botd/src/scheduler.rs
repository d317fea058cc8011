//! Periodic expiration sweeps.

use std::sync::Arc;
use std::time::Duration;

use council_store::PollStore;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, error};

/// Run expiration sweeps at `interval` until shutdown is signalled.
///
/// The first tick fires immediately, so polls that went overdue while the
/// daemon was down conclude right after startup. Sweep failures are logged
/// and the cadence keeps going; a wedged state directory should not take
/// the whole daemon down.
pub(crate) async fn run_expiry_sweeps(
    store: Arc<Mutex<PollStore>>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                debug!("running expiration sweep");
                if let Err(err) = store.lock().expire_polls() {
                    error!(error = %err, "expiration sweep failed");
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    debug!("expiration sweeps stopping");
                    return;
                }
            }
        }
    }
}
