use crate::{deliver, Message, Notifier};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

/// Send an "Update" message every `every` until `stop` turns true or its sender is dropped.
/// The first message goes out after one full interval.
pub fn spawn_heartbeat(
    notifier: Arc<dyn Notifier>,
    every: Duration,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let every = every.max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            if *stop.borrow_and_update() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    deliver(notifier.as_ref(), &Message::new("Update", "Updating...")).await;
                }
                changed = stop.changed() => {
                    if changed.is_err() { break; }
                }
            }
        }
        debug!("heartbeat stopped");
    })
}
