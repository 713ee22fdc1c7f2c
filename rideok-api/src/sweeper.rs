use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};

use rideok_core::ExpirySweeper;

/// Runs the expiration sweeper on its own task for the life of the process.
///
/// One task owns the timer and awaits each drain to completion before the
/// next tick can fire (missed ticks are delayed, not stacked), so a slow
/// sweep over a large backlog never overlaps with the following one. A
/// failed tick is logged and the next tick retries from scratch.
pub fn spawn(sweeper: ExpirySweeper, interval_seconds: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(interval_seconds));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Expiration sweeper started, interval {}s", interval_seconds);

        loop {
            ticker.tick().await;
            match sweeper.run_once(Utc::now()).await {
                Ok(processed) => {
                    if processed > 0 {
                        info!("Marked a total of {} rides as expired.", processed);
                    }
                }
                Err(e) => error!("Error in checking expired rides: {}", e),
            }
        }
    })
}
