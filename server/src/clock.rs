//! Match countdown and the delayed start announcement

use crate::network::MatchContext;
use log::{debug, info};
use photon_shared::{encode_control, START_CODE};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, sleep, Duration, MissedTickBehavior};

/// Counts the match down one second at a time
///
/// Reaching zero while the match is running triggers the stop sequence. An
/// external stop wakes the task through `running` and it exits without
/// stopping a second time.
pub(crate) async fn run_clock(ctx: Arc<MatchContext>, mut running: watch::Receiver<bool>) {
    let mut ticker = interval(Duration::from_secs(1));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // Skip the first tick since it fires immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            changed = running.changed() => {
                if changed.is_err() || !*running.borrow() {
                    debug!("Match clock stopped externally");
                    return;
                }
            }
            _ = ticker.tick() => {
                let time_left = {
                    let mut state = ctx.state.write().await;
                    if !state.is_running() {
                        return;
                    }
                    state.tick()
                };

                if time_left == 0 {
                    info!("Time is up");
                    ctx.finish_match().await;
                    return;
                }
                if time_left % 30 == 0 {
                    info!("{} seconds left", time_left);
                } else {
                    debug!("{} seconds left", time_left);
                }
            }
        }
    }
}

/// Sends the start code once the grace period has passed
///
/// A stop during the grace period cancels the announcement.
pub(crate) async fn run_announcer(ctx: Arc<MatchContext>, mut running: watch::Receiver<bool>) {
    let grace = sleep(ctx.config.start_grace);
    tokio::pin!(grace);

    loop {
        tokio::select! {
            _ = &mut grace => break,
            changed = running.changed() => {
                if changed.is_err() || !*running.borrow() {
                    debug!("Start announcement cancelled");
                    return;
                }
            }
        }
    }

    // Holding the state lock orders this before any stop codes.
    let state = ctx.state.read().await;
    if state.is_running() {
        ctx.enqueue(encode_control(START_CODE));
        info!("Start code queued");
    }
}
