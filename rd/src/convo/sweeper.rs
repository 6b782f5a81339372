//! Expiry sweeper - periodic cancellation of stale dialogues
//!
//! Staff who never answer leave conversations dangling; the sweeper
//! cancels them once their expiry deadline passes so the sessions become
//! free for a fresh dialogue. Sweeps also run on demand via the engine.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::ConversationConfig;

use super::{ConvoEngine, ConvoError};

/// Spawn the periodic sweep task
pub fn spawn_sweeper(engine: ConvoEngine, config: &ConversationConfig) -> JoinHandle<()> {
    let sweep_interval = Duration::from_secs(config.sweep_interval_secs);
    info!(interval_secs = config.sweep_interval_secs, "expiry sweeper started");

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        // the first tick fires immediately, covering conversations that
        // expired while the daemon was down
        loop {
            interval.tick().await;
            debug!("sweeper: tick");
            match engine.sweep_expired().await {
                Ok(0) => {}
                Ok(cancelled) => info!(cancelled, "sweeper: cancelled expired conversations"),
                Err(ConvoError::ChannelError) => {
                    debug!("sweeper: engine gone, stopping");
                    break;
                }
                Err(e) => error!(error = %e, "sweeper: sweep failed"),
            }
        }
    })
}
