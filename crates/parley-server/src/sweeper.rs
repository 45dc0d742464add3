//! Background eviction of idle sessions.

use crate::state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Spawn the idle sweeper if a session TTL is configured.
pub fn spawn_idle_sweeper(state: Arc<AppState>) -> Option<JoinHandle<()>> {
    let ttl = state.config.session_ttl()?;
    let period = Duration::from_secs(state.config.sweep_interval_secs.max(1));
    info!(
        target: "parley::startup",
        "Evicting sessions idle for {}s (sweep every {}s)",
        ttl.as_secs(),
        period.as_secs()
    );

    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let evicted = state.session_manager.evict_idle(ttl);
            if evicted > 0 {
                debug!(
                    target: "parley::session",
                    "Sweep evicted {} sessions, {} remain",
                    evicted,
                    state.session_manager.store().len()
                );
            }
        }
    }))
}
