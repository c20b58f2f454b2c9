use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::{mpsc, watch};

use crate::connectivity::{self, Connectivity, ConnectivityState};
use crate::registry::QueueHandle;
use crate::state::SharedState;

const FALLBACK_INTERVAL: Duration = Duration::from_secs(1);

/// Drive flush passes until shutdown is signalled.
///
/// A pass over every queue runs on each sync interval tick and whenever
/// connectivity comes back. Background-sync tags flush their queue right away
/// when online, or are held until the next online transition.
pub async fn run(
    state: SharedState,
    mut tags: mpsc::UnboundedReceiver<String>,
    sync_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!(
        "Sync worker started ({} queues, every {sync_interval:?})",
        state.queues.len()
    );

    let mut connectivity = state.connectivity.subscribe();
    let mut deferred: HashSet<String> = HashSet::new();
    let mut ticker = interval_timer(sync_interval);

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = ticker.tick() => {
                if state.connectivity.is_online() {
                    unless_shutdown(&mut shutdown, flush_all(&state)).await;
                }
            }
            changed = connectivity.changed() => {
                if changed.is_err() {
                    break;
                }
                let online = connectivity.borrow_and_update().is_online();
                if online {
                    tracing::debug!("Back online, flushing all queues");
                    deferred.clear();
                    unless_shutdown(&mut shutdown, flush_all(&state)).await;
                }
            }
            tag = tags.recv() => {
                let Some(tag) = tag else {
                    tracing::debug!("Background sync channel closed");
                    break;
                };
                deferred.insert(tag);
                if state.connectivity.is_online() {
                    let due: Vec<String> = deferred.drain().collect();
                    let passes = async {
                        for tag in &due {
                            flush_tag(&state, tag).await;
                        }
                    };
                    unless_shutdown(&mut shutdown, passes).await;
                }
            }
        }
    }

    tracing::info!("Sync worker stopped");
}

/// Keep `connectivity` in line with whether `url` answers.
pub async fn run_probe(
    connectivity: Connectivity,
    url: String,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval_timer(interval);
    let client = connectivity::probe_client(ticker.period().min(Duration::from_secs(10)));

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = ticker.tick() => {
                let state = connectivity::probe(&client, &url).await;
                if state == ConnectivityState::Offline && connectivity.is_online() {
                    tracing::warn!("Connectivity probe to {url} failed, going offline");
                }
                connectivity.set(state);
            }
        }
    }

    tracing::debug!("Connectivity probe stopped");
}

/// `tokio::time::interval` panics on a zero period.
fn interval_timer(period: Duration) -> tokio::time::Interval {
    let period = if period.is_zero() {
        tracing::warn!("Zero worker interval, using {FALLBACK_INTERVAL:?}");
        FALLBACK_INTERVAL
    } else {
        period
    };
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker
}

/// Run `pass` to completion unless shutdown is signalled first. An abandoned
/// delivery leaves its entry queued for the next start.
async fn unless_shutdown(shutdown: &mut watch::Receiver<bool>, pass: impl Future<Output = ()>) {
    tokio::select! {
        _ = pass => {}
        _ = stopped(shutdown) => {
            tracing::info!("Shutdown requested, abandoning flush pass");
        }
    }
}

async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// One pass over every queue. Queues are independent, so they run side by side.
pub async fn flush_all(state: &SharedState) {
    join_all(state.queues.list().into_iter().map(|queue| flush_one(queue.as_ref()))).await;
}

async fn flush_tag(state: &SharedState, tag: &str) {
    match state.queues.by_sync_tag(tag) {
        Some(queue) => flush_one(queue.as_ref()).await,
        None => tracing::warn!("Background sync for unknown tag {tag}"),
    }
}

async fn flush_one(queue: &dyn QueueHandle) {
    match queue.flush().await {
        Ok(outcome) => tracing::debug!("Flush of {}: {outcome:?}", queue.name()),
        Err(e) => tracing::error!("Flush of {} failed: {e}", queue.name()),
    }
}
