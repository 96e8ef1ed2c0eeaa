//! Liveness and reconnect loop: wakes every 30 seconds, reconnects a dead
//! session, aborts an idle one, and probes for desynchronized multiplexers
//! (§4.7).

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, warn};

use crate::commands::cmd;
use crate::loader::LoadSelector;
use crate::panel::{ConnectionStatus, Session};

const WAKE_INTERVAL: Duration = Duration::from_secs(30);
const IDLE_TIMEOUT_SECS: i64 = 180;
const SKEW_PROBE_THRESHOLD_SECS: i64 = 60;
const SKEW_PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Run until the session is torn down for good (this task is aborted by
/// `Panel::disconnect`, it never returns on its own in normal operation).
pub(crate) async fn run(session: Arc<Session>) {
    loop {
        tokio::time::sleep(WAKE_INTERVAL).await;

        if session.is_user_disconnected() {
            return;
        }

        match session.status().await {
            ConnectionStatus::Disconnected => {
                reconnect(&session).await;
            }
            ConnectionStatus::Connected => {
                if let Some(idle) = idle_seconds(&session).await {
                    if idle > IDLE_TIMEOUT_SECS {
                        warn!(idle_seconds = idle, "connection idle past timeout, forcing reconnect");
                        session.teardown().await;
                        reconnect(&session).await;
                        continue;
                    }
                }
                if fifo_stuck_past_threshold(&session).await {
                    run_skew_probe(&session).await;
                }
            }
            ConnectionStatus::Connecting => {}
        }
    }
}

async fn idle_seconds(session: &Arc<Session>) -> Option<i64> {
    let connected = session.connected.read().await;
    connected.as_ref().map(|c| c.mux.seconds_since_activity())
}

async fn fifo_stuck_past_threshold(session: &Arc<Session>) -> bool {
    let connected = session.connected.read().await;
    match connected.as_ref() {
        Some(c) => c.mux.seconds_since_fifo_drained() > SKEW_PROBE_THRESHOLD_SECS,
        None => false,
    }
}

/// Issue the identity command with a bounded timeout; if it doesn't come
/// back, or its family byte doesn't match the negotiated model, the
/// multiplexer has desynchronized (a known panel bug drops one response
/// without ever sending it) — force a reset (§4.7).
async fn run_skew_probe(session: &Arc<Session>) {
    let (mux, expected_family) = {
        let connected = session.connected.read().await;
        match connected.as_ref() {
            Some(c) => (c.mux.clone(), c.caps.model.0),
            None => return,
        }
    };

    let probe = tokio::time::timeout(SKEW_PROBE_TIMEOUT, mux.send_command(cmd::WHAT_ARE_YOU, Vec::new()));
    match probe.await {
        Ok(Ok(reply)) if reply.first().copied() == Some(expected_family) => {
            // Multiplexer is healthy; the long FIFO dwell was just a slow panel.
        }
        Ok(Ok(_)) => {
            warn!("skew probe family mismatch, resetting connection");
            session.teardown().await;
            reconnect(session).await;
        }
        Ok(Err(e)) => {
            warn!(error = %e, "skew probe command failed, resetting connection");
            session.teardown().await;
            reconnect(session).await;
        }
        Err(_) => {
            warn!("skew probe timed out, resetting connection");
            session.teardown().await;
            reconnect(session).await;
        }
    }
}

/// Reconnect with the selector chosen by whether entities are already
/// populated: a prior successful load only needs its status refreshed,
/// otherwise load everything (§4.7).
async fn reconnect(session: &Arc<Session>) {
    let selector = {
        let model = session.model.read().await;
        if model.areas.is_empty() && model.points.is_empty() {
            LoadSelector::ALL
        } else {
            LoadSelector::STATUS_ONLY
        }
    };

    match session.connect_once(selector).await {
        Ok(()) => session.start_connection_tasks().await,
        Err(e) => error!(error = %e, "reconnect attempt failed, will retry next cycle"),
    }
}
