//! The watch loop: one shared connection, the default handler table, and a
//! log line for everything the server pushes.

use anyhow::{anyhow, Context, Result};
use linkup_sync::{
    default_table, ConnectionManager, ConnectionState, EventRouter, Invalidate, OnlineRoster,
    TracingAlerts,
};
use linkup_transport::{Credential, WebSocketConfig, WebSocketConnector};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;

/// How long to wait for the first connection before giving up.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Wait before the first reacquire after the session gives up; doubled for
/// each further round.
const REACQUIRE_DELAY: Duration = Duration::from_secs(10);

/// Reacquire rounds without a connection in between before the watcher exits.
const MAX_REACQUIRE_ROUNDS: u32 = 3;

/// Delay before reacquire round `round` (0-based), `None` once exhausted.
fn reacquire_delay(round: u32) -> Option<Duration> {
    (round < MAX_REACQUIRE_ROUNDS).then(|| REACQUIRE_DELAY * 2u32.pow(round))
}

/// Logs invalidations instead of refetching; the watcher has no REST client.
struct LogInvalidate(&'static str);

impl Invalidate for LogInvalidate {
    fn invalidate(&self) {
        info!(store = self.0, "Cached data is stale");
    }
}

/// Run until Ctrl-C.
///
/// # Errors
///
/// Returns an error if no credential is configured, the first connection
/// cannot be established, or reconnection keeps giving up.
pub async fn run(config: Config) -> Result<()> {
    let credential = Credential::new(config.token()?);
    let connector = WebSocketConnector::new(WebSocketConfig {
        url: config.sync.realtime.url.clone(),
        ..WebSocketConfig::default()
    });

    let manager = ConnectionManager::new(
        Arc::new(connector),
        config.sync.realtime.reconnect_policy(),
    )
    .with_event_capacity(config.sync.realtime.event_capacity);

    let handle = manager.acquire(credential.clone()).await;
    let roster = OnlineRoster::new();
    let router = EventRouter::new();
    router.bind(
        &handle,
        default_table(
            Arc::new(TracingAlerts),
            Arc::new(LogInvalidate("notifications")),
            Arc::new(LogInvalidate("requests")),
            Some(roster.clone()),
        ),
    )?;

    tokio::time::timeout(CONNECT_TIMEOUT, handle.wait_connected())
        .await
        .context("Timed out waiting for the realtime connection")??;
    handle.request_online_users()?;

    let mut states = handle.watch_state()?;
    let mut rounds = 0;
    let mut outcome = Ok(());
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *states.borrow_and_update();
                match state {
                    ConnectionState::Connected => {
                        rounds = 0;
                        info!(socket = ?handle.socket_id(), online = roster.count(), "Connected");
                        if let Err(e) = handle.request_online_users() {
                            warn!(error = %e, "Could not request the online roster");
                        }
                    }
                    ConnectionState::Disconnected => {
                        let Some(delay) = reacquire_delay(rounds) else {
                            outcome = Err(anyhow!("Realtime connection gave up {rounds} times in a row"));
                            break;
                        };
                        rounds += 1;
                        warn!(retry_in = ?delay, round = rounds, "Realtime connection gave up; reacquiring");
                        tokio::select! {
                            _ = tokio::signal::ctrl_c() => {
                                info!("Shutting down");
                                break;
                            }
                            () = tokio::time::sleep(delay) => {}
                        }
                        manager.acquire(credential.clone()).await;
                        manager.release();
                    }
                    other => info!(state = %other, "Connection state changed"),
                }
            }
        }
    }

    router.unbind_all();
    manager.teardown(&credential).await;
    outcome
}
