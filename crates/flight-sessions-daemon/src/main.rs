//! flight-sessions daemon.
//!
//! Loads the config, owns the session manager for the lifetime of the
//! process, sweeps expired tokens in the background and serves the HTTP
//! front-end until Ctrl-C.

mod cli;

use clap::Parser;
use cli::Args;
use flight_sessions_core::event_bus::EventBus;
use flight_sessions_core::SessionManager;
use flight_sessions_http::SharedState;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = match args.resolve_config() {
        Ok(config) => config,
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let sessions = Arc::new(SessionManager::from_config(&config));
    log::info!(
        "Session pool ready: max sessions {}, max tokens {}, token ttl {}s",
        config.max_sessions,
        config.token_capacity(),
        config.token_ttl_secs
    );

    let event_log = spawn_event_log(sessions.events());
    let reaper = spawn_reaper(Arc::clone(&sessions), config.reap_interval());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            log::error!("Failed to bind HTTP server to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    let state = Arc::new(SharedState::new(Arc::clone(&sessions)));
    let served = flight_sessions_http::serve(listener, state, async {
        tokio::signal::ctrl_c().await.ok();
    })
    .await;

    reaper.abort();
    event_log.abort();

    match served {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("HTTP server failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Periodically drop expired tokens and their sessions.
fn spawn_reaper(sessions: Arc<SessionManager>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let reaped = sessions.reap_expired();
            if reaped > 0 {
                let stats = sessions.stats();
                log::info!(
                    "Reaped {} expired token(s), pool {}/{}",
                    reaped,
                    stats.used,
                    stats.capacity
                );
            }
        }
    })
}

/// Mirror lifecycle events into the log.
fn spawn_event_log(events: &EventBus) -> JoinHandle<()> {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => log::debug!(
                    "{} token={} used={}{}",
                    event.kind.as_str(),
                    event.token,
                    event.used,
                    event
                        .reason
                        .as_deref()
                        .map(|r| format!(" reason={}", r))
                        .unwrap_or_default()
                ),
                Err(RecvError::Lagged(missed)) => {
                    log::warn!("Lifecycle log lagged, {} event(s) dropped", missed)
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flight_sessions_core::TokenDetails;

    #[tokio::test]
    async fn reaper_frees_slots_of_expired_tokens() {
        let sessions = Arc::new(SessionManager::builder().capacity(1).build());
        sessions
            .tokens()
            .insert(TokenDetails::new(
                "tok-short",
                "alice",
                "127.0.0.1:1",
                Duration::from_millis(500),
            ))
            .unwrap();
        sessions.get_or_create("tok-short").unwrap();
        assert_eq!(sessions.stats().used, 1);

        let reaper = spawn_reaper(Arc::clone(&sessions), Duration::from_millis(20));

        let freed = tokio::time::timeout(Duration::from_secs(5), async {
            while sessions.stats().used > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        reaper.abort();

        assert!(freed.is_ok());
        assert_eq!(sessions.stats().tokens, 0);
    }

    #[tokio::test]
    async fn event_log_stops_when_bus_is_dropped() {
        let events = EventBus::new();
        let task = spawn_event_log(&events);
        drop(events);

        let finished = tokio::time::timeout(Duration::from_secs(5), task).await;
        assert!(finished.is_ok());
    }
}
