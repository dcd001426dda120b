//! kandav server: composition root.
//!
//! Loads the configuration document, builds the board file store once,
//! wires the file watcher, and serves the WebDAV/CalDAV adapters.
mod api;
mod dav_xml;
mod state;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tower_http::cors::CorsLayer;

use kandav_core::config::Config;
use kandav_core::dav::locks::MemoryLockStore;
use kandav_core::store::BoardFileStore;
use kandav_core::watcher::file_watcher::FileWatcher;
use kandav_core::watcher::types::WatchEvent;

use crate::state::AppState;

const CONFIG_ENV: &str = "KANDAV_CONFIG";
const DEFAULT_CONFIG: &str = "kandav.json";

fn config_path() -> PathBuf {
    std::env::var(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG))
}

fn load_config(path: &Path) -> Config {
    match std::fs::read_to_string(path) {
        Ok(text) => match serde_json::from_str(&text) {
            Ok(config) => config,
            Err(e) => {
                log::error!("[kandav.config] Invalid config {:?}: {}", path, e);
                Config::default()
            }
        },
        Err(e) => {
            log::warn!(
                "[kandav.config] No config at {:?} ({}), starting with defaults",
                path,
                e
            );
            Config::default()
        }
    }
}

/// Register every configured board, returning the canonical paths that are
/// now tracked. Failures are logged and skipped, not fatal.
fn register_boards(store: &BoardFileStore, config: &Config) -> Vec<PathBuf> {
    let mut tracked = Vec::new();
    for entry in &config.boards {
        let path = PathBuf::from(&entry.file);
        match store.register(&path, entry.to_options()) {
            Ok(canonical) => {
                log::info!("[kandav.config] Tracking board {:?}", canonical);
                tracked.push(canonical);
            }
            Err(e) => log::warn!("[kandav.config] Failed to load board {:?}: {}", path, e),
        }
    }
    tracked
}

/// Re-diff the tracked board set after a config change.
fn apply_config_change(
    store: &BoardFileStore,
    watcher: &mut FileWatcher,
    config: &Config,
    tracked: &mut Vec<PathBuf>,
) {
    let before: HashSet<PathBuf> = tracked.iter().cloned().collect();
    let mut after = Vec::new();

    for entry in &config.boards {
        let path = PathBuf::from(&entry.file);
        match store.register(&path, entry.to_options()) {
            Ok(canonical) => {
                if !before.contains(&canonical) {
                    if let Err(e) = watcher.watch_board(&canonical) {
                        log::warn!("[kandav.config] Failed to watch {:?}: {}", canonical, e);
                    }
                }
                after.push(canonical);
            }
            Err(e) => log::warn!("[kandav.config] Failed to load board {:?}: {}", path, e),
        }
    }

    let after_set: HashSet<PathBuf> = after.iter().cloned().collect();
    for removed in before.difference(&after_set) {
        log::info!("[kandav.config] Untracking board {:?}", removed);
        store.unregister(removed);
        watcher.unwatch_board(removed);
    }

    *tracked = after;
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config_file = config_path();
    let config = load_config(&config_file);
    let bind_address = config.bind_address.clone();
    let port = config.port;

    let store = Arc::new(BoardFileStore::new());
    let mut tracked = register_boards(&store, &config);

    let watcher = match FileWatcher::new() {
        Ok((mut watcher, event_rx)) => {
            for path in &tracked {
                if let Err(e) = watcher.watch_board(path) {
                    log::warn!("[kandav.watcher] Failed to watch {:?}: {}", path, e);
                }
            }
            if config_file.exists() {
                if let Err(e) = watcher.watch_config(&config_file) {
                    log::warn!("[kandav.watcher] Failed to watch config: {}", e);
                }
            }

            let store_for_events = store.clone();
            let config_file_for_events = config_file.clone();
            let watcher = Arc::new(tokio::sync::Mutex::new(watcher));
            let watcher_for_events = watcher.clone();

            tokio::spawn(async move {
                let mut event_rx = event_rx;
                loop {
                    match event_rx.recv().await {
                        Ok(WatchEvent::BoardChanged { path })
                        | Ok(WatchEvent::BoardCreated { path }) => {
                            if store_for_events.check_self_write(&path) {
                                log::debug!(
                                    "[kandav.events] Suppressed self-write echo for {:?}",
                                    path
                                );
                                continue;
                            }
                            if let Err(e) = store_for_events.reload(&path) {
                                log::warn!("[kandav.events] Failed to reload {:?}: {}", path, e);
                            }
                        }
                        Ok(WatchEvent::BoardRemoved { path }) => {
                            // Editors often replace files via remove+create;
                            // only untrack when the file is really gone.
                            if path.exists() {
                                if let Err(e) = store_for_events.reload(&path) {
                                    log::warn!(
                                        "[kandav.events] Failed to reload {:?}: {}",
                                        path,
                                        e
                                    );
                                }
                            } else {
                                log::info!("[kandav.events] Board file deleted: {:?}", path);
                                store_for_events.unregister(&path);
                            }
                        }
                        Ok(WatchEvent::ConfigChanged) => {
                            log::info!("[kandav.events] Config changed, re-reading");
                            let config = load_config(&config_file_for_events);
                            let mut watcher = watcher_for_events.lock().await;
                            apply_config_change(
                                &store_for_events,
                                &mut watcher,
                                &config,
                                &mut tracked,
                            );
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            log::warn!("[kandav.events] Lagged by {} events", n);
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                            log::info!("[kandav.events] Event channel closed");
                            break;
                        }
                    }
                }
            });

            Some(watcher)
        }
        Err(e) => {
            log::warn!(
                "[kandav.watcher] File watching disabled ({}), external edits need a restart",
                e
            );
            None
        }
    };
    // Keep the watcher alive for the process lifetime.
    let _watcher = watcher;

    let app_state = AppState::new(store, Arc::new(MemoryLockStore::new()));
    let app = api::api_router()
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    let addr = format!("{}:{}", bind_address, port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            log::error!("[kandav.server] Failed to bind {}: {}", addr, e);
            return;
        }
    };
    log::info!("[kandav.server] Listening on http://{}", addr);

    if let Err(e) = axum::serve(listener, app).await {
        log::error!("[kandav.server] Server error: {}", e);
    }
}
