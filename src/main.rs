//! `aquamon`: headless water-quality monitor.
//!
//! Mounts the dashboard and history controllers against the configured bridge
//! and store, then logs live readings and notifications until Ctrl-C.

use chrono::Utc;
use std::error::Error;
use std::sync::Arc;

use aquamon_service::config::{AppConfig, BridgeMode, StoreBackend};
use aquamon_service::dashboard::DashboardController;
use aquamon_service::dev_mode::ReplayBridge;
use aquamon_service::history::HistoryController;
use aquamon_service::ingest::SensorBridge;
use aquamon_service::ingest::bridge::HttpBridge;
use aquamon_service::logging::{self, Component, LogLevel};
use aquamon_service::notify::{Notification, NotificationKind, Notifier};
use aquamon_service::parameters::{summarize_persisted, summarize_reading};
use aquamon_service::store::memory::MemoryStore;
use aquamon_service::store::pg::PgStore;
use aquamon_service::store::{ReadingStore, ReadingStoreClient};
use aquamon_service::verify;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Defaults until the config says otherwise, so config loading can log.
    logging::init_logger(LogLevel::Info, None, false);

    let config = AppConfig::load_or_default(&AppConfig::default_path());
    logging::init_logger(
        config.logging.min_level(),
        config.logging.file.as_deref(),
        config.logging.console_timestamps,
    );

    println!("\n💧 Water quality monitor");
    println!("   {}\n", config.summary());

    // Store
    let backend: Arc<dyn ReadingStore> = match config.store.backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::Postgres => match PgStore::from_env().await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                logging::error(Component::Store, None, &e.to_string());
                return Err(e.into());
            }
        },
    };
    let store = ReadingStoreClient::new(backend, config.store.refresh_interval());

    // Bridge
    let bridge: Arc<dyn SensorBridge> = match config.bridge.mode {
        BridgeMode::Http => Arc::new(HttpBridge::new(
            &config.bridge.endpoint(),
            config.bridge.request_timeout(),
        )?),
        BridgeMode::Replay => {
            let records = match store.snapshot().await {
                Ok(records) => records,
                Err(e) => {
                    logging::warn(Component::Bridge, None, &format!("nothing to replay: {}", e));
                    Vec::new()
                }
            };
            Arc::new(ReplayBridge::from_records(&records))
        }
    };

    let report = verify::run_verification(bridge.as_ref(), &store).await;
    verify::print_summary(&report);

    let (notifier, mut toasts) = Notifier::channel(Component::Dashboard);
    let mut history = HistoryController::mount(store.clone(), notifier.for_component(Component::History));
    let mut dashboard = DashboardController::mount(
        bridge,
        config.bridge.acquisition_options(),
        store,
        notifier,
    );

    let toast_ms = config.notifications.toast_ms;
    let mut visible: Vec<Notification> = Vec::new();
    let mut live = dashboard.live();
    let mut updates = history.updates();

    logging::info(Component::System, None, "running - press Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = live.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *live.borrow();
                let badge = if state.connected { "connected" } else { "disconnected" };
                logging::debug(
                    Component::Dashboard,
                    Some(badge),
                    &summarize_reading(&state.reading),
                );
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = history.view();
                logging::debug(
                    Component::History,
                    None,
                    &format!("{} readings from {} sources", view.readings.len(), view.sources.len()),
                );
                if let Some(newest) = view.readings.first() {
                    logging::debug(
                        Component::History,
                        Some(newest.source_display()),
                        &format!("{}: {}", newest.label_display(), summarize_persisted(newest)),
                    );
                }
            }
            Some(toast) = toasts.recv() => {
                let marker = match toast.kind {
                    NotificationKind::Success => "✓",
                    NotificationKind::Error => "✗",
                };
                println!("   {} {}", marker, toast.message);
                let now = Utc::now();
                visible.retain(|t| !t.is_expired_at(now, toast_ms));
                if !visible.is_empty() {
                    logging::debug(
                        Component::System,
                        None,
                        &format!("{} earlier notifications still showing", visible.len()),
                    );
                }
                visible.push(toast);
            }
        }
    }

    logging::info(Component::System, None, "shutting down");
    dashboard.shutdown();
    history.shutdown();
    Ok(())
}
