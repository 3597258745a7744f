//! Wiring: configuration → ports → router state.

use campus_realtime::Hub;
use std::sync::Arc;
use thiserror::Error;

use crate::auth::StaticTokenAuth;
use crate::config::{AppConfig, ValidationError};
use crate::gateways::{
    CompletionGateway, DailyRoomProvider, Disabled, HttpCompletionGateway, PaymentGateway,
    StripeGateway, VideoRoomProvider,
};
use crate::http::AppState;
use crate::store::{MemoryStore, RocksStore, RocksStoreConfig, Store, StoreError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("failed to open store: {0}")]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("realtime server error: {0}")]
    Realtime(#[from] campus_realtime::RealtimeError),
}

fn open_store(config: &AppConfig) -> Result<Arc<dyn Store>, StoreError> {
    match &config.store.path {
        Some(path) => {
            let mut rocks = RocksStoreConfig::new(path);
            rocks.sync_writes = config.store.sync_writes;
            Ok(Arc::new(RocksStore::open(rocks)?))
        }
        None => {
            log::warn!("No store path configured; rows are kept in memory");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

fn payments(config: &AppConfig) -> Arc<dyn PaymentGateway> {
    match &config.payment.stripe_api_key {
        Some(key) => Arc::new(StripeGateway::new(
            key.clone(),
            config.payment.base_url.clone(),
            config.payment.currency.clone(),
        )),
        None => Arc::new(Disabled("payments")),
    }
}

fn video(config: &AppConfig) -> Arc<dyn VideoRoomProvider> {
    match &config.video.api_key {
        Some(key) => Arc::new(DailyRoomProvider::new(
            key.clone(),
            config.video.base_url.clone(),
            config.video.room_ttl_secs,
        )),
        None => Arc::new(Disabled("video rooms")),
    }
}

fn completions(config: &AppConfig) -> Arc<dyn CompletionGateway> {
    match &config.ai.api_key {
        Some(key) => Arc::new(HttpCompletionGateway::new(
            key.clone(),
            config.ai.base_url.clone(),
            config.ai.model.clone(),
        )),
        None => Arc::new(Disabled("AI gateway")),
    }
}

/// Build the router state. Row changes go to `hub`, which the realtime
/// server shares, so subscribers see them in-process.
pub fn build_state(config: &AppConfig, hub: Arc<Hub>) -> Result<AppState, StartupError> {
    let auth = StaticTokenAuth::new(config.auth.token_table()?);
    if auth.token_count() == 0 {
        log::warn!("No auth tokens configured; every authenticated route will answer 401");
    }

    Ok(AppState {
        auth: Arc::new(auth),
        store: open_store(config)?,
        notifier: hub,
        payments: payments(config),
        video: video(config),
        ai: completions(config),
    })
}
