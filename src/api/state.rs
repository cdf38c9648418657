use std::sync::Arc;

use crate::config::Config;
use crate::convert::Converter;
use crate::observability::Metrics;
use crate::retention::{ExpiryLedger, RetentionError, RetentionScheduler};
use crate::storage::UploadStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<UploadStore>,
    pub converter: Arc<Converter>,
    pub retention: Arc<RetentionScheduler>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: UploadStore,
        converter: Converter,
        retention: RetentionScheduler,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store: Arc::new(store),
            converter: Arc::new(converter),
            retention: Arc::new(retention),
            metrics,
        }
    }

    /// Wire every component from configuration, opening the expiry ledger
    pub fn from_config(config: Config) -> Result<Self, RetentionError> {
        let store = UploadStore::new(
            config.storage.upload_dir.clone(),
            config.server.public_base_url.clone(),
        );
        let converter = Converter::from_config(store.clone(), &config.conversion);

        let metrics = Arc::new(Metrics::new());
        let ledger = ExpiryLedger::open(&config.storage.ledger_path)?;
        let retention = RetentionScheduler::new(ledger, Arc::clone(&metrics));

        Ok(Self::new(config, store, converter, retention, metrics))
    }
}
