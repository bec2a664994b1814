//! Service wiring: one durable store, one reactive store, one lifecycle
//!
//! [`Harmonic`] is constructed explicitly and passed by handle; nothing in
//! the workspace is a global.

use crate::config::{DatabaseTarget, HarmonicConfig};
use crate::error::AppError;
use harmonic_durable::{
    ClearReport, DurableStore, ExportDocument, MemoryBackend, SqliteBackend, StorageBackend,
    StoreStats,
};
use harmonic_model::{Clock, SystemClock};
use harmonic_reactive::ReactiveStore;
use std::path::Path;
use std::sync::Arc;

/// Build the storage backend a config points at
#[must_use]
pub fn backend_for(target: &DatabaseTarget) -> Arc<dyn StorageBackend> {
    match target {
        DatabaseTarget::Memory => Arc::new(MemoryBackend::new()),
        DatabaseTarget::Sqlite(path) => Arc::new(SqliteBackend::file(path)),
    }
}

/// The running store pair
#[derive(Debug)]
pub struct Harmonic {
    config: HarmonicConfig,
    durable: Arc<DurableStore>,
    store: ReactiveStore,
}

impl Harmonic {
    /// Open storage, start the reactive store and hydrate it
    pub async fn start(config: HarmonicConfig) -> Result<Self, AppError> {
        let backend = backend_for(&config.database);
        Self::start_with(config, backend, Arc::new(SystemClock)).await
    }

    /// Same as [`Harmonic::start`] with an explicit backend and clock
    pub async fn start_with(
        config: HarmonicConfig,
        backend: Arc<dyn StorageBackend>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AppError> {
        config.validate()?;
        let durable = Arc::new(DurableStore::with_clock(backend, clock));
        durable.init().await?;

        let store = ReactiveStore::new(Arc::clone(&durable), config.reactive())?;
        store.initialize(config.initial_message_limit).await?;
        tracing::info!(database = ?config.database, "harmonic started");

        Ok(Self {
            config,
            durable,
            store,
        })
    }

    /// Active configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &HarmonicConfig {
        &self.config
    }

    /// The reactive store (what the UI talks to)
    #[inline]
    #[must_use]
    pub fn store(&self) -> &ReactiveStore {
        &self.store
    }

    /// The durable store
    #[inline]
    #[must_use]
    pub fn durable(&self) -> &Arc<DurableStore> {
        &self.durable
    }

    /// Row counts after pending writes land
    pub async fn stats(&self) -> Result<StoreStats, AppError> {
        self.store.flush().await?;
        Ok(self.durable.stats().await?)
    }

    /// Export everything after pending writes land
    pub async fn export(&self) -> Result<ExportDocument, AppError> {
        self.store.flush().await?;
        Ok(self.durable.export_data().await?)
    }

    /// Write an export to `path` as pretty JSON
    pub async fn export_to(&self, path: &Path) -> Result<StoreStats, AppError> {
        let export = self.export().await?;
        std::fs::write(path, export.to_json()?)?;
        tracing::info!(path = %path.display(), "export written");
        Ok(export.data.stats)
    }

    /// Import an export file
    ///
    /// Rows land in the durable store only; the reactive view picks them up
    /// on the next start.
    pub async fn import_from(&self, path: &Path) -> Result<StoreStats, AppError> {
        let json = std::fs::read_to_string(path)?;
        let export = ExportDocument::from_json(&json)?;
        self.store.flush().await?;
        Ok(self.durable.import_data(&export).await?)
    }

    /// Remove messages and events older than `days` (configured retention if `None`)
    pub async fn prune(&self, days: Option<u32>) -> Result<ClearReport, AppError> {
        let days = days.unwrap_or(self.config.retention_days);
        self.store.flush().await?;
        Ok(self.durable.clear_old_data(days).await?)
    }

    /// Empty every collection
    pub async fn clear(&self) -> Result<StoreStats, AppError> {
        self.store.flush().await?;
        Ok(self.durable.clear_all().await?)
    }

    /// Flush, stop the reactive store and close storage
    pub async fn shutdown(self) -> Result<(), AppError> {
        self.store.dispose().await?;
        self.durable.close().await?;
        tracing::info!("harmonic stopped");
        Ok(())
    }
}
