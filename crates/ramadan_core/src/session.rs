//! Per-session choice between the persisted and the guest store.

use std::sync::Arc;

use crate::error::EngineError;
use crate::planner;
use crate::store::{
    Database, DeviceStorage, LocalStore, OwnerId, PersistedStore, ProgressStore, StoreMode,
};

/// Store selected once at startup and handed to every engine operation.
pub struct Session {
    store: Box<dyn ProgressStore>,
}

impl Session {
    /// Probe the persisted store for `owner`; anything short of a non-empty
    /// tasbeeh list falls back to the device store. Local data is never
    /// copied into the persisted store.
    pub fn bootstrap(
        owner: Option<&OwnerId>,
        database: Arc<Database>,
        device: Arc<dyn DeviceStorage>,
    ) -> Self {
        match Self::probe_persisted(owner, database) {
            Some(store) => {
                tracing::info!(owner = %store.owner(), "using persisted store");
                Self {
                    store: Box::new(store),
                }
            }
            None => {
                tracing::info!("using guest store");
                Self::local(device)
            }
        }
    }

    pub fn local(device: Arc<dyn DeviceStorage>) -> Self {
        Self {
            store: Box::new(LocalStore::new(device)),
        }
    }

    fn probe_persisted(owner: Option<&OwnerId>, database: Arc<Database>) -> Option<PersistedStore> {
        let store = match PersistedStore::open(database, owner) {
            Ok(store) => store,
            Err(err @ (EngineError::Unauthorized | EngineError::NotFound { .. })) => {
                tracing::debug!(%err, "no persisted owner");
                return None;
            }
            Err(err) => {
                tracing::error!(%err, "persisted store unavailable");
                return None;
            }
        };
        let probe = planner::ensure_default_data(&store).and_then(|_| store.tasbeehs());
        match probe {
            Ok(tasbeehs) if !tasbeehs.is_empty() => Some(store),
            Ok(_) => None,
            Err(err) => {
                tracing::error!(owner = %store.owner(), %err, "persisted probe failed");
                None
            }
        }
    }

    pub fn mode(&self) -> StoreMode {
        self.store.mode()
    }

    pub fn owner(&self) -> &OwnerId {
        self.store.owner()
    }

    pub fn store(&self) -> &dyn ProgressStore {
        self.store.as_ref()
    }
}
