use super::{OrderRecord, OrderRegistry, OrderStatus};
use crate::code::Code;
use crate::error::{RegistryError, Result};
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Registry held in memory, optionally loaded from and written back to a JSON file
pub struct InMemoryRegistry {
    records: RwLock<Vec<OrderRecord>>,
    persist_path: Option<PathBuf>,
    outage: Mutex<Option<String>>,
    latency: Mutex<Duration>,
    lookups: AtomicU64,
    mutations: AtomicU64,
}

impl InMemoryRegistry {
    pub fn new(records: Vec<OrderRecord>) -> Self {
        Self {
            records: RwLock::new(records),
            persist_path: None,
            outage: Mutex::new(None),
            latency: Mutex::new(Duration::ZERO),
            lookups: AtomicU64::new(0),
            mutations: AtomicU64::new(0),
        }
    }

    /// Load a JSON array of order records. With `persist`, serve confirmations
    /// are written back to the same file.
    pub async fn from_json_file<P: AsRef<Path>>(path: P, persist: bool) -> Result<Self> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path).await?;
        let records: Vec<OrderRecord> = serde_json::from_str(&contents)?;

        info!("Loaded {} order(s) from {}", records.len(), path.display());

        let mut registry = Self::new(records);
        if persist {
            registry.persist_path = Some(path.to_path_buf());
        }
        Ok(registry)
    }

    /// Simulate an outage; every call fails as unavailable until cleared
    pub fn set_outage(&self, details: Option<&str>) {
        *self.outage.lock() = details.map(str::to_string);
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    pub fn insert(&self, record: OrderRecord) {
        self.records.write().push(record);
    }

    pub fn get(&self, order_id: &str) -> Option<OrderRecord> {
        self.records.read().iter().find(|r| r.id == order_id).cloned()
    }

    /// Lookups served so far
    pub fn lookup_count(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }

    /// Serve confirmations applied so far
    pub fn mutation_count(&self) -> u64 {
        self.mutations.load(Ordering::Relaxed)
    }

    async fn simulate_conditions(&self) -> std::result::Result<(), RegistryError> {
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if let Some(details) = self.outage.lock().clone() {
            return Err(RegistryError::Unavailable { details });
        }
        Ok(())
    }

    async fn persist(&self) -> std::result::Result<(), RegistryError> {
        let Some(path) = &self.persist_path else {
            return Ok(());
        };

        let json = {
            let records = self.records.read();
            serde_json::to_string_pretty(&*records).map_err(|e| RegistryError::Data {
                details: e.to_string(),
            })?
        };

        tokio::fs::write(path, json).await.map_err(|e| RegistryError::Data {
            details: format!("Failed to write {}: {}", path.display(), e),
        })?;

        debug!("Persisted registry to {}", path.display());
        Ok(())
    }
}

#[async_trait::async_trait]
impl OrderRegistry for InMemoryRegistry {
    async fn lookup(&self, code: &Code) -> std::result::Result<Option<OrderRecord>, RegistryError> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        self.simulate_conditions().await?;

        let found = self.records.read().iter().find(|r| r.matches(code)).cloned();
        debug!("Registry lookup for {} -> {:?}", code, found.as_ref().map(|r| &r.id));
        Ok(found)
    }

    async fn mark_served(&self, order_id: &str) -> std::result::Result<OrderRecord, RegistryError> {
        self.simulate_conditions().await?;

        let updated = {
            let mut records = self.records.write();
            let record = records
                .iter_mut()
                .find(|r| r.id == order_id)
                .ok_or_else(|| RegistryError::UnknownOrder {
                    order_id: order_id.to_string(),
                })?;

            match record.status {
                OrderStatus::Pending => {
                    record.status = OrderStatus::Confirmed;
                    record.clone()
                }
                OrderStatus::Confirmed => {
                    return Err(RegistryError::ServeRefused {
                        order_id: order_id.to_string(),
                        reason: "already confirmed".to_string(),
                    })
                }
                OrderStatus::Canceled => {
                    return Err(RegistryError::ServeRefused {
                        order_id: order_id.to_string(),
                        reason: "order canceled".to_string(),
                    })
                }
            }
        };

        self.mutations.fetch_add(1, Ordering::Relaxed);
        info!("Order {} marked as served", order_id);

        if let Err(e) = self.persist().await {
            warn!("Serve confirmation for {} not persisted: {}", order_id, e);
        }

        Ok(updated)
    }
}
