//! Courier roster

use super::CatalogResult;
use async_trait::async_trait;
use parking_lot::RwLock;
use shared::models::CourierProfile;
use std::collections::HashMap;
use std::sync::Arc;

/// Courier lookup consumed by the broadcaster
#[async_trait]
pub trait CourierDirectory: Send + Sync {
    /// Active, approved couriers affiliated with any of `vendor_ids`
    async fn eligible_couriers(&self, vendor_ids: &[String]) -> CatalogResult<Vec<CourierProfile>>;

    async fn get_courier(&self, courier_id: &str) -> CatalogResult<Option<CourierProfile>>;
}

#[derive(Clone, Default)]
pub struct MemoryCourierDirectory {
    couriers: Arc<RwLock<HashMap<String, CourierProfile>>>,
}

impl std::fmt::Debug for MemoryCourierDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCourierDirectory")
            .field("couriers_count", &self.couriers.read().len())
            .finish()
    }
}

impl MemoryCourierDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, courier: CourierProfile) {
        self.couriers.write().insert(courier.id.clone(), courier);
    }
}

#[async_trait]
impl CourierDirectory for MemoryCourierDirectory {
    async fn eligible_couriers(&self, vendor_ids: &[String]) -> CatalogResult<Vec<CourierProfile>> {
        let mut eligible: Vec<CourierProfile> = self
            .couriers
            .read()
            .values()
            .filter(|c| c.is_eligible_for(vendor_ids))
            .cloned()
            .collect();
        eligible.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(eligible)
    }

    async fn get_courier(&self, courier_id: &str) -> CatalogResult<Option<CourierProfile>> {
        Ok(self.couriers.read().get(courier_id).cloned())
    }
}
