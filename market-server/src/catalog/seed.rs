//! JSON seed for the in-memory catalog and courier roster

use super::{CatalogError, CatalogResult, MemoryCatalog, MemoryCourierDirectory, ProductState};
use serde::Deserialize;
use shared::models::CourierProfile;
use std::path::Path;

/// Seed file layout: `{ "products": [...], "couriers": [...] }`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogSeed {
    #[serde(default)]
    pub products: Vec<ProductState>,
    #[serde(default)]
    pub couriers: Vec<CourierProfile>,
}

impl CatalogSeed {
    pub fn apply(self, catalog: &MemoryCatalog, couriers: &MemoryCourierDirectory) {
        for product in self.products {
            catalog.upsert_product(product);
        }
        for courier in self.couriers {
            couriers.upsert(courier);
        }
    }
}

/// Read and parse a seed file
pub fn load_seed(path: impl AsRef<Path>) -> CatalogResult<CatalogSeed> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .map_err(|e| CatalogError::Seed(format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&raw).map_err(|e| CatalogError::Seed(format!("{}: {}", path.display(), e)))
}
