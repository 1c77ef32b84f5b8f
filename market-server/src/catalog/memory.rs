//! In-memory catalog

use super::{CatalogError, CatalogResult, CatalogStore, DebitOutcome, ProductState};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Products keyed by id behind a single lock
///
/// Debit checks and decrements under the write lock, so concurrent debits of
/// the same product can never oversell.
#[derive(Clone, Default)]
pub struct MemoryCatalog {
    products: Arc<RwLock<HashMap<String, ProductState>>>,
}

impl std::fmt::Debug for MemoryCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let products_count = self.products.read().len();
        f.debug_struct("MemoryCatalog")
            .field("products_count", &products_count)
            .finish()
    }
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a product
    pub fn upsert_product(&self, product: ProductState) {
        self.products.write().insert(product.id.clone(), product);
    }

    /// Mutate a product in place; returns `false` if missing
    pub fn modify_product(&self, product_id: &str, f: impl FnOnce(&mut ProductState)) -> bool {
        match self.products.write().get_mut(product_id) {
            Some(product) => {
                f(product);
                true
            }
            None => false,
        }
    }

    /// Current stock of a product or variant
    pub fn stock_of(&self, product_id: &str, variant_key: Option<&str>) -> Option<u32> {
        self.products
            .read()
            .get(product_id)
            .and_then(|p| p.available_stock(variant_key).ok())
    }

    pub fn len(&self) -> usize {
        self.products.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.read().is_empty()
    }

    fn stock_slot<'a>(
        product: &'a mut ProductState,
        variant_key: Option<&str>,
    ) -> CatalogResult<&'a mut u32> {
        match variant_key {
            None if product.variants.is_empty() => Ok(&mut product.stock),
            None => Err(CatalogError::VariantRequired(product.id.clone())),
            Some(key) => {
                let product_id = product.id.clone();
                product
                    .variants
                    .get_mut(key)
                    .map(|v| &mut v.stock)
                    .ok_or_else(|| CatalogError::UnknownVariant {
                        product_id,
                        variant: key.to_string(),
                    })
            }
        }
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn get_product(&self, product_id: &str) -> CatalogResult<Option<ProductState>> {
        Ok(self.products.read().get(product_id).cloned())
    }

    async fn debit_inventory(
        &self,
        product_id: &str,
        variant_key: Option<&str>,
        quantity: u32,
    ) -> CatalogResult<DebitOutcome> {
        let mut products = self.products.write();
        let product = products
            .get_mut(product_id)
            .ok_or_else(|| CatalogError::ProductNotFound(product_id.to_string()))?;
        let stock = Self::stock_slot(product, variant_key)?;

        if *stock < quantity {
            return Ok(DebitOutcome::Insufficient { available: *stock });
        }
        *stock -= quantity;
        Ok(DebitOutcome::Applied)
    }

    async fn restock_inventory(
        &self,
        product_id: &str,
        variant_key: Option<&str>,
        quantity: u32,
    ) -> CatalogResult<()> {
        let mut products = self.products.write();
        let product = products
            .get_mut(product_id)
            .ok_or_else(|| CatalogError::ProductNotFound(product_id.to_string()))?;
        let stock = Self::stock_slot(product, variant_key)?;
        *stock = stock.saturating_add(quantity);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::VariantState;
    use crate::catalog::tests::product;

    #[tokio::test]
    async fn test_debit_and_restock() {
        let catalog = MemoryCatalog::new();
        catalog.upsert_product(product("p-1", "v-1", 10, 5));

        assert_eq!(
            catalog.debit_inventory("p-1", None, 3).await.unwrap(),
            DebitOutcome::Applied
        );
        assert_eq!(
            catalog.debit_inventory("p-1", None, 3).await.unwrap(),
            DebitOutcome::Insufficient { available: 2 }
        );
        catalog.restock_inventory("p-1", None, 3).await.unwrap();
        assert_eq!(catalog.stock_of("p-1", None), Some(5));

        assert!(matches!(
            catalog.debit_inventory("missing", None, 1).await,
            Err(CatalogError::ProductNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_variant_debit() {
        let catalog = MemoryCatalog::new();
        let mut p = product("p-1", "v-1", 10, 0);
        p.variants.insert("xl".into(), VariantState { stock: 1 });
        catalog.upsert_product(p);

        assert_eq!(
            catalog.debit_inventory("p-1", Some("xl"), 1).await.unwrap(),
            DebitOutcome::Applied
        );
        assert_eq!(catalog.stock_of("p-1", Some("xl")), Some(0));
        assert!(matches!(
            catalog.debit_inventory("p-1", None, 1).await,
            Err(CatalogError::VariantRequired(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_debits_never_oversell() {
        let catalog = MemoryCatalog::new();
        catalog.upsert_product(product("p-1", "v-1", 10, 10));

        let mut handles = Vec::new();
        for _ in 0..25 {
            let c = catalog.clone();
            handles.push(tokio::spawn(async move {
                c.debit_inventory("p-1", None, 1).await.unwrap()
            }));
        }
        let mut applied = 0;
        for h in handles {
            if h.await.unwrap() == DebitOutcome::Applied {
                applied += 1;
            }
        }
        assert_eq!(applied, 10);
        assert_eq!(catalog.stock_of("p-1", None), Some(0));
    }
}
