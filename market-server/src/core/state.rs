use std::sync::Arc;
use std::time::Duration;

use crate::auth::JwtService;
use crate::cart::CartStore;
use crate::catalog::{MemoryCatalog, MemoryCourierDirectory, load_seed};
use crate::coupons::CouponRegistry;
use crate::core::{BackgroundTasks, Config, TaskKind};
use crate::courier::{ConnectionRegistry, CourierBroadcaster};
use crate::message::{NotificationWorker, RedbNotificationQueue};
use crate::orders::{CommitPipeline, OrderLifecycle, RandomOrderNumbers};
use crate::pricing::PricingReconciler;
use crate::storage::MarketStorage;

/// 服务器状态 - 持有所有服务的单例引用
///
/// 使用 Arc 实现浅拷贝，所有权成本极低。
///
/// | 字段 | 说明 |
/// |------|------|
/// | config | 配置项 (不可变) |
/// | storage | redb 存储 (购物车、订单、优惠券、配送邀请、离线通知) |
/// | catalog | 商品目录 (库存扣减/回补) |
/// | couriers | 骑手名录 |
/// | carts | 购物车 |
/// | coupons | 优惠券发放 |
/// | checkout | 下单流水线 |
/// | lifecycle | 订单状态机 |
/// | broadcaster | 配送邀请广播 |
/// | connections | 在线连接 (WebSocket 推送) |
/// | notifications | 离线通知重投 |
/// | jwt_service | JWT 认证服务 |
#[derive(Clone, Debug)]
pub struct ServerState {
    pub config: Config,
    pub storage: MarketStorage,
    pub catalog: MemoryCatalog,
    pub couriers: MemoryCourierDirectory,
    pub carts: CartStore,
    pub coupons: CouponRegistry,
    pub checkout: Arc<CommitPipeline>,
    pub lifecycle: OrderLifecycle,
    pub broadcaster: CourierBroadcaster,
    pub connections: Arc<ConnectionRegistry>,
    pub notifications: NotificationWorker,
    pub jwt_service: Arc<JwtService>,
}

impl ServerState {
    /// Wire every service on top of an opened storage
    pub fn build(config: Config, storage: MarketStorage) -> Self {
        let catalog = MemoryCatalog::new();
        let couriers = MemoryCourierDirectory::new();
        let connections = Arc::new(ConnectionRegistry::new());

        let reconciler = PricingReconciler::new(
            Arc::new(catalog.clone()),
            config.pricing.clone(),
            config.timezone,
        );
        let carts = CartStore::new(storage.clone(), reconciler);
        let coupons = CouponRegistry::new(storage.clone());
        let checkout = Arc::new(CommitPipeline::new(
            storage.clone(),
            carts.clone(),
            Arc::new(RandomOrderNumbers),
            config.timezone,
        ));
        let broadcaster = CourierBroadcaster::new(
            storage.clone(),
            Arc::new(couriers.clone()),
            connections.clone(),
            Arc::new(RedbNotificationQueue::new(storage.clone())),
        );
        let lifecycle = OrderLifecycle::new(
            storage.clone(),
            Arc::new(catalog.clone()),
            broadcaster.clone(),
        );
        let notifications = NotificationWorker::new(storage.clone(), connections.clone());
        let jwt_service = Arc::new(JwtService::with_config(config.jwt.clone()));

        Self {
            config,
            storage,
            catalog,
            couriers,
            carts,
            coupons,
            checkout,
            lifecycle,
            broadcaster,
            connections,
            notifications,
            jwt_service,
        }
    }

    /// 初始化服务器状态
    ///
    /// 按顺序初始化：
    /// 1. 工作目录结构
    /// 2. 数据库 (work_dir/market.redb)
    /// 3. 各服务
    /// 4. 种子数据 (如果配置了 CATALOG_SEED_PATH)
    pub fn initialize(config: &Config) -> anyhow::Result<Self> {
        config.ensure_work_dir_structure()?;

        let db_path = config.database_path();
        let storage = MarketStorage::open(&db_path)?;
        tracing::info!(path = %db_path.display(), "Storage opened");

        let state = Self::build(config.clone(), storage);

        if let Some(path) = &config.catalog_seed_path {
            let seed = load_seed(path)?;
            tracing::info!(
                path = %path,
                products = seed.products.len(),
                couriers = seed.couriers.len(),
                "Catalog seed loaded"
            );
            seed.apply(&state.catalog, &state.couriers);
        }

        Ok(state)
    }

    /// 启动后台任务
    ///
    /// - 离线通知重投 (Worker)
    /// - 过期配送邀请清理 (Periodic)
    pub fn start_background_tasks(&self) -> BackgroundTasks {
        let mut tasks = BackgroundTasks::new();

        let worker = self.notifications.clone();
        let scan = Duration::from_secs(self.config.notification_scan_interval_secs);
        let token = tasks.shutdown_token();
        tasks.spawn("notification_worker", TaskKind::Worker, async move {
            worker.run(scan, token).await;
        });

        let broadcaster = self.broadcaster.clone();
        let sweep = Duration::from_secs(self.config.offer_sweep_interval_secs);
        let ttl_ms = (self.config.offer_ttl_secs * 1000) as i64;
        let token = tasks.shutdown_token();
        tasks.spawn("offer_expiry_sweep", TaskKind::Periodic, async move {
            let mut interval = tokio::time::interval(sweep);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        broadcaster.expire_stale(ttl_ms, shared::util::now_millis()).await;
                    }
                }
            }
        });

        tasks.log_summary();
        tasks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_initialize_loads_seed() {
        let dir = tempfile::tempdir().unwrap();
        let seed_path = dir.path().join("seed.json");
        std::fs::write(
            &seed_path,
            r#"{
                "products": [{
                    "id": "p-1", "vendor_id": "v-1", "display": {"name": "Tea"},
                    "regular_price": "12.50", "is_active": true, "vendor_active": true,
                    "approval": "approved", "stock": 3
                }],
                "couriers": [{"id": "c-1", "name": "Rider", "vendor_ids": ["v-1"], "is_active": true, "approval": "approved"}]
            }"#,
        )
        .unwrap();

        let mut config = Config::with_overrides(dir.path().to_string_lossy(), 0);
        config.catalog_seed_path = Some(seed_path.to_string_lossy().into_owned());

        let state = ServerState::initialize(&config).unwrap();
        assert_eq!(state.catalog.stock_of("p-1", None), Some(3));
        assert!(config.database_path().exists());
    }
}
