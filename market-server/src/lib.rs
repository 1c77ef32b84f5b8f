//! Market Server - 多商家电商结算与履约引擎
//!
//! # 架构概述
//!
//! - **购物车** (`cart`): 每用户一个购物车，读取时对账并剔除不可售行
//! - **定价** (`pricing`): 价格对账、优惠券评估、税费与配送费
//! - **下单** (`orders`): 原子下单流水线与订单状态机
//! - **配送** (`courier`): 配送邀请广播、抢单、实时推送
//! - **消息** (`message`): 离线通知持久化与重投
//! - **存储** (`storage`): 嵌入式 redb 存储
//! - **HTTP API** (`api`): RESTful API 接口
//!
//! # 模块结构
//!
//! ```text
//! market-server/src/
//! ├── core/          # 配置、状态、服务器、后台任务
//! ├── auth/          # JWT 身份解析
//! ├── api/           # HTTP 路由和处理器
//! ├── cart/          # 购物车
//! ├── catalog/       # 商品目录、骑手名录、库存
//! ├── coupons/       # 优惠券发放
//! ├── courier/       # 配送邀请广播、推送通道
//! ├── message/       # 离线通知队列
//! ├── orders/        # 下单流水线、状态机
//! ├── pricing/       # 价格对账
//! ├── storage/       # redb 表
//! └── utils/         # 工具函数
//! ```

pub mod api;
pub mod auth;
pub mod cart;
pub mod catalog;
pub mod core;
pub mod coupons;
pub mod courier;
pub mod message;
pub mod orders;
pub mod pricing;
pub mod storage;
pub mod utils;

// Re-export 公共类型
pub use auth::JwtService;
pub use core::{Config, Server, ServerState};
pub use orders::{CheckoutError, CommitPipeline, OrderLifecycle};
pub use storage::MarketStorage;
pub use utils::{AppError, AppResult};

// Re-export unified error types from shared
pub use utils::{ApiResponse, ErrorCategory, ErrorCode};

// Re-export logger functions
pub use utils::logger::{cleanup_old_logs, init_logger, init_logger_with_file};

/// Rolled log files older than this are removed at startup
const LOG_RETENTION_DAYS: u64 = 14;

// Security logging macro - 支持 tracing 格式说明符
#[macro_export]
macro_rules! security_log {
    ($level:expr, $event:expr, $($key:ident = $value:expr),*) => {
        tracing::info!(
            target: "security",
            level = $level,
            event = $event,
            $($key = $value),*
        );
    };
}

/// 设置运行环境: 工作目录、日志、旧日志清理
pub fn setup_environment(config: &Config) -> std::io::Result<()> {
    config.ensure_work_dir_structure()?;

    let log_dir = config.log_dir();
    let log_dir = log_dir.to_string_lossy();
    let file_dir = config.is_production().then_some(log_dir.as_ref());
    init_logger_with_file(Some(&config.log_level), Some(config.log_json), file_dir);

    match cleanup_old_logs(&log_dir, LOG_RETENTION_DAYS) {
        Ok(0) => {}
        Ok(removed) => tracing::info!(removed, "Old log files removed"),
        Err(e) => tracing::warn!(error = %e, "Log cleanup failed"),
    }
    Ok(())
}

pub fn print_banner() {
    println!(
        r#"
    __  ___           __        __
   /  |/  /___ ______/ /_____  / /_
  / /|_/ / __ `/ ___/ //_/ _ \/ __/
 / /  / / /_/ / /  / ,< /  __/ /_
/_/  /_/\__,_/_/  /_/|_|\___/\__/
    "#
    );
}
