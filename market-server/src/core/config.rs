use std::num::NonZeroU64;
use std::path::PathBuf;

use chrono_tz::Tz;
use rust_decimal::Decimal;

use crate::auth::JwtConfig;
use crate::utils::time::parse_timezone;

/// 服务器配置
///
/// # 环境变量
///
/// 所有配置项都可以通过环境变量覆盖：
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | WORK_DIR | ./data | 工作目录 (数据库、日志) |
/// | HTTP_PORT | 3000 | HTTP 服务端口 |
/// | ENVIRONMENT | development | 运行环境 |
/// | LOG_LEVEL | info | 日志级别 |
/// | LOG_JSON | false | JSON 格式日志 |
/// | BUSINESS_TIMEZONE | UTC | 业务时区 |
/// | TAX_RATE | 0.05 | 税率 |
/// | HANDLING_FEE | 50 | 配送费 |
/// | FREE_HANDLING_THRESHOLD | 500 | 免配送费门槛 |
/// | OFFER_TTL_SECS | 120 | 配送邀请有效期 |
/// | OFFER_SWEEP_INTERVAL_SECS | 30 | 过期邀请清理周期 |
/// | NOTIFICATION_SCAN_INTERVAL_SECS | 15 | 离线通知重投周期 |
/// | CATALOG_SEED_PATH | - | 商品/骑手种子数据 (JSON) |
///
/// `*_SECS` 为 0 或无法解析时使用默认值。
///
/// # 示例
///
/// ```ignore
/// WORK_DIR=/data/market HTTP_PORT=8080 cargo run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// 工作目录，存储数据库和日志
    pub work_dir: String,
    /// HTTP API 服务端口
    pub http_port: u16,
    /// JWT 认证配置
    pub jwt: JwtConfig,
    /// 运行环境: development | staging | production
    pub environment: String,
    pub log_level: String,
    pub log_json: bool,
    /// 业务时区
    pub timezone: Tz,
    /// 定价参数
    pub pricing: PricingConfig,
    /// 配送邀请有效期 (秒)
    pub offer_ttl_secs: u64,
    pub offer_sweep_interval_secs: u64,
    pub notification_scan_interval_secs: u64,
    /// 种子数据文件
    pub catalog_seed_path: Option<String>,
}

/// Pricing parameters injected into the reconciler
#[derive(Debug, Clone, PartialEq)]
pub struct PricingConfig {
    /// Applied to (subtotal − discount)
    pub tax_rate: Decimal,
    /// Flat fee below the threshold
    pub handling_fee: Decimal,
    /// Handling is waived at or above this subtotal
    pub free_handling_threshold: Decimal,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            tax_rate: Decimal::new(5, 2),
            handling_fee: Decimal::from(50),
            free_handling_threshold: Decimal::from(500),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// 周期/时长类配置不允许为 0，非法值回退默认
fn parse_nonzero_secs(raw: Option<&str>, default: u64) -> u64 {
    raw.and_then(|v| v.trim().parse::<NonZeroU64>().ok())
        .map_or(default, NonZeroU64::get)
}

fn env_nonzero_secs(key: &str, default: u64) -> u64 {
    parse_nonzero_secs(std::env::var(key).ok().as_deref(), default)
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置，使用默认值
    pub fn from_env() -> Self {
        let pricing_defaults = PricingConfig::default();
        Self {
            work_dir: std::env::var("WORK_DIR").unwrap_or_else(|_| "./data".into()),
            http_port: env_parse("HTTP_PORT").unwrap_or(3000),
            jwt: JwtConfig::default(),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_json: env_parse("LOG_JSON").unwrap_or(false),
            timezone: parse_timezone(
                &std::env::var("BUSINESS_TIMEZONE").unwrap_or_else(|_| "UTC".into()),
            ),
            pricing: PricingConfig {
                tax_rate: env_parse("TAX_RATE").unwrap_or(pricing_defaults.tax_rate),
                handling_fee: env_parse("HANDLING_FEE").unwrap_or(pricing_defaults.handling_fee),
                free_handling_threshold: env_parse("FREE_HANDLING_THRESHOLD")
                    .unwrap_or(pricing_defaults.free_handling_threshold),
            },
            offer_ttl_secs: env_nonzero_secs("OFFER_TTL_SECS", 120),
            offer_sweep_interval_secs: env_nonzero_secs("OFFER_SWEEP_INTERVAL_SECS", 30),
            notification_scan_interval_secs: env_nonzero_secs("NOTIFICATION_SCAN_INTERVAL_SECS", 15),
            catalog_seed_path: std::env::var("CATALOG_SEED_PATH").ok(),
        }
    }

    /// 使用自定义值覆盖部分配置
    ///
    /// 常用于测试场景
    pub fn with_overrides(work_dir: impl Into<String>, http_port: u16) -> Self {
        let mut config = Self::from_env();
        config.work_dir = work_dir.into();
        config.http_port = http_port;
        config
    }

    /// 数据库文件路径: work_dir/market.redb
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("market.redb")
    }

    /// 日志目录: work_dir/logs
    pub fn log_dir(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("logs")
    }

    /// 确保工作目录存在
    pub fn ensure_work_dir_structure(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.work_dir)?;
        std::fs::create_dir_all(self.log_dir())
    }

    /// 是否生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// 是否开发环境
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pricing_defaults() {
        let pricing = PricingConfig::default();
        assert_eq!(pricing.tax_rate, Decimal::new(5, 2));
        assert_eq!(pricing.handling_fee, Decimal::from(50));
        assert_eq!(pricing.free_handling_threshold, Decimal::from(500));
    }

    #[test]
    fn test_zero_interval_falls_back_to_default() {
        assert_eq!(parse_nonzero_secs(Some("0"), 30), 30);
        assert_eq!(parse_nonzero_secs(Some("-5"), 30), 30);
        assert_eq!(parse_nonzero_secs(Some("abc"), 30), 30);
        assert_eq!(parse_nonzero_secs(None, 15), 15);
        assert_eq!(parse_nonzero_secs(Some(" 45 "), 30), 45);
    }

    #[test]
    fn test_paths_under_work_dir() {
        let config = Config::with_overrides("/tmp/market-test", 0);
        assert_eq!(
            config.database_path(),
            PathBuf::from("/tmp/market-test/market.redb")
        );
        assert_eq!(config.log_dir(), PathBuf::from("/tmp/market-test/logs"));
    }
}
