//! JWT 令牌服务
//!
//! 处理 JWT 令牌的生成、验证和解析。

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use shared::models::{Actor, ActorRole};
use thiserror::Error;

/// JWT 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// JWT 密钥 (应至少 32 字节)
    pub secret: String,
    /// 令牌过期时间 (分钟)
    pub expiration_minutes: i64,
    /// 令牌签发者
    pub issuer: String,
    /// 令牌受众
    pub audience: String,
}

impl JwtConfig {
    /// 使用固定密钥 (测试和内嵌部署)
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            expiration_minutes: 60,
            issuer: "market-identity".to_string(),
            audience: "market-server".to_string(),
        }
    }
}

impl Default for JwtConfig {
    fn default() -> Self {
        let secret = match load_jwt_secret() {
            Ok(secret) => secret,
            Err(e) => {
                #[cfg(debug_assertions)]
                {
                    tracing::warn!("JWT configuration error: {}, using temporary key", e);
                    generate_secure_printable_jwt_secret()
                }
                #[cfg(not(debug_assertions))]
                {
                    panic!("FATAL: JWT_SECRET configuration failed: {}", e);
                }
            }
        };

        Self {
            secret,
            expiration_minutes: std::env::var("JWT_EXPIRATION_MINUTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1440), // 默认 24 小时
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "market-identity".to_string()),
            audience: std::env::var("JWT_AUDIENCE")
                .unwrap_or_else(|_| "market-server".to_string()),
        }
    }
}

/// 存储在令牌中的 JWT Claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// 用户/商家/骑手 ID (Subject)
    pub sub: String,
    /// 角色: user | vendor | courier | admin
    pub role: String,
    /// 过期时间戳
    pub exp: i64,
    /// 签发时间戳
    pub iat: i64,
    /// 签发者
    pub iss: String,
    /// 受众
    pub aud: String,
}

impl TryFrom<Claims> for Actor {
    type Error = JwtError;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        if claims.sub.trim().is_empty() {
            return Err(JwtError::InvalidToken("empty subject".to_string()));
        }
        let role: ActorRole = claims.role.parse().map_err(JwtError::InvalidToken)?;
        Ok(Actor::from_role(role, claims.sub))
    }
}

/// JWT 错误
#[derive(Error, Debug)]
pub enum JwtError {
    #[error("无效令牌: {0}")]
    InvalidToken(String),

    #[error("令牌已过期")]
    ExpiredToken,

    #[error("无效签名")]
    InvalidSignature,

    #[error("令牌生成失败: {0}")]
    GenerationFailed(String),

    #[error("配置错误: {0}")]
    ConfigError(String),
}

/// 生成可打印的安全 JWT 密钥 (用于开发环境)
pub fn generate_secure_printable_jwt_secret() -> String {
    const ALLOWED: &[u8] =
        b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*()-_=+[]{}|;:,.<>?";

    let rng = SystemRandom::new();
    let mut bytes = [0u8; 64];
    if rng.fill(&mut bytes).is_err() {
        // 如果随机数生成失败，使用固定的开发密钥
        return "MarketServerDevelopmentOnlyKeyDoNotDeploy2024!!".to_string();
    }

    bytes
        .iter()
        .map(|b| ALLOWED[(*b as usize) % ALLOWED.len()] as char)
        .collect()
}

/// 从环境变量加载 JWT 密钥
fn load_jwt_secret() -> Result<String, JwtError> {
    let secret = std::env::var("JWT_SECRET").map_err(|_| {
        JwtError::ConfigError("JWT_SECRET environment variable is not set".to_string())
    })?;
    if secret.len() < 32 {
        return Err(JwtError::ConfigError(
            "JWT_SECRET must be at least 32 characters long".to_string(),
        ));
    }
    Ok(secret)
}

/// JWT 令牌服务
#[derive(Clone)]
pub struct JwtService {
    pub config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl std::fmt::Debug for JwtService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtService")
            .field("issuer", &self.config.issuer)
            .field("audience", &self.config.audience)
            .finish()
    }
}

impl JwtService {
    /// 使用指定配置创建新的 JWT 服务
    pub fn with_config(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// 签发令牌
    ///
    /// 生产环境由外部身份服务签发，这里用于测试和内嵌部署。
    pub fn generate_token(&self, subject: &str, role: ActorRole) -> Result<String, JwtError> {
        let now = Utc::now();
        let expiration = now + Duration::minutes(self.config.expiration_minutes);

        let claims = Claims {
            sub: subject.to_string(),
            role: role.as_str().to_string(),
            exp: expiration.timestamp(),
            iat: now.timestamp(),
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| JwtError::GenerationFailed(e.to_string()))
    }

    /// 验证并解码令牌
    pub fn validate_token(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[&self.config.audience]);
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_required_spec_claims(&["sub", "exp", "iat", "iss", "aud"]);

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => JwtError::ExpiredToken,
                ErrorKind::InvalidSignature => JwtError::InvalidSignature,
                ErrorKind::InvalidToken => JwtError::InvalidToken(e.to_string()),
                _ => JwtError::InvalidToken(format!("Token validation failed: {}", e)),
            }
        })?;

        Ok(token_data.claims)
    }

    /// 验证令牌并解析为 Actor
    pub fn resolve_actor(&self, token: &str) -> Result<Actor, JwtError> {
        Actor::try_from(self.validate_token(token)?)
    }

    /// 从 Authorization 头提取令牌
    pub fn extract_from_header(header: &str) -> Option<&str> {
        header.strip_prefix("Bearer ")
    }
}

impl Default for JwtService {
    fn default() -> Self {
        Self::with_config(JwtConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> JwtService {
        JwtService::with_config(JwtConfig::with_secret(
            "test-secret-that-is-long-enough-for-hs256",
        ))
    }

    #[test]
    fn test_token_resolves_to_actor() {
        let service = service();
        let token = service.generate_token("c-42", ActorRole::Courier).unwrap();

        let actor = service.resolve_actor(&token).unwrap();
        assert_eq!(actor, Actor::Courier("c-42".to_string()));
    }

    #[test]
    fn test_token_from_other_secret_rejected() {
        let token = service().generate_token("u-1", ActorRole::User).unwrap();
        let other = JwtService::with_config(JwtConfig::with_secret(
            "another-secret-that-is-long-enough-for-hs256",
        ));
        assert!(matches!(
            other.validate_token(&token),
            Err(JwtError::InvalidSignature)
        ));
    }

    #[test]
    fn test_unknown_role_rejected() {
        let claims = Claims {
            sub: "x".into(),
            role: "superuser".into(),
            exp: 0,
            iat: 0,
            iss: String::new(),
            aud: String::new(),
        };
        assert!(Actor::try_from(claims).is_err());
    }

    #[test]
    fn test_printable_secret() {
        let key = generate_secure_printable_jwt_secret();
        assert_eq!(key.len(), 64);
        assert!(key.is_ascii());
    }
}
