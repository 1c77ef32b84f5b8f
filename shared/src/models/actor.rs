//! Actor Model
//!
//! The identity provider resolves every caller to exactly one actor. The core
//! trusts the resolution and performs its own ownership checks.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Role carried in identity tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    User,
    Vendor,
    Courier,
    Admin,
}

impl ActorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Vendor => "vendor",
            Self::Courier => "courier",
            Self::Admin => "admin",
        }
    }
}

impl std::str::FromStr for ActorRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "vendor" => Ok(Self::Vendor),
            "courier" => Ok(Self::Courier),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// Who is asking for an operation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Actor {
    /// Purchasing user
    User(String),
    /// Vendor whose products are sold
    Vendor(String),
    /// Delivery courier
    Courier(String),
    /// Platform operator
    Admin(String),
    /// Internal jobs (payment callbacks, sweeps)
    System,
}

impl Actor {
    pub fn from_role(role: ActorRole, id: impl Into<String>) -> Self {
        let id = id.into();
        match role {
            ActorRole::User => Self::User(id),
            ActorRole::Vendor => Self::Vendor(id),
            ActorRole::Courier => Self::Courier(id),
            ActorRole::Admin => Self::Admin(id),
        }
    }

    /// The resolved id, `None` for [`Actor::System`]
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::User(id) | Self::Vendor(id) | Self::Courier(id) | Self::Admin(id) => Some(id),
            Self::System => None,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::User(id) => Some(id),
            _ => None,
        }
    }

    pub fn vendor_id(&self) -> Option<&str> {
        match self {
            Self::Vendor(id) => Some(id),
            _ => None,
        }
    }

    pub fn courier_id(&self) -> Option<&str> {
        match self {
            Self::Courier(id) => Some(id),
            _ => None,
        }
    }

    /// Admin or system: bypasses ownership checks
    pub fn is_privileged(&self) -> bool {
        matches!(self, Self::Admin(_) | Self::System)
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{}", id),
            Self::Vendor(id) => write!(f, "vendor:{}", id),
            Self::Courier(id) => write!(f, "courier:{}", id),
            Self::Admin(id) => write!(f, "admin:{}", id),
            Self::System => write!(f, "system"),
        }
    }
}
