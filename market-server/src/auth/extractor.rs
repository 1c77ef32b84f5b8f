//! JWT Extractor
//!
//! Resolves the bearer token of a request into an [`Actor`]

use axum::{extract::FromRequestParts, http::request::Parts};
use shared::models::Actor;

use crate::AppError;
use crate::auth::{JwtError, JwtService};
use crate::core::ServerState;
use crate::security_log;

impl FromRequestParts<ServerState> for Actor {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        // Check if already extracted
        if let Some(actor) = parts.extensions.get::<Actor>() {
            return Ok(actor.clone());
        }

        // Extract Authorization header
        let auth_header = parts
            .headers
            .get(http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok());

        let token = match auth_header {
            Some(header) => JwtService::extract_from_header(header)
                .ok_or_else(|| AppError::invalid_token("Invalid authorization header"))?,
            None => {
                security_log!("WARN", "auth_missing", uri = format!("{:?}", parts.uri));
                return Err(AppError::unauthorized());
            }
        };

        match state.jwt_service.resolve_actor(token) {
            Ok(actor) => {
                parts.extensions.insert(actor.clone());
                Ok(actor)
            }
            Err(e) => {
                security_log!(
                    "WARN",
                    "auth_failed",
                    error = format!("{}", e),
                    uri = format!("{:?}", parts.uri)
                );

                match e {
                    JwtError::ExpiredToken => Err(AppError::token_expired()),
                    _ => Err(AppError::invalid_token("Invalid token")),
                }
            }
        }
    }
}
