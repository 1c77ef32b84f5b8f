//! Push WebSocket endpoint - 配送邀请与订单状态实时推送
//!
//! GET /api/courier/ws?token=<JWT>
//! Auth: JWT 通过 query parameter 或 Authorization header 传递
//!
//! 协议:
//! - Server → Client: PushMessage (JSON text)
//! - Client → Server: 仅 Ping/Close，其余帧忽略
//!
//! 连接建立后先补投离线期间积压的通知。

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use shared::message::PushMessage;
use tokio::time::Duration;

use crate::auth::{JwtError, JwtService};
use crate::core::ServerState;
use crate::security_log;
use crate::utils::AppError;

const PING_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
pub struct WsAuthQuery {
    token: Option<String>,
}

/// GET /api/courier/ws
pub async fn handle_push_ws(
    State(state): State<ServerState>,
    Query(query): Query<WsAuthQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, AppError> {
    // 浏览器 WebSocket 不支持自定义 headers，优先使用 query token
    let token = query.token.or_else(|| {
        headers
            .get(http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(JwtService::extract_from_header)
            .map(String::from)
    });
    let Some(token) = token else {
        security_log!("WARN", "ws_auth_missing", endpoint = "courier_ws");
        return Err(AppError::unauthorized());
    };

    let actor = state.jwt_service.resolve_actor(&token).map_err(|e| {
        tracing::debug!("Push WS JWT validation failed: {e}");
        match e {
            JwtError::ExpiredToken => AppError::token_expired(),
            _ => AppError::invalid_token("Invalid token"),
        }
    })?;
    let recipient_id = actor
        .id()
        .map(String::from)
        .ok_or_else(|| AppError::forbidden("System actor has no push channel"))?;

    Ok(ws.on_upgrade(move |socket| push_ws_session(socket, state, recipient_id)))
}

async fn push_ws_session(socket: WebSocket, state: ServerState, recipient_id: String) {
    let (mut sink, mut stream) = socket.split();
    let (sender, mut rx) = state.connections.register(&recipient_id);

    tracing::info!(recipient_id = %recipient_id, "Push WS connected");

    // 补投离线通知，与下面的转发循环并行，避免占满发送缓冲
    {
        let worker = state.notifications.clone();
        let recipient_id = recipient_id.clone();
        tokio::spawn(async move {
            let report = worker
                .drain_for(&recipient_id, shared::util::now_millis())
                .await;
            if report.delivered > 0 {
                tracing::info!(
                    recipient_id = %recipient_id,
                    delivered = report.delivered,
                    "Backlog delivered on connect"
                );
            }
        });
    }

    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    ping_interval.tick().await; // skip immediate

    loop {
        tokio::select! {
            _ = ping_interval.tick() => {
                // 被新连接替换
                if !state.connections.is_current(&recipient_id, &sender) {
                    break;
                }
                if sink.send(Message::Ping(vec![].into())).await.is_err() {
                    break;
                }
            }

            outgoing = rx.recv() => {
                match outgoing {
                    Some(msg) => {
                        if send_message(&mut sink, &msg).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    state.connections.unregister(&recipient_id, &sender);
    tracing::info!(recipient_id = %recipient_id, "Push WS disconnected");
}

async fn send_message<S>(sink: &mut S, msg: &PushMessage) -> Result<(), ()>
where
    S: futures::Sink<Message, Error = axum::Error> + Unpin,
{
    let json = serde_json::to_string(msg).map_err(|_| ())?;
    sink.send(Message::Text(json.into())).await.map_err(|_| ())
}
