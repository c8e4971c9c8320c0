//! WebSocket 接入
//!
//! 连接升级时一次性完成凭证校验，失败即拒绝，没有重试或降级。
//! 成功后把连接注册进事件枢纽：发送任务统一串行化所有写操作，
//! 接收任务把文本帧解析为客户端事件交给枢纽。任一任务结束即
//! 注销连接并清理在线状态。

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use application::{ClientEvent, ConnectionIdentity, ServerEvent};

use crate::state::AppState;

/// WebSocket连接查询参数
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// JWT access token
    pub token: String,
}

/// 处理WebSocket连接升级
pub async fn upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> Result<Response, StatusCode> {
    // 认证失败对连接是致命的：拒绝升级，不建立部分会话
    let user_id = state.jwt_service.verify(&query.token).map_err(|_| {
        tracing::warn!("WebSocket upgrade failed: invalid token");
        StatusCode::UNAUTHORIZED
    })?;

    let profile = state.user_service.get_profile(user_id).await.map_err(|_| {
        tracing::warn!(user_id = %user_id, "WebSocket upgrade failed: unknown user");
        StatusCode::UNAUTHORIZED
    })?;

    // 身份在此刻快照，存续期间不再刷新
    let identity = ConnectionIdentity {
        user_id: profile.id,
        username: profile.username.as_str().to_owned(),
        display_name: profile.display_name.clone(),
        avatar_url: profile.avatar_url.clone(),
    };

    Ok(ws.on_upgrade(move |socket| run_connection(socket, state, identity)))
}

/// WebSocket 写操作命令
///
/// 所有对 sender 的写操作统一经由发送任务串行化
#[derive(Debug)]
enum WsCommand {
    SendText(String),
    SendPong(Vec<u8>),
}

async fn run_connection(socket: WebSocket, state: AppState, identity: ConnectionIdentity) {
    let user_id = identity.user_id;
    let (mut sender, mut incoming) = socket.split();

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ServerEvent>();
    let connection_id = state.hub.register_connection(identity, event_tx).await;
    tracing::info!(connection_id = %connection_id, user_id = %user_id, "WebSocket 连接已建立");

    let (cmd_tx, mut cmd_rx) = mpsc::channel::<WsCommand>(32);

    // 发送任务：转发枢纽事件并处理 pong 回应
    let send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(cmd) = cmd_rx.recv() => {
                    match cmd {
                        WsCommand::SendText(text) => {
                            if sender.send(WsMessage::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        WsCommand::SendPong(data) => {
                            if sender.send(WsMessage::Pong(data.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                }
                Some(event) = event_rx.recv() => {
                    let payload = match serde_json::to_string(&event) {
                        Ok(json) => json,
                        Err(err) => {
                            tracing::warn!(error = %err, "failed to serialize websocket payload");
                            continue;
                        }
                    };
                    if sender.send(WsMessage::Text(payload.into())).await.is_err() {
                        break;
                    }
                }
                else => break,
            }
        }
        tracing::debug!("WebSocket发送任务结束");
    });

    // 接收任务：客户端事件交给枢纽，按连接顺序处理
    let hub = state.hub.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = incoming.next().await {
            match message {
                WsMessage::Text(text) => {
                    match serde_json::from_str::<ClientEvent>(text.as_str()) {
                        Ok(event) => hub.handle_event(connection_id, event).await,
                        // 格式不合法的事件静默丢弃
                        Err(err) => {
                            tracing::debug!(error = %err, "malformed client event dropped");
                        }
                    }
                }
                WsMessage::Ping(data) => {
                    if cmd_tx.send(WsCommand::SendPong(data.to_vec())).await.is_err() {
                        break;
                    }
                }
                WsMessage::Close(_) => {
                    tracing::debug!("WebSocket收到关闭消息");
                    break;
                }
                WsMessage::Pong(_) | WsMessage::Binary(_) => {}
            }
        }
        tracing::debug!("WebSocket接收任务结束");
    });

    // 等待任意一个任务完成（连接断开）
    tokio::select! {
        _ = send_task => {}
        _ = recv_task => {}
    }

    state.hub.unregister_connection(connection_id).await;
    tracing::info!(connection_id = %connection_id, user_id = %user_id, "WebSocket连接已断开，在线状态已清理");
}
