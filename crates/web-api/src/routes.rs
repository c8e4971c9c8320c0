//! HTTP 路由
//!
//! 轻薄的处理函数：取身份、解载荷、委托用例服务、映射错误。

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use application::{
    CreateGroupRequest, CreateUserRequest, ReportRequest, ShapedConversation, UserSummary,
};
use domain::{ConversationId, MessageId, Timestamp, UserId};

use crate::{error::ApiError, state::AppState, websocket};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/auth/token", post(issue_token))
        .route("/api/users", post(create_user).get(list_users))
        .route(
            "/api/users/{id}/block",
            post(block_user).delete(unblock_user),
        )
        .route("/api/reports", post(create_report))
        .route(
            "/api/conversations",
            get(list_conversations).post(create_conversation),
        )
        .route("/api/conversations/{id}", get(get_conversation))
        .route("/api/conversations/{id}/messages", get(message_history))
        .route("/api/groups", post(create_group))
        .route("/api/groups/join", post(join_group))
        .route("/api/groups/{id}", patch(update_group).delete(delete_group))
        .route("/api/groups/{id}/members", patch(update_members))
        .route("/api/groups/{id}/admins", patch(update_admins))
        .route("/api/groups/{id}/leave", post(leave_group))
        .route("/api/messages/starred", get(starred_messages))
        .route("/api/messages/{id}/reactions", post(react_to_message))
        .route("/api/messages/{id}/star", post(toggle_star))
        .route("/api/messages/{id}/receipts", get(message_receipts))
        .route("/ws", get(websocket::upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<UserId, ApiError> {
    state.jwt_service.authenticate(headers)
}

// ===== 认证 =====

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenPayload {
    user_id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    token: String,
    user: UserSummary,
}

/// 为已存在的档案签发 bearer token（开发级登录）
async fn issue_token(
    State(state): State<AppState>,
    Json(payload): Json<TokenPayload>,
) -> Result<Json<TokenResponse>, ApiError> {
    let profile = state
        .user_service
        .get_profile(UserId::new(payload.user_id))
        .await?;
    let token = state.jwt_service.issue(profile.id)?;
    Ok(Json(TokenResponse {
        token,
        user: UserSummary::from_profile(&profile),
    }))
}

// ===== 用户 =====

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateUserPayload {
    username: String,
    display_name: String,
    avatar_url: Option<String>,
}

async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<CreateUserPayload>,
) -> Result<(StatusCode, Json<UserSummary>), ApiError> {
    let profile = state
        .user_service
        .create_user(CreateUserRequest {
            username: payload.username,
            display_name: payload.display_name,
            avatar_url: payload.avatar_url,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(UserSummary::from_profile(&profile))))
}

async fn list_users(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    authenticate(&state, &headers)?;
    let users = state.user_service.list_summaries().await?;
    Ok(Json(users))
}

async fn block_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let me = authenticate(&state, &headers)?;
    state.user_service.block_user(me, UserId::new(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn unblock_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let me = authenticate(&state, &headers)?;
    state.user_service.unblock_user(me, UserId::new(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ===== 举报 =====

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportPayload {
    reported_user_id: Uuid,
    reason: String,
    message_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReportResponse {
    id: Uuid,
    reported_user_id: Uuid,
    reason: String,
}

async fn create_report(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ReportPayload>,
) -> Result<(StatusCode, Json<ReportResponse>), ApiError> {
    let me = authenticate(&state, &headers)?;
    let report = state
        .user_service
        .report_user(
            me,
            ReportRequest {
                reported_user_id: UserId::new(payload.reported_user_id),
                reason: payload.reason,
                message_id: payload.message_id.map(MessageId::new),
            },
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ReportResponse {
            id: report.id.0,
            reported_user_id: report.reported_user.0,
            reason: report.reason,
        }),
    ))
}

// ===== 会话 =====

async fn list_conversations(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<ShapedConversation>>, ApiError> {
    let me = authenticate(&state, &headers)?;
    let conversations = state.conversation_service.list_for_user(me).await?;
    Ok(Json(conversations))
}

async fn get_conversation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<ShapedConversation>, ApiError> {
    let me = authenticate(&state, &headers)?;
    let conversation = state
        .conversation_service
        .get_for_user(me, ConversationId::new(id))
        .await?;
    Ok(Json(conversation))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateConversationPayload {
    target_user_id: Uuid,
}

async fn create_conversation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateConversationPayload>,
) -> Result<(StatusCode, Json<ShapedConversation>), ApiError> {
    let me = authenticate(&state, &headers)?;
    let (conversation, created) = state
        .conversation_service
        .create_direct(me, UserId::new(payload.target_user_id))
        .await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(conversation)))
}

// ===== 群组 =====

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateGroupPayload {
    name: String,
    member_ids: Vec<Uuid>,
    avatar_url: Option<String>,
}

async fn create_group(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateGroupPayload>,
) -> Result<(StatusCode, Json<ShapedConversation>), ApiError> {
    let me = authenticate(&state, &headers)?;
    let group = state
        .group_service
        .create_group(
            me,
            CreateGroupRequest {
                name: payload.name,
                member_ids: payload.member_ids.into_iter().map(UserId::new).collect(),
                avatar_url: payload.avatar_url,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(group)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateGroupPayload {
    name: Option<String>,
    avatar_url: Option<String>,
}

async fn update_group(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateGroupPayload>,
) -> Result<Json<ShapedConversation>, ApiError> {
    let me = authenticate(&state, &headers)?;
    let group = state
        .group_service
        .update_group(
            me,
            ConversationId::new(id),
            application::UpdateGroupRequest {
                name: payload.name,
                avatar_url: payload.avatar_url,
            },
        )
        .await?;
    Ok(Json(group))
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct UpdateMembersPayload {
    add: Vec<Uuid>,
    remove: Vec<Uuid>,
}

async fn update_members(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateMembersPayload>,
) -> Result<Json<ShapedConversation>, ApiError> {
    let me = authenticate(&state, &headers)?;
    let group = state
        .group_service
        .update_members(
            me,
            ConversationId::new(id),
            application::UpdateMembersRequest {
                add: payload.add.into_iter().map(UserId::new).collect(),
                remove: payload.remove.into_iter().map(UserId::new).collect(),
            },
        )
        .await?;
    Ok(Json(group))
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct UpdateAdminsPayload {
    promote: Vec<Uuid>,
    demote: Vec<Uuid>,
}

async fn update_admins(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateAdminsPayload>,
) -> Result<Json<ShapedConversation>, ApiError> {
    let me = authenticate(&state, &headers)?;
    let group = state
        .group_service
        .update_admins(
            me,
            ConversationId::new(id),
            application::UpdateAdminsRequest {
                promote: payload.promote.into_iter().map(UserId::new).collect(),
                demote: payload.demote.into_iter().map(UserId::new).collect(),
            },
        )
        .await?;
    Ok(Json(group))
}

#[derive(Debug, Deserialize)]
struct JoinGroupPayload {
    code: String,
}

async fn join_group(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<JoinGroupPayload>,
) -> Result<Json<ShapedConversation>, ApiError> {
    let me = authenticate(&state, &headers)?;
    let group = state.group_service.join_by_invite(me, &payload.code).await?;
    Ok(Json(group))
}

async fn leave_group(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let me = authenticate(&state, &headers)?;
    state
        .group_service
        .leave_group(me, ConversationId::new(id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_group(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let me = authenticate(&state, &headers)?;
    state
        .group_service
        .delete_group(me, ConversationId::new(id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ===== 消息 =====

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
    /// ISO 时间戳游标，取该时刻之前的消息
    before: Option<Timestamp>,
}

async fn message_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<application::MessagePage>, ApiError> {
    let me = authenticate(&state, &headers)?;
    let limit = query
        .limit
        .unwrap_or(state.history.default_page_size)
        .min(state.history.max_page_size);
    let page = state
        .message_service
        .history(me, ConversationId::new(id), query.before, limit)
        .await?;
    Ok(Json(page))
}

#[derive(Debug, Deserialize)]
struct ReactPayload {
    emoji: String,
}

async fn react_to_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReactPayload>,
) -> Result<Json<application::ReactionUpdate>, ApiError> {
    let me = authenticate(&state, &headers)?;
    let update = state
        .message_service
        .react(me, MessageId::new(id), &payload.emoji)
        .await?;
    Ok(Json(update))
}

async fn toggle_star(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<application::StarUpdate>, ApiError> {
    let me = authenticate(&state, &headers)?;
    let update = state
        .message_service
        .toggle_star(me, MessageId::new(id))
        .await?;
    Ok(Json(update))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StarredQuery {
    conversation_id: Option<Uuid>,
}

async fn starred_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<StarredQuery>,
) -> Result<Json<Vec<application::ShapedMessage>>, ApiError> {
    let me = authenticate(&state, &headers)?;
    let items = state
        .message_service
        .starred(me, query.conversation_id.map(ConversationId::new))
        .await?;
    Ok(Json(items))
}

async fn message_receipts(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<application::ReadReceiptsView>, ApiError> {
    let me = authenticate(&state, &headers)?;
    let receipts = state
        .message_service
        .read_receipts(me, MessageId::new(id))
        .await?;
    Ok(Json(receipts))
}
