//! 实时事件枢纽
//!
//! 持有连接生命周期、房间成员和会话计数这三张进程内的表，把入站
//! 事件路由到各个处理器，并把出站事件扇出到正确的受众（某个用户
//! 的全部设备、某个会话的订阅者、或全体连接）。
//!
//! 每个处理器都是 校验 → 持久化 → 成形 → 扇出 的直线流程；任何
//! 持久化调用都是挂起点，涉及不变量的状态一律重新读取。非法输入
//! 与越权操作静默丢弃（唯一例外是 `message:blocked` 回执），持久
//! 化失败记录日志后中止本次处理，连接本身不受影响。
//!
//! 扇出是尽力而为：成员检查与发送之间掉线的接收方只是错过这次
//! 推送，持久化已经完成，下次拉取即可对齐。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, RwLock};

use domain::{
    ConnectionId, ConversationId, ConversationRepository, Message, MessageId, MessageRepository,
    MessageText, UserId, UserRepository,
};

use crate::delivery::DeliveryEngine;
use crate::directory::{last_message_snapshot, ConversationDirectory};
use crate::error::ApplicationResult;
use crate::events::{ClientEvent, ServerEvent};
use crate::policy::PolicyGate;
use crate::session::SessionStore;
use crate::shape::{shape_conversation, shape_message, shape_reply_preview, ReplyPreview, UserSummary};

/// 房间标识：个人房间用于跨设备投递，会话房间用于会话广播
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomId {
    User(UserId),
    Conversation(ConversationId),
}

/// 连接建立时快照的认证身份，存续期间不再刷新
#[derive(Debug, Clone)]
pub struct ConnectionIdentity {
    pub user_id: UserId,
    pub username: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

impl ConnectionIdentity {
    fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.user_id,
            username: self.username.clone(),
            display_name: self.display_name.clone(),
            avatar_url: self.avatar_url.clone(),
            last_seen: None,
        }
    }
}

/// 枢纽的外部依赖
pub struct HubDependencies {
    pub users: Arc<dyn UserRepository>,
    pub conversations: Arc<dyn ConversationRepository>,
    pub messages: Arc<dyn MessageRepository>,
}

/// 实时事件枢纽
pub struct ChatHub {
    users: Arc<dyn UserRepository>,
    conversations: Arc<dyn ConversationRepository>,
    messages: Arc<dyn MessageRepository>,
    policy: PolicyGate,
    directory: ConversationDirectory,
    delivery: DeliveryEngine,
    sessions: SessionStore,
    connections: RwLock<HashMap<ConnectionId, ConnectionIdentity>>,
    rooms: RwLock<HashMap<RoomId, HashSet<ConnectionId>>>,
    senders: RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<ServerEvent>>>,
}

impl ChatHub {
    pub fn new(deps: HubDependencies) -> Self {
        let policy = PolicyGate::new(deps.users.clone());
        let directory =
            ConversationDirectory::new(deps.conversations.clone(), deps.messages.clone());
        let delivery = DeliveryEngine::new(deps.messages.clone());
        Self {
            users: deps.users,
            conversations: deps.conversations,
            messages: deps.messages,
            policy,
            directory,
            delivery,
            sessions: SessionStore::new(),
            connections: RwLock::new(HashMap::new()),
            rooms: RwLock::new(HashMap::new()),
            senders: RwLock::new(HashMap::new()),
        }
    }

    /// 注册一条已认证的连接。
    /// 会话计数 +1，订阅个人房间，给新连接下发在线快照；
    /// 0→1 跳变时向全体连接广播上线。
    pub async fn register_connection(
        &self,
        identity: ConnectionIdentity,
        sender: mpsc::UnboundedSender<ServerEvent>,
    ) -> ConnectionId {
        let connection_id = ConnectionId::generate();
        let user_id = identity.user_id;

        {
            let mut senders = self.senders.write().await;
            senders.insert(connection_id, sender);
        }
        {
            let mut connections = self.connections.write().await;
            connections.insert(connection_id, identity);
        }
        self.join_room(connection_id, RoomId::User(user_id)).await;

        // 计数先于快照更新，快照里包含用户自己
        let count = self.sessions.connect(user_id).await;
        let snapshot = ServerEvent::OnlineUsers {
            user_ids: self.sessions.online_users().await,
        };
        self.emit_to_connection(connection_id, snapshot).await;

        if count == 1 {
            self.broadcast(ServerEvent::PresenceUpdate {
                user_id,
                is_online: true,
                last_seen: None,
            })
            .await;
        }

        tracing::info!(connection_id = %connection_id, user_id = %user_id, "connection registered");
        connection_id
    }

    /// 注销连接：清理房间与发送端，会话计数 -1；
    /// 1→0 跳变时落盘 last_seen 并广播下线。
    pub async fn unregister_connection(&self, connection_id: ConnectionId) {
        {
            let mut senders = self.senders.write().await;
            senders.remove(&connection_id);
        }
        {
            let mut rooms = self.rooms.write().await;
            rooms.retain(|_, members| {
                members.remove(&connection_id);
                !members.is_empty()
            });
        }
        let identity = {
            let mut connections = self.connections.write().await;
            connections.remove(&connection_id)
        };
        let Some(identity) = identity else {
            return;
        };

        let user_id = identity.user_id;
        let count = self.sessions.disconnect(user_id).await;
        if count == 0 {
            let now = Utc::now();
            if let Err(err) = self.users.stamp_last_seen(user_id, now).await {
                tracing::warn!(user_id = %user_id, error = %err, "failed to stamp last_seen");
            }
            self.broadcast(ServerEvent::PresenceUpdate {
                user_id,
                is_online: false,
                last_seen: Some(now),
            })
            .await;
        }

        tracing::info!(connection_id = %connection_id, user_id = %user_id, "connection unregistered");
    }

    /// 入站事件统一入口。处理器内部的失败不回传给连接：
    /// 校验与授权失败静默丢弃，持久化失败记录日志后中止。
    pub async fn handle_event(&self, connection_id: ConnectionId, event: ClientEvent) {
        let identity = {
            let connections = self.connections.read().await;
            connections.get(&connection_id).cloned()
        };
        let Some(identity) = identity else {
            tracing::debug!(connection_id = %connection_id, "event from unknown connection dropped");
            return;
        };

        let result = match event {
            ClientEvent::ConversationJoin(conversation_id) => {
                self.join_room(connection_id, RoomId::Conversation(conversation_id))
                    .await;
                Ok(())
            }
            ClientEvent::MessageSend {
                conversation_id,
                text,
                reply_to_id,
            } => {
                self.handle_send(connection_id, &identity, conversation_id, text, reply_to_id)
                    .await
            }
            ClientEvent::MessageEdit {
                conversation_id,
                message_id,
                text,
            } => {
                self.handle_edit(&identity, conversation_id, message_id, text)
                    .await
            }
            ClientEvent::MessageDelete {
                conversation_id,
                message_id,
            } => {
                self.handle_delete(&identity, conversation_id, message_id)
                    .await
            }
            ClientEvent::ConversationSeen(conversation_id) => {
                self.handle_seen(&identity, conversation_id).await
            }
            ClientEvent::TypingStart { conversation_id } => {
                self.handle_typing(&identity, conversation_id, true).await
            }
            ClientEvent::TypingStop { conversation_id } => {
                self.handle_typing(&identity, conversation_id, false).await
            }
        };

        if let Err(err) = result {
            tracing::warn!(
                connection_id = %connection_id,
                user_id = %identity.user_id,
                error = %err,
                "event handler aborted"
            );
        }
    }

    async fn handle_send(
        &self,
        connection_id: ConnectionId,
        identity: &ConnectionIdentity,
        conversation_id: ConversationId,
        text: String,
        reply_to_id: Option<MessageId>,
    ) -> ApplicationResult<()> {
        let sender_id = identity.user_id;
        let Some(conversation) = self.conversations.find_by_id(conversation_id).await? else {
            return Ok(());
        };
        if !self.policy.can_act(&conversation, sender_id) {
            tracing::debug!(user_id = %sender_id, conversation_id = %conversation_id, "send from non-participant dropped");
            return Ok(());
        }
        let Ok(text) = MessageText::parse(text) else {
            return Ok(());
        };

        // 屏蔽状态在每次发送时新鲜读取
        if let Some(status) = self.policy.send_block(&conversation, sender_id).await? {
            self.emit_to_connection(
                connection_id,
                ServerEvent::MessageBlocked {
                    conversation_id,
                    reason: status.reason().to_owned(),
                },
            )
            .await;
            return Ok(());
        }

        let now = Utc::now();
        let message = Message::new_text(
            MessageId::generate(),
            conversation_id,
            sender_id,
            text,
            reply_to_id,
            now,
        );
        let mut message = self.messages.create(message).await?;

        // 持久化完成即视为送达
        self.delivery.mark_delivered(&mut message);
        let message = self.messages.update(message).await?;

        let reply_preview = self.build_reply_preview(&message).await?;
        let conversation = self
            .directory
            .set_last_message(conversation_id, last_message_snapshot(&message), now)
            .await?;

        let shaped = shape_message(&message, identity.summary(), reply_preview, None);
        self.emit_to_room(
            RoomId::Conversation(conversation_id),
            ServerEvent::MessageNew(shaped),
        )
        .await;

        self.emit_to_room(
            RoomId::User(sender_id),
            ServerEvent::ConversationUpdate {
                conversation_id,
                last_message: conversation.last_message.clone(),
                updated_at: conversation.updated_at,
            },
        )
        .await;

        // 未订阅会话房间的其他成员收到整份会话推送
        let subscribed = self
            .subscribed_users(RoomId::Conversation(conversation_id))
            .await;
        let targets = self
            .delivery
            .instant_push_targets(&conversation, sender_id, &subscribed);
        if !targets.is_empty() {
            let profiles = self.users.find_many(&conversation.participants).await?;
            for target in targets {
                let shaped = shape_conversation(
                    &conversation,
                    &profiles,
                    target,
                    self.delivery.push_unread_count(),
                );
                self.emit_to_room(RoomId::User(target), ServerEvent::ConversationNew(shaped))
                    .await;
            }
        }

        Ok(())
    }

    async fn handle_edit(
        &self,
        identity: &ConnectionIdentity,
        conversation_id: ConversationId,
        message_id: MessageId,
        text: String,
    ) -> ApplicationResult<()> {
        let Ok(text) = MessageText::parse(text) else {
            return Ok(());
        };
        let Some(mut message) = self.messages.find_by_id(message_id).await? else {
            return Ok(());
        };
        if message.conversation_id != conversation_id {
            return Ok(());
        }
        if message.sender_id != identity.user_id {
            tracing::debug!(user_id = %identity.user_id, message_id = %message_id, "edit of foreign message dropped");
            return Ok(());
        }
        // 已删除的消息不可编辑
        if message.edit(text, Utc::now()).is_err() {
            return Ok(());
        }
        let message = self.messages.update(message).await?;

        let conversation = self.directory.refresh_after_edit(&message).await?;
        self.emit_to_room(
            RoomId::Conversation(conversation_id),
            ServerEvent::MessageUpdated {
                id: message.id,
                conversation_id,
                text: message.text.clone(),
                status: message.status,
                is_edited: message.is_edited,
                edited_at: message.edited_at,
                is_deleted: message.is_deleted,
                deleted_at: message.deleted_at,
                last_message: conversation.as_ref().and_then(|c| c.last_message.clone()),
                updated_at: conversation.as_ref().map(|c| c.updated_at),
            },
        )
        .await;

        Ok(())
    }

    async fn handle_delete(
        &self,
        identity: &ConnectionIdentity,
        conversation_id: ConversationId,
        message_id: MessageId,
    ) -> ApplicationResult<()> {
        let Some(mut message) = self.messages.find_by_id(message_id).await? else {
            return Ok(());
        };
        if message.conversation_id != conversation_id {
            return Ok(());
        }
        if message.sender_id != identity.user_id {
            return Ok(());
        }
        if message.soft_delete(Utc::now()).is_err() {
            return Ok(());
        }
        let message = self.messages.update(message).await?;

        // 快照回退到最近一条未删除消息
        let conversation = self
            .directory
            .recompute_last_message(conversation_id, Utc::now())
            .await?;
        self.emit_to_room(
            RoomId::Conversation(conversation_id),
            ServerEvent::MessageDeleted {
                id: message.id,
                conversation_id,
                is_deleted: true,
                deleted_at: message.deleted_at,
                last_message: conversation.as_ref().and_then(|c| c.last_message.clone()),
                updated_at: conversation.as_ref().map(|c| c.updated_at),
            },
        )
        .await;

        Ok(())
    }

    async fn handle_seen(
        &self,
        identity: &ConnectionIdentity,
        conversation_id: ConversationId,
    ) -> ApplicationResult<()> {
        let viewer = identity.user_id;
        let Some(conversation) = self.conversations.find_by_id(conversation_id).await? else {
            return Ok(());
        };
        if !self.policy.can_act(&conversation, viewer) {
            return Ok(());
        }

        self.directory
            .mark_seen(conversation_id, viewer, Utc::now())
            .await?;

        self.emit_to_room(
            RoomId::Conversation(conversation_id),
            ServerEvent::ConversationSeen {
                conversation_id,
                seen_by: viewer,
            },
        )
        .await;

        Ok(())
    }

    async fn handle_typing(
        &self,
        identity: &ConnectionIdentity,
        conversation_id: ConversationId,
        is_typing: bool,
    ) -> ApplicationResult<()> {
        let Some(conversation) = self.conversations.find_by_id(conversation_id).await? else {
            return Ok(());
        };
        if !self.policy.can_act(&conversation, identity.user_id) {
            return Ok(());
        }

        self.emit_to_room(
            RoomId::Conversation(conversation_id),
            ServerEvent::Typing {
                conversation_id,
                user_id: identity.user_id,
                is_typing,
            },
        )
        .await;

        Ok(())
    }

    async fn build_reply_preview(
        &self,
        message: &Message,
    ) -> ApplicationResult<Option<ReplyPreview>> {
        let Some(reply_to) = message.reply_to else {
            return Ok(None);
        };
        let Some(replied) = self.messages.find_by_id(reply_to).await? else {
            return Ok(None);
        };
        let sender = self
            .users
            .find_by_id(replied.sender_id)
            .await?
            .map(|p| UserSummary::from_profile(&p));
        Ok(Some(shape_reply_preview(&replied, sender)))
    }

    /// 订阅房间。加入本身不做成员校验，授权在每次动作时独立判定。
    async fn join_room(&self, connection_id: ConnectionId, room: RoomId) {
        let mut rooms = self.rooms.write().await;
        rooms.entry(room).or_default().insert(connection_id);
    }

    /// 房间内订阅者去重后的用户集合
    async fn subscribed_users(&self, room: RoomId) -> HashSet<UserId> {
        let members = {
            let rooms = self.rooms.read().await;
            rooms.get(&room).cloned().unwrap_or_default()
        };
        let connections = self.connections.read().await;
        members
            .iter()
            .filter_map(|id| connections.get(id).map(|c| c.user_id))
            .collect()
    }

    async fn emit_to_connection(&self, connection_id: ConnectionId, event: ServerEvent) {
        let senders = self.senders.read().await;
        if let Some(sender) = senders.get(&connection_id) {
            if sender.send(event).is_err() {
                tracing::debug!(connection_id = %connection_id, "emit to closed connection dropped");
            }
        }
    }

    async fn emit_to_room(&self, room: RoomId, event: ServerEvent) {
        let members = {
            let rooms = self.rooms.read().await;
            rooms.get(&room).cloned().unwrap_or_default()
        };
        if members.is_empty() {
            return;
        }
        let senders = self.senders.read().await;
        for connection_id in members {
            if let Some(sender) = senders.get(&connection_id) {
                // 掉线的接收方只是错过这次推送
                let _ = sender.send(event.clone());
            }
        }
    }

    async fn broadcast(&self, event: ServerEvent) {
        let senders = self.senders.read().await;
        for sender in senders.values() {
            let _ = sender.send(event.clone());
        }
    }
}
