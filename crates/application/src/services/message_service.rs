//! 消息读取与附属操作服务
//!
//! 历史分页、表情反应、收藏、已读回执。写路径（发送/编辑/删除）
//! 属于实时枢纽；这里是 REST 侧的读取与子文档更新，形状与推送
//! 路径完全一致。

use std::collections::HashMap;
use std::sync::Arc;

use domain::{
    Conversation, ConversationId, ConversationRepository, Message, MessageId, MessageRepository,
    RepositoryError, Timestamp, UserId, UserProfile, UserRepository,
};

use crate::error::{ApplicationError, ApplicationResult};
use crate::policy::PolicyGate;
use crate::shape::{
    shape_message, shape_reply_preview, ReactionView, ShapedMessage, UserSummary,
};

/// 历史分页结果
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    pub messages: Vec<ShapedMessage>,
    pub has_more: bool,
}

/// 反应切换后的聚合状态
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionUpdate {
    pub message_id: MessageId,
    pub reactions: Vec<ReactionView>,
}

/// 收藏切换后的状态
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StarUpdate {
    pub message_id: MessageId,
    pub star_count: usize,
    pub starred_by_me: bool,
}

/// 单条消息的已读回执视图
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceiptsView {
    pub message_id: MessageId,
    pub conversation_id: ConversationId,
    pub seen_by: Vec<UserSummary>,
    pub not_seen_by: Vec<UserSummary>,
}

pub struct MessageServiceDependencies {
    pub messages: Arc<dyn MessageRepository>,
    pub conversations: Arc<dyn ConversationRepository>,
    pub users: Arc<dyn UserRepository>,
}

/// 消息服务
pub struct MessageService {
    messages: Arc<dyn MessageRepository>,
    conversations: Arc<dyn ConversationRepository>,
    users: Arc<dyn UserRepository>,
    policy: PolicyGate,
}

impl MessageService {
    pub fn new(deps: MessageServiceDependencies) -> Self {
        let policy = PolicyGate::new(deps.users.clone());
        Self {
            messages: deps.messages,
            conversations: deps.conversations,
            users: deps.users,
            policy,
        }
    }

    /// 历史分页：按时间倒序取 `before` 之前的 `limit` 条，
    /// 按时间正序返回给客户端渲染。
    pub async fn history(
        &self,
        viewer: UserId,
        conversation_id: ConversationId,
        before: Option<Timestamp>,
        limit: usize,
    ) -> ApplicationResult<MessagePage> {
        self.require_participant(conversation_id, viewer).await?;

        let mut page = self
            .messages
            .list_page(conversation_id, before, limit)
            .await?;
        let has_more = page.len() == limit;
        page.reverse();

        let messages = self.shape_many(&page, viewer).await?;
        Ok(MessagePage { messages, has_more })
    }

    /// 切换表情反应（toggle 语义，成对调用恢复原状）
    pub async fn react(
        &self,
        viewer: UserId,
        message_id: MessageId,
        emoji: &str,
    ) -> ApplicationResult<ReactionUpdate> {
        let emoji = emoji.trim();
        if emoji.is_empty() {
            return Err(
                domain::DomainError::invalid_argument("emoji", "cannot be empty").into(),
            );
        }
        let mut message = self.load_message_for(viewer, message_id).await?;
        message.toggle_reaction(viewer, emoji);
        let message = self.messages.update(message).await?;

        let reactions = message
            .reactions
            .iter()
            .map(|r| ReactionView {
                emoji: r.emoji.clone(),
                count: r.users.len(),
                reacted_by_me: r.users.contains(&viewer),
            })
            .collect();
        Ok(ReactionUpdate {
            message_id,
            reactions,
        })
    }

    /// 切换收藏标记，与已读状态无关
    pub async fn toggle_star(
        &self,
        viewer: UserId,
        message_id: MessageId,
    ) -> ApplicationResult<StarUpdate> {
        let mut message = self.load_message_for(viewer, message_id).await?;
        let starred_by_me = message.toggle_star(viewer);
        let message = self.messages.update(message).await?;
        Ok(StarUpdate {
            message_id,
            star_count: message.starred_by.len(),
            starred_by_me,
        })
    }

    /// 用户收藏的消息，可限定某个会话
    pub async fn starred(
        &self,
        viewer: UserId,
        conversation: Option<ConversationId>,
    ) -> ApplicationResult<Vec<ShapedMessage>> {
        if let Some(conversation_id) = conversation {
            self.require_participant(conversation_id, viewer).await?;
        }
        let starred = self.messages.list_starred(viewer, conversation).await?;
        self.shape_many(&starred, viewer).await
    }

    /// 单条消息的已读回执明细。
    /// not_seen_by 不包含发送者本人。
    pub async fn read_receipts(
        &self,
        viewer: UserId,
        message_id: MessageId,
    ) -> ApplicationResult<ReadReceiptsView> {
        let message = self
            .messages
            .find_by_id(message_id)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        let conversation = self.require_participant(message.conversation_id, viewer).await?;

        let profiles = self.users.find_many(&conversation.participants).await?;
        let summary = |id: &UserId| {
            profiles
                .iter()
                .find(|p| p.id == *id)
                .map(UserSummary::from_profile)
        };

        let seen_by: Vec<UserSummary> = conversation
            .participants
            .iter()
            .filter(|p| message.seen_by.contains(p))
            .filter_map(|p| summary(p))
            .collect();
        let not_seen_by: Vec<UserSummary> = conversation
            .participants
            .iter()
            .filter(|p| **p != message.sender_id && !message.seen_by.contains(*p))
            .filter_map(|p| summary(p))
            .collect();

        Ok(ReadReceiptsView {
            message_id,
            conversation_id: message.conversation_id,
            seen_by,
            not_seen_by,
        })
    }

    async fn require_participant(
        &self,
        conversation_id: ConversationId,
        viewer: UserId,
    ) -> ApplicationResult<Conversation> {
        let conversation = self
            .conversations
            .find_by_id(conversation_id)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        if !self.policy.can_act(&conversation, viewer) {
            return Err(ApplicationError::Authorization);
        }
        Ok(conversation)
    }

    async fn load_message_for(
        &self,
        viewer: UserId,
        message_id: MessageId,
    ) -> ApplicationResult<Message> {
        let message = self
            .messages
            .find_by_id(message_id)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        self.require_participant(message.conversation_id, viewer)
            .await?;
        Ok(message)
    }

    /// 批量成形：发送者档案与回复预览一次性装配
    async fn shape_many(
        &self,
        messages: &[Message],
        viewer: UserId,
    ) -> ApplicationResult<Vec<ShapedMessage>> {
        let mut sender_ids: Vec<UserId> = messages.iter().map(|m| m.sender_id).collect();
        sender_ids.sort();
        sender_ids.dedup();
        let profiles = self.users.find_many(&sender_ids).await?;
        let profile_map: HashMap<UserId, &UserProfile> =
            profiles.iter().map(|p| (p.id, p)).collect();

        let fallback = |id: UserId| UserSummary {
            id,
            username: String::new(),
            display_name: String::new(),
            avatar_url: None,
            last_seen: None,
        };

        let mut shaped = Vec::with_capacity(messages.len());
        for message in messages {
            let sender = profile_map
                .get(&message.sender_id)
                .map(|p| UserSummary::from_profile(p))
                .unwrap_or_else(|| fallback(message.sender_id));

            let reply_to = match message.reply_to {
                Some(reply_id) => match self.messages.find_by_id(reply_id).await? {
                    Some(replied) => {
                        let reply_sender = match profile_map.get(&replied.sender_id) {
                            Some(p) => Some(UserSummary::from_profile(p)),
                            None => self
                                .users
                                .find_by_id(replied.sender_id)
                                .await?
                                .map(|p| UserSummary::from_profile(&p)),
                        };
                        Some(shape_reply_preview(&replied, reply_sender))
                    }
                    None => None,
                },
                None => None,
            };

            shaped.push(shape_message(message, sender, reply_to, Some(viewer)));
        }
        Ok(shaped)
    }
}
