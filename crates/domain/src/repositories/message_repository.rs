//! 消息仓储接口

use async_trait::async_trait;

use crate::entities::message::Message;
use crate::errors::RepositoryResult;
use crate::value_objects::{ConversationId, MessageId, Timestamp, UserId};

/// 消息仓储
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn create(&self, message: Message) -> RepositoryResult<Message>;

    async fn update(&self, message: Message) -> RepositoryResult<Message>;

    async fn find_by_id(&self, id: MessageId) -> RepositoryResult<Option<Message>>;

    /// 历史分页：取 `before` 之前的最新 `limit` 条，按时间倒序返回
    async fn list_page(
        &self,
        conversation: ConversationId,
        before: Option<Timestamp>,
        limit: usize,
    ) -> RepositoryResult<Vec<Message>>;

    /// 会话内最近一条未删除消息
    async fn latest_visible(
        &self,
        conversation: ConversationId,
    ) -> RepositoryResult<Option<Message>>;

    /// 将会话内所有非 viewer 发送的消息标记为 seen，
    /// 并把 viewer 加入各自的 seen_by。返回实际变更的条数。
    async fn mark_seen_except(
        &self,
        conversation: ConversationId,
        viewer: UserId,
    ) -> RepositoryResult<u64>;

    /// 未读统计：非本人发送、晚于读取游标的消息数
    async fn count_unread(
        &self,
        conversation: ConversationId,
        user: UserId,
        after: Option<Timestamp>,
    ) -> RepositoryResult<u64>;

    /// 用户收藏的未删除消息，可限定会话，按时间倒序
    async fn list_starred(
        &self,
        user: UserId,
        conversation: Option<ConversationId>,
    ) -> RepositoryResult<Vec<Message>>;

    /// 删除会话的全部消息（会话硬删除的级联）
    async fn delete_all(&self, conversation: ConversationId) -> RepositoryResult<u64>;
}
