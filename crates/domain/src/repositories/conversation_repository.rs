//! 会话仓储接口

use async_trait::async_trait;

use crate::entities::conversation::Conversation;
use crate::errors::RepositoryResult;
use crate::value_objects::{ConversationId, UserId};

/// 会话仓储
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn create(&self, conversation: Conversation) -> RepositoryResult<Conversation>;

    /// 整体更新会话。进程内逐个处理保证串行；
    /// 并发写入 last_message 按后写者覆盖处理。
    async fn update(&self, conversation: Conversation) -> RepositoryResult<Conversation>;

    async fn find_by_id(&self, id: ConversationId) -> RepositoryResult<Option<Conversation>>;

    /// 按无序用户对查找一对一会话
    async fn find_direct(&self, a: UserId, b: UserId) -> RepositoryResult<Option<Conversation>>;

    /// 按邀请码查找群组会话
    async fn find_by_invite_code(&self, code: &str) -> RepositoryResult<Option<Conversation>>;

    /// 用户参与的全部会话，按 updated_at 倒序
    async fn list_for_user(&self, user: UserId) -> RepositoryResult<Vec<Conversation>>;

    /// 硬删除会话本身（消息级联由调用方负责）
    async fn delete(&self, id: ConversationId) -> RepositoryResult<()>;
}
