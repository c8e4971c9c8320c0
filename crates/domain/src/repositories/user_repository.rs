//! 用户档案仓储接口

use async_trait::async_trait;

use crate::entities::user::UserProfile;
use crate::errors::RepositoryResult;
use crate::value_objects::{Timestamp, UserId, Username};

/// 用户档案仓储
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// 创建用户档案，用户名冲突返回 Conflict
    async fn create(&self, profile: UserProfile) -> RepositoryResult<UserProfile>;

    /// 整体更新用户档案
    async fn update(&self, profile: UserProfile) -> RepositoryResult<UserProfile>;

    async fn find_by_id(&self, id: UserId) -> RepositoryResult<Option<UserProfile>>;

    async fn find_by_username(&self, username: &Username)
        -> RepositoryResult<Option<UserProfile>>;

    /// 批量查找，缺失的 id 被静默跳过
    async fn find_many(&self, ids: &[UserId]) -> RepositoryResult<Vec<UserProfile>>;

    async fn list(&self) -> RepositoryResult<Vec<UserProfile>>;

    /// 记录用户最后一次全部连接断开的时间
    async fn stamp_last_seen(&self, id: UserId, at: Timestamp) -> RepositoryResult<()>;
}
