//! 用户档案与社交管控服务
//!
//! 档案 CRUD、屏蔽/取消屏蔽、举报。屏蔽列表由策略闸门在
//! 发送路径上消费，这里只负责维护。

use std::sync::Arc;

use chrono::Utc;

use domain::{
    MessageId, MessageRepository, Report, ReportId, ReportRepository, RepositoryError, UserId,
    UserProfile, UserRepository, Username,
};

use crate::error::{ApplicationError, ApplicationResult};
use crate::shape::UserSummary;

#[derive(Debug, Clone)]
pub struct CreateUserRequest {
    pub username: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReportRequest {
    pub reported_user_id: UserId,
    pub reason: String,
    /// 可选：随举报附上的消息，正文会被快照
    pub message_id: Option<MessageId>,
}

pub struct UserServiceDependencies {
    pub users: Arc<dyn UserRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub reports: Arc<dyn ReportRepository>,
}

/// 用户服务
pub struct UserService {
    users: Arc<dyn UserRepository>,
    messages: Arc<dyn MessageRepository>,
    reports: Arc<dyn ReportRepository>,
}

impl UserService {
    pub fn new(deps: UserServiceDependencies) -> Self {
        Self {
            users: deps.users,
            messages: deps.messages,
            reports: deps.reports,
        }
    }

    pub async fn create_user(&self, request: CreateUserRequest) -> ApplicationResult<UserProfile> {
        let username = Username::parse(request.username)?;
        let profile = UserProfile::new(
            UserId::generate(),
            username,
            request.display_name,
            request.avatar_url,
            Utc::now(),
        )?;
        let profile = self.users.create(profile).await?;
        tracing::info!(user_id = %profile.id, "user profile created");
        Ok(profile)
    }

    pub async fn get_profile(&self, id: UserId) -> ApplicationResult<UserProfile> {
        self.users
            .find_by_id(id)
            .await?
            .ok_or(ApplicationError::Repository(RepositoryError::NotFound))
    }

    pub async fn list_summaries(&self) -> ApplicationResult<Vec<UserSummary>> {
        let profiles = self.users.list().await?;
        Ok(profiles.iter().map(UserSummary::from_profile).collect())
    }

    /// 屏蔽另一个用户。目标必须存在；重复屏蔽是幂等的。
    pub async fn block_user(&self, me: UserId, target: UserId) -> ApplicationResult<()> {
        if self.users.find_by_id(target).await?.is_none() {
            return Err(RepositoryError::NotFound.into());
        }
        let mut profile = self.get_profile(me).await?;
        profile.block(target)?;
        self.users.update(profile).await?;
        tracing::info!(user_id = %me, target = %target, "user blocked");
        Ok(())
    }

    pub async fn unblock_user(&self, me: UserId, target: UserId) -> ApplicationResult<()> {
        let mut profile = self.get_profile(me).await?;
        profile.unblock(target);
        self.users.update(profile).await?;
        tracing::info!(user_id = %me, target = %target, "user unblocked");
        Ok(())
    }

    /// 提交举报，附带消息时快照其正文
    pub async fn report_user(
        &self,
        reporter: UserId,
        request: ReportRequest,
    ) -> ApplicationResult<Report> {
        if self
            .users
            .find_by_id(request.reported_user_id)
            .await?
            .is_none()
        {
            return Err(RepositoryError::NotFound.into());
        }
        let message_text = match request.message_id {
            Some(id) => self
                .messages
                .find_by_id(id)
                .await?
                .map(|m| m.text),
            None => None,
        };
        let report = Report::new(
            ReportId::generate(),
            reporter,
            request.reported_user_id,
            request.reason,
            message_text,
            Utc::now(),
        )?;
        let report = self.reports.create(report).await?;
        tracing::info!(report_id = %report.id, reporter = %reporter, "report filed");
        Ok(report)
    }
}
