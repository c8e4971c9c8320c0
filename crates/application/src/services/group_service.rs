//! 群组会话服务
//!
//! 群组的创建、改名、成员与管理员编辑、邀请码加入、退出与删除。
//! 每个可见变更落一条系统消息；创建者既不可被移出也不可被降权。

use std::sync::Arc;

use chrono::Utc;
use rand::Rng;

use domain::{
    Conversation, ConversationId, ConversationRepository, Message, MessageId, MessageRepository,
    RepositoryError, SystemMessageKind, UserId, UserProfile, UserRepository,
};

use crate::error::{ApplicationError, ApplicationResult};
use crate::shape::{shape_conversation, ShapedConversation};

#[derive(Debug, Clone)]
pub struct CreateGroupRequest {
    pub name: String,
    pub member_ids: Vec<UserId>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateGroupRequest {
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateMembersRequest {
    pub add: Vec<UserId>,
    pub remove: Vec<UserId>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateAdminsRequest {
    pub promote: Vec<UserId>,
    pub demote: Vec<UserId>,
}

pub struct GroupServiceDependencies {
    pub conversations: Arc<dyn ConversationRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub users: Arc<dyn UserRepository>,
}

/// 群组服务
pub struct GroupService {
    conversations: Arc<dyn ConversationRepository>,
    messages: Arc<dyn MessageRepository>,
    users: Arc<dyn UserRepository>,
}

fn generate_invite_code() -> String {
    let bytes: [u8; 8] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn display_name(profile: Option<&UserProfile>) -> String {
    match profile {
        Some(p) if !p.display_name.is_empty() => p.display_name.clone(),
        Some(p) => p.username.as_str().to_owned(),
        None => "Someone".to_owned(),
    }
}

impl GroupService {
    pub fn new(deps: GroupServiceDependencies) -> Self {
        Self {
            conversations: deps.conversations,
            messages: deps.messages,
            users: deps.users,
        }
    }

    pub async fn create_group(
        &self,
        creator: UserId,
        request: CreateGroupRequest,
    ) -> ApplicationResult<ShapedConversation> {
        let mut members: Vec<UserId> = request
            .member_ids
            .into_iter()
            .filter(|m| *m != creator)
            .collect();
        members.sort();
        members.dedup();
        if members.len() < 2 {
            return Err(domain::DomainError::invalid_argument(
                "member_ids",
                "select at least 2 other members for a group",
            )
            .into());
        }
        let found = self.users.find_many(&members).await?;
        if found.len() != members.len() {
            return Err(domain::DomainError::invalid_argument(
                "member_ids",
                "some members are invalid",
            )
            .into());
        }

        let mut conversation = Conversation::group(
            ConversationId::generate(),
            creator,
            members,
            request.name,
            Some(generate_invite_code()),
            Utc::now(),
        )?;
        conversation.avatar_url = request.avatar_url;
        let conversation = self.conversations.create(conversation).await?;

        let actor_name = self.actor_name(creator).await?;
        self.system_message(
            &conversation,
            creator,
            SystemMessageKind::GroupCreated,
            format!("{actor_name} created the group"),
        )
        .await;

        tracing::info!(conversation_id = %conversation.id, creator = %creator, "group created");
        self.shape_for(&conversation, creator).await
    }

    /// 改名 / 换头像，仅管理员
    pub async fn update_group(
        &self,
        actor: UserId,
        id: ConversationId,
        request: UpdateGroupRequest,
    ) -> ApplicationResult<ShapedConversation> {
        let mut conversation = self.load_group(id).await?;
        self.require_admin(&conversation, actor)?;
        let actor_name = self.actor_name(actor).await?;

        let mut renamed = None;
        if let Some(name) = request.name {
            let name = name.trim().to_owned();
            if name.is_empty() {
                return Err(
                    domain::DomainError::invalid_argument("name", "cannot be empty").into(),
                );
            }
            conversation.name = Some(name.clone());
            renamed = Some(name);
        }
        let mut avatar_changed = false;
        if let Some(avatar_url) = request.avatar_url {
            conversation.avatar_url = Some(avatar_url);
            avatar_changed = true;
        }
        conversation.touch(Utc::now());
        let conversation = self.conversations.update(conversation).await?;

        if let Some(new_name) = renamed {
            self.system_message(
                &conversation,
                actor,
                SystemMessageKind::GroupRenamed,
                format!("{actor_name} changed the group name to \"{new_name}\""),
            )
            .await;
        }
        if avatar_changed {
            self.system_message(
                &conversation,
                actor,
                SystemMessageKind::GroupAvatarChanged,
                format!("{actor_name} changed the group photo"),
            )
            .await;
        }

        self.shape_for(&conversation, actor).await
    }

    /// 增删成员，仅管理员。创建者不可被移出（静默跳过）。
    pub async fn update_members(
        &self,
        actor: UserId,
        id: ConversationId,
        request: UpdateMembersRequest,
    ) -> ApplicationResult<ShapedConversation> {
        let mut conversation = self.load_group(id).await?;
        self.require_admin(&conversation, actor)?;

        let mut added = Vec::new();
        for user in request.add {
            if self.users.find_by_id(user).await?.is_none() {
                continue;
            }
            if conversation.add_member(user)? {
                added.push(user);
            }
        }

        let mut removed = Vec::new();
        for user in request.remove {
            match conversation.remove_member(user) {
                Ok(true) => removed.push(user),
                Ok(false) => {}
                // 创建者不可移出，静默跳过
                Err(domain::DomainError::CreatorImmutable) => {
                    tracing::debug!(conversation_id = %id, "attempt to remove group creator skipped");
                }
                Err(err) => return Err(err.into()),
            }
        }

        conversation.touch(Utc::now());
        let conversation = self.conversations.update(conversation).await?;

        let actor_name = self.actor_name(actor).await?;
        if !added.is_empty() {
            let names = self.joined_names(&added).await?;
            self.system_message(
                &conversation,
                actor,
                SystemMessageKind::MemberAdded,
                format!("{actor_name} added {names}"),
            )
            .await;
        }
        if !removed.is_empty() {
            let names = self.joined_names(&removed).await?;
            self.system_message(
                &conversation,
                actor,
                SystemMessageKind::MemberRemoved,
                format!("{actor_name} removed {names}"),
            )
            .await;
        }

        self.shape_for(&conversation, actor).await
    }

    /// 提升 / 撤销管理员，仅管理员。创建者不可被降权（静默跳过）。
    pub async fn update_admins(
        &self,
        actor: UserId,
        id: ConversationId,
        request: UpdateAdminsRequest,
    ) -> ApplicationResult<ShapedConversation> {
        let mut conversation = self.load_group(id).await?;
        self.require_admin(&conversation, actor)?;

        let mut promoted = Vec::new();
        for user in request.promote {
            match conversation.promote_admin(user) {
                Ok(true) => promoted.push(user),
                Ok(false) => {}
                Err(domain::DomainError::NotParticipant) => {}
                Err(err) => return Err(err.into()),
            }
        }

        let mut demoted = Vec::new();
        for user in request.demote {
            match conversation.demote_admin(user) {
                Ok(true) => demoted.push(user),
                Ok(false) => {}
                // 创建者不可降权，静默跳过
                Err(domain::DomainError::CreatorImmutable) => {
                    tracing::debug!(conversation_id = %id, "attempt to demote group creator skipped");
                }
                Err(err) => return Err(err.into()),
            }
        }

        conversation.touch(Utc::now());
        let conversation = self.conversations.update(conversation).await?;

        let actor_name = self.actor_name(actor).await?;
        if !promoted.is_empty() {
            let names = self.joined_names(&promoted).await?;
            let suffix = if promoted.len() > 1 { "admins" } else { "admin" };
            self.system_message(
                &conversation,
                actor,
                SystemMessageKind::AdminPromoted,
                format!("{actor_name} made {names} {suffix}"),
            )
            .await;
        }
        if !demoted.is_empty() {
            let names = self.joined_names(&demoted).await?;
            self.system_message(
                &conversation,
                actor,
                SystemMessageKind::AdminDemoted,
                format!("{actor_name} removed admin rights from {names}"),
            )
            .await;
        }

        self.shape_for(&conversation, actor).await
    }

    /// 凭邀请码加入群组
    pub async fn join_by_invite(
        &self,
        user: UserId,
        code: &str,
    ) -> ApplicationResult<ShapedConversation> {
        let mut conversation = self
            .conversations
            .find_by_invite_code(code)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        if conversation.add_member(user)? {
            conversation.touch(Utc::now());
            conversation = self.conversations.update(conversation).await?;
            let name = self.actor_name(user).await?;
            self.system_message(
                &conversation,
                user,
                SystemMessageKind::MemberAdded,
                format!("{name} joined the group"),
            )
            .await;
        }
        self.shape_for(&conversation, user).await
    }

    /// 主动退出群组。创建者不能退出自己的群。
    pub async fn leave_group(&self, user: UserId, id: ConversationId) -> ApplicationResult<()> {
        let mut conversation = self.load_group(id).await?;
        if !conversation.is_participant(user) {
            return Err(ApplicationError::Authorization);
        }
        conversation.remove_member(user)?;
        conversation.touch(Utc::now());
        let conversation = self.conversations.update(conversation).await?;

        let name = self.actor_name(user).await?;
        self.system_message(
            &conversation,
            user,
            SystemMessageKind::MemberLeft,
            format!("{name} left the group"),
        )
        .await;
        Ok(())
    }

    /// 删除群组，仅创建者。消息随会话级联硬删除。
    pub async fn delete_group(&self, actor: UserId, id: ConversationId) -> ApplicationResult<()> {
        let conversation = self.load_group(id).await?;
        if conversation.created_by != Some(actor) {
            return Err(ApplicationError::Authorization);
        }
        self.messages.delete_all(id).await?;
        self.conversations.delete(id).await?;
        tracing::info!(conversation_id = %id, "group deleted");
        Ok(())
    }

    async fn load_group(&self, id: ConversationId) -> ApplicationResult<Conversation> {
        let conversation = self
            .conversations
            .find_by_id(id)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        if !conversation.is_group {
            return Err(domain::DomainError::NotAGroup.into());
        }
        Ok(conversation)
    }

    fn require_admin(&self, conversation: &Conversation, actor: UserId) -> ApplicationResult<()> {
        if conversation.is_admin(actor) {
            Ok(())
        } else {
            Err(ApplicationError::Authorization)
        }
    }

    async fn actor_name(&self, user: UserId) -> ApplicationResult<String> {
        let profile = self.users.find_by_id(user).await?;
        Ok(display_name(profile.as_ref()))
    }

    async fn joined_names(&self, ids: &[UserId]) -> ApplicationResult<String> {
        let profiles = self.users.find_many(ids).await?;
        let names: Vec<String> = ids
            .iter()
            .map(|id| display_name(profiles.iter().find(|p| p.id == *id)))
            .collect();
        Ok(names.join(", "))
    }

    /// 系统消息是尽力而为的装饰，失败只记日志不影响主流程
    async fn system_message(
        &self,
        conversation: &Conversation,
        actor: UserId,
        kind: SystemMessageKind,
        text: String,
    ) {
        let message = Message::new_system(
            MessageId::generate(),
            conversation.id,
            actor,
            text,
            kind,
            Utc::now(),
        );
        if let Err(err) = self.messages.create(message).await {
            tracing::warn!(conversation_id = %conversation.id, error = %err, "failed to record system message");
        }
    }

    async fn shape_for(
        &self,
        conversation: &Conversation,
        viewer: UserId,
    ) -> ApplicationResult<ShapedConversation> {
        let profiles = self.users.find_many(&conversation.participants).await?;
        Ok(shape_conversation(conversation, &profiles, viewer, 0))
    }
}
