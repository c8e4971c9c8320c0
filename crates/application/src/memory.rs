//! 内存仓储实现
//!
//! 单进程部署下的记录源，同时服务于测试。所有映射由
//! `tokio::sync::RwLock` 保护，仅在异步任务内访问。

use std::collections::HashMap;

use tokio::sync::RwLock;

use domain::{
    Conversation, ConversationId, ConversationRepository, Message, MessageId, MessageRepository,
    Report, ReportRepository, RepositoryError, RepositoryResult, Timestamp, UserId, UserProfile,
    UserRepository, Username,
};

/// 内存用户档案仓储
#[derive(Default)]
pub struct MemoryUserRepository {
    users: RwLock<HashMap<UserId, UserProfile>>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl UserRepository for MemoryUserRepository {
    async fn create(&self, profile: UserProfile) -> RepositoryResult<UserProfile> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.username == profile.username) {
            return Err(RepositoryError::Conflict);
        }
        users.insert(profile.id, profile.clone());
        Ok(profile)
    }

    async fn update(&self, profile: UserProfile) -> RepositoryResult<UserProfile> {
        let mut users = self.users.write().await;
        match users.get_mut(&profile.id) {
            Some(stored) => {
                *stored = profile.clone();
                Ok(profile)
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn find_by_id(&self, id: UserId) -> RepositoryResult<Option<UserProfile>> {
        let users = self.users.read().await;
        Ok(users.get(&id).cloned())
    }

    async fn find_by_username(
        &self,
        username: &Username,
    ) -> RepositoryResult<Option<UserProfile>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| &u.username == username).cloned())
    }

    async fn find_many(&self, ids: &[UserId]) -> RepositoryResult<Vec<UserProfile>> {
        let users = self.users.read().await;
        Ok(ids.iter().filter_map(|id| users.get(id).cloned()).collect())
    }

    async fn list(&self) -> RepositoryResult<Vec<UserProfile>> {
        let users = self.users.read().await;
        let mut all: Vec<_> = users.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all)
    }

    async fn stamp_last_seen(&self, id: UserId, at: Timestamp) -> RepositoryResult<()> {
        let mut users = self.users.write().await;
        match users.get_mut(&id) {
            Some(profile) => {
                profile.stamp_last_seen(at);
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }
}

/// 内存会话仓储
#[derive(Default)]
pub struct MemoryConversationRepository {
    conversations: RwLock<HashMap<ConversationId, Conversation>>,
}

impl MemoryConversationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ConversationRepository for MemoryConversationRepository {
    async fn create(&self, conversation: Conversation) -> RepositoryResult<Conversation> {
        let mut conversations = self.conversations.write().await;
        if conversations.contains_key(&conversation.id) {
            return Err(RepositoryError::Conflict);
        }
        conversations.insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn update(&self, conversation: Conversation) -> RepositoryResult<Conversation> {
        let mut conversations = self.conversations.write().await;
        match conversations.get_mut(&conversation.id) {
            Some(stored) => {
                // 后写者覆盖，不做版本校验
                *stored = conversation.clone();
                Ok(conversation)
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn find_by_id(&self, id: ConversationId) -> RepositoryResult<Option<Conversation>> {
        let conversations = self.conversations.read().await;
        Ok(conversations.get(&id).cloned())
    }

    async fn find_direct(
        &self,
        a: UserId,
        b: UserId,
    ) -> RepositoryResult<Option<Conversation>> {
        let key = Conversation::direct_key(a, b);
        let conversations = self.conversations.read().await;
        Ok(conversations
            .values()
            .find(|c| {
                !c.is_group
                    && c.participants.len() == 2
                    && Conversation::direct_key(c.participants[0], c.participants[1]) == key
            })
            .cloned())
    }

    async fn find_by_invite_code(&self, code: &str) -> RepositoryResult<Option<Conversation>> {
        let conversations = self.conversations.read().await;
        Ok(conversations
            .values()
            .find(|c| c.is_group && c.invite_code.as_deref() == Some(code))
            .cloned())
    }

    async fn list_for_user(&self, user: UserId) -> RepositoryResult<Vec<Conversation>> {
        let conversations = self.conversations.read().await;
        let mut result: Vec<_> = conversations
            .values()
            .filter(|c| c.is_participant(user))
            .cloned()
            .collect();
        result.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(result)
    }

    async fn delete(&self, id: ConversationId) -> RepositoryResult<()> {
        let mut conversations = self.conversations.write().await;
        conversations
            .remove(&id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }
}

/// 内存消息仓储
#[derive(Default)]
pub struct MemoryMessageRepository {
    messages: RwLock<HashMap<MessageId, Message>>,
    by_conversation: RwLock<HashMap<ConversationId, Vec<MessageId>>>,
}

impl MemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn conversation_messages(&self, conversation: ConversationId) -> Vec<Message> {
        let ids = {
            let index = self.by_conversation.read().await;
            index.get(&conversation).cloned().unwrap_or_default()
        };
        let messages = self.messages.read().await;
        ids.iter()
            .filter_map(|id| messages.get(id).cloned())
            .collect()
    }
}

#[async_trait::async_trait]
impl MessageRepository for MemoryMessageRepository {
    async fn create(&self, message: Message) -> RepositoryResult<Message> {
        {
            let mut messages = self.messages.write().await;
            if messages.contains_key(&message.id) {
                return Err(RepositoryError::Conflict);
            }
            messages.insert(message.id, message.clone());
        }
        let mut index = self.by_conversation.write().await;
        index
            .entry(message.conversation_id)
            .or_default()
            .push(message.id);
        Ok(message)
    }

    async fn update(&self, message: Message) -> RepositoryResult<Message> {
        let mut messages = self.messages.write().await;
        match messages.get_mut(&message.id) {
            Some(stored) => {
                *stored = message.clone();
                Ok(message)
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn find_by_id(&self, id: MessageId) -> RepositoryResult<Option<Message>> {
        let messages = self.messages.read().await;
        Ok(messages.get(&id).cloned())
    }

    async fn list_page(
        &self,
        conversation: ConversationId,
        before: Option<Timestamp>,
        limit: usize,
    ) -> RepositoryResult<Vec<Message>> {
        let mut all = self.conversation_messages(conversation).await;
        if let Some(before) = before {
            all.retain(|m| m.created_at < before);
        }
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all.truncate(limit);
        Ok(all)
    }

    async fn latest_visible(
        &self,
        conversation: ConversationId,
    ) -> RepositoryResult<Option<Message>> {
        let all = self.conversation_messages(conversation).await;
        Ok(all
            .into_iter()
            .filter(|m| m.is_visible())
            .max_by_key(|m| m.created_at))
    }

    async fn mark_seen_except(
        &self,
        conversation: ConversationId,
        viewer: UserId,
    ) -> RepositoryResult<u64> {
        let ids = {
            let index = self.by_conversation.read().await;
            index.get(&conversation).cloned().unwrap_or_default()
        };
        let mut messages = self.messages.write().await;
        let mut changed = 0;
        for id in ids {
            if let Some(message) = messages.get_mut(&id) {
                if message.mark_seen_by(viewer) {
                    changed += 1;
                }
            }
        }
        Ok(changed)
    }

    async fn count_unread(
        &self,
        conversation: ConversationId,
        user: UserId,
        after: Option<Timestamp>,
    ) -> RepositoryResult<u64> {
        let all = self.conversation_messages(conversation).await;
        let count = all
            .iter()
            .filter(|m| m.sender_id != user)
            .filter(|m| after.map(|cursor| m.created_at > cursor).unwrap_or(true))
            .count();
        Ok(count as u64)
    }

    async fn list_starred(
        &self,
        user: UserId,
        conversation: Option<ConversationId>,
    ) -> RepositoryResult<Vec<Message>> {
        let messages = self.messages.read().await;
        let mut starred: Vec<_> = messages
            .values()
            .filter(|m| m.is_starred_by(user) && m.is_visible())
            .filter(|m| conversation.map(|c| m.conversation_id == c).unwrap_or(true))
            .cloned()
            .collect();
        starred.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(starred)
    }

    async fn delete_all(&self, conversation: ConversationId) -> RepositoryResult<u64> {
        let ids = {
            let mut index = self.by_conversation.write().await;
            index.remove(&conversation).unwrap_or_default()
        };
        let mut messages = self.messages.write().await;
        let mut removed = 0;
        for id in ids {
            if messages.remove(&id).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// 内存举报仓储
#[derive(Default)]
pub struct MemoryReportRepository {
    reports: RwLock<Vec<Report>>,
}

impl MemoryReportRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ReportRepository for MemoryReportRepository {
    async fn create(&self, report: Report) -> RepositoryResult<Report> {
        let mut reports = self.reports.write().await;
        if reports.iter().any(|r| r.id == report.id) {
            return Err(RepositoryError::Conflict);
        }
        reports.push(report.clone());
        Ok(report)
    }

    async fn list(&self) -> RepositoryResult<Vec<Report>> {
        let reports = self.reports.read().await;
        Ok(reports.clone())
    }
}
