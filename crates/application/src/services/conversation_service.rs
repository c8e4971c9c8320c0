//! 会话列表与一对一会话服务
//!
//! 列表读取路径在这里计算真实未读数（读取游标之后、非本人发送
//! 的消息数），与实时推送里固定为 1 的乐观值形成互补。

use std::sync::Arc;

use chrono::Utc;

use domain::{
    Conversation, ConversationId, ConversationRepository, MessageRepository, RepositoryError,
    UserId, UserRepository,
};

use crate::delivery::DeliveryEngine;
use crate::error::{ApplicationError, ApplicationResult};
use crate::policy::PolicyGate;
use crate::shape::{shape_conversation, ShapedConversation};

pub struct ConversationServiceDependencies {
    pub conversations: Arc<dyn ConversationRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub users: Arc<dyn UserRepository>,
}

/// 会话服务
pub struct ConversationService {
    conversations: Arc<dyn ConversationRepository>,
    users: Arc<dyn UserRepository>,
    policy: PolicyGate,
    delivery: DeliveryEngine,
}

impl ConversationService {
    pub fn new(deps: ConversationServiceDependencies) -> Self {
        let policy = PolicyGate::new(deps.users.clone());
        let delivery = DeliveryEngine::new(deps.messages.clone());
        Self {
            conversations: deps.conversations,
            users: deps.users,
            policy,
            delivery,
        }
    }

    /// 用户的全部会话，按最近更新倒序，携带真实未读数
    pub async fn list_for_user(&self, user: UserId) -> ApplicationResult<Vec<ShapedConversation>> {
        let conversations = self.conversations.list_for_user(user).await?;
        let mut shaped = Vec::with_capacity(conversations.len());
        for conversation in &conversations {
            let profiles = self.users.find_many(&conversation.participants).await?;
            let unread = self.delivery.unread_for(conversation, user).await?;
            shaped.push(shape_conversation(conversation, &profiles, user, unread));
        }
        Ok(shaped)
    }

    /// 查看单个会话（成员校验）
    pub async fn get_for_user(
        &self,
        user: UserId,
        id: ConversationId,
    ) -> ApplicationResult<ShapedConversation> {
        let conversation = self
            .conversations
            .find_by_id(id)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        if !self.policy.can_act(&conversation, user) {
            return Err(ApplicationError::Authorization);
        }
        let profiles = self.users.find_many(&conversation.participants).await?;
        let unread = self.delivery.unread_for(&conversation, user).await?;
        Ok(shape_conversation(&conversation, &profiles, user, unread))
    }

    /// 创建（或返回既有的）一对一会话。
    /// 双向屏蔽在创建时即被拒绝；无序用户对唯一。
    /// 返回值的第二项表示会话是否为新建。
    pub async fn create_direct(
        &self,
        me: UserId,
        target: UserId,
    ) -> ApplicationResult<(ShapedConversation, bool)> {
        if self.users.find_by_id(target).await?.is_none() {
            return Err(RepositoryError::NotFound.into());
        }

        let status = self.policy.block_status(me, target).await?;
        if status.blocked_by_me {
            return Err(ApplicationError::blocked(
                "You have blocked this user. Unblock to start a conversation again.",
            ));
        }
        if status.blocked_by_other {
            return Err(ApplicationError::blocked("You are blocked by this user."));
        }

        let (conversation, created) = match self.conversations.find_direct(me, target).await? {
            Some(existing) => (existing, false),
            None => {
                let conversation =
                    Conversation::direct(ConversationId::generate(), me, target, Utc::now())?;
                let conversation = self.conversations.create(conversation).await?;
                tracing::info!(conversation_id = %conversation.id, "direct conversation created");
                (conversation, true)
            }
        };

        let profiles = self.users.find_many(&conversation.participants).await?;
        // 新会话对创建者而言未读数为 0
        Ok((shape_conversation(&conversation, &profiles, me, 0), created))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{
        MemoryConversationRepository, MemoryMessageRepository, MemoryUserRepository,
    };
    use domain::{Message, MessageId, MessageText, UserProfile, Username};

    struct Fixture {
        service: ConversationService,
        users: Arc<MemoryUserRepository>,
        messages: Arc<MemoryMessageRepository>,
    }

    fn fixture() -> Fixture {
        let users = Arc::new(MemoryUserRepository::new());
        let messages = Arc::new(MemoryMessageRepository::new());
        let conversations = Arc::new(MemoryConversationRepository::new());
        let service = ConversationService::new(ConversationServiceDependencies {
            conversations,
            messages: messages.clone(),
            users: users.clone(),
        });
        Fixture {
            service,
            users,
            messages,
        }
    }

    async fn seed(fx: &Fixture, name: &str) -> UserId {
        let profile = UserProfile::new(
            UserId::generate(),
            Username::parse(name).unwrap(),
            name.to_uppercase(),
            None,
            Utc::now(),
        )
        .unwrap();
        fx.users.create(profile).await.unwrap().id
    }

    #[tokio::test]
    async fn create_direct_is_idempotent_per_pair() {
        let fx = fixture();
        let a = seed(&fx, "alice").await;
        let b = seed(&fx, "bob").await;

        let (first, created) = fx.service.create_direct(a, b).await.unwrap();
        assert!(created);
        // 反方向拿到同一个会话
        let (second, created) = fx.service.create_direct(b, a).await.unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn blocked_pair_cannot_start_a_conversation() {
        let fx = fixture();
        let a = seed(&fx, "alice").await;
        let b = seed(&fx, "bob").await;

        let mut profile = fx.users.find_by_id(a).await.unwrap().unwrap();
        profile.block(b).unwrap();
        fx.users.update(profile).await.unwrap();

        // 屏蔽者自己
        let err = fx.service.create_direct(a, b).await.unwrap_err();
        assert!(matches!(err, ApplicationError::Blocked(_)));
        // 被屏蔽的一方
        let err = fx.service.create_direct(b, a).await.unwrap_err();
        assert!(matches!(err, ApplicationError::Blocked(_)));
    }

    #[tokio::test]
    async fn list_carries_real_unread_counts() {
        let fx = fixture();
        let a = seed(&fx, "alice").await;
        let b = seed(&fx, "bob").await;

        let (conv, _) = fx.service.create_direct(a, b).await.unwrap();
        for i in 0..3 {
            let msg = Message::new_text(
                MessageId::generate(),
                conv.id,
                a,
                MessageText::parse(format!("m{i}")).unwrap(),
                None,
                Utc::now(),
            );
            fx.messages.create(msg).await.unwrap();
        }

        let for_b = fx.service.list_for_user(b).await.unwrap();
        assert_eq!(for_b.len(), 1);
        assert_eq!(for_b[0].unread_count, 3);
        assert_eq!(for_b[0].name, "ALICE");

        // 发送者自己的未读数为 0
        let for_a = fx.service.list_for_user(a).await.unwrap();
        assert_eq!(for_a[0].unread_count, 0);
    }

    #[tokio::test]
    async fn get_for_user_enforces_membership() {
        let fx = fixture();
        let a = seed(&fx, "alice").await;
        let b = seed(&fx, "bob").await;
        let outsider = seed(&fx, "mallory").await;

        let (conv, _) = fx.service.create_direct(a, b).await.unwrap();
        let err = fx.service.get_for_user(outsider, conv.id).await.unwrap_err();
        assert!(matches!(err, ApplicationError::Authorization));
    }
}
