//! 投递与状态引擎
//!
//! 决定每条新消息的状态推进和未读增量：持久化并扇出即视为
//! delivered；seen 只能由非发送者的"会话已查看"事件触发。
//! 对未订阅会话房间的其他成员，引擎选择整份会话推送而非轻量
//! 通知，让从未拉取过会话列表的客户端可以直接渲染。

use std::collections::HashSet;
use std::sync::Arc;

use domain::{Conversation, Message, MessageRepository, MessageStatus, UserId};

use crate::error::ApplicationResult;

/// 整份会话推送里固定的未读数。真实未读数留待客户端下一次
/// 列表拉取时校正，这是沿用的简化行为而非缺陷。
const PUSH_UNREAD_COUNT: u64 = 1;

/// 投递引擎
pub struct DeliveryEngine {
    messages: Arc<dyn MessageRepository>,
}

impl DeliveryEngine {
    pub fn new(messages: Arc<dyn MessageRepository>) -> Self {
        Self { messages }
    }

    /// 消息持久化成功后推进到 delivered。
    /// 返回状态是否变化（重复调用幂等）。
    pub fn mark_delivered(&self, message: &mut Message) -> bool {
        message.advance_status(MessageStatus::Delivered)
    }

    /// 选出需要整份会话推送的成员：除发送者外、且当前没有任何
    /// 连接订阅该会话房间的参与者。已订阅者由 `message:new` 覆盖。
    pub fn instant_push_targets(
        &self,
        conversation: &Conversation,
        sender: UserId,
        subscribed: &HashSet<UserId>,
    ) -> Vec<UserId> {
        conversation
            .participants
            .iter()
            .copied()
            .filter(|p| *p != sender && !subscribed.contains(p))
            .collect()
    }

    pub fn push_unread_count(&self) -> u64 {
        PUSH_UNREAD_COUNT
    }

    /// 列表读取路径的真实未读数：读取游标之后、非本人发送的消息数
    pub async fn unread_for(
        &self,
        conversation: &Conversation,
        user: UserId,
    ) -> ApplicationResult<u64> {
        let cursor = conversation.read_cursor(user);
        let count = self
            .messages
            .count_unread(conversation.id, user, cursor)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryMessageRepository;
    use chrono::{Duration, Utc};
    use domain::{ConversationId, MessageId, MessageText};

    fn engine() -> (DeliveryEngine, Arc<MemoryMessageRepository>) {
        let messages = Arc::new(MemoryMessageRepository::new());
        (DeliveryEngine::new(messages.clone()), messages)
    }

    #[tokio::test]
    async fn delivered_advance_is_idempotent() {
        let (engine, _) = engine();
        let mut msg = Message::new_text(
            MessageId::generate(),
            ConversationId::generate(),
            UserId::generate(),
            MessageText::parse("hi").unwrap(),
            None,
            Utc::now(),
        );

        assert!(engine.mark_delivered(&mut msg));
        assert_eq!(msg.status, MessageStatus::Delivered);
        assert!(!engine.mark_delivered(&mut msg));

        // 已 seen 的消息不会被拉回 delivered
        msg.advance_status(MessageStatus::Seen);
        assert!(!engine.mark_delivered(&mut msg));
        assert_eq!(msg.status, MessageStatus::Seen);
    }

    #[tokio::test]
    async fn push_targets_exclude_sender_and_subscribed() {
        let (engine, _) = engine();
        let sender = UserId::generate();
        let joined = UserId::generate();
        let absent = UserId::generate();
        let conversation = Conversation::group(
            ConversationId::generate(),
            sender,
            vec![joined, absent],
            "team",
            None,
            Utc::now(),
        )
        .unwrap();

        let mut subscribed = HashSet::new();
        subscribed.insert(sender);
        subscribed.insert(joined);

        let targets = engine.instant_push_targets(&conversation, sender, &subscribed);
        assert_eq!(targets, vec![absent]);
        assert_eq!(engine.push_unread_count(), 1);
    }

    #[tokio::test]
    async fn unread_uses_read_cursor() {
        let (engine, messages) = engine();
        let a = UserId::generate();
        let b = UserId::generate();
        let mut conversation =
            Conversation::direct(ConversationId::generate(), a, b, Utc::now()).unwrap();
        let base = Utc::now();

        for i in 0..4 {
            let msg = Message::new_text(
                MessageId::generate(),
                conversation.id,
                a,
                MessageText::parse(format!("m{i}")).unwrap(),
                None,
                base + Duration::seconds(i),
            );
            messages.create(msg).await.unwrap();
        }

        // b 没有游标：全部 4 条未读
        assert_eq!(engine.unread_for(&conversation, b).await.unwrap(), 4);

        conversation.upsert_read_cursor(b, base + Duration::seconds(1));
        assert_eq!(engine.unread_for(&conversation, b).await.unwrap(), 2);

        // 发送者视角永远是 0
        assert_eq!(engine.unread_for(&conversation, a).await.unwrap(), 0);
    }
}
