//! 会话目录
//!
//! 会话成员、最后消息快照和读取游标的窄更新接口。每个操作都
//! 重新读取会话——任何持久化调用都是挂起点，之后不信任内存里的旧副本。
//! 串行化只在进程内成立，不提供跨进程事务保证。

use std::sync::Arc;

use domain::{
    Conversation, ConversationId, ConversationRepository, LastMessage, Message, MessageRepository,
    MessageStatus, RepositoryError, Timestamp, UserId,
};

use crate::error::ApplicationResult;

/// 从消息构造最后消息快照
pub fn last_message_snapshot(message: &Message) -> LastMessage {
    LastMessage {
        message_id: message.id,
        text: message.text.clone(),
        sender: message.sender_id,
        created_at: message.created_at,
        status: message.status,
        is_edited: message.is_edited,
        is_deleted: message.is_deleted,
    }
}

/// 会话目录
pub struct ConversationDirectory {
    conversations: Arc<dyn ConversationRepository>,
    messages: Arc<dyn MessageRepository>,
}

impl ConversationDirectory {
    pub fn new(
        conversations: Arc<dyn ConversationRepository>,
        messages: Arc<dyn MessageRepository>,
    ) -> Self {
        Self {
            conversations,
            messages,
        }
    }

    /// 覆盖最后消息快照并刷新 updated_at，返回更新后的会话。
    /// 并发发送时后写者覆盖。
    pub async fn set_last_message(
        &self,
        id: ConversationId,
        snapshot: LastMessage,
        now: Timestamp,
    ) -> ApplicationResult<Conversation> {
        let mut conversation = self
            .conversations
            .find_by_id(id)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        conversation.set_last_message(Some(snapshot), now);
        let conversation = self.conversations.update(conversation).await?;
        Ok(conversation)
    }

    /// 消息编辑后同步快照：仅当被编辑的消息就是当前快照时才更新
    pub async fn refresh_after_edit(
        &self,
        message: &Message,
    ) -> ApplicationResult<Option<Conversation>> {
        let Some(mut conversation) =
            self.conversations.find_by_id(message.conversation_id).await?
        else {
            return Ok(None);
        };
        let is_current = conversation
            .last_message
            .as_ref()
            .map(|lm| lm.message_id == message.id)
            .unwrap_or(false);
        if is_current {
            let now = conversation.updated_at.max(message.edited_at.unwrap_or(conversation.updated_at));
            conversation.set_last_message(Some(last_message_snapshot(message)), now);
            conversation = self.conversations.update(conversation).await?;
        }
        Ok(Some(conversation))
    }

    /// 消息删除后重算快照：取最近一条未删除消息，没有则清空
    pub async fn recompute_last_message(
        &self,
        id: ConversationId,
        now: Timestamp,
    ) -> ApplicationResult<Option<Conversation>> {
        let Some(mut conversation) = self.conversations.find_by_id(id).await? else {
            return Ok(None);
        };
        let snapshot = self
            .messages
            .latest_visible(id)
            .await?
            .map(|m| last_message_snapshot(&m));
        conversation.set_last_message(snapshot, now);
        let conversation = self.conversations.update(conversation).await?;
        Ok(Some(conversation))
    }

    /// 更新成员的读取游标
    pub async fn upsert_read_cursor(
        &self,
        id: ConversationId,
        user: UserId,
        at: Timestamp,
    ) -> ApplicationResult<Conversation> {
        let mut conversation = self
            .conversations
            .find_by_id(id)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        conversation.upsert_read_cursor(user, at);
        let conversation = self.conversations.update(conversation).await?;
        Ok(conversation)
    }

    /// 会话被查看的聚合处理：
    /// 所有非 viewer 发送的消息推进到 seen 并记录 viewer，
    /// viewer 的读取游标更新到 now，最后消息快照同步为 seen。
    pub async fn mark_seen(
        &self,
        id: ConversationId,
        viewer: UserId,
        now: Timestamp,
    ) -> ApplicationResult<Conversation> {
        self.messages.mark_seen_except(id, viewer).await?;

        // 消息更新是挂起点，会话需要重新读取
        let mut conversation = self
            .conversations
            .find_by_id(id)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        conversation.upsert_read_cursor(viewer, now);
        if let Some(last) = conversation.last_message.as_mut() {
            last.status = MessageStatus::Seen;
        }
        let conversation = self.conversations.update(conversation).await?;
        Ok(conversation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryConversationRepository, MemoryMessageRepository};
    use chrono::{Duration, Utc};
    use domain::MessageText;

    struct Fixture {
        directory: ConversationDirectory,
        messages: Arc<MemoryMessageRepository>,
        conversation: Conversation,
        a: UserId,
        b: UserId,
    }

    async fn fixture() -> Fixture {
        let conversations = Arc::new(MemoryConversationRepository::new());
        let messages = Arc::new(MemoryMessageRepository::new());
        let a = UserId::generate();
        let b = UserId::generate();
        let conversation = Conversation::direct(ConversationId::generate(), a, b, Utc::now())
            .unwrap();
        conversations.create(conversation.clone()).await.unwrap();
        let directory = ConversationDirectory::new(conversations, messages.clone());
        Fixture {
            directory,
            messages,
            conversation,
            a,
            b,
        }
    }

    fn new_message(conversation: ConversationId, sender: UserId, text: &str) -> Message {
        Message::new_text(
            domain::MessageId::generate(),
            conversation,
            sender,
            MessageText::parse(text).unwrap(),
            None,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn set_last_message_touches_updated_at() {
        let fx = fixture().await;
        let msg = new_message(fx.conversation.id, fx.a, "hi");
        let later = fx.conversation.updated_at + Duration::seconds(10);

        let updated = fx
            .directory
            .set_last_message(fx.conversation.id, last_message_snapshot(&msg), later)
            .await
            .unwrap();

        assert_eq!(updated.updated_at, later);
        assert_eq!(updated.last_message.unwrap().text, "hi");
    }

    #[tokio::test]
    async fn refresh_after_edit_only_touches_current_snapshot() {
        let fx = fixture().await;
        let mut first = new_message(fx.conversation.id, fx.a, "first");
        let second = new_message(fx.conversation.id, fx.a, "second");

        fx.directory
            .set_last_message(fx.conversation.id, last_message_snapshot(&second), Utc::now())
            .await
            .unwrap();

        // 编辑的不是当前快照，目录不应被改写
        first
            .edit(MessageText::parse("first*").unwrap(), Utc::now())
            .unwrap();
        let conv = fx
            .directory
            .refresh_after_edit(&first)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conv.last_message.as_ref().unwrap().text, "second");

        let mut second_edited = second.clone();
        second_edited
            .edit(MessageText::parse("second*").unwrap(), Utc::now())
            .unwrap();
        let conv = fx
            .directory
            .refresh_after_edit(&second_edited)
            .await
            .unwrap()
            .unwrap();
        let snapshot = conv.last_message.unwrap();
        assert_eq!(snapshot.text, "second*");
        assert!(snapshot.is_edited);
    }

    #[tokio::test]
    async fn recompute_falls_back_to_latest_visible_or_none() {
        let fx = fixture().await;
        let mut only = new_message(fx.conversation.id, fx.a, "only");
        fx.messages.create(only.clone()).await.unwrap();
        fx.directory
            .set_last_message(fx.conversation.id, last_message_snapshot(&only), Utc::now())
            .await
            .unwrap();

        only.soft_delete(Utc::now()).unwrap();
        fx.messages.update(only).await.unwrap();

        let conv = fx
            .directory
            .recompute_last_message(fx.conversation.id, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert!(conv.last_message.is_none());
    }

    #[tokio::test]
    async fn mark_seen_rolls_up_messages_cursor_and_snapshot() {
        let fx = fixture().await;
        for i in 0..3 {
            let msg = new_message(fx.conversation.id, fx.a, &format!("m{i}"));
            fx.messages.create(msg.clone()).await.unwrap();
            fx.directory
                .set_last_message(fx.conversation.id, last_message_snapshot(&msg), Utc::now())
                .await
                .unwrap();
        }

        let now = Utc::now();
        let conv = fx
            .directory
            .mark_seen(fx.conversation.id, fx.b, now)
            .await
            .unwrap();

        assert_eq!(conv.read_cursor(fx.b), Some(now));
        assert_eq!(conv.last_message.unwrap().status, MessageStatus::Seen);

        let page = fx
            .messages
            .list_page(fx.conversation.id, None, 10)
            .await
            .unwrap();
        assert_eq!(page.len(), 3);
        for msg in &page {
            assert_eq!(msg.status, MessageStatus::Seen);
            assert!(msg.seen_by.contains(&fx.b));
        }

        // 第二次查看是幂等的
        let again = fx
            .directory
            .mark_seen(fx.conversation.id, fx.b, now + Duration::seconds(1))
            .await;
        assert!(again.is_ok());
        let page = fx
            .messages
            .list_page(fx.conversation.id, None, 10)
            .await
            .unwrap();
        for msg in &page {
            assert_eq!(msg.seen_by.iter().filter(|u| **u == fx.b).count(), 1);
        }
    }
}
